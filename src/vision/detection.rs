//! OCR detections
//!
//! A detection is one recognized text region: the text, the engine's
//! confidence and the 4-point polygon around it.

use serde::Serialize;

/// A corner of a detection polygon in pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Single recognized text region
///
/// Corners are ordered top-left, top-right, bottom-right, bottom-left.
/// Extents are computed once at construction; a detection never changes
/// afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    text: String,
    confidence: f64,
    polygon: [Point; 4],
    #[serde(skip)]
    min_x: f64,
    #[serde(skip)]
    max_x: f64,
    #[serde(skip)]
    min_y: f64,
    #[serde(skip)]
    max_y: f64,
    #[serde(skip)]
    center_y: f64,
}

impl Detection {
    /// Create a detection from its text, confidence and polygon
    pub fn new(text: impl Into<String>, confidence: f64, polygon: [Point; 4]) -> Self {
        let [top_left, top_right, bottom_right, bottom_left] = polygon;

        let min_x = polygon.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let max_x = polygon.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let min_y = top_left.y.min(top_right.y).min(bottom_right.y).min(bottom_left.y);
        let max_y = top_left.y.max(top_right.y).max(bottom_right.y).max(bottom_left.y);

        Self {
            text: text.into(),
            confidence,
            polygon,
            min_x,
            max_x,
            min_y,
            max_y,
            // Left edge only, so a skewed right edge does not move the line
            center_y: (top_left.y + bottom_left.y) / 2.0,
        }
    }

    /// Create a detection from the engine's flat `[x0,y0,x1,y1,x2,y2,x3,y3]` layout
    pub fn from_flat(text: impl Into<String>, confidence: f64, coords: [f64; 8]) -> Self {
        let polygon = [
            Point::new(coords[0], coords[1]),
            Point::new(coords[2], coords[3]),
            Point::new(coords[4], coords[5]),
            Point::new(coords[6], coords[7]),
        ];
        Self::new(text, confidence, polygon)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    pub fn polygon(&self) -> &[Point; 4] {
        &self.polygon
    }

    /// Polygon flattened back to `[x0,y0,x1,y1,x2,y2,x3,y3]`
    pub fn flat_box(&self) -> [f64; 8] {
        let p = &self.polygon;
        [p[0].x, p[0].y, p[1].x, p[1].y, p[2].x, p[2].y, p[3].x, p[3].y]
    }

    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    /// Vertical midpoint of the left edge
    pub fn center_y(&self) -> f64 {
        self.center_y
    }

    /// Vertical span `(min_y, max_y)`
    pub fn span(&self) -> (f64, f64) {
        (self.min_y, self.max_y)
    }
}

/// Keep detections with `confidence >= threshold`, preserving order
pub fn filter_by_confidence(detections: Vec<Detection>, threshold: f64) -> Vec<Detection> {
    detections
        .into_iter()
        .filter(|d| d.confidence >= threshold)
        .collect()
}
