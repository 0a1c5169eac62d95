//! Diagnostic overlay
//!
//! Draws detection (and optionally row) outlines onto a copy of the scanned
//! image so the reconstructed layout can be checked by eye.

use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use std::io::{Cursor, Write};
use std::path::Path;

use super::detection::Detection;
use super::rows::{Row, RowSet};
use crate::config::OverlaySettings;

/// Box reduced to integer top-left and bottom-right corners, both inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxOutline {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl BoxOutline {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Coordinates are truncated toward zero
    pub fn from_detection(d: &Detection) -> Self {
        Self::new(d.min_x() as i32, d.min_y() as i32, d.max_x() as i32, d.max_y() as i32)
    }

    pub fn from_row(row: &Row) -> Self {
        let (x0, y0, x1, y1) = row.bounds();
        Self::new(x0 as i32, y0 as i32, x1 as i32, y1 as i32)
    }
}

/// Outline color and thickness
#[derive(Debug, Clone, Copy)]
pub struct OverlayStyle {
    pub color: Rgba<u8>,
    pub thickness: u32,
}

impl OverlayStyle {
    pub fn new(rgb: [u8; 3], thickness: u32) -> Self {
        Self {
            color: Rgba([rgb[0], rgb[1], rgb[2], 255]),
            thickness,
        }
    }
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self::new([0, 255, 0], 1)
    }
}

/// Return a copy of `image` with every box outlined
pub fn render_overlay(image: &DynamicImage, boxes: &[BoxOutline], style: &OverlayStyle) -> RgbaImage {
    let mut canvas = image.to_rgba8();
    for outline in boxes {
        draw_outline_mut(&mut canvas, *outline, style);
    }
    canvas
}

/// Outline every detection of `rows`, plus each row's bounds when enabled
pub fn render_rows(image: &DynamicImage, rows: &RowSet, settings: &OverlaySettings) -> RgbaImage {
    let boxes: Vec<BoxOutline> = rows.detections().map(BoxOutline::from_detection).collect();
    let mut canvas = render_overlay(image, &boxes, &OverlayStyle::new(settings.color, settings.thickness));

    if settings.draw_rows {
        let style = OverlayStyle::new(settings.row_color, settings.thickness);
        for row in rows {
            draw_outline_mut(&mut canvas, BoxOutline::from_row(row), &style);
        }
    }

    canvas
}

/// Paint the four bands of one outline. Anything outside the canvas is clipped.
pub fn draw_outline_mut(canvas: &mut RgbaImage, outline: BoxOutline, style: &OverlayStyle) {
    let t = i64::from(style.thickness);
    if t == 0 {
        return;
    }
    let (x0, y0) = (i64::from(outline.x0), i64::from(outline.y0));
    let (x1, y1) = (i64::from(outline.x1), i64::from(outline.y1));

    // top and bottom
    fill_clipped(canvas, x0, y0, x1, y0 + t - 1, style.color);
    fill_clipped(canvas, x0, y1 - t + 1, x1, y1, style.color);
    // left and right
    fill_clipped(canvas, x0, y0, x0 + t - 1, y1, style.color);
    fill_clipped(canvas, x1 - t + 1, y0, x1, y1, style.color);
}

/// Fill the inclusive rectangle `[x0, x1] x [y0, y1]` intersected with the canvas
fn fill_clipped(canvas: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba<u8>) {
    let (w, h) = canvas.dimensions();
    let x0 = x0.max(0);
    let y0 = y0.max(0);
    let x1 = x1.min(i64::from(w) - 1);
    let y1 = y1.min(i64::from(h) - 1);
    if x0 > x1 || y0 > y1 {
        return;
    }

    let rect = Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32);
    draw_filled_rect_mut(canvas, rect, color);
}

/// Encode the overlay in memory
///
/// JPEG has no alpha channel, so the image is flattened to RGB first.
pub fn encode_overlay(canvas: &RgbaImage, format: ImageFormat) -> Result<Vec<u8>, image::ImageError> {
    let image = if format == ImageFormat::Jpeg {
        DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(canvas.clone()).to_rgb8())
    } else {
        DynamicImage::ImageRgba8(canvas.clone())
    };

    let mut buf = Vec::new();
    image.write_to(&mut Cursor::new(&mut buf), format)?;
    Ok(buf)
}

/// Encode and write the overlay to `output`
///
/// The bytes go to a temporary file next to `output` that is renamed into
/// place only once fully written, so a failure never leaves a partial file.
pub fn write_overlay(canvas: &RgbaImage, output: &Path, format: ImageFormat) -> Result<(), image::ImageError> {
    let bytes = encode_overlay(canvas, format)?;

    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut temp = tempfile::NamedTempFile::new_in(dir)?;
    temp.write_all(&bytes)?;
    temp.flush()?;
    temp.persist(output).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgba<u8> = Rgba([255, 255, 255, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);

    fn white(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, WHITE))
    }

    fn changed(canvas: &RgbaImage) -> Vec<(u32, u32)> {
        canvas
            .enumerate_pixels()
            .filter(|(_, _, p)| **p != WHITE)
            .map(|(x, y, _)| (x, y))
            .collect()
    }

    #[test]
    fn test_single_box_paints_exact_perimeter() {
        let image = white(40, 40);
        let canvas = render_overlay(&image, &[BoxOutline::new(10, 10, 20, 20)], &OverlayStyle::default());

        let painted = changed(&canvas);
        assert_eq!(painted.len(), 40);
        for (x, y) in painted {
            let on_edge = x == 10 || x == 20 || y == 10 || y == 20;
            let inside = (10..=20).contains(&x) && (10..=20).contains(&y);
            assert!(on_edge && inside, "unexpected pixel ({}, {})", x, y);
            assert_eq!(*canvas.get_pixel(x, y), GREEN);
        }
    }

    #[test]
    fn test_thickness_grows_inward() {
        let image = white(40, 40);
        let style = OverlayStyle::new([0, 255, 0], 2);
        let canvas = render_overlay(&image, &[BoxOutline::new(10, 10, 20, 20)], &style);

        // 11x11 box minus its untouched 7x7 interior
        assert_eq!(changed(&canvas).len(), 121 - 49);
        assert_eq!(*canvas.get_pixel(11, 11), GREEN);
        assert_eq!(*canvas.get_pixel(12, 12), WHITE);
    }

    #[test]
    fn test_out_of_bounds_box_is_clipped() {
        let image = white(10, 10);
        let canvas = render_overlay(
            &image,
            &[BoxOutline::new(-5, -5, 5, 5), BoxOutline::new(50, 50, 80, 80)],
            &OverlayStyle::default(),
        );

        // Only the right and bottom edges of the first box are visible
        assert_eq!(changed(&canvas).len(), 11);
        assert_eq!(*canvas.get_pixel(5, 0), GREEN);
        assert_eq!(*canvas.get_pixel(0, 5), GREEN);
    }

    #[test]
    fn test_zero_thickness_draws_nothing() {
        let image = white(20, 20);
        let canvas = render_overlay(&image, &[BoxOutline::new(2, 2, 8, 8)], &OverlayStyle::new([0, 0, 0], 0));
        assert!(changed(&canvas).is_empty());
    }

    #[test]
    fn test_input_image_is_untouched() {
        let image = white(20, 20);
        let before = image.clone();
        let _ = render_overlay(&image, &[BoxOutline::new(2, 2, 8, 8)], &OverlayStyle::default());
        assert_eq!(image, before);
    }

    #[test]
    fn test_detection_coordinates_are_truncated() {
        let d = Detection::from_flat("x", 1.0, [10.9, 20.2, 30.7, 20.2, 30.7, 40.99, 10.9, 40.99]);
        assert_eq!(BoxOutline::from_detection(&d), BoxOutline::new(10, 20, 30, 40));
    }

    #[test]
    fn test_encode_jpeg_and_png() {
        let canvas = render_overlay(&white(16, 16), &[BoxOutline::new(1, 1, 10, 10)], &OverlayStyle::default());

        let jpeg = encode_overlay(&canvas, ImageFormat::Jpeg).unwrap();
        assert_eq!(image::guess_format(&jpeg).unwrap(), ImageFormat::Jpeg);

        let png = encode_overlay(&canvas, ImageFormat::Png).unwrap();
        let decoded = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(decoded, canvas);
    }

    #[test]
    fn test_write_overlay_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("label.overlay.png");
        let canvas = render_overlay(&white(8, 8), &[BoxOutline::new(0, 0, 7, 7)], &OverlayStyle::default());

        write_overlay(&canvas, &out, ImageFormat::Png).unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(image::open(&out).unwrap().to_rgba8(), canvas);
    }

    #[test]
    fn test_write_overlay_into_missing_dir_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("missing").join("label.overlay.png");
        let canvas = RgbaImage::from_pixel(4, 4, WHITE);

        assert!(write_overlay(&canvas, &out, ImageFormat::Png).is_err());
        assert!(!out.exists());
    }
}
