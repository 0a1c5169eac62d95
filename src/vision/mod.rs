//! Label scanning pipeline
//!
//! Turns a photographed nutrition label into rows of text:
//!
//! engine output -> [`parse`] -> confidence filter -> [`rows`] -> [`RowSet`]
//!
//! and, for diagnostics, draws the reconstructed boxes over the photo
//! ([`overlay`]).

pub mod detection;
pub mod error;
pub mod ocr;
pub mod ocr_preprocess;
pub mod overlay;
pub mod parse;
pub mod rows;

pub use detection::{filter_by_confidence, Detection, Point};
pub use error::{EngineError, LineParseError, ScanError};
pub use ocr::{CancelToken, CommandEngine, OcrEngine};
pub use overlay::{render_overlay, render_rows, BoxOutline, OverlayStyle};
pub use parse::{parse_detection_line, parse_engine_output};
pub use rows::{cluster_rows, Row, RowClusterer, RowSet};

use image::{DynamicImage, ImageFormat, ImageReader};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, LayoutSettings, OverlaySettings, PreprocessSettings};

/// Result of scanning one image
#[derive(Debug)]
pub struct ScanReport {
    /// Image the report belongs to
    pub image: PathBuf,
    /// Reconstructed rows, top to bottom
    pub rows: RowSet,
    /// Engine lines that could not be parsed
    pub skipped_lines: Vec<LineParseError>,
    /// Detections dropped for low confidence
    pub low_confidence: usize,
    /// Overlay outcome, when one was requested. A failure here does not
    /// affect `rows`.
    pub overlay: Option<Result<PathBuf, ScanError>>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

/// Runs the OCR engine over one image and interprets its output
///
/// Holds no per-image state, so one pipeline per thread can scan images in
/// parallel.
pub struct ScanPipeline<E = CommandEngine> {
    engine: E,
    layout: LayoutSettings,
    preprocess: PreprocessSettings,
    overlay: OverlaySettings,
    cancel: CancelToken,
}

impl ScanPipeline<CommandEngine> {
    /// Pipeline driving the configured external engine
    pub fn from_config(config: &AppConfig) -> Self {
        Self::with_engine(CommandEngine::from_settings(&config.engine), config)
    }
}

impl<E: OcrEngine> ScanPipeline<E> {
    /// Pipeline over a custom engine
    pub fn with_engine(engine: E, config: &AppConfig) -> Self {
        Self {
            engine,
            layout: config.layout.clone(),
            preprocess: config.preprocess.clone(),
            overlay: config.overlay.clone(),
            cancel: CancelToken::new(),
        }
    }

    /// Share a cancellation flag with other pipelines
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Scan an image and return its rows
    pub fn scan(&self, image: &Path) -> Result<ScanReport, ScanError> {
        self.scan_with_overlay(image, None)
    }

    /// Scan an image, optionally writing a diagnostic overlay to `overlay_output`
    ///
    /// The overlay is encoded in the same format as the source image.
    pub fn scan_with_overlay(&self, image: &Path, overlay_output: Option<&Path>) -> Result<ScanReport, ScanError> {
        let start = Instant::now();
        info!("Scanning {:?}", image);

        let mut original = None;
        let prepared = if self.preprocess.enabled {
            let (decoded, format) = decode_image(image)?;
            let prepared = match ocr_preprocess::preprocess_for_ocr(&decoded, &self.preprocess) {
                Some(processed) => Some(ocr_preprocess::write_temp_png(&processed).map_err(|source| {
                    ScanError::Preprocess {
                        image: image.to_path_buf(),
                        source,
                    }
                })?),
                None => None,
            };
            original = Some((decoded, format));
            prepared
        } else {
            None
        };

        let engine_input = prepared.as_ref().map_or(image, |temp| temp.path());
        let output = self
            .engine
            .recognize(engine_input, &self.cancel)
            .map_err(|source| ScanError::EngineInvocation {
                image: image.to_path_buf(),
                source,
            })?;
        drop(prepared);
        self.ensure_not_cancelled(image)?;

        let mut report = self.interpret(image, &output)?;

        if let Some(output_path) = overlay_output {
            self.ensure_not_cancelled(image)?;
            let outcome = self.write_overlay(image, original, &report.rows, output_path);
            if let Err(e) = &outcome {
                warn!("Overlay for {:?} failed: {}", image, e);
            }
            report.overlay = Some(outcome);
        }

        report.processing_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Scan of {:?} complete in {}ms: {} rows, {} detections",
            image,
            report.processing_time_ms,
            report.rows.len(),
            report.rows.detection_count()
        );
        Ok(report)
    }

    /// Interpret raw engine output that was captured for `image`
    pub fn interpret(&self, image: &Path, engine_output: &str) -> Result<ScanReport, ScanError> {
        let (detections, skipped_lines) = parse_engine_output(engine_output);
        for err in &skipped_lines {
            warn!("Skipping OCR line for {:?}: {}", image, err);
        }

        let parsed = detections.len();
        let detections = filter_by_confidence(detections, self.layout.min_confidence);
        let low_confidence = parsed - detections.len();
        debug!(
            "{:?}: {} detections parsed, {} below confidence {}",
            image, parsed, low_confidence, self.layout.min_confidence
        );

        if detections.is_empty() {
            info!("No text found in {:?}", image);
            return Err(ScanError::EmptyDetectionSet {
                image: image.to_path_buf(),
            });
        }

        let rows = RowClusterer::new(self.layout.overlap_fraction).cluster(detections);

        Ok(ScanReport {
            image: image.to_path_buf(),
            rows,
            skipped_lines,
            low_confidence,
            overlay: None,
            processing_time_ms: 0,
        })
    }

    fn write_overlay(
        &self,
        image: &Path,
        source: Option<(DynamicImage, ImageFormat)>,
        rows: &RowSet,
        output: &Path,
    ) -> Result<PathBuf, ScanError> {
        let (decoded, format) = match source {
            Some(source) => source,
            None => decode_image(image)?,
        };

        let canvas = render_rows(&decoded, rows, &self.overlay);
        overlay::write_overlay(&canvas, output, format).map_err(|source| ScanError::ImageEncode {
            image: image.to_path_buf(),
            output: output.to_path_buf(),
            source,
        })?;

        info!("Wrote overlay for {:?} to {:?}", image, output);
        Ok(output.to_path_buf())
    }

    fn ensure_not_cancelled(&self, image: &Path) -> Result<(), ScanError> {
        if self.cancel.is_cancelled() {
            return Err(ScanError::EngineInvocation {
                image: image.to_path_buf(),
                source: EngineError::Cancelled,
            });
        }
        Ok(())
    }
}

/// Decode an image, detecting its format from the content
pub fn decode_image(path: &Path) -> Result<(DynamicImage, ImageFormat), ScanError> {
    let decode_err = |source| ScanError::ImageDecode {
        image: path.to_path_buf(),
        source,
    };

    let reader = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| decode_err(image::ImageError::IoError(e)))?;
    let format = reader.format().or_else(|| ImageFormat::from_path(path).ok());
    let decoded = reader.decode().map_err(decode_err)?;

    // Fall back to PNG for formats that only exist on the decode side
    let format = format.filter(|f| f.writing_enabled()).unwrap_or(ImageFormat::Png);
    Ok((decoded, format))
}
