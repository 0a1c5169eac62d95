//! Error types for the scan pipeline

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// One line of engine output could not be turned into a detection.
///
/// Recoverable: the pipeline logs it and moves on to the next line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed detection line ({reason}): {line}")]
pub struct LineParseError {
    /// The raw line as emitted by the engine
    pub line: String,
    /// What the tokenizer was looking for when it gave up
    pub reason: String,
}

impl LineParseError {
    pub fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Failure to obtain output from the OCR engine process
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("OCR engine `{program}` could not be started: {source}")]
    Missing {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("OCR engine exited with {status}: {stderr}")]
    Failed { status: ExitStatus, stderr: String },
    #[error("OCR engine timed out after {0:?}")]
    Timeout(Duration),
    #[error("OCR engine invocation was cancelled")]
    Cancelled,
    #[error("I/O error while talking to the OCR engine: {0}")]
    Io(#[from] std::io::Error),
}

/// Fatal outcome of scanning one image, tagged with that image
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("{image:?}: OCR engine invocation failed: {source}")]
    EngineInvocation {
        image: PathBuf,
        #[source]
        source: EngineError,
    },
    #[error("{image:?}: could not decode image: {source}")]
    ImageDecode {
        image: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{image:?}: could not encode overlay to {output:?}: {source}")]
    ImageEncode {
        image: PathBuf,
        output: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{image:?}: could not prepare image for OCR: {source}")]
    Preprocess {
        image: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("{image:?}: no text found")]
    EmptyDetectionSet { image: PathBuf },
}

impl ScanError {
    /// The image this failure belongs to
    pub fn image(&self) -> &std::path::Path {
        match self {
            Self::EngineInvocation { image, .. }
            | Self::ImageDecode { image, .. }
            | Self::ImageEncode { image, .. }
            | Self::Preprocess { image, .. }
            | Self::EmptyDetectionSet { image } => image,
        }
    }

    /// True for the "no text found" outcome, which callers usually report
    /// rather than treat as a failure
    pub fn is_no_text(&self) -> bool {
        matches!(self, Self::EmptyDetectionSet { .. })
    }
}
