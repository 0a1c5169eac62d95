//! label-scan - nutrition label scanning
//!
//! Runs an external OCR engine over a photographed food label and rebuilds
//! the label's row layout from the engine's unordered text boxes.

pub mod config;
pub mod vision;

pub use config::AppConfig;
pub use vision::{
    CancelToken, CommandEngine, Detection, EngineError, LineParseError, OcrEngine, Row, RowClusterer, RowSet,
    ScanError, ScanPipeline, ScanReport,
};
