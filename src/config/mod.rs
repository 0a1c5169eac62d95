//! Application Configuration
//!
//! Scanner settings stored in TOML format. Every section falls back to its
//! defaults when missing from the file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Scanner settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// External OCR engine invocation
    pub engine: EngineSettings,
    /// Image cleanup applied before OCR
    pub preprocess: PreprocessSettings,
    /// Row reconstruction heuristics
    pub layout: LayoutSettings,
    /// Diagnostic overlay drawing
    pub overlay: OverlaySettings,
}

/// How to run the OCR engine process
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Executable name or path
    pub program: String,
    /// Arguments passed before the image path (the path is always last)
    pub args: Vec<String>,
    /// Seconds to wait for the engine before killing it
    pub timeout_secs: u64,
}

impl EngineSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            program: "easyocr".to_string(),
            args: ["-l", "en", "--detail", "1", "-f"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            timeout_secs: 60,
        }
    }
}

/// Preprocessing applied to the label photo before it reaches the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessSettings {
    /// Master switch; when off the original file is handed to the engine
    pub enabled: bool,
    /// Convert to grayscale
    pub grayscale: bool,
    /// Median-filter speckle noise
    pub despeckle: bool,
    /// Median filter radius in pixels
    pub despeckle_radius: u32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            grayscale: true,
            despeckle: true,
            despeckle_radius: 1,
        }
    }
}

/// Heuristics used to turn detections into rows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    /// Detections below this confidence are dropped
    pub min_confidence: f64,
    /// Fraction of the smaller vertical span two boxes must share to be on one row
    pub overlap_fraction: f64,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            min_confidence: 0.1,
            overlap_fraction: 0.5,
        }
    }
}

/// Diagnostic overlay settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlaySettings {
    /// Outline color for detection boxes (RGB)
    pub color: [u8; 3],
    /// Outline thickness in pixels
    pub thickness: u32,
    /// Also outline each reconstructed row
    pub draw_rows: bool,
    /// Outline color for row boxes (RGB)
    pub row_color: [u8; 3],
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            color: [0, 255, 0],
            thickness: 1,
            draw_rows: false,
            row_color: [255, 0, 0],
        }
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file {:?}", path))?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Get the configuration directory, creating it if needed
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("com", "labelscan", "LabelScan")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    let config_dir = proj_dirs.config_dir().to_path_buf();
    std::fs::create_dir_all(&config_dir)?;

    Ok(config_dir)
}

/// Default location of `config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    Ok(get_config_dir()?.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert_eq!(config.engine.program, "easyocr");
        assert_eq!(config.engine.args.last().map(String::as_str), Some("-f"));
        assert_eq!(config.engine.timeout(), Duration::from_secs(60));

        assert!(config.preprocess.enabled);
        assert!(config.preprocess.grayscale);
        assert!(config.preprocess.despeckle);
        assert_eq!(config.preprocess.despeckle_radius, 1);

        assert!((config.layout.min_confidence - 0.1).abs() < 1e-9);
        assert!((config.layout.overlap_fraction - 0.5).abs() < 1e-9);

        assert_eq!(config.overlay.color, [0, 255, 0]);
        assert_eq!(config.overlay.thickness, 1);
        assert!(!config.overlay.draw_rows);
    }

    #[test]
    fn test_config_with_custom_values() {
        let mut config = AppConfig::default();
        config.engine.program = "/opt/ocr/bin/easyocr".to_string();
        config.layout.overlap_fraction = 0.3;
        config.overlay.thickness = 3;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.engine.program, "/opt/ocr/bin/easyocr");
        assert!((parsed.layout.overlap_fraction - 0.3).abs() < 1e-9);
        assert_eq!(parsed.overlay.thickness, 3);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str("[layout]\nmin_confidence = 0.4\n").unwrap();

        assert!((parsed.layout.min_confidence - 0.4).abs() < 1e-9);
        assert!((parsed.layout.overlap_fraction - 0.5).abs() < 1e-9);
        assert_eq!(parsed.engine.program, "easyocr");
        assert_eq!(parsed.overlay.color, [0, 255, 0]);
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.engine.args, loaded.engine.args);
        assert_eq!(config.preprocess.despeckle_radius, loaded.preprocess.despeckle_radius);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}
