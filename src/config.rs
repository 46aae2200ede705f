//! Configuration management for ZeroBlur
//!
//! Provides configuration loading, saving, and validation for the stacking
//! pipeline and output settings. Stored as TOML.

use crate::errors::FocusStackError;
use crate::focus_stack::FocusStackConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZeroBlurConfig {
    pub stack: FocusStackConfig,
    pub output: OutputConfig,
}

/// Output file configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output directory for merged images
    pub output_directory: String,
    /// File name prefix, followed by `_yyyyMMdd_HHmmss.jpg`
    pub filename_prefix: String,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_directory: "./stacks".to_string(),
            filename_prefix: "ZeroBlur".to_string(),
            jpeg_quality: 100,
        }
    }
}

impl ZeroBlurConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, FocusStackError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)?;

        let config: ZeroBlurConfig = toml::from_str(&contents).map_err(|e| {
            FocusStackError::InvalidConfig(format!("Failed to parse config file: {}", e))
        })?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), FocusStackError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            FocusStackError::InvalidConfig(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("zeroblur.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        self.stack.validate().map_err(|e| e.to_string())?;

        if self.output.jpeg_quality == 0 || self.output.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        if self.output.filename_prefix.is_empty() {
            return Err("Filename prefix must not be empty".to_string());
        }
        if self
            .output
            .filename_prefix
            .contains(|c: char| c == '/' || c == '\\')
        {
            return Err("Filename prefix must not contain path separators".to_string());
        }

        Ok(())
    }
}
