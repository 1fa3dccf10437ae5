//! Engine configuration — one TOML file for every runner component.
//!
//! All sections are optional; missing sections and fields take their
//! defaults, so a file only needs the values it changes:
//!
//! ```toml
//! [optimizer]
//! method = "genetic"
//! max_iterations = 60
//!
//! [split]
//! mode = "k_fold"
//! k = 4
//! purge_gap = 5
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use stratguard_core::error::ErrorKind;
use stratguard_core::split::SplitMode;

use crate::optimizer::OptimizerConfig;
use crate::overfitting::OverfittingConfig;
use crate::walk_forward::ValidationConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub optimizer: OptimizerConfig,
    pub split: SplitMode,
    pub overfitting: OverfittingConfig,
    pub validation: ValidationSection,
}

/// Walk-forward settings that are not owned by another section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSection {
    /// Train candidates re-scored on the validation window (default 5).
    pub top_k: usize,
}

impl Default for ValidationSection {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidConfig
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Parse from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// The walk-forward pipeline configuration assembled from the sections.
    pub fn validation_config(&self) -> ValidationConfig {
        ValidationConfig {
            split: self.split.clone(),
            optimizer: self.optimizer.clone(),
            overfitting: self.overfitting.clone(),
            validation_top_k: self.validation.top_k,
        }
    }
}
