//! Configuration for the fNIRS toolkit.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Main configuration for a processing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the converted recordings
    pub input_dir: Option<PathBuf>,

    /// Root of the report output (tables under `data/`, figures under `figures/`)
    pub output_dir: PathBuf,

    /// Channel-to-region mapping artifact; region reports are skipped without one
    pub mapping_path: Option<PathBuf>,

    /// Extension of input files, without the dot
    pub input_extension: String,

    /// Extraction workers; 1 processes files sequentially
    pub workers: usize,

    /// Path for storing the run ledger
    pub data_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fnirs-toolkit");

        Self {
            input_dir: None,
            output_dir: PathBuf::from("output"),
            mapping_path: None,
            input_extension: "json".to_string(),
            workers: 1,
            data_path: data_dir,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file, falling back to defaults when absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("fnirs-toolkit")
            .join("config.json")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.input_extension.trim().is_empty() {
            return Err(ConfigError::Invalid("input_extension must not be empty".into()));
        }
        Ok(())
    }

    /// Output layout derived from `output_dir`.
    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(&self.output_dir)
    }
}

/// Values given on the command line that replace configured ones.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub mapping_path: Option<PathBuf>,
    pub input_extension: Option<String>,
    pub workers: Option<usize>,
}

impl ConfigOverrides {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every override that is set, then validate the result.
    pub fn apply_to(self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(dir) = self.input_dir {
            config.input_dir = Some(dir);
        }
        if let Some(dir) = self.output_dir {
            config.output_dir = dir;
        }
        if let Some(path) = self.mapping_path {
            config.mapping_path = Some(path);
        }
        if let Some(ext) = self.input_extension {
            config.input_extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        config.validate()
    }
}

/// Where a run writes its tables and renderer artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    pub root: PathBuf,
    pub data_dir: PathBuf,
    pub figures_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            data_dir: root.join("data"),
            figures_dir: root.join("figures"),
            root,
        }
    }

    /// Ensure all output directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.figures_dir)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
