//! Configuration for the translation system.
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::filters::ContentFilters;
use crate::model::{BatchSettings, TranslationRequest};

const CONFIG_DIR_NAME: &str = "sheet-translator";
const CONFIG_FILE_NAME: &str = "config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Timing knobs of the batch processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProcessorOptions {
    /// Pause between consecutive slices.
    pub pacing_delay_ms: u64,
    /// Extra wait after a rate-limit response.
    pub rate_limit_pause_secs: u64,
    pub max_backoff_secs: u64,
    /// Per provider call.
    pub request_timeout_secs: u64,
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            pacing_delay_ms: 100,
            rate_limit_pause_secs: 5,
            max_backoff_secs: 60,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionOptions {
    /// How many non-empty cells are sampled for auto-detection.
    pub sample_size: usize,
    pub min_confidence: f64,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            sample_size: 10,
            min_confidence: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupOptions {
    pub enabled: bool,
    /// Defaults to the source file's directory.
    pub directory: Option<PathBuf>,
    pub max_age_days: u32,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            max_age_days: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranslatorConfig {
    pub batch: BatchSettings,
    pub filters: ContentFilters,
    pub processor: ProcessorOptions,
    pub detection: DetectionOptions,
    pub backup: BackupOptions,
}

impl TranslatorConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(serde_yaml::from_str(&content)?)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, content).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load from JSON string (for shell integration)
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `<config dir>/sheet-translator/config.yaml`, when the platform has one.
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Empty request for `file_path` carrying this config's batch settings
    /// and filters. `None` for the source turns on auto-detection.
    pub fn request_for(
        &self,
        file_path: impl Into<PathBuf>,
        source_lang: Option<&str>,
        target_lang: &str,
    ) -> TranslationRequest {
        let mut request = TranslationRequest::simple(file_path, source_lang, target_lang);
        request.batch_settings = self.batch.clone();
        request.content_filters = self.filters.clone();
        request
    }

    /// Reads `path`, falling back to defaults when the file does not exist.
    /// Parse errors are still reported.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        match Self::from_yaml_file(path.as_ref()) {
            Err(ConfigError::Read { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                log::debug!(
                    "no config at {}, using defaults",
                    path.as_ref().display()
                );
                Ok(Self::default())
            }
            other => other,
        }
    }
}
