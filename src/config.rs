//! Library configuration.
//!
//! The suffix delimiter, index prefix, and scroll extension are explicit
//! configuration handed to the name codec's constructor, never process-wide
//! state. Loadable from a TOML file; defaults match the stock vault layout.

use crate::error::ReconcileError;
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the library reconciliation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Name of the library root section (and root folder).
    #[serde(default = "default_root_name")]
    pub root_name: String,

    /// Delimiter joining a basename's core name with its suffix parts.
    /// Node names must not contain it.
    #[serde(default = "default_delimiter")]
    pub suffix_delimiter: String,

    /// Fixed basename prefix of generated codex (index) documents.
    #[serde(default = "default_index_prefix")]
    pub index_prefix: String,

    /// Extension of scroll leaves.
    #[serde(default = "default_scroll_extension")]
    pub scroll_extension: String,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_root_name() -> String {
    "Library".to_string()
}

fn default_delimiter() -> String {
    "-".to_string()
}

fn default_index_prefix() -> String {
    "__".to_string()
}

fn default_scroll_extension() -> String {
    "md".to_string()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root_name: default_root_name(),
            suffix_delimiter: default_delimiter(),
            index_prefix: default_index_prefix(),
            scroll_extension: default_scroll_extension(),
            logging: LoggingConfig::default(),
        }
    }
}

impl LibraryConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ReconcileError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::Config(format!("failed to read config {:?}: {}", path, e))
        })?;
        let config: LibraryConfig = toml::from_str(&raw)
            .map_err(|e| ReconcileError::Config(format!("invalid config {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the codec cannot work with.
    pub fn validate(&self) -> Result<(), ReconcileError> {
        if self.root_name.is_empty() {
            return Err(ReconcileError::Config("root_name must be non-empty".into()));
        }
        if self.suffix_delimiter.is_empty() {
            return Err(ReconcileError::Config(
                "suffix_delimiter must be non-empty".into(),
            ));
        }
        if self.root_name.contains(&self.suffix_delimiter) {
            return Err(ReconcileError::Config(
                "root_name must not contain the suffix delimiter".into(),
            ));
        }
        if self.index_prefix.contains(&self.suffix_delimiter) {
            return Err(ReconcileError::Config(
                "index_prefix must not contain the suffix delimiter".into(),
            ));
        }
        Ok(())
    }
}
