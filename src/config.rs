//! Application configuration
//!
//! Loaded from an optional JSON file; every field has a default so a partial
//! file (or none at all) is enough.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::explain::compositor::check_blend_strength;
use crate::model::registry::{default_catalog, ModelEntry};
use crate::session::live::LiveSessionConfig;
use crate::utils::error::{CarXplainError, Result};

/// Dashboard configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory holding the `.mpk` weight files and their `.json` configs
    pub models_dir: PathBuf,

    /// Newline-separated class names; generic names are used when missing
    pub labels_path: PathBuf,

    /// Selectable models
    pub models: Vec<ModelEntry>,

    /// Heatmap opacity in (0, 1)
    pub blend_strength: f32,

    /// Number of ranked classes kept per prediction
    pub top_k: usize,

    pub live: LiveSessionConfig,

    /// Where reports, heatmaps and charts are written
    pub output_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            labels_path: PathBuf::from("models/labels.txt"),
            models: default_catalog(),
            blend_strength: crate::explain::DEFAULT_BLEND_STRENGTH,
            top_k: crate::inference::predictor::DEFAULT_TOP_K,
            live: LiveSessionConfig::default(),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl AppConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(CarXplainError::Config(
                "at least one model must be configured".to_string(),
            ));
        }

        let mut names: Vec<&str> = self.models.iter().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        if let Some(dup) = names.windows(2).find(|w| w[0] == w[1]) {
            return Err(CarXplainError::Config(format!(
                "model name '{}' is configured twice",
                dup[0]
            )));
        }

        check_blend_strength(self.blend_strength)
            .map_err(|e| CarXplainError::Config(e.to_string()))?;

        if self.top_k == 0 {
            return Err(CarXplainError::Config("top_k must be at least 1".to_string()));
        }

        self.live.validate().map_err(CarXplainError::Config)?;

        Ok(())
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| CarXplainError::Config(format!("reading {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        tracing::debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// `load` when a path is given, defaults otherwise
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Save configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
