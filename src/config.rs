use crate::context::SortOrder;
use crate::fields::MAX_LINE_LENGTH;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    pub initial_limit: usize,
    pub load_more_step: usize,
    pub sort_order: SortOrder,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self { initial_limit: 10, load_more_step: 10, sort_order: SortOrder::Descending }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Values shown before the rest collapse into "Other".
    pub top_k: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self { top_k: 5 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    pub max_line_length: usize,
    pub format_cache_capacity: usize,
    pub context: ContextConfig,
    pub stats: StatsConfig,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            max_line_length: MAX_LINE_LENGTH,
            format_cache_capacity: 1,
            context: ContextConfig::default(),
            stats: StatsConfig::default(),
        }
    }
}

impl ExploreConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: ExploreConfig = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_line_length == 0 {
            return Err(ConfigError::Invalid("max_line_length must be > 0".into()));
        }
        if self.format_cache_capacity == 0 {
            return Err(ConfigError::Invalid("format_cache_capacity must be > 0".into()));
        }
        if self.context.initial_limit == 0 {
            return Err(ConfigError::Invalid("context.initial_limit must be > 0".into()));
        }
        if self.context.load_more_step == 0 {
            return Err(ConfigError::Invalid("context.load_more_step must be > 0".into()));
        }
        Ok(())
    }
}
