//! Fetch configuration, loaded from environment variables.

use std::path::PathBuf;

/// Default number of preview lines kept per task.
pub const DEFAULT_PREVIEW_LIMIT: usize = 500;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}='{value}' is not a valid value: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of the task orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    /// Archives are written to `<base_dir>/<group_id>/`.
    pub base_dir: PathBuf,

    /// Maximum preview lines stored per task. Always > 0.
    pub preview_limit: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_dir: std::env::temp_dir().join("dashboard-logs"),
            preview_limit: DEFAULT_PREVIEW_LIMIT,
        }
    }
}

impl FetchConfig {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_preview_limit(mut self, preview_limit: usize) -> Result<Self, ConfigError> {
        if preview_limit == 0 {
            return Err(ConfigError::Invalid {
                key: "preview_limit",
                value: preview_limit.to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        self.preview_limit = preview_limit;
        Ok(self)
    }

    /// Build from `LOGFETCH_DIR` and `LOGFETCH_PREVIEW_LIMIT`, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(dir) = lookup("LOGFETCH_DIR") {
            config.base_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("LOGFETCH_PREVIEW_LIMIT") {
            let limit = raw.parse::<usize>().map_err(|e| ConfigError::Invalid {
                key: "LOGFETCH_PREVIEW_LIMIT",
                value: raw.clone(),
                reason: e.to_string(),
            })?;
            config = config.with_preview_limit(limit)?;
        }
        Ok(config)
    }
}
