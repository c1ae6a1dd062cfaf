// SPDX-License-Identifier: GPL-3.0-only

//! Session configuration
//!
//! Only the session's own tuning is read from disk. Device options are never
//! persisted between sessions.

use crate::constants::{self, drain};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Consecutive preview failures tolerated before the device is closed
    pub preview_fail_limit: u32,
    /// Timeout of one wait-for-event poll while draining, in milliseconds
    pub event_poll_timeout_ms: u64,
    /// Overall bound on one drain, in milliseconds
    pub drain_deadline_ms: u64,
    /// Absolute tolerance when matching floating values to radio choices
    pub choice_tolerance: f64,
    /// Option used to flap the mirror
    pub viewfinder_parameter: String,
    /// Directory where the file destination writer stores stills
    pub capture_dir: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            preview_fail_limit: constants::CAPTURING_FAIL_LIMIT,
            event_poll_timeout_ms: drain::POLL_TIMEOUT.as_millis() as u64,
            drain_deadline_ms: drain::DEADLINE.as_millis() as u64,
            choice_tolerance: constants::CHOICE_TOLERANCE,
            viewfinder_parameter: constants::VIEWFINDER_PARAMETER.to_string(),
            capture_dir: default_capture_dir(),
        }
    }
}

impl SessionConfig {
    /// Read configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        let config: SessionConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;

        info!(path = %path.display(), "Loaded session configuration");
        Ok(config)
    }

    /// Read the user's configuration file if there is one, defaults otherwise
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn event_poll_timeout(&self) -> Duration {
        Duration::from_millis(self.event_poll_timeout_ms)
    }

    pub fn drain_deadline(&self) -> Duration {
        Duration::from_millis(self.drain_deadline_ms)
    }
}

/// `<config dir>/tethercam/config.json`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| {
        dir.join(constants::APP_DIR_NAME)
            .join(constants::CONFIG_FILE_NAME)
    })
}

/// `<pictures>/tethercam`, or the working directory when there is no picture dir
pub fn default_capture_dir() -> PathBuf {
    dirs::picture_dir()
        .map(|dir| dir.join(constants::APP_DIR_NAME))
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: SessionConfig = serde_json::from_str(r#"{"preview_fail_limit": 3}"#).unwrap();
        assert_eq!(config.preview_fail_limit, 3);
        assert_eq!(config.viewfinder_parameter, "viewfinder");
        assert_eq!(config.event_poll_timeout(), Duration::from_millis(10));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let dir = std::env::temp_dir().join(format!("tethercam-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.json");
        std::fs::write(&path, "not json").unwrap();

        let result = SessionConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse(_))));

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let path = std::env::temp_dir().join(format!("missing-{}.json", uuid::Uuid::new_v4()));
        assert!(matches!(
            SessionConfig::load(&path),
            Err(ConfigError::Read(_))
        ));
    }
}
