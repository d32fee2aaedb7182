//! Client configuration.
//!
//! Layered TOML config in the usual places:
//! - user level: ~/.campushub/config.toml
//! - project level: ./.campushub/config.toml (overrides user level)
//! The base URL can additionally be overridden per invocation via
//! CAMPUSHUB_BASE_URL or --base-url.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A validation error in the configuration
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the community API, e.g. https://campus.example.edu/api
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Where credentials are persisted. Defaults to ~/.campushub
    #[serde(default)]
    pub credentials_dir: Option<PathBuf>,

    /// Tokens within this many seconds of expiry are refreshed proactively
    /// at startup instead of waiting for the first 401.
    #[serde(default = "default_refresh_window")]
    pub refresh_window_secs: i64,

    /// Timeout for ordinary API requests.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for the refresh call specifically. A hung refresh would block
    /// every request waiting on it, so it gets its own bound.
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,
}

fn default_base_url() -> String {
    "http://localhost:8000/api".to_string()
}

fn default_refresh_window() -> i64 {
    300
}

fn default_request_timeout() -> u64 {
    30
}

fn default_refresh_timeout() -> u64 {
    30
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            credentials_dir: None,
            refresh_window_secs: default_refresh_window(),
            request_timeout_secs: default_request_timeout(),
            refresh_timeout_secs: default_refresh_timeout(),
        }
    }
}

impl Config {
    /// Load configuration from default paths.
    /// Priority: project (.campushub/config.toml) > user (~/.campushub/config.toml)
    pub fn load() -> Result<Self> {
        let mut config = Self::default();

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".campushub").join("config.toml");
            if user_config.exists() {
                config.merge(Self::load_from(&user_config)?);
            }
        }

        let project_config = Path::new(".campushub").join("config.toml");
        if project_config.exists() {
            config.merge(Self::load_from(&project_config)?);
        }

        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge another config into this one (other takes priority for any
    /// field that differs from the defaults)
    pub fn merge(&mut self, other: Config) {
        if other.base_url != default_base_url() {
            self.base_url = other.base_url;
        }
        if other.credentials_dir.is_some() {
            self.credentials_dir = other.credentials_dir;
        }
        if other.refresh_window_secs != default_refresh_window() {
            self.refresh_window_secs = other.refresh_window_secs;
        }
        if other.request_timeout_secs != default_request_timeout() {
            self.request_timeout_secs = other.request_timeout_secs;
        }
        if other.refresh_timeout_secs != default_refresh_timeout() {
            self.refresh_timeout_secs = other.refresh_timeout_secs;
        }
    }

    /// Resolve the credentials directory, defaulting to ~/.campushub
    pub fn credentials_dir(&self) -> PathBuf {
        if let Some(dir) = &self.credentials_dir {
            return dir.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".campushub")
    }

    /// Validate configuration and return any errors found
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            errors.push(ValidationError {
                field: "base_url".to_string(),
                message: format!("Expected an http(s) URL, got '{}'", self.base_url),
            });
        }

        if self.refresh_window_secs < 0 {
            errors.push(ValidationError {
                field: "refresh_window_secs".to_string(),
                message: "Must not be negative".to_string(),
            });
        }

        if self.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "request_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if self.refresh_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "refresh_timeout_secs".to_string(),
                message: "Must be greater than 0".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.refresh_window_secs, 300);
    }

    #[test]
    fn test_validate_bad_base_url() {
        let mut config = Config::default();
        config.base_url = "localhost:8000".to_string();
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].field.contains("base_url"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.request_timeout_secs = 0;
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("greater than 0"));
    }

    #[test]
    fn test_merge_overrides_non_default_fields() {
        let mut base = Config::default();
        let mut other = Config::default();
        other.base_url = "https://campus.example.edu/api".to_string();
        other.refresh_window_secs = 60;
        base.merge(other);
        assert_eq!(base.base_url, "https://campus.example.edu/api");
        assert_eq!(base.refresh_window_secs, 60);
        // untouched fields keep their defaults
        assert_eq!(base.request_timeout_secs, 30);
    }

    #[test]
    fn test_load_from_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "base_url = \"https://hub.example.edu/api\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.base_url, "https://hub.example.edu/api");
        assert_eq!(config.refresh_window_secs, 300);
    }
}
