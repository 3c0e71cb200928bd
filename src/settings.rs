use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use crate::error::DashboardError;

pub const CONFIG_ENV: &str = "SNOWJAM_DASHBOARD_CONFIG";
const BASE_URL_ENV: &str = "SNOWJAM_BASE_URL";
const FAST_POLL_ENV: &str = "SNOWJAM_FAST_POLL_SECS";
const CONFIG_POLL_ENV: &str = "SNOWJAM_CONFIG_POLL_SECS";

/// Client-side settings for the dashboard: where the backend lives and how often to poll it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    /// Prefix joined onto server image paths for display. Paths are shown verbatim when unset.
    pub image_base_url: Option<String>,
    pub fast_poll_secs: u64,
    pub config_poll_secs: u64,
    pub history_limit: usize,
    pub exclude_overlay: bool,
    /// Off by default: requests wait as long as the network stack lets them.
    pub request_timeout_secs: Option<u64>,
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            image_base_url: None,
            fast_poll_secs: 10,
            config_poll_secs: 5,
            history_limit: 5,
            exclude_overlay: true,
            request_timeout_secs: None,
            user_agent: "SnowjamDashboard/0.1".to_string(),
        }
    }
}

impl ClientConfig {
    /// Load from the first config file found, then apply environment overrides.
    ///
    /// Lookup order: `explicit`, `$SNOWJAM_DASHBOARD_CONFIG`, the user config dir.
    /// A missing file at the default location is not an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self, DashboardError> {
        let from_env = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let mut config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => match default_config_path() {
                Some(path) if path.exists() => Self::from_file(&path)?,
                _ => {
                    info!("No dashboard config file, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, DashboardError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&raw)
            .map_err(|e| DashboardError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded dashboard config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self, String> {
        toml::from_str(raw).map_err(|e| format!("Invalid TOML: {}", e))
    }

    fn apply_env(&mut self) {
        if let Ok(url) = env::var(BASE_URL_ENV) {
            self.base_url = url;
        }
        if let Some(secs) = env_secs(FAST_POLL_ENV) {
            self.fast_poll_secs = secs;
        }
        if let Some(secs) = env_secs(CONFIG_POLL_ENV) {
            self.config_poll_secs = secs;
        }
    }

    pub fn validate(&self) -> Result<(), DashboardError> {
        Url::parse(&self.base_url).map_err(|e| {
            DashboardError::Config(format!("Invalid base_url '{}': {}", self.base_url, e))
        })?;
        if let Some(base) = &self.image_base_url {
            Url::parse(base).map_err(|e| {
                DashboardError::Config(format!("Invalid image_base_url '{}': {}", base, e))
            })?;
        }
        Ok(())
    }

    pub fn fast_interval(&self) -> Duration {
        Duration::from_secs(self.fast_poll_secs.max(1))
    }

    pub fn config_interval(&self) -> Duration {
        Duration::from_secs(self.config_poll_secs.max(1))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }
}

/// `<config dir>/snowjam/dashboard.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("snowjam").join("dashboard.toml"))
}

fn env_secs(key: &str) -> Option<u64> {
    let raw = env::var(key).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(_) => {
            warn!("Ignoring {}={}: not a whole number of seconds", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_match_reference_cadence() {
        let config = ClientConfig::default();
        assert_eq!(config.fast_interval(), Duration::from_secs(10));
        assert_eq!(config.config_interval(), Duration::from_secs(5));
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ClientConfig::from_toml(
            r#"
            base_url = "http://snowjam.local:8080"
            history_limit = 12
            "#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://snowjam.local:8080");
        assert_eq!(config.history_limit, 12);
        assert_eq!(config.fast_poll_secs, 10);
        assert!(config.exclude_overlay);
    }

    #[test]
    fn test_zero_interval_clamped() {
        let config = ClientConfig {
            fast_poll_secs: 0,
            config_poll_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.fast_interval(), Duration::from_secs(1));
        assert_eq!(config.config_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dashboard.toml");
        std::fs::write(&path, "config_poll_secs = 30\nrequest_timeout_secs = 4\n").unwrap();

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.config_interval(), Duration::from_secs(30));
        assert_eq!(config.request_timeout(), Some(Duration::from_secs(4)));
    }

    #[test]
    fn test_from_file_missing_is_config_error() {
        let dir = TempDir::new().unwrap();
        let err = ClientConfig::from_file(&dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, DashboardError::Config(_)));
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let config = ClientConfig {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
