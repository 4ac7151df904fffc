//! TOML-based configuration for the render server and client.
//!
//! Example configuration:
//! ```toml
//! socket_path = "/run/cardrender/gui.sock"
//!
//! [server]
//! workers = 10
//! max_pending = 50
//!
//! [client]
//! max_concurrent = 5
//! connection_timeout = 30.0
//! request_expiry = 30.0
//!
//! [client.retry]
//! base = 2.0
//! delay = 5.0
//! max_delay = 60.0
//! ```
//!
//! Durations are seconds as floating point numbers. Every field has a
//! default, so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the configured socket path.
pub const SOCKET_ENV: &str = "CARDRENDER_SOCKET";

/// Default socket path, relative to the working directory.
pub const DEFAULT_SOCKET_PATH: &str = "gui.sock";

/// Error type for configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Unix socket the server listens on and the client connects to.
    pub socket_path: PathBuf,

    /// Server settings.
    pub server: ServerSettings,

    /// Client settings.
    pub client: ClientSettings,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from(DEFAULT_SOCKET_PATH),
            server: ServerSettings::default(),
            client: ClientSettings::default(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Number of worker processes.
    pub workers: usize,

    /// Jobs allowed to wait for a worker beyond the busy ones.
    /// Unset means unbounded.
    pub max_pending: Option<usize>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            workers: 10,
            max_pending: None,
        }
    }
}

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Maximum requests in flight at once.
    pub max_concurrent: usize,

    /// Bound on a single connect attempt, in seconds.
    pub connection_timeout: f64,

    /// Default end-to-end request deadline, in seconds.
    pub request_expiry: f64,

    /// Reconnect backoff.
    pub retry: RetrySettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            connection_timeout: 30.0,
            request_expiry: 30.0,
            retry: RetrySettings::default(),
        }
    }
}

impl ClientSettings {
    pub fn connection_timeout(&self) -> Duration {
        secs(self.connection_timeout)
    }

    pub fn request_expiry(&self) -> Duration {
        secs(self.request_expiry)
    }
}

/// Reconnect backoff settings.
///
/// After `n` consecutive failures the next attempt waits
/// `min(max_delay, delay + base^n)` seconds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub base: f64,
    pub delay: f64,
    pub max_delay: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            base: 2.0,
            delay: 5.0,
            max_delay: 60.0,
        }
    }
}

impl RenderConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: RenderConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from `path` if given, otherwise defaults, then
    /// apply the `CARDRENDER_SOCKET` override and validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_socket_override(env::var_os(SOCKET_ENV).map(PathBuf::from));
        config.validate()?;
        Ok(config)
    }

    /// Replaces the socket path when an override is present.
    pub fn with_socket_override(mut self, socket_path: Option<PathBuf>) -> Self {
        if let Some(socket_path) = socket_path {
            self.socket_path = socket_path;
        }
        self
    }

    /// Checks value ranges the rest of the system relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.socket_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidConfig("socket_path is empty".into()));
        }
        if self.server.workers == 0 {
            return Err(ConfigError::InvalidConfig("server.workers must be at least 1".into()));
        }
        if self.client.max_concurrent == 0 {
            return Err(ConfigError::InvalidConfig(
                "client.max_concurrent must be at least 1".into(),
            ));
        }

        let durations = [
            ("client.connection_timeout", self.client.connection_timeout),
            ("client.request_expiry", self.client.request_expiry),
            ("client.retry.delay", self.client.retry.delay),
            ("client.retry.max_delay", self.client.retry.max_delay),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidConfig(format!(
                    "{} must be a non-negative number of seconds, got {}",
                    name, value
                )));
            }
        }

        if !self.client.retry.base.is_finite() || self.client.retry.base < 1.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "client.retry.base must be at least 1, got {}",
                self.client.retry.base
            )));
        }

        Ok(())
    }
}

/// Seconds to a `Duration`, saturating out-of-range values.
pub fn secs(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RenderConfig::default();
        assert_eq!(config.socket_path, PathBuf::from("gui.sock"));
        assert_eq!(config.server.workers, 10);
        assert_eq!(config.server.max_pending, None);
        assert_eq!(config.client.max_concurrent, 5);
        assert_eq!(config.client.connection_timeout(), Duration::from_secs(30));
        assert_eq!(config.client.request_expiry(), Duration::from_secs(30));
        assert_eq!(config.client.retry, RetrySettings { base: 2.0, delay: 5.0, max_delay: 60.0 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: RenderConfig = toml::from_str("").unwrap();
        assert_eq!(config, RenderConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config: RenderConfig = toml::from_str(
            r#"
            [server]
            max_pending = 20

            [client.retry]
            delay = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.server.workers, 10);
        assert_eq!(config.server.max_pending, Some(20));
        assert_eq!(config.client.retry.delay, 0.5);
        assert_eq!(config.client.retry.base, 2.0);
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "socket_path = \"/tmp/render.sock\"\n[server]\nworkers = 3").unwrap();

        let config = RenderConfig::from_file(file.path()).unwrap();
        assert_eq!(config.socket_path, PathBuf::from("/tmp/render.sock"));
        assert_eq!(config.server.workers, 3);
    }

    #[test]
    fn test_from_missing_file() {
        let result = RenderConfig::from_file("/nonexistent/cardrender.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_from_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server\nworkers = ").unwrap();

        let result = RenderConfig::from_file(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_socket_override() {
        let config = RenderConfig::default().with_socket_override(Some(PathBuf::from("other.sock")));
        assert_eq!(config.socket_path, PathBuf::from("other.sock"));

        let config = RenderConfig::default().with_socket_override(None);
        assert_eq!(config.socket_path, PathBuf::from("gui.sock"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RenderConfig::default();
        config.server.workers = 0;
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.client.max_concurrent = 0;
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.client.request_expiry = -1.0;
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.client.retry.max_delay = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = RenderConfig::default();
        config.client.retry.base = 0.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secs_saturates() {
        assert_eq!(secs(1.5), Duration::from_millis(1500));
        assert_eq!(secs(-3.0), Duration::ZERO);
        assert_eq!(secs(f64::NAN), Duration::ZERO);
        assert_eq!(secs(f64::INFINITY), Duration::MAX);
    }
}
