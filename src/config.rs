use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scholar: SourceConfig,
    pub jstor: SourceConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_sources()
    }
}

/// Per-source retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Base URL of the source
    pub base_url: String,
    /// Minimum spacing between requests from one client instance
    pub min_request_interval_ms: u64,
    /// Base delay for exponential backoff between retries
    pub backoff_base_ms: u64,
    /// Total attempts per fetch (first try included)
    pub max_attempts: u32,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self::scholar()
    }
}

impl SourceConfig {
    /// Defaults for the open-access source
    #[must_use]
    pub fn scholar() -> Self {
        Self {
            base_url: "https://scholar.google.com".to_string(),
            min_request_interval_ms: 1000,
            backoff_base_ms: 1000,
            max_attempts: 3,
            timeout_secs: 30,
        }
    }

    /// Defaults for the institutional source. Spacing and backoff are doubled
    /// since the site throttles aggressively.
    #[must_use]
    pub fn jstor() -> Self {
        Self {
            base_url: "https://www.jstor.org".to_string(),
            min_request_interval_ms: 2000,
            backoff_base_ms: 2000,
            max_attempts: 3,
            timeout_secs: 30,
        }
    }
}

/// Session persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Where the captured session record is stored, relative to the working
    /// directory unless absolute
    pub cookie_file: PathBuf,
    /// Session lifetime from capture time
    pub ttl_hours: u64,
    /// Identity-provider domain fragment whose cookies are also captured
    pub idp_domain: String,
    /// Ceiling on the interactive login wait
    pub auth_timeout_secs: u64,
    /// Interval between login-completion polls
    pub auth_poll_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_file: PathBuf::from(".jstor_session.json"),
            ttl_hours: 24,
            idp_domain: "idp".to_string(),
            auth_timeout_secs: 300,
            auth_poll_interval_secs: 2,
        }
    }
}

/// MCP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Graceful shutdown grace period
    pub shutdown_timeout_secs: u64,
    /// TTL for the in-memory search result cache
    pub cache_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_secs: 10,
            cache_ttl_secs: 300,
        }
    }
}

impl Config {
    /// Load configuration, layering an optional TOML file and `RSM_`-prefixed
    /// environment variables over the defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            debug!("Loading configuration from {:?}", path);
            builder = builder.add_source(config::File::from(path.clone()));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("RSM")
                .separator("__")
                .try_parsing(true),
        );

        let loaded: Self = builder.build()?.try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Default configuration with per-source tuning applied
    #[must_use]
    pub fn default_sources() -> Self {
        Self {
            scholar: SourceConfig::scholar(),
            jstor: SourceConfig::jstor(),
            session: SessionConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Validate configuration ranges
    pub fn validate(&self) -> Result<()> {
        for (name, source) in [("scholar", &self.scholar), ("jstor", &self.jstor)] {
            if source.base_url.is_empty() {
                return Err(crate::Error::InvalidInput {
                    field: format!("{name}.base_url"),
                    reason: "base URL cannot be empty".to_string(),
                });
            }
            if source.max_attempts == 0 || source.max_attempts > 10 {
                return Err(crate::Error::InvalidInput {
                    field: format!("{name}.max_attempts"),
                    reason: "max attempts must be between 1 and 10".to_string(),
                });
            }
            if source.timeout_secs == 0 || source.timeout_secs > 300 {
                return Err(crate::Error::InvalidInput {
                    field: format!("{name}.timeout_secs"),
                    reason: "timeout must be between 1 and 300 seconds".to_string(),
                });
            }
        }

        if self.session.ttl_hours == 0 {
            return Err(crate::Error::InvalidInput {
                field: "session.ttl_hours".to_string(),
                reason: "session TTL must be at least 1 hour".to_string(),
            });
        }
        if self.session.auth_poll_interval_secs == 0
            || self.session.auth_poll_interval_secs > self.session.auth_timeout_secs
        {
            return Err(crate::Error::InvalidInput {
                field: "session.auth_poll_interval_secs".to_string(),
                reason: "poll interval must be nonzero and below the auth timeout".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sources_validate() {
        let config = Config::default_sources();
        assert!(config.validate().is_ok());
        assert_eq!(config.scholar.min_request_interval_ms, 1000);
        assert_eq!(config.jstor.min_request_interval_ms, 2000);
        assert_eq!(config.session.ttl_hours, 24);
    }

    #[test]
    fn test_invalid_attempts_rejected() {
        let mut config = Config::default_sources();
        config.scholar.max_attempts = 0;
        assert!(config.validate().is_err());

        config.scholar.max_attempts = 11;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_poll_interval_rejected() {
        let mut config = Config::default_sources();
        config.session.auth_poll_interval_secs = 0;
        assert!(config.validate().is_err());

        config.session.auth_poll_interval_secs = 600;
        config.session.auth_timeout_secs = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_only_load() {
        let config = Config::load(None).expect("env-only load should succeed");
        assert!(!config.jstor.base_url.is_empty());
    }
}
