// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::errors::ConfigError;
use crate::hostname::default_hostname;
use std::env;
use std::time::Duration;

/// Configuration for the bridge, consumed once at startup.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Remote API endpoint including scheme (e.g. "https://api.example.com")
    pub api_url: String,
    /// Access token exchanged for a session token at login
    pub access_token: String,
    /// Application id scoping every API path
    pub app_id: String,
    /// Interval at which the collection daemon delivers batches; counters
    /// are normalized to per-second rates against this
    pub flush_interval: Duration,
    /// Host name used for keys that carry no host segment
    pub hostname: String,
    /// Log level (e.g. trace, debug, info, warn, error)
    pub log_level: String,
}

impl BridgeConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = env::var("BRIDGE_API_URL").unwrap_or_default();
        let access_token = env::var("BRIDGE_ACCESS_TOKEN").unwrap_or_default();
        let app_id = env::var("BRIDGE_APP_ID").unwrap_or_default();
        let flush_interval = env::var("BRIDGE_FLUSH_INTERVAL_MS")
            .ok()
            .and_then(|val| val.parse::<u64>().ok())
            .map_or(Duration::from_secs(60), Duration::from_millis);
        let hostname = env::var("BRIDGE_HOSTNAME")
            .ok()
            .filter(|val| !val.is_empty())
            .unwrap_or_else(default_hostname);
        let log_level = env::var("BRIDGE_LOG_LEVEL")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "info".to_string());

        let config = Self {
            api_url,
            access_token,
            app_id,
            flush_interval,
            hostname,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(ConfigError::InvalidApiUrl(self.api_url.clone()));
        }

        if self.access_token.trim().is_empty() {
            return Err(ConfigError::MissingAccessToken);
        }

        if self.app_id.trim().is_empty() {
            return Err(ConfigError::MissingAppId);
        }

        if self.flush_interval.is_zero() {
            return Err(ConfigError::ZeroFlushInterval);
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> BridgeConfig {
        BridgeConfig {
            api_url: "https://api.example.com".to_string(),
            access_token: "token".to_string(),
            app_id: "42".to_string(),
            flush_interval: Duration::from_secs(60),
            hostname: "WEB1".to_string(),
            log_level: "info".to_string(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_access_token() {
        let config = BridgeConfig {
            access_token: "  ".to_string(),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingAccessToken)
        ));
    }

    #[test]
    fn test_missing_app_id() {
        let config = BridgeConfig {
            app_id: String::new(),
            ..valid_config()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MissingAppId)));
    }

    #[test]
    fn test_url_without_scheme() {
        let config = BridgeConfig {
            api_url: "api.example.com".to_string(),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidApiUrl(_))
        ));
    }

    #[test]
    fn test_zero_flush_interval() {
        let config = BridgeConfig {
            flush_interval: Duration::ZERO,
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroFlushInterval)
        ));
    }

    #[test]
    fn test_invalid_log_level() {
        let config = BridgeConfig {
            log_level: "loud".to_string(),
            ..valid_config()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLogLevel(_))
        ));
    }

    #[test]
    fn test_from_env() {
        env::set_var("BRIDGE_API_URL", "https://api.example.com");
        env::set_var("BRIDGE_ACCESS_TOKEN", "secret");
        env::set_var("BRIDGE_APP_ID", "42");
        env::set_var("BRIDGE_FLUSH_INTERVAL_MS", "30000");

        let config = BridgeConfig::from_env().expect("config should be valid");
        assert_eq!(config.app_id, "42");
        assert_eq!(config.flush_interval, Duration::from_secs(30));
        assert!(!config.hostname.is_empty());

        env::remove_var("BRIDGE_API_URL");
        env::remove_var("BRIDGE_ACCESS_TOKEN");
        env::remove_var("BRIDGE_APP_ID");
        env::remove_var("BRIDGE_FLUSH_INTERVAL_MS");
    }
}
