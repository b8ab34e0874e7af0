//! Service configuration
//!
//! Read from environment variables (a `.env` file is loaded first by `main`).

use reqwest::Url;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Catapult account id
    pub user_id: String,
    pub api_token: String,
    pub api_secret: String,

    /// Catapult API root (default: "https://api.catapult.inetwork.com/v1")
    pub api_base_url: String,

    /// Public URL of this service, used to build callback URLs
    pub base_url: Url,

    /// SIP domain the user endpoints are registered under
    pub domain: String,

    /// JSON file holding the user directory
    pub users_path: String,

    pub host: String,
    pub port: u16,

    /// Upper bound for a single provider request made while handling an event
    pub gateway_timeout: Duration,

    /// State searched when reserving a number for a new user
    pub number_search_state: String,
}

impl Config {
    /// Create config from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = required("BASE_URL")?;
        let base_url = Url::parse(&base_url).map_err(|e| ConfigError::Invalid {
            name: "BASE_URL",
            reason: e.to_string(),
        })?;

        let port = match std::env::var("PORT") {
            Ok(p) => p.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                reason: format!("{:?} is not a port number", p),
            })?,
            Err(_) => 3000,
        };

        let gateway_timeout_secs = std::env::var("GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        let config = Self {
            user_id: required("CATAPULT_USER_ID")?,
            api_token: required("CATAPULT_API_TOKEN")?,
            api_secret: required("CATAPULT_API_SECRET")?,
            api_base_url: std::env::var("CATAPULT_BASE_URL")
                .unwrap_or_else(|_| "https://api.catapult.inetwork.com/v1".to_string()),
            base_url,
            domain: required("DOMAIN_NAME")?,
            users_path: std::env::var("USERS_PATH").unwrap_or_else(|_| "users.json".to_string()),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port,
            gateway_timeout: Duration::from_secs(gateway_timeout_secs),
            number_search_state: std::env::var("NUMBER_SEARCH_STATE")
                .unwrap_or_else(|_| "NC".to_string()),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !matches!(self.base_url.scheme(), "http" | "https") || self.base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid {
                name: "BASE_URL",
                reason: "must be an http(s) URL".to_string(),
            });
        }
        if self.gateway_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "GATEWAY_TIMEOUT_SECS",
                reason: "must be positive".to_string(),
            });
        }
        if self.domain.is_empty() {
            return Err(ConfigError::Missing("DOMAIN_NAME"));
        }
        Ok(())
    }

    /// `{baseUrl}/users/{userName}/callback`
    pub fn callback_url(&self, user_name: &str) -> String {
        user_url(&self.base_url, user_name, Some("callback"))
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// URL of a user resource under `base`, with the user name percent-encoded
/// as a single path segment.
pub fn user_url(base: &Url, user_name: &str, tail: Option<&str>) -> String {
    let mut url = base.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.pop_if_empty().push("users").push(user_name);
        if let Some(tail) = tail {
            segments.push(tail);
        }
    }
    url.to_string()
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        user_id: "u-test".to_string(),
        api_token: "t-test".to_string(),
        api_secret: "s-test".to_string(),
        api_base_url: "http://127.0.0.1:1/v1".to_string(),
        base_url: Url::parse("http://relay.example.com").unwrap(),
        domain: "relay".to_string(),
        users_path: "users.json".to_string(),
        host: "127.0.0.1".to_string(),
        port: 3000,
        gateway_timeout: Duration::from_secs(10),
        number_search_state: "NC".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_url_encodes_name() {
        let base = Url::parse("http://relay.example.com").unwrap();
        assert_eq!(
            user_url(&base, "alice", Some("callback")),
            "http://relay.example.com/users/alice/callback"
        );
        assert_eq!(
            user_url(&base, "bob smith/2", None),
            "http://relay.example.com/users/bob%20smith%2F2"
        );
    }

    #[test]
    fn test_user_url_keeps_base_path() {
        let base = Url::parse("https://example.com/relay/").unwrap();
        assert_eq!(
            user_url(&base, "alice", Some("callback")),
            "https://example.com/relay/users/alice/callback"
        );
    }

    #[test]
    fn test_validate() {
        let config = test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.callback_url("alice"), "http://relay.example.com/users/alice/callback");

        let mut bad = test_config();
        bad.gateway_timeout = Duration::ZERO;
        assert!(matches!(bad.validate(), Err(ConfigError::Invalid { name: "GATEWAY_TIMEOUT_SECS", .. })));

        let mut bad = test_config();
        bad.base_url = Url::parse("mailto:ops@example.com").unwrap();
        assert!(bad.validate().is_err());
    }
}
