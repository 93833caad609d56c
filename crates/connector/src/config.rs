//! Per-request session configuration
//!
//! Loads the auth token and request tuning from environment variables.

use std::env;
use std::time::Duration;
use thiserror::Error;
use tvfeed_metadata::Feed;

use crate::error::ResolverError;
use crate::traits::KeyResolver;

/// Token the service accepts for anonymous, delayed data
pub const ANONYMOUS_TOKEN: &str = "unauthorized_user_token";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const TOKEN_VAR: &str = "TV_AUTH_TOKEN";
const QUALITY_VAR: &str = "TV_DATA_QUALITY";
const TIMEOUT_VAR: &str = "TV_REQUEST_TIMEOUT_SECS";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Key resolution failed: {0}")]
    Resolver(#[from] ResolverError),
}

/// Immutable settings handed to every coordinator
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub auth_token: String,
    pub data_quality: String,
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_token: ANONYMOUS_TOKEN.to_string(),
            data_quality: crate::commands::DATA_QUALITY_LOW.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables
    ///
    /// Optional:
    /// - `TV_AUTH_TOKEN`: session auth token (default: anonymous token)
    /// - `TV_DATA_QUALITY`: data quality tier (default: "low")
    /// - `TV_REQUEST_TIMEOUT_SECS`: per-request deadline (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(token) = env::var(TOKEN_VAR) {
            if !token.is_empty() {
                config.auth_token = token;
            }
        }

        if let Ok(quality) = env::var(QUALITY_VAR) {
            if !quality.is_empty() {
                config.data_quality = quality;
            }
        }

        if let Ok(raw) = env::var(TIMEOUT_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{} must be a positive integer, got {:?}", TIMEOUT_VAR, raw))
            })?;
            if secs == 0 {
                return Err(ConfigError::Invalid(format!("{} must be positive", TIMEOUT_VAR)));
            }
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Environment defaults, with the token taken from the feed's key source
    /// when one is configured
    pub fn from_feed(feed: &Feed, resolver: &dyn KeyResolver) -> Result<Self, ConfigError> {
        Self::from_env()?.with_feed_token(feed, resolver)
    }

    /// Replace the token with the one named by `feed.auth_token_source`
    pub fn with_feed_token(
        mut self,
        feed: &Feed,
        resolver: &dyn KeyResolver,
    ) -> Result<Self, ConfigError> {
        if let Some(ref source) = feed.auth_token_source {
            let resolved = resolver.resolve(source)?;
            let token = resolved
                .into_values()
                .next()
                .ok_or_else(|| ConfigError::MissingEnvVar(source.clone()))?;
            self.auth_token = token;
        }
        Ok(self)
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = token.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
