//! Configuration schema definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

use crate::error::{Error, Result};

/// Minimum signing secret length accepted in production
pub const MIN_SECRET_LEN: usize = 32;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

/// Server configuration for the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub environment: Environment,

    /// Reverse proxies allowed to report the client address via `X-Forwarded-For`.
    /// Empty means the header is ignored and the socket peer is used.
    #[serde(default)]
    pub trusted_proxies: Vec<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: Environment::default(),
            trusted_proxies: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Relational store connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// tokio-postgres connection string
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Keep everything in process memory instead of PostgreSQL
    #[serde(default)]
    pub in_memory: bool,
}

fn default_database_url() -> String {
    "host=localhost port=5432 user=postgres password=postgres dbname=fruitstand".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            in_memory: false,
        }
    }
}

/// Secrets and tunables consumed by the token and password services.
///
/// Built once at startup and handed to the services explicitly.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub access_token_secret: String,

    /// Reserved for password-reset tokens; not used by the session flow
    #[serde(default)]
    pub reset_token_secret: String,

    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl_minutes: i64,

    #[serde(default = "default_bcrypt_cost")]
    pub bcrypt_cost: u32,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_access_token_ttl() -> i64 {
    15
}

fn default_bcrypt_cost() -> u32 {
    12
}

fn default_issuer() -> String {
    "fruitstand-api".to_string()
}

fn default_audience() -> String {
    "fruitstand-client".to_string()
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_token_secret: String::new(),
            reset_token_secret: String::new(),
            access_token_ttl_minutes: default_access_token_ttl(),
            bcrypt_cost: default_bcrypt_cost(),
            issuer: default_issuer(),
            audience: default_audience(),
        }
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}

impl fmt::Debug for AuthSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSettings")
            .field("access_token_secret", &redact(&self.access_token_secret))
            .field("reset_token_secret", &redact(&self.reset_token_secret))
            .field("access_token_ttl_minutes", &self.access_token_ttl_minutes)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .finish()
    }
}

impl AuthSettings {
    /// Settings with a fixed secret, handy for deterministic signatures
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            access_token_secret: secret.into(),
            ..Self::default()
        }
    }
}

/// Allowed cross-origin callers. Empty means permissive, which does not allow
/// credentials, so a browser on another origin cannot send the refresh cookie.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Fixed-window limiter applied to register, login and refresh-token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,

    #[serde(default = "default_auth_max_requests")]
    pub auth_max_requests: u32,

    #[serde(default = "default_auth_window_secs")]
    pub auth_window_secs: u64,
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_auth_max_requests() -> u32 {
    20
}

fn default_auth_window_secs() -> u64 {
    900
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            auth_max_requests: default_auth_max_requests(),
            auth_window_secs: default_auth_window_secs(),
        }
    }
}

impl Config {
    pub fn is_production(&self) -> bool {
        self.server.environment == Environment::Production
    }

    /// Reject settings the server must not start with
    pub fn validate(&self) -> Result<()> {
        let secret = &self.auth.access_token_secret;
        if secret.is_empty() {
            return Err(Error::Config(
                "auth.access_token_secret must be set".to_string(),
            ));
        }
        if secret.len() < MIN_SECRET_LEN && self.is_production() {
            return Err(Error::Config(format!(
                "auth.access_token_secret must be at least {} bytes in production",
                MIN_SECRET_LEN
            )));
        }
        if !(4..=31).contains(&self.auth.bcrypt_cost) {
            return Err(Error::Config(format!(
                "auth.bcrypt_cost must be between 4 and 31, got {}",
                self.auth.bcrypt_cost
            )));
        }
        if self.auth.access_token_ttl_minutes <= 0 {
            return Err(Error::Config(
                "auth.access_token_ttl_minutes must be positive".to_string(),
            ));
        }
        self.trusted_proxy_addrs()?;
        Ok(())
    }

    /// Settings that start fine but are probably not what was meant
    pub fn warnings(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.auth.access_token_secret.len() < MIN_SECRET_LEN {
            warnings.push(format!(
                "auth.access_token_secret is shorter than {} bytes",
                MIN_SECRET_LEN
            ));
        }
        if self.cors.allowed_origins.is_empty() {
            warnings.push(
                "cors.allowed_origins is empty; cross-origin browsers cannot send the refresh cookie"
                    .to_string(),
            );
        }
        warnings
    }

    pub fn trusted_proxy_addrs(&self) -> Result<Vec<IpAddr>> {
        self.server
            .trusted_proxies
            .iter()
            .map(|entry| {
                entry.trim().parse::<IpAddr>().map_err(|_| {
                    Error::Config(format!("Invalid server.trusted_proxies entry: {}", entry))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_secret(secret: &str) -> Config {
        let mut config = Config::default();
        config.auth.access_token_secret = secret.to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.auth.access_token_ttl_minutes, 15);
        assert_eq!(config.auth.bcrypt_cost, 12);
        assert!(config.rate_limit.enabled);
        assert!(!config.is_production());
    }

    #[test]
    fn test_validate_requires_secret() {
        assert!(matches!(
            Config::default().validate(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_short_secret_only_fatal_in_production() {
        let mut config = config_with_secret("short");
        assert!(config.validate().is_ok());

        config.server.environment = Environment::Production;
        assert!(config.validate().is_err());

        config.auth.access_token_secret = "x".repeat(MIN_SECRET_LEN);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_trusted_proxies_must_be_addresses() {
        let mut config = config_with_secret("some-development-secret");
        config.server.trusted_proxies = vec!["10.0.0.1".to_string(), "::1".to_string()];
        assert_eq!(config.trusted_proxy_addrs().unwrap().len(), 2);

        config.server.trusted_proxies.push("proxy.internal".to_string());
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_warnings_cover_short_secret_and_open_cors() {
        let mut config = config_with_secret("short");
        let warnings = config.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[1].contains("cors.allowed_origins"));

        config.auth.access_token_secret = "x".repeat(MIN_SECRET_LEN);
        config.cors.allowed_origins = vec!["https://shop.example".to_string()];
        assert!(config.warnings().is_empty());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut settings = AuthSettings::with_secret("super-secret-signing-key");
        settings.reset_token_secret = "another-secret".to_string();
        let printed = format!("{:?}", settings);

        assert!(!printed.contains("super-secret-signing-key"));
        assert!(!printed.contains("another-secret"));
        assert!(printed.contains("<redacted>"));
        assert!(printed.contains("fruitstand-api"));
    }

    #[test]
    fn test_bcrypt_cost_bounds() {
        let mut config = config_with_secret("some-development-secret");
        config.auth.bcrypt_cost = 3;
        assert!(config.validate().is_err());
        config.auth.bcrypt_cost = 4;
        assert!(config.validate().is_ok());
    }
}
