//! Application configuration loaded from environment variables.

use std::time::Duration;

use checkout::PayHeroConfig;
use checkout::services::payhero::{DEFAULT_BASE_URL, DEFAULT_CHANNEL_ID};
use thiserror::Error;

/// Configuration problems found at start-up.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `"info"`)
/// - `LOG_FORMAT`: `json` or `pretty` (default `pretty`)
/// - `DATABASE_URL`, `DATABASE_MAX_CONNECTIONS`: PostgreSQL pool
/// - `PAYHERO_*`: payment provider credentials and callback
/// - `ADMIN_EMAILS` (comma separated) or `ADMIN_EMAIL`: back-office allow-list
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub payhero_base_url: String,
    pub payhero_username: Option<String>,
    pub payhero_password: Option<String>,
    pub payhero_channel_id: u32,
    pub payhero_callback_url: Option<String>,
    pub payhero_timeout: Duration,
    pub webhook_secret: Option<String>,
    pub admin_emails: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let admin_emails = var("ADMIN_EMAILS")
            .or_else(|| var("ADMIN_EMAIL"))
            .map(|raw| {
                raw.split(',')
                    .map(|email| email.trim().to_lowercase())
                    .filter(|email| !email.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            host: var("HOST").unwrap_or(defaults.host),
            port: var("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: var("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: var("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: var("DATABASE_URL"),
            database_max_connections: var("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            payhero_base_url: var("PAYHERO_BASE_URL").unwrap_or(defaults.payhero_base_url),
            payhero_username: var("PAYHERO_API_USERNAME"),
            payhero_password: var("PAYHERO_API_PASSWORD"),
            payhero_channel_id: var("PAYHERO_CHANNEL_ID")
                .and_then(|id| id.parse().ok())
                .unwrap_or(defaults.payhero_channel_id),
            payhero_callback_url: var("PAYHERO_CALLBACK_URL"),
            payhero_timeout: var("PAYHERO_TIMEOUT_SECS")
                .and_then(|secs| secs.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.payhero_timeout),
            webhook_secret: var("PAYHERO_WEBHOOK_SECRET"),
            admin_emails,
        }
    }

    /// Checks that every required secret and endpoint is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("DATABASE_URL", &self.database_url),
            ("PAYHERO_API_USERNAME", &self.payhero_username),
            ("PAYHERO_API_PASSWORD", &self.payhero_password),
            ("PAYHERO_CALLBACK_URL", &self.payhero_callback_url),
            ("PAYHERO_WEBHOOK_SECRET", &self.webhook_secret),
        ];
        match required.into_iter().find(|(_, value)| value.is_none()) {
            Some((name, _)) => Err(ConfigError::Missing(name)),
            None => Ok(()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Settings for the PayHero client.
    pub fn payhero(&self) -> PayHeroConfig {
        PayHeroConfig {
            base_url: self.payhero_base_url.clone(),
            username: self.payhero_username.clone().unwrap_or_default(),
            password: self.payhero_password.clone().unwrap_or_default(),
            channel_id: self.payhero_channel_id,
            callback_url: self.payhero_callback_url.clone().unwrap_or_default(),
            timeout: self.payhero_timeout,
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("database_url", &redacted(&self.database_url))
            .field("database_max_connections", &self.database_max_connections)
            .field("payhero_base_url", &self.payhero_base_url)
            .field("payhero_username", &self.payhero_username)
            .field("payhero_password", &redacted(&self.payhero_password))
            .field("payhero_channel_id", &self.payhero_channel_id)
            .field("payhero_callback_url", &self.payhero_callback_url)
            .field("payhero_timeout", &self.payhero_timeout)
            .field("webhook_secret", &redacted(&self.webhook_secret))
            .field("admin_emails", &self.admin_emails)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            database_url: None,
            database_max_connections: 10,
            payhero_base_url: DEFAULT_BASE_URL.to_string(),
            payhero_username: None,
            payhero_password: None,
            payhero_channel_id: DEFAULT_CHANNEL_ID,
            payhero_callback_url: None,
            payhero_timeout: Duration::from_secs(30),
            webhook_secret: None,
            admin_emails: Vec::new(),
        }
    }
}
