//! Process-level configuration, loaded once at startup.
//!
//! C1's DB-overlay cache (`src/services/config_store.rs`) layers on top of this:
//! this module is the code-level defaults plus required secrets, `config_store`
//! is the per-scraper runtime-tunable overlay.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    MissingRequired(String),

    #[error("invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn from_env() -> Self {
        match std::env::var("ENVIRONMENT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            "staging" | "stage" => Self::Staging,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Process-wide configuration shared by all three binaries.
#[derive(Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseSettings,
    pub redis: RedisSettings,
    pub cron: CronConfig,
    pub instagram: InstagramConfig,
    pub categorizer: CategorizerConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = Environment::from_env();
        Ok(Self {
            environment,
            server: ServerConfig::from_env()?,
            database: DatabaseSettings::from_env()?,
            redis: RedisSettings::from_env(),
            cron: CronConfig::from_env()?,
            instagram: InstagramConfig::from_env(),
            categorizer: CategorizerConfig::from_env(),
        })
    }
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            request_timeout: Duration::from_secs(
                std::env::var("REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(30),
            ),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Supabase/Postgres connection settings. The core treats Supabase as a plain
/// Postgres-compatible store accessed over `sqlx`.
#[derive(Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
}

impl DatabaseSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("SUPABASE_URL")
            .or_else(|_| std::env::var("DATABASE_URL"))
            .map_err(|_| ConfigError::MissingRequired("SUPABASE_URL".to_string()))?;

        require_env("SUPABASE_SERVICE_ROLE_KEY")?;

        Ok(Self {
            url,
            max_connections: env_or_default("DB_MAX_CONNECTIONS", "10")
                .parse()
                .unwrap_or(10),
            connection_timeout: Duration::from_secs(
                env_or_default("DB_CONNECTION_TIMEOUT_SECS", "30")
                    .parse()
                    .unwrap_or(30),
            ),
        })
    }
}

#[derive(Clone)]
pub struct RedisSettings {
    pub url: String,
    pub max_size: usize,
}

impl RedisSettings {
    pub fn from_env() -> Self {
        Self {
            url: env_or_default("REDIS_URL", "redis://localhost:6379"),
            max_size: env_or_default("REDIS_MAX_CONNECTIONS", "10")
                .parse()
                .unwrap_or(10),
        }
    }
}

/// Secret gating access to the log-cleanup cron endpoint (§4.10).
#[derive(Clone)]
pub struct CronConfig {
    pub secret: String,
}

impl CronConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            secret: require_env("CRON_SECRET")?,
        })
    }
}

/// RapidAPI gateway credentials + rate-limit defaults for the Instagram scraper (C8).
#[derive(Clone)]
pub struct InstagramConfig {
    pub rapidapi_key: Option<String>,
    pub rapidapi_host: Option<String>,
    pub requests_per_second: u32,
    pub concurrent_creators: usize,
    pub retry_empty_response: u32,
    pub cost_per_request: f64,
}

impl InstagramConfig {
    pub fn from_env() -> Self {
        Self {
            rapidapi_key: std::env::var("RAPIDAPI_KEY").ok(),
            rapidapi_host: std::env::var("RAPIDAPI_HOST").ok(),
            requests_per_second: env_or_default("INSTAGRAM_SCRAPER_REQUESTS_PER_SECOND", "55")
                .parse()
                .unwrap_or(55)
                .min(60),
            concurrent_creators: env_or_default("INSTAGRAM_SCRAPER_CONCURRENT_CREATORS", "10")
                .parse()
                .unwrap_or(10),
            retry_empty_response: env_or_default("INSTAGRAM_SCRAPER_RETRY_EMPTY_RESPONSE", "2")
                .parse()
                .unwrap_or(2),
            cost_per_request: env_or_default("INSTAGRAM_SCRAPER_COST_PER_REQUEST", "0.001")
                .parse()
                .unwrap_or(0.001),
        }
    }

    pub fn enabled(&self) -> bool {
        self.rapidapi_key.is_some() && self.rapidapi_host.is_some()
    }
}

/// C9's external classifier is opaque to the core; this only tracks whether it's wired up.
#[derive(Clone)]
pub struct CategorizerConfig {
    pub openai_api_key: Option<String>,
}

impl CategorizerConfig {
    pub fn from_env() -> Self {
        Self {
            openai_api_key: std::env::var("OPENAI_API_KEY").ok(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

/// Helper to get a required environment variable.
pub fn require_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingRequired(key.to_string()))
}

/// Helper to get an optional environment variable with a default.
pub fn env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_detection() {
        assert!(Environment::from_env().is_development());
    }

    #[test]
    fn test_env_or_default_fallback() {
        std::env::remove_var("SOME_UNSET_KEY_FOR_TEST");
        assert_eq!(env_or_default("SOME_UNSET_KEY_FOR_TEST", "fallback"), "fallback");
    }
}
