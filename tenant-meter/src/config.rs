//! Service configuration

use std::time::Duration;

use shared::enforcement::DEFAULT_RETENTION_DAYS;

use crate::store::BoxError;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Environment: development | staging | production
    pub environment: String,
    /// HTTP port
    pub http_port: u16,
    /// PostgreSQL connection URL; in development an unset URL selects the in-memory store
    pub database_url: Option<String>,
    /// Bound on one usage snapshot fetch
    pub usage_timeout: Duration,
    /// Retention for plans that do not define one (days)
    pub default_retention_days: u32,
    pub log_format: LogFormat,
}

impl Config {
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, BoxError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BoxError> {
        let environment = lookup("ENVIRONMENT").unwrap_or_else(|| "development".into());

        let database_url = lookup("DATABASE_URL").filter(|s| !s.is_empty());
        if database_url.is_none() && environment != "development" {
            return Err(format!("DATABASE_URL must be set in {environment} environment").into());
        }

        Ok(Self {
            http_port: lookup("HTTP_PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            database_url,
            usage_timeout: Duration::from_millis(
                lookup("USAGE_TIMEOUT_MS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(2000),
            ),
            default_retention_days: lookup("DEFAULT_RETENTION_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETENTION_DAYS),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            environment,
        })
    }
}
