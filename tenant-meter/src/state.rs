//! Application state for tenant-meter

use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::enforcement::EnforcementService;
use crate::store::memory::MemoryStore;
use crate::store::postgres::PgStore;
use crate::store::{BillingProvider, BoxError, EnforcementStore, UsageProvider};
use crate::throttle::ThrottleGate;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub enforcement: EnforcementService,
    pub gate: ThrottleGate,
}

impl AppState {
    /// Postgres when `DATABASE_URL` is set; the in-memory store only in development
    pub async fn new(config: &Config) -> Result<Self, BoxError> {
        match &config.database_url {
            Some(url) => {
                let pool = PgPool::connect(url).await?;
                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("PostgreSQL ready");

                let store = Arc::new(PgStore::new(pool));
                Ok(Self::with_backends(config, store.clone(), store.clone(), store))
            }
            None if config.is_development() => {
                tracing::warn!("DATABASE_URL not set, using in-memory store");
                let store = Arc::new(MemoryStore::new());
                Ok(Self::with_backends(config, store.clone(), store.clone(), store))
            }
            None => Err(format!(
                "DATABASE_URL must be set in {} environment",
                config.environment
            )
            .into()),
        }
    }

    pub fn with_backends(
        config: &Config,
        usage: Arc<dyn UsageProvider>,
        billing: Arc<dyn BillingProvider>,
        store: Arc<dyn EnforcementStore>,
    ) -> Self {
        let enforcement = EnforcementService::new(usage, billing, store)
            .with_usage_timeout(config.usage_timeout)
            .with_default_retention_days(config.default_retention_days);
        Self {
            gate: ThrottleGate::new(enforcement.clone()),
            enforcement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogFormat;
    use std::time::Duration;

    fn config(environment: &str) -> Config {
        Config {
            environment: environment.into(),
            http_port: 0,
            database_url: None,
            usage_timeout: Duration::from_millis(100),
            default_retention_days: 30,
            log_format: LogFormat::Text,
        }
    }

    #[tokio::test]
    async fn development_falls_back_to_memory() {
        assert!(AppState::new(&config("development")).await.is_ok());
    }

    #[tokio::test]
    async fn production_needs_a_database() {
        assert!(AppState::new(&config("production")).await.is_err());
    }
}
