//! Collaborator interfaces
//!
//! The engine never counts rows or talks to billing itself. It consumes
//! three collaborators:
//!
//! - [`UsageProvider`]: current-period counts with resolved limits
//! - [`BillingProvider`]: subscription health and plan settings
//! - [`EnforcementStore`]: the cached enforcement record, one per subscription
//!
//! [`postgres::PgStore`] implements all three over one pool;
//! [`memory::MemoryStore`] backs development mode and tests.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use shared::UsageSnapshot;
use shared::enforcement::{EnforcementStateRecord, SubscriptionHealth};

use crate::enforcement::config::PlanSettings;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait UsageProvider: Send + Sync {
    /// `Ok(None)` when metering has nothing for this tenant
    async fn usage_snapshot(&self, tenant_id: &str) -> Result<Option<UsageSnapshot>, BoxError>;
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn subscription_health(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionHealth>, BoxError>;

    async fn plan_settings(&self, plan_id: &str) -> Result<Option<PlanSettings>, BoxError>;
}

#[async_trait]
pub trait EnforcementStore: Send + Sync {
    /// Malformed rows come back as `Ok(None)`
    async fn get(&self, subscription_id: &str)
    -> Result<Option<EnforcementStateRecord>, BoxError>;

    /// Insert or replace; already-set `*_entered_at` values are kept
    async fn upsert(
        &self,
        subscription_id: &str,
        record: &EnforcementStateRecord,
    ) -> Result<(), BoxError>;
}
