//! In-memory collaborators
//!
//! Backs development mode (no `DATABASE_URL`) and the test suites. Usage and
//! subscriptions are keyed by tenant id, plans by plan id and enforcement
//! records by subscription id.

use async_trait::async_trait;
use dashmap::DashMap;
use shared::UsageSnapshot;
use shared::enforcement::{EnforcementStateRecord, SubscriptionHealth};

use super::{BillingProvider, BoxError, EnforcementStore, UsageProvider};
use crate::enforcement::config::PlanSettings;

#[derive(Debug, Default)]
pub struct MemoryStore {
    usage: DashMap<String, UsageSnapshot>,
    subscriptions: DashMap<String, SubscriptionHealth>,
    plans: DashMap<String, PlanSettings>,
    records: DashMap<String, EnforcementStateRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_usage(&self, tenant_id: &str, usage: UsageSnapshot) {
        self.usage.insert(tenant_id.to_string(), usage);
    }

    pub fn set_subscription(&self, tenant_id: &str, health: SubscriptionHealth) {
        self.subscriptions.insert(tenant_id.to_string(), health);
    }

    pub fn set_plan(&self, plan_id: &str, settings: PlanSettings) {
        self.plans.insert(plan_id.to_string(), settings);
    }

    /// Stored record, bypassing the trait
    pub fn record(&self, subscription_id: &str) -> Option<EnforcementStateRecord> {
        self.records.get(subscription_id).map(|r| r.clone())
    }

    pub fn put_record(&self, subscription_id: &str, record: EnforcementStateRecord) {
        self.records.insert(subscription_id.to_string(), record);
    }
}

#[async_trait]
impl UsageProvider for MemoryStore {
    async fn usage_snapshot(&self, tenant_id: &str) -> Result<Option<UsageSnapshot>, BoxError> {
        Ok(self.usage.get(tenant_id).map(|u| u.clone()))
    }
}

#[async_trait]
impl BillingProvider for MemoryStore {
    async fn subscription_health(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionHealth>, BoxError> {
        Ok(self.subscriptions.get(tenant_id).map(|s| s.clone()))
    }

    async fn plan_settings(&self, plan_id: &str) -> Result<Option<PlanSettings>, BoxError> {
        Ok(self.plans.get(plan_id).map(|p| p.clone()))
    }
}

#[async_trait]
impl EnforcementStore for MemoryStore {
    async fn get(
        &self,
        subscription_id: &str,
    ) -> Result<Option<EnforcementStateRecord>, BoxError> {
        Ok(self.record(subscription_id))
    }

    async fn upsert(
        &self,
        subscription_id: &str,
        record: &EnforcementStateRecord,
    ) -> Result<(), BoxError> {
        let mut merged = record.clone();
        if let Some(existing) = self.records.get(subscription_id) {
            merged.warn_entered_at = existing.warn_entered_at.or(record.warn_entered_at);
            merged.grace_entered_at = existing.grace_entered_at.or(record.grace_entered_at);
            merged.degraded_entered_at =
                existing.degraded_entered_at.or(record.degraded_entered_at);
        }
        self.records.insert(subscription_id.to_string(), merged);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::EnforcementState;
    use shared::enforcement::EffectivePolicy;

    fn record(state: EnforcementState, warn_entered_at: Option<i64>) -> EnforcementStateRecord {
        EnforcementStateRecord {
            state,
            warn_entered_at,
            grace_entered_at: None,
            grace_ends_at: None,
            degraded_entered_at: None,
            effective_policy: EffectivePolicy::default(),
            triggered_metrics: Vec::new(),
            last_evaluated_at: 0,
            next_evaluation_at: 0,
        }
    }

    #[tokio::test]
    async fn test_get_missing_record() {
        let store = MemoryStore::new();
        assert!(store.get("sub-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_keeps_first_entry() {
        let store = MemoryStore::new();
        store
            .upsert("sub-1", &record(EnforcementState::Warn, Some(100)))
            .await
            .unwrap();
        // A racing writer that computed a later first-entry time loses
        store
            .upsert("sub-1", &record(EnforcementState::Warn, Some(200)))
            .await
            .unwrap();

        let stored = store.get("sub-1").await.unwrap().unwrap();
        assert_eq!(stored.warn_entered_at, Some(100));
    }

    #[tokio::test]
    async fn test_upsert_never_clears_entry() {
        let store = MemoryStore::new();
        store
            .upsert("sub-1", &record(EnforcementState::Warn, Some(100)))
            .await
            .unwrap();
        store
            .upsert("sub-1", &record(EnforcementState::Active, None))
            .await
            .unwrap();

        let stored = store.get("sub-1").await.unwrap().unwrap();
        assert_eq!(stored.state, EnforcementState::Active);
        assert_eq!(stored.warn_entered_at, Some(100));
    }
}
