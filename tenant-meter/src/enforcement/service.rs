//! Cache-aside enforcement service
//!
//! The stored record is the cache. It is recomputed lazily, only when a
//! caller asks for a tenant whose record is absent or past its
//! `next_evaluation_at`. Records belong to the tenant's current
//! subscription, so a new subscription starts without history. There is no
//! background scheduler. Concurrent
//! callers that both see a stale record both recompute; last write wins,
//! and the store keeps the earliest `*_entered_at` values.

use std::sync::Arc;
use std::time::Duration;

use shared::enforcement::{DEFAULT_RETENTION_DAYS, EnforcementStateRecord, SubscriptionHealth};
use shared::util::now_millis;
use shared::UsageSnapshot;

use super::config::EnforcementConfig;
use super::machine::{Evaluation, evaluate, evaluate_without_usage};
use super::record::apply_evaluation;
use crate::error::{EnforcementError, EnforcementResult};
use crate::store::{BillingProvider, EnforcementStore, UsageProvider};

/// Default bound on a usage snapshot fetch
pub const DEFAULT_USAGE_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Clone)]
pub struct EnforcementService {
    usage: Arc<dyn UsageProvider>,
    billing: Arc<dyn BillingProvider>,
    store: Arc<dyn EnforcementStore>,
    usage_timeout: Duration,
    default_retention_days: u32,
}

impl EnforcementService {
    pub fn new(
        usage: Arc<dyn UsageProvider>,
        billing: Arc<dyn BillingProvider>,
        store: Arc<dyn EnforcementStore>,
    ) -> Self {
        Self {
            usage,
            billing,
            store,
            usage_timeout: DEFAULT_USAGE_TIMEOUT,
            default_retention_days: DEFAULT_RETENTION_DAYS,
        }
    }

    pub fn with_usage_timeout(mut self, timeout: Duration) -> Self {
        self.usage_timeout = timeout;
        self
    }

    pub fn with_default_retention_days(mut self, days: u32) -> Self {
        self.default_retention_days = days;
        self
    }

    /// Current usage, `None` when metering is unavailable
    ///
    /// Provider errors and timeouts are both treated as "no usage data".
    pub async fn usage_snapshot(&self, tenant_id: &str) -> Option<UsageSnapshot> {
        match tokio::time::timeout(self.usage_timeout, self.usage.usage_snapshot(tenant_id)).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                tracing::warn!(tenant_id = %tenant_id, error = %e, "Usage snapshot unavailable, failing open");
                None
            }
            Err(_) => {
                tracing::warn!(
                    tenant_id = %tenant_id,
                    timeout_ms = self.usage_timeout.as_millis() as u64,
                    "Usage snapshot timed out, failing open"
                );
                None
            }
        }
    }

    /// Subscription the tenant is currently on; its id keys the record
    async fn subscription(&self, tenant_id: &str) -> EnforcementResult<SubscriptionHealth> {
        self.billing
            .subscription_health(tenant_id)
            .await
            .map_err(EnforcementError::Store)?
            .ok_or_else(|| EnforcementError::SubscriptionNotFound(tenant_id.to_string()))
    }

    /// Stored record without refreshing; read failures count as absent
    async fn cached(&self, subscription_id: &str) -> Option<EnforcementStateRecord> {
        match self.store.get(subscription_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(subscription_id = %subscription_id, error = %e, "Enforcement record read failed, re-evaluating");
                None
            }
        }
    }

    /// Fresh cached record, or a new evaluation when absent or stale
    pub async fn current(&self, tenant_id: &str) -> EnforcementResult<EnforcementStateRecord> {
        let now = now_millis();
        let subscription = self.subscription(tenant_id).await?;
        let existing = self.cached(&subscription.subscription_id).await;
        if let Some(record) = existing.as_ref().filter(|r| !r.is_stale(now)) {
            return Ok(record.clone());
        }
        let usage = self.usage_snapshot(tenant_id).await;
        self.evaluate_with(tenant_id, &subscription, existing.as_ref(), usage.as_ref(), now)
            .await
    }

    /// Same as [`current`](Self::current) with a snapshot the caller already holds
    pub async fn refresh_at(
        &self,
        tenant_id: &str,
        usage: Option<&UsageSnapshot>,
        now: i64,
    ) -> EnforcementResult<EnforcementStateRecord> {
        let subscription = self.subscription(tenant_id).await?;
        let existing = self.cached(&subscription.subscription_id).await;
        if let Some(record) = existing.as_ref().filter(|r| !r.is_stale(now)) {
            return Ok(record.clone());
        }
        self.evaluate_with(tenant_id, &subscription, existing.as_ref(), usage, now)
            .await
    }

    /// Force a full evaluation now, ignoring the cache deadline
    pub async fn evaluate(&self, tenant_id: &str) -> EnforcementResult<EnforcementStateRecord> {
        let now = now_millis();
        let usage = self.usage_snapshot(tenant_id).await;
        self.evaluate_at(tenant_id, usage.as_ref(), now).await
    }

    pub async fn evaluate_at(
        &self,
        tenant_id: &str,
        usage: Option<&UsageSnapshot>,
        now: i64,
    ) -> EnforcementResult<EnforcementStateRecord> {
        let subscription = self.subscription(tenant_id).await?;
        let existing = self.cached(&subscription.subscription_id).await;
        self.evaluate_with(tenant_id, &subscription, existing.as_ref(), usage, now)
            .await
    }

    async fn evaluate_with(
        &self,
        tenant_id: &str,
        subscription: &SubscriptionHealth,
        existing: Option<&EnforcementStateRecord>,
        usage: Option<&UsageSnapshot>,
        now: i64,
    ) -> EnforcementResult<EnforcementStateRecord> {
        let plan = self
            .billing
            .plan_settings(&subscription.plan_id)
            .await
            .map_err(EnforcementError::Store)?
            .ok_or_else(|| EnforcementError::PlanNotFound(subscription.plan_id.clone()))?;

        let config = EnforcementConfig::resolve(&plan.enforcement);
        let retention_days = plan.retention_days.unwrap_or(self.default_retention_days);

        let evaluation: Evaluation = match usage {
            Some(usage) => evaluate(existing, subscription, usage, &config, retention_days, now),
            None => evaluate_without_usage(now),
        };

        let record = apply_evaluation(existing, &evaluation, now);
        let subscription_id = subscription.subscription_id.as_str();

        let previous = existing.map(|r| r.state).unwrap_or_default();
        if previous != record.state {
            tracing::info!(
                tenant_id = %tenant_id,
                subscription_id = %subscription_id,
                from = %previous,
                to = %record.state,
                triggered = record.triggered_metrics.len(),
                "Enforcement state changed"
            );
        } else {
            tracing::debug!(tenant_id = %tenant_id, state = %record.state, "Enforcement re-evaluated");
        }

        if let Err(e) = self.store.upsert(subscription_id, &record).await {
            tracing::warn!(subscription_id = %subscription_id, error = %e, "Failed to persist enforcement record");
        }

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::config::PlanSettings;
    use crate::store::BoxError;
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use shared::enforcement::{EffectivePolicy, SubscriptionStatus};
    use shared::util::{HOUR_MS, MINUTE_MS};
    use shared::{EnforcementState, Meter, MeterKey};

    const NOW: i64 = 1_750_000_000_000;

    fn subscription(id: &str, plan_id: &str, enabled: bool) -> SubscriptionHealth {
        SubscriptionHealth {
            subscription_id: id.into(),
            plan_id: plan_id.into(),
            status: SubscriptionStatus::Active,
            enabled,
            grace_period_end: None,
        }
    }

    fn seeded() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.set_plan("pro", PlanSettings::default());
        store.set_subscription("t-1", subscription("sub-1", "pro", true));
        store
    }

    fn service(store: &Arc<MemoryStore>) -> EnforcementService {
        EnforcementService::new(store.clone(), store.clone(), store.clone())
    }

    fn devices(used: u64) -> UsageSnapshot {
        UsageSnapshot::new().with_meter(MeterKey::Devices, Meter::new(used, Some(100)))
    }

    struct SlowUsage;

    #[async_trait]
    impl UsageProvider for SlowUsage {
        async fn usage_snapshot(&self, _: &str) -> Result<Option<UsageSnapshot>, BoxError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Some(devices(100)))
        }
    }

    struct BrokenUsage;

    #[async_trait]
    impl UsageProvider for BrokenUsage {
        async fn usage_snapshot(&self, _: &str) -> Result<Option<UsageSnapshot>, BoxError> {
            Err("metering offline".into())
        }
    }

    #[tokio::test]
    async fn evaluation_is_persisted() {
        let store = seeded();
        let record = service(&store)
            .evaluate_at("t-1", Some(&devices(90)), NOW)
            .await
            .unwrap();

        assert_eq!(record.state, EnforcementState::Warn);
        assert_eq!(record.warn_entered_at, Some(NOW));
        assert_eq!(store.record("sub-1"), Some(record));
    }

    #[tokio::test]
    async fn fresh_record_is_served_from_cache() {
        let store = seeded();
        let svc = service(&store);
        let first = svc.evaluate_at("t-1", Some(&devices(90)), NOW).await.unwrap();

        // Usage moved, but the deadline has not passed
        let cached = svc
            .refresh_at("t-1", Some(&devices(100)), NOW + MINUTE_MS)
            .await
            .unwrap();
        assert_eq!(cached, first);

        let refreshed = svc
            .refresh_at("t-1", Some(&devices(100)), first.next_evaluation_at)
            .await
            .unwrap();
        assert_eq!(refreshed.state, EnforcementState::Grace);
        assert_eq!(refreshed.warn_entered_at, Some(NOW));
    }

    #[tokio::test]
    async fn grace_deadline_survives_round_trips() {
        let store = seeded();
        let svc = service(&store);
        let entered = svc.evaluate_at("t-1", Some(&devices(100)), NOW).await.unwrap();
        let ends_at = NOW + 48 * HOUR_MS;
        assert_eq!(entered.grace_ends_at, Some(ends_at));

        let still = svc
            .evaluate_at("t-1", Some(&devices(100)), ends_at - 1000)
            .await
            .unwrap();
        assert_eq!(still.state, EnforcementState::Grace);
        assert_eq!(still.grace_ends_at, Some(ends_at));
        assert_eq!(still.grace_entered_at, Some(NOW));

        let degraded = svc
            .evaluate_at("t-1", Some(&devices(100)), ends_at + 1000)
            .await
            .unwrap();
        assert_eq!(degraded.state, EnforcementState::Degraded);
        assert_eq!(degraded.degraded_entered_at, Some(ends_at + 1000));
    }

    #[tokio::test]
    async fn missing_usage_fails_open() {
        let store = seeded();
        let record = service(&store).evaluate_at("t-1", None, NOW).await.unwrap();

        assert_eq!(record.state, EnforcementState::Active);
        assert!(record.triggered_metrics.is_empty());
        assert_eq!(record.effective_policy, EffectivePolicy::default());
        assert_eq!(record.next_evaluation_at, NOW + 15 * MINUTE_MS);
    }

    #[tokio::test]
    async fn usage_timeout_counts_as_unavailable() {
        let store = seeded();
        let svc = EnforcementService::new(Arc::new(SlowUsage), store.clone(), store.clone())
            .with_usage_timeout(Duration::from_millis(10));
        assert!(svc.usage_snapshot("t-1").await.is_none());

        let record = svc.evaluate("t-1").await.unwrap();
        assert_eq!(record.state, EnforcementState::Active);
    }

    #[tokio::test]
    async fn usage_error_counts_as_unavailable() {
        let store = seeded();
        let svc = EnforcementService::new(Arc::new(BrokenUsage), store.clone(), store.clone());
        assert!(svc.usage_snapshot("t-1").await.is_none());
    }

    #[tokio::test]
    async fn missing_subscription_is_fatal() {
        let store = seeded();
        let err = service(&store)
            .evaluate_at("nobody", Some(&devices(10)), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, EnforcementError::SubscriptionNotFound(t) if t == "nobody"));
    }

    #[tokio::test]
    async fn missing_plan_is_fatal() {
        let store = seeded();
        store.set_subscription("t-2", subscription("sub-2", "legacy", true));
        let err = service(&store)
            .evaluate_at("t-2", Some(&devices(10)), NOW)
            .await
            .unwrap_err();
        assert!(matches!(err, EnforcementError::PlanNotFound(p) if p == "legacy"));
    }

    #[tokio::test]
    async fn plan_retention_flows_into_policy() {
        let store = seeded();
        store.set_plan(
            "pro",
            PlanSettings {
                retention_days: Some(90),
                ..PlanSettings::default()
            },
        );
        let record = service(&store).evaluate_at("t-1", Some(&devices(10)), NOW).await.unwrap();
        assert_eq!(record.effective_policy.retention.api_traces, 90);
    }

    #[tokio::test]
    async fn default_retention_applies_without_plan_value() {
        let store = seeded();
        let record = service(&store)
            .with_default_retention_days(14)
            .evaluate_at("t-1", Some(&devices(10)), NOW)
            .await
            .unwrap();
        assert_eq!(record.effective_policy.retention.logs, 14);
    }

    #[tokio::test]
    async fn new_subscription_does_not_inherit_record() {
        let store = seeded();
        let svc = service(&store);
        store.set_subscription("t-1", subscription("sub-1", "pro", false));
        let suspended = svc.evaluate_at("t-1", Some(&devices(10)), NOW).await.unwrap();
        assert_eq!(suspended.state, EnforcementState::Suspended);

        // Resubscribed well before the old record goes stale
        store.set_subscription("t-1", subscription("sub-2", "pro", true));
        let record = svc
            .refresh_at("t-1", Some(&devices(10)), NOW + MINUTE_MS)
            .await
            .unwrap();

        assert_eq!(record.state, EnforcementState::Active);
        assert_eq!(store.record("sub-2").map(|r| r.state), Some(EnforcementState::Active));
        assert_eq!(store.record("sub-1").map(|r| r.state), Some(EnforcementState::Suspended));
    }
}
