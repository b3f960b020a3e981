//! PostgreSQL collaborators
//!
//! Timestamps are stored as BIGINT milliseconds. Policy and triggered
//! metrics are stored as JSONB snapshots of what was computed.

use std::collections::HashMap;

use async_trait::async_trait;
use shared::enforcement::{
    EffectivePolicy, EnforcementStateRecord, SubscriptionHealth, SubscriptionStatus,
    TriggeredMetric,
};
use shared::metering::resolve_limit;
use shared::{EnforcementState, Meter, MeterKey, UsageSnapshot};
use sqlx::PgPool;

use super::{BillingProvider, BoxError, EnforcementStore, UsageProvider};
use crate::enforcement::config::{EnforcementOverrides, PlanSettings};

/// Lifetime meters are counted under this period
const LIFETIME_PERIOD: i64 = 0;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    id: String,
    plan_id: String,
    status: String,
    enabled: bool,
    grace_period_end: Option<i64>,
    current_period_start: i64,
}

#[derive(sqlx::FromRow)]
struct EnforcementRow {
    state: String,
    warn_entered_at: Option<i64>,
    grace_entered_at: Option<i64>,
    grace_ends_at: Option<i64>,
    degraded_entered_at: Option<i64>,
    effective_policy: serde_json::Value,
    triggered_metrics: serde_json::Value,
    last_evaluated_at: i64,
    next_evaluation_at: i64,
}

impl EnforcementRow {
    fn into_record(self) -> Result<EnforcementStateRecord, String> {
        let state = EnforcementState::from_db(&self.state)
            .ok_or_else(|| format!("unknown state {}", self.state))?;
        let effective_policy: EffectivePolicy =
            serde_json::from_value(self.effective_policy).map_err(|e| e.to_string())?;
        let triggered_metrics: Vec<TriggeredMetric> =
            serde_json::from_value(self.triggered_metrics).map_err(|e| e.to_string())?;
        Ok(EnforcementStateRecord {
            state,
            warn_entered_at: self.warn_entered_at,
            grace_entered_at: self.grace_entered_at,
            grace_ends_at: self.grace_ends_at,
            degraded_entered_at: self.degraded_entered_at,
            effective_policy,
            triggered_metrics,
            last_evaluated_at: self.last_evaluated_at,
            next_evaluation_at: self.next_evaluation_at,
        })
    }
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

async fn latest_subscription(
    pool: &PgPool,
    tenant_id: &str,
) -> Result<Option<SubscriptionRow>, sqlx::Error> {
    sqlx::query_as::<_, SubscriptionRow>(
        "SELECT id, plan_id, status, enabled, grace_period_end, current_period_start
            FROM tenant_subscriptions
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT 1",
    )
    .bind(tenant_id)
    .fetch_optional(pool)
    .await
}

#[async_trait]
impl UsageProvider for PgStore {
    async fn usage_snapshot(&self, tenant_id: &str) -> Result<Option<UsageSnapshot>, BoxError> {
        let Some(subscription) = latest_subscription(&self.pool, tenant_id).await? else {
            return Ok(None);
        };

        let plan_limits: HashMap<String, Option<i64>> =
            sqlx::query_as::<_, (String, Option<i64>)>(
                "SELECT meter, limit_value FROM plan_limits WHERE plan_id = $1",
            )
            .bind(&subscription.plan_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();

        let overrides: HashMap<String, i64> = sqlx::query_as::<_, (String, i64)>(
            "SELECT meter, limit_value FROM tenant_quota_overrides WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .collect();

        let counters: HashMap<(String, i64), i64> = sqlx::query_as::<_, (String, i64, i64)>(
            "SELECT meter, period_start, used FROM tenant_usage_counters
                WHERE tenant_id = $1 AND period_start IN ($2, $3)",
        )
        .bind(tenant_id)
        .bind(subscription.current_period_start)
        .bind(LIFETIME_PERIOD)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(meter, period, used)| ((meter, period), used))
        .collect();

        let snapshot = MeterKey::ALL
            .into_iter()
            .filter_map(|key| {
                let name = key.as_str();
                let override_limit = overrides.get(name).map(|v| count(*v));
                let plan_limit = plan_limits.get(name);
                // Not on the plan and not overridden: the meter is not tracked
                if override_limit.is_none() && plan_limit.is_none() {
                    return None;
                }
                let plan_limit = plan_limit.copied().flatten().map(count);
                let period = if key.is_lifetime() {
                    LIFETIME_PERIOD
                } else {
                    subscription.current_period_start
                };
                let used = counters
                    .get(&(name.to_string(), period))
                    .copied()
                    .map(count)
                    .unwrap_or(0);
                Some((key, Meter::new(used, resolve_limit(override_limit, plan_limit))))
            })
            .collect();

        Ok(Some(snapshot))
    }
}

#[async_trait]
impl BillingProvider for PgStore {
    async fn subscription_health(
        &self,
        tenant_id: &str,
    ) -> Result<Option<SubscriptionHealth>, BoxError> {
        let Some(row) = latest_subscription(&self.pool, tenant_id).await? else {
            return Ok(None);
        };
        let status = SubscriptionStatus::from_db(&row.status).unwrap_or_else(|| {
            tracing::warn!(tenant_id = %tenant_id, status = %row.status, "Unknown subscription status");
            SubscriptionStatus::Disabled
        });
        Ok(Some(SubscriptionHealth {
            subscription_id: row.id,
            plan_id: row.plan_id,
            status,
            enabled: row.enabled,
            grace_period_end: row.grace_period_end,
        }))
    }

    async fn plan_settings(&self, plan_id: &str) -> Result<Option<PlanSettings>, BoxError> {
        let row: Option<(Option<i32>, Option<serde_json::Value>)> = sqlx::query_as(
            "SELECT retention_days, enforcement_config FROM plans WHERE id = $1",
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(retention_days, config)| PlanSettings {
            enforcement: EnforcementOverrides::from_json(config.as_ref()),
            retention_days: retention_days.and_then(|d| u32::try_from(d).ok()),
        }))
    }
}

#[async_trait]
impl EnforcementStore for PgStore {
    async fn get(&self, subscription_id: &str) -> Result<Option<EnforcementStateRecord>, BoxError> {
        let row = sqlx::query_as::<_, EnforcementRow>(
            "SELECT state, warn_entered_at, grace_entered_at, grace_ends_at, degraded_entered_at,
                effective_policy, triggered_metrics, last_evaluated_at, next_evaluation_at
                FROM enforcement_states
                WHERE subscription_id = $1",
        )
        .bind(subscription_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        match row.into_record() {
            Ok(record) => Ok(Some(record)),
            Err(reason) => {
                tracing::warn!(subscription_id = %subscription_id, reason = %reason, "Malformed enforcement record, re-evaluating");
                Ok(None)
            }
        }
    }

    async fn upsert(
        &self,
        subscription_id: &str,
        record: &EnforcementStateRecord,
    ) -> Result<(), BoxError> {
        let policy = serde_json::to_value(&record.effective_policy)?;
        let metrics = serde_json::to_value(&record.triggered_metrics)?;

        sqlx::query(
            "INSERT INTO enforcement_states (
                subscription_id, state, warn_entered_at, grace_entered_at, grace_ends_at,
                degraded_entered_at, effective_policy, triggered_metrics,
                last_evaluated_at, next_evaluation_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (subscription_id) DO UPDATE SET
                state = EXCLUDED.state,
                warn_entered_at = COALESCE(enforcement_states.warn_entered_at, EXCLUDED.warn_entered_at),
                grace_entered_at = COALESCE(enforcement_states.grace_entered_at, EXCLUDED.grace_entered_at),
                grace_ends_at = EXCLUDED.grace_ends_at,
                degraded_entered_at = COALESCE(enforcement_states.degraded_entered_at, EXCLUDED.degraded_entered_at),
                effective_policy = EXCLUDED.effective_policy,
                triggered_metrics = EXCLUDED.triggered_metrics,
                last_evaluated_at = EXCLUDED.last_evaluated_at,
                next_evaluation_at = EXCLUDED.next_evaluation_at",
        )
        .bind(subscription_id)
        .bind(record.state.as_str())
        .bind(record.warn_entered_at)
        .bind(record.grace_entered_at)
        .bind(record.grace_ends_at)
        .bind(record.degraded_entered_at)
        .bind(&policy)
        .bind(&metrics)
        .bind(record.last_evaluated_at)
        .bind(record.next_evaluation_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
