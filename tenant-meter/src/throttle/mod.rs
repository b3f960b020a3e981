//! Per-request throttle decisions
//!
//! Order of checks for one meter:
//! 1. no usage data: allow as ACTIVE
//! 2. meter not in the snapshot: allow
//! 3. unlimited meter: allow as ACTIVE
//! 4. `used >= limit`: refresh the enforcement record, then block for an
//!    hour whatever the state; a failed refresh still blocks
//! 5. refresh the cached enforcement record if absent or stale
//! 6. SUSPENDED: block, no retry hint
//! 7. anything else: allow and hand back the effective policy
//!
//! A refresh is what moves an over-limit tenant through GRACE and DEGRADED,
//! so blocked requests refresh too.
//!
//! Sampling, dropping and freezes are the caller's job; the gate only
//! reports the policy.

use std::collections::BTreeMap;

use serde::Serialize;
use shared::enforcement::{EffectivePolicy, EnforcementStateRecord};
use shared::error::{AppError, ErrorCode};
use shared::util::now_millis;
use shared::{EnforcementState, Meter, MeterKey, UsageSnapshot};

use crate::enforcement::EnforcementService;
use crate::error::EnforcementResult;

/// Retry hint for a per-meter quota block (seconds)
pub const QUOTA_RETRY_AFTER_SECS: u64 = 3600;

const SUSPENDED_MESSAGE: &str = "Subscription suspended. Please contact support.";

/// Why a request was blocked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockReason {
    QuotaExceeded,
    Suspended,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThrottleResult {
    pub meter: MeterKey,
    pub throttled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
    pub enforcement_state: EnforcementState,
    pub effective_policy: EffectivePolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Meter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block: Option<BlockReason>,
}

impl ThrottleResult {
    fn allow(
        meter: MeterKey,
        usage: Option<Meter>,
        state: EnforcementState,
        policy: EffectivePolicy,
    ) -> Self {
        Self {
            meter,
            throttled: false,
            error: None,
            retry_after_seconds: None,
            enforcement_state: state,
            effective_policy: policy,
            usage,
            block: None,
        }
    }

    /// Allowed as ACTIVE with the default policy
    fn fail_open(meter: MeterKey, usage: Option<Meter>) -> Self {
        Self::allow(meter, usage, EnforcementState::Active, EffectivePolicy::default())
    }

    fn quota_exceeded(
        meter: MeterKey,
        usage: Meter,
        limit: u64,
        record: Option<EnforcementStateRecord>,
    ) -> Self {
        let (state, policy) = record
            .map(|r| (r.state, r.effective_policy))
            .unwrap_or_default();
        Self {
            meter,
            throttled: true,
            error: Some(format!(
                "Quota exceeded: {}/{} {}. Please upgrade your plan.",
                usage.used, limit, meter
            )),
            retry_after_seconds: Some(QUOTA_RETRY_AFTER_SECS),
            enforcement_state: state,
            effective_policy: policy,
            usage: Some(usage),
            block: Some(BlockReason::QuotaExceeded),
        }
    }

    fn suspended(meter: MeterKey, usage: Meter, policy: EffectivePolicy) -> Self {
        Self {
            meter,
            throttled: true,
            error: Some(SUSPENDED_MESSAGE.to_string()),
            retry_after_seconds: None,
            enforcement_state: EnforcementState::Suspended,
            effective_policy: policy,
            usage: Some(usage),
            block: Some(BlockReason::Suspended),
        }
    }

    /// The HTTP error for a blocked result, `None` when allowed
    pub fn to_app_error(&self) -> Option<AppError> {
        let message = self.error.clone().unwrap_or_default();
        let err = match self.block? {
            BlockReason::QuotaExceeded => {
                let mut err = AppError::with_message(ErrorCode::QuotaExceeded, message)
                    .with_detail("meter", self.meter.as_str())
                    .with_retry_after(QUOTA_RETRY_AFTER_SECS);
                if let Some(usage) = &self.usage {
                    err = err.with_detail("used", usage.used);
                    if let Some(limit) = usage.limit {
                        err = err.with_detail("limit", limit);
                    }
                }
                err
            }
            BlockReason::Suspended => {
                AppError::with_message(ErrorCode::SubscriptionSuspended, message)
                    .with_detail("meter", self.meter.as_str())
            }
        };
        Some(err)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchThrottleResult {
    /// True iff any meter blocked
    pub throttled: bool,
    pub errors: Vec<String>,
    pub per_meter: BTreeMap<MeterKey, ThrottleResult>,
}

impl BatchThrottleResult {
    /// Result that decides the batch status; a quota block outranks a suspension
    pub fn first_block(&self) -> Option<&ThrottleResult> {
        let blocked = || self.per_meter.values().filter(|r| r.throttled);
        blocked()
            .find(|r| r.block == Some(BlockReason::QuotaExceeded))
            .or_else(|| blocked().next())
    }
}

#[derive(Clone)]
pub struct ThrottleGate {
    service: EnforcementService,
}

impl ThrottleGate {
    pub fn new(service: EnforcementService) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &EnforcementService {
        &self.service
    }

    pub async fn check(
        &self,
        tenant_id: &str,
        meter: MeterKey,
    ) -> EnforcementResult<ThrottleResult> {
        self.check_at(tenant_id, meter, now_millis()).await
    }

    pub async fn check_at(
        &self,
        tenant_id: &str,
        meter: MeterKey,
        now: i64,
    ) -> EnforcementResult<ThrottleResult> {
        let usage = self.service.usage_snapshot(tenant_id).await;
        let mut resolved = None;
        self.decide(tenant_id, meter, usage.as_ref(), now, &mut resolved)
            .await
    }

    pub async fn check_batch(
        &self,
        tenant_id: &str,
        meters: &[MeterKey],
    ) -> EnforcementResult<BatchThrottleResult> {
        self.check_batch_at(tenant_id, meters, now_millis()).await
    }

    /// One snapshot and at most one refresh for the whole batch
    pub async fn check_batch_at(
        &self,
        tenant_id: &str,
        meters: &[MeterKey],
        now: i64,
    ) -> EnforcementResult<BatchThrottleResult> {
        let usage = self.service.usage_snapshot(tenant_id).await;
        let mut resolved = None;
        let mut per_meter = BTreeMap::new();
        let mut errors = Vec::new();

        for &meter in meters {
            let result = self
                .decide(tenant_id, meter, usage.as_ref(), now, &mut resolved)
                .await?;
            if result.throttled {
                errors.push(
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| format!("Quota exceeded for {meter}")),
                );
            }
            per_meter.insert(meter, result);
        }

        Ok(BatchThrottleResult {
            throttled: !errors.is_empty(),
            errors,
            per_meter,
        })
    }

    async fn decide(
        &self,
        tenant_id: &str,
        meter: MeterKey,
        usage: Option<&UsageSnapshot>,
        now: i64,
        resolved: &mut Option<EnforcementStateRecord>,
    ) -> EnforcementResult<ThrottleResult> {
        let Some(usage) = usage else {
            tracing::debug!(tenant_id = %tenant_id, meter = %meter, "No usage data, allowing");
            return Ok(ThrottleResult::fail_open(meter, None));
        };
        let Some(current) = usage.get(meter).cloned() else {
            return Ok(ThrottleResult::fail_open(meter, None));
        };
        let Some(limit) = current.limit else {
            return Ok(ThrottleResult::fail_open(meter, Some(current)));
        };

        if current.used >= limit {
            let record = match self.resolve(tenant_id, usage, now, resolved).await {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(tenant_id = %tenant_id, error = %e, "Enforcement refresh failed on quota block");
                    None
                }
            };
            tracing::info!(
                tenant_id = %tenant_id,
                meter = %meter,
                used = current.used,
                limit,
                "Quota exceeded"
            );
            return Ok(ThrottleResult::quota_exceeded(meter, current, limit, record));
        }

        let record = self.resolve(tenant_id, usage, now, resolved).await?;
        Ok(match record.state {
            EnforcementState::Suspended => {
                tracing::info!(tenant_id = %tenant_id, meter = %meter, "Blocked, subscription suspended");
                ThrottleResult::suspended(meter, current, record.effective_policy)
            }
            state => ThrottleResult::allow(meter, Some(current), state, record.effective_policy),
        })
    }

    /// Enforcement record for this call, refreshed at most once
    async fn resolve(
        &self,
        tenant_id: &str,
        usage: &UsageSnapshot,
        now: i64,
        resolved: &mut Option<EnforcementStateRecord>,
    ) -> EnforcementResult<EnforcementStateRecord> {
        if let Some(record) = resolved {
            return Ok(record.clone());
        }
        let record = self.service.refresh_at(tenant_id, Some(usage), now).await?;
        *resolved = Some(record.clone());
        Ok(record)
    }
}
