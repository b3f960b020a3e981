//! Enforcement types shared by the engine, the HTTP API and SDK consumers
//!
//! The engine decides an [`EnforcementState`] per tenant and derives an
//! [`EffectivePolicy`] from it. Ingestion paths read the policy and apply
//! sampling / retention / freezes themselves.

use serde::{Deserialize, Serialize};

use crate::metering::MeterKey;

/// Plan retention used when a plan does not define one (days)
pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Soft enforcement posture of a tenant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnforcementState {
    #[default]
    Active,
    Warn,
    Grace,
    Degraded,
    Suspended,
}

impl EnforcementState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Warn => "WARN",
            Self::Grace => "GRACE",
            Self::Degraded => "DEGRADED",
            Self::Suspended => "SUSPENDED",
        }
    }

    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "ACTIVE" => Some(Self::Active),
            "WARN" => Some(Self::Warn),
            "GRACE" => Some(Self::Grace),
            "DEGRADED" => Some(Self::Degraded),
            "SUSPENDED" => Some(Self::Suspended),
            _ => None,
        }
    }

    /// Grace, degraded and suspended tenants are re-evaluated more often
    pub fn is_at_risk(&self) -> bool {
        matches!(self, Self::Grace | Self::Degraded | Self::Suspended)
    }
}

impl std::fmt::Display for EnforcementState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing status of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Cancelled,
    Expired,
    Disabled,
}

impl SubscriptionStatus {
    /// Parse from database string value (lowercase)
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "suspended" => Some(Self::Suspended),
            "cancelled" => Some(Self::Cancelled),
            "expired" => Some(Self::Expired),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Database string representation (lowercase)
    pub fn as_db(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "suspended",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
            Self::Disabled => "disabled",
        }
    }
}

/// Subscription health as reported by billing (read-only here)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionHealth {
    pub subscription_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    /// Admin switch; a disabled subscription is suspended regardless of status
    pub enabled: bool,
    pub grace_period_end: Option<i64>,
}

impl SubscriptionHealth {
    /// Active and enabled
    pub fn is_in_good_standing(&self) -> bool {
        self.status == SubscriptionStatus::Active && self.enabled
    }
}

/// A meter at or above the warn threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggeredMetric {
    pub metric: MeterKey,
    pub usage: u64,
    pub limit: u64,
    pub percentage: f64,
}

/// Sampling for a request-shaped stream (API traces)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceSampling {
    /// Keep 1 in `rate`
    pub rate: u32,
    pub enabled: bool,
    pub drop_response_bodies: bool,
}

/// Sampling for sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSampling {
    /// Keep 1 in `rate`
    pub rate: u32,
    pub enabled: bool,
    pub max_events_per_session: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSampling {
    pub prioritize_crashes: bool,
    pub drop_debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingPolicy {
    pub api_traces: TraceSampling,
    pub sessions: SessionSampling,
    pub logs: LogSampling,
}

/// Retention per stream (days)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    pub api_traces: u32,
    pub logs: u32,
    pub sessions: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FreezePolicy {
    pub business_config: bool,
    pub localization: bool,
    /// Frozen modules keep serving their last published version
    pub serve_last_published: bool,
}

/// Concrete policy ingestion paths must honour
///
/// Always derived from (state, config, plan retention); never edited by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectivePolicy {
    pub sampling: SamplingPolicy,
    pub retention: RetentionPolicy,
    pub freezes: FreezePolicy,
}

impl EffectivePolicy {
    /// No sampling, plan retention, no freezes
    pub fn full_fidelity(retention_days: u32) -> Self {
        Self {
            sampling: SamplingPolicy {
                api_traces: TraceSampling {
                    rate: 1,
                    enabled: false,
                    drop_response_bodies: false,
                },
                sessions: SessionSampling {
                    rate: 1,
                    enabled: false,
                    max_events_per_session: None,
                },
                logs: LogSampling {
                    prioritize_crashes: false,
                    drop_debug: false,
                },
            },
            retention: RetentionPolicy {
                api_traces: retention_days,
                logs: retention_days,
                sessions: retention_days,
            },
            freezes: FreezePolicy {
                business_config: false,
                localization: false,
                serve_last_published: false,
            },
        }
    }
}

impl Default for EffectivePolicy {
    fn default() -> Self {
        Self::full_fidelity(DEFAULT_RETENTION_DAYS)
    }
}

/// Persisted enforcement state of one subscription (upserted, never deleted)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforcementStateRecord {
    pub state: EnforcementState,
    pub warn_entered_at: Option<i64>,
    pub grace_entered_at: Option<i64>,
    pub grace_ends_at: Option<i64>,
    pub degraded_entered_at: Option<i64>,
    pub effective_policy: EffectivePolicy,
    pub triggered_metrics: Vec<TriggeredMetric>,
    pub last_evaluated_at: i64,
    pub next_evaluation_at: i64,
}

impl EnforcementStateRecord {
    /// The record is past its re-evaluation deadline
    pub fn is_stale(&self, now: i64) -> bool {
        now >= self.next_evaluation_at
    }
}
