//! Enforcement configuration
//!
//! Plans store a partial JSON document ([`EnforcementOverrides`]); every
//! consumer works on the fully populated [`EnforcementConfig`] produced by
//! [`EnforcementConfig::resolve`]. Resolution is field by field, so a plan
//! that only sets `moduleRules.logs.minRetentionDays` keeps every other
//! default, including the rest of the `logs` rule.

use serde::{Deserialize, Serialize};

pub const DEFAULT_WARN_THRESHOLD: f64 = 80.0;
pub const DEFAULT_HARD_THRESHOLD: f64 = 100.0;
pub const DEFAULT_GRACE_PERIOD_HOURS: u32 = 48;
pub const DEFAULT_SAMPLING_RATE: u32 = 10;
pub const DEFAULT_CAP_EVENTS_PER_SESSION: u32 = 100;
pub const DEFAULT_MIN_LOG_RETENTION_DAYS: u32 = 7;

// ========== Stored (partial) form ==========

/// Per-plan enforcement settings as stored, every field optional
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnforcementOverrides {
    pub warn_threshold: Option<f64>,
    pub hard_threshold: Option<f64>,
    pub grace_period_hours: Option<u32>,
    pub module_rules: ModuleRuleOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModuleRuleOverrides {
    pub api_traces: TraceRuleOverrides,
    pub sessions: SessionRuleOverrides,
    pub logs: LogRuleOverrides,
    pub business_config: PublishRuleOverrides,
    pub localization: PublishRuleOverrides,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceRuleOverrides {
    pub sampling_rate: Option<u32>,
    pub drop_response_bodies: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionRuleOverrides {
    pub sampling_rate: Option<u32>,
    pub cap_events_per_session: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LogRuleOverrides {
    pub prioritize_crashes: Option<bool>,
    pub min_retention_days: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PublishRuleOverrides {
    pub freeze_publishing: Option<bool>,
    pub serve_last_published: Option<bool>,
}

impl EnforcementOverrides {
    /// Parse a plan's stored JSON; `null` or malformed documents yield no overrides
    pub fn from_json(value: Option<&serde_json::Value>) -> Self {
        value
            .filter(|v| !v.is_null())
            .and_then(|v| match serde_json::from_value::<Self>(v.clone()) {
                Ok(o) => Some(o),
                Err(e) => {
                    tracing::warn!(error = %e, "Malformed plan enforcement config, using defaults");
                    None
                }
            })
            .unwrap_or_default()
    }
}

// ========== Resolved form ==========

/// Fully populated enforcement configuration
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforcementConfig {
    /// Percent of limit at which a meter warns
    pub warn_threshold: f64,
    /// Percent of limit at which a meter is hard-triggered
    pub hard_threshold: f64,
    pub grace_period_hours: u32,
    pub module_rules: DegradeRules,
}

/// Degrade rules per data-stream family
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DegradeRules {
    pub api_traces: TraceRule,
    pub sessions: SessionRule,
    pub logs: LogRule,
    pub business_config: PublishRule,
    pub localization: PublishRule,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRule {
    /// Keep 1 in `sampling_rate` when degraded
    pub sampling_rate: u32,
    pub drop_response_bodies: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRule {
    pub sampling_rate: u32,
    pub cap_events_per_session: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRule {
    pub prioritize_crashes: bool,
    /// Retention floor for logs when degraded (days)
    pub min_retention_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRule {
    pub freeze_publishing: bool,
    pub serve_last_published: bool,
}

/// A sampling rate of 0 would mean "keep 1 in 0"; treat it as unset
fn sampling_rate(value: Option<u32>) -> u32 {
    value.filter(|rate| *rate > 0).unwrap_or(DEFAULT_SAMPLING_RATE)
}

impl PublishRule {
    fn resolve(overrides: &PublishRuleOverrides) -> Self {
        Self {
            freeze_publishing: overrides.freeze_publishing.unwrap_or(true),
            serve_last_published: overrides.serve_last_published.unwrap_or(true),
        }
    }
}

impl EnforcementConfig {
    /// Fill every unset field from the defaults
    pub fn resolve(overrides: &EnforcementOverrides) -> Self {
        let rules = &overrides.module_rules;
        Self {
            warn_threshold: overrides.warn_threshold.unwrap_or(DEFAULT_WARN_THRESHOLD),
            hard_threshold: overrides.hard_threshold.unwrap_or(DEFAULT_HARD_THRESHOLD),
            grace_period_hours: overrides
                .grace_period_hours
                .unwrap_or(DEFAULT_GRACE_PERIOD_HOURS),
            module_rules: DegradeRules {
                api_traces: TraceRule {
                    sampling_rate: sampling_rate(rules.api_traces.sampling_rate),
                    drop_response_bodies: rules.api_traces.drop_response_bodies.unwrap_or(true),
                },
                sessions: SessionRule {
                    sampling_rate: sampling_rate(rules.sessions.sampling_rate),
                    cap_events_per_session: rules
                        .sessions
                        .cap_events_per_session
                        .unwrap_or(DEFAULT_CAP_EVENTS_PER_SESSION),
                },
                logs: LogRule {
                    prioritize_crashes: rules.logs.prioritize_crashes.unwrap_or(true),
                    min_retention_days: rules
                        .logs
                        .min_retention_days
                        .filter(|days| *days > 0)
                        .unwrap_or(DEFAULT_MIN_LOG_RETENTION_DAYS),
                },
                business_config: PublishRule::resolve(&rules.business_config),
                localization: PublishRule::resolve(&rules.localization),
            },
        }
    }

    pub fn grace_period_ms(&self) -> i64 {
        i64::from(self.grace_period_hours) * shared::util::HOUR_MS
    }
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self::resolve(&EnforcementOverrides::default())
    }
}

/// Everything the engine needs from a plan
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanSettings {
    pub enforcement: EnforcementOverrides,
    /// `None` falls back to the service default
    pub retention_days: Option<u32>,
}
