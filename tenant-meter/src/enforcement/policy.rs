//! Effective policy generation
//!
//! Pure mapping from (state, config, plan retention) to the policy that
//! ingestion paths apply. ACTIVE, WARN and GRACE are indistinguishable here;
//! grace only delays the move to DEGRADED.

use shared::EnforcementState;
use shared::enforcement::{
    EffectivePolicy, FreezePolicy, LogSampling, RetentionPolicy, SamplingPolicy, SessionSampling,
    TraceSampling,
};

use super::config::EnforcementConfig;

/// Retention never degrades below one week
const RETENTION_FLOOR_DAYS: u32 = 7;

pub fn generate_policy(
    state: EnforcementState,
    config: &EnforcementConfig,
    plan_retention_days: u32,
) -> EffectivePolicy {
    match state {
        EnforcementState::Active | EnforcementState::Warn | EnforcementState::Grace => {
            EffectivePolicy::full_fidelity(plan_retention_days)
        }
        EnforcementState::Degraded => degraded(config, plan_retention_days),
        EnforcementState::Suspended => suspended(),
    }
}

fn degraded(config: &EnforcementConfig, plan_retention_days: u32) -> EffectivePolicy {
    let rules = &config.module_rules;
    let reduced = plan_retention_days
        .saturating_sub(RETENTION_FLOOR_DAYS)
        .max(RETENTION_FLOOR_DAYS);

    EffectivePolicy {
        sampling: SamplingPolicy {
            api_traces: TraceSampling {
                rate: rules.api_traces.sampling_rate,
                enabled: true,
                drop_response_bodies: rules.api_traces.drop_response_bodies,
            },
            sessions: SessionSampling {
                rate: rules.sessions.sampling_rate,
                enabled: true,
                max_events_per_session: Some(rules.sessions.cap_events_per_session),
            },
            logs: LogSampling {
                prioritize_crashes: rules.logs.prioritize_crashes,
                drop_debug: true,
            },
        },
        retention: RetentionPolicy {
            api_traces: reduced,
            logs: rules.logs.min_retention_days.max(RETENTION_FLOOR_DAYS),
            sessions: reduced,
        },
        freezes: FreezePolicy {
            business_config: rules.business_config.freeze_publishing,
            localization: rules.localization.freeze_publishing,
            serve_last_published: rules.business_config.serve_last_published
                || rules.localization.serve_last_published,
        },
    }
}

/// Full-fidelity sampling over zero retention, with publishing frozen
fn suspended() -> EffectivePolicy {
    EffectivePolicy {
        freezes: FreezePolicy {
            business_config: true,
            localization: true,
            serve_last_published: false,
        },
        ..EffectivePolicy::full_fidelity(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enforcement::config::EnforcementOverrides;
    use serde_json::json;

    #[test]
    fn test_full_fidelity_states_are_identical() {
        let config = EnforcementConfig::default();
        let active = generate_policy(EnforcementState::Active, &config, 30);
        assert_eq!(generate_policy(EnforcementState::Warn, &config, 30), active);
        assert_eq!(generate_policy(EnforcementState::Grace, &config, 30), active);

        assert!(!active.sampling.api_traces.enabled);
        assert_eq!(active.sampling.api_traces.rate, 1);
        assert_eq!(active.retention.logs, 30);
        assert!(!active.freezes.business_config);
        assert!(!active.freezes.localization);
    }

    #[test]
    fn test_degraded_defaults() {
        let policy = generate_policy(EnforcementState::Degraded, &EnforcementConfig::default(), 30);

        assert!(policy.sampling.api_traces.enabled);
        assert_eq!(policy.sampling.api_traces.rate, 10);
        assert!(policy.sampling.api_traces.drop_response_bodies);
        assert!(policy.sampling.sessions.enabled);
        assert_eq!(policy.sampling.sessions.rate, 10);
        assert_eq!(policy.sampling.sessions.max_events_per_session, Some(100));
        assert!(policy.sampling.logs.drop_debug);
        assert!(policy.sampling.logs.prioritize_crashes);
        assert_eq!(policy.retention.api_traces, 23);
        assert_eq!(policy.retention.sessions, 23);
        assert_eq!(policy.retention.logs, 7);
        assert!(policy.freezes.business_config);
        assert!(policy.freezes.localization);
        assert!(policy.freezes.serve_last_published);
    }

    #[test]
    fn test_degraded_retention_floor() {
        let config = EnforcementConfig::default();
        assert_eq!(
            generate_policy(EnforcementState::Degraded, &config, 10).retention.api_traces,
            7
        );
        assert_eq!(
            generate_policy(EnforcementState::Degraded, &config, 3).retention.sessions,
            7
        );
        assert_eq!(
            generate_policy(EnforcementState::Degraded, &config, 90).retention.sessions,
            83
        );
    }

    #[test]
    fn test_degraded_respects_module_rules() {
        let overrides: EnforcementOverrides = serde_json::from_value(json!({
            "moduleRules": {
                "apiTraces": { "samplingRate": 4 },
                "logs": { "prioritizeCrashes": false, "minRetentionDays": 3 },
                "localization": { "freezePublishing": false }
            }
        }))
        .unwrap();
        let config = EnforcementConfig::resolve(&overrides);
        let policy = generate_policy(EnforcementState::Degraded, &config, 30);

        assert_eq!(policy.sampling.api_traces.rate, 4);
        assert_eq!(policy.sampling.sessions.rate, 10);
        assert!(!policy.sampling.logs.prioritize_crashes);
        assert_eq!(policy.retention.logs, 7);
        assert!(policy.freezes.business_config);
        assert!(!policy.freezes.localization);
    }

    #[test]
    fn test_suspended_policy() {
        let config = EnforcementConfig::default();
        let policy = generate_policy(EnforcementState::Suspended, &config, 90);

        assert!(!policy.sampling.api_traces.enabled);
        assert_eq!(policy.sampling.api_traces.rate, 1);
        assert!(!policy.sampling.api_traces.drop_response_bodies);
        assert!(!policy.sampling.sessions.enabled);
        assert_eq!(policy.sampling.sessions.rate, 1);
        assert_eq!(policy.sampling.sessions.max_events_per_session, None);
        assert!(!policy.sampling.logs.prioritize_crashes);
        assert!(!policy.sampling.logs.drop_debug);
        assert_eq!(policy.retention.api_traces, 0);
        assert_eq!(policy.retention.logs, 0);
        assert_eq!(policy.retention.sessions, 0);
        assert!(policy.freezes.business_config);
        assert!(policy.freezes.localization);
        assert!(!policy.freezes.serve_last_published);
    }
}
