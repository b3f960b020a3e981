//! Enforcement state machine
//!
//! The next state is recomputed from scratch on every evaluation. The only
//! memory carried over from the previous record is the grace deadline, so
//! a tenant whose usage drops below the hard threshold leaves GRACE or
//! DEGRADED on the very next evaluation.

use shared::enforcement::{
    EffectivePolicy, EnforcementStateRecord, SubscriptionHealth, TriggeredMetric,
};
use shared::util::MINUTE_MS;
use shared::{EnforcementState, UsageSnapshot};

use super::config::EnforcementConfig;
use super::evaluator::{ThresholdReport, evaluate_thresholds};
use super::policy::generate_policy;

/// Re-evaluation interval for ACTIVE and WARN tenants
pub const STEADY_INTERVAL_MS: i64 = 15 * MINUTE_MS;

/// Re-evaluation interval for GRACE, DEGRADED and SUSPENDED tenants
pub const AT_RISK_INTERVAL_MS: i64 = 5 * MINUTE_MS;

/// Outcome of one evaluation, before it is merged into the stored record
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub state: EnforcementState,
    pub triggered_metrics: Vec<TriggeredMetric>,
    pub effective_policy: EffectivePolicy,
    /// Set only while in GRACE
    pub grace_ends_at: Option<i64>,
    pub next_evaluation_at: i64,
}

/// Decide the next state and, for GRACE, its deadline
pub fn next_state(
    previous: Option<&EnforcementStateRecord>,
    subscription: &SubscriptionHealth,
    report: &ThresholdReport,
    config: &EnforcementConfig,
    now: i64,
) -> (EnforcementState, Option<i64>) {
    if !subscription.is_in_good_standing() {
        return (EnforcementState::Suspended, None);
    }

    if report.has_hard_threshold {
        let running_grace = previous
            .filter(|record| record.state == EnforcementState::Grace)
            .and_then(|record| record.grace_ends_at);

        return match running_grace {
            Some(ends_at) if now < ends_at => (EnforcementState::Grace, Some(ends_at)),
            Some(_) => (EnforcementState::Degraded, None),
            // Fresh overage, or a GRACE record that lost its deadline
            None => (
                EnforcementState::Grace,
                Some(now + config.grace_period_ms()),
            ),
        };
    }

    if report.max_percentage >= config.warn_threshold {
        (EnforcementState::Warn, None)
    } else {
        (EnforcementState::Active, None)
    }
}

pub fn next_evaluation_at(state: EnforcementState, now: i64) -> i64 {
    if state.is_at_risk() {
        now + AT_RISK_INTERVAL_MS
    } else {
        now + STEADY_INTERVAL_MS
    }
}

/// Full evaluation: thresholds, state, policy and cadence
pub fn evaluate(
    previous: Option<&EnforcementStateRecord>,
    subscription: &SubscriptionHealth,
    usage: &UsageSnapshot,
    config: &EnforcementConfig,
    plan_retention_days: u32,
    now: i64,
) -> Evaluation {
    let report = evaluate_thresholds(usage, config);
    let (state, grace_ends_at) = next_state(previous, subscription, &report, config, now);

    Evaluation {
        state,
        triggered_metrics: report.triggered_metrics,
        effective_policy: generate_policy(state, config, plan_retention_days),
        grace_ends_at,
        next_evaluation_at: next_evaluation_at(state, now),
    }
}

/// Metering is unavailable: fail open to ACTIVE with the default policy
pub fn evaluate_without_usage(now: i64) -> Evaluation {
    Evaluation {
        state: EnforcementState::Active,
        triggered_metrics: Vec::new(),
        effective_policy: EffectivePolicy::default(),
        grace_ends_at: None,
        next_evaluation_at: now + STEADY_INTERVAL_MS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::enforcement::SubscriptionStatus;
    use shared::util::HOUR_MS;
    use shared::{Meter, MeterKey};

    const NOW: i64 = 1_750_000_000_000;
    const SECOND_MS: i64 = 1000;

    fn healthy() -> SubscriptionHealth {
        SubscriptionHealth {
            subscription_id: "sub-1".into(),
            plan_id: "pro".into(),
            status: SubscriptionStatus::Active,
            enabled: true,
            grace_period_end: None,
        }
    }

    fn devices(used: u64) -> UsageSnapshot {
        UsageSnapshot::new()
            .with_meter(MeterKey::Devices, Meter::new(used, Some(100)))
            .with_meter(MeterKey::Logs, Meter::new(5, Some(1000)))
            .with_meter(MeterKey::ApiRequests, Meter::unlimited(10_000))
    }

    fn record_from(evaluation: &Evaluation, now: i64) -> EnforcementStateRecord {
        EnforcementStateRecord {
            state: evaluation.state,
            warn_entered_at: None,
            grace_entered_at: None,
            grace_ends_at: evaluation.grace_ends_at,
            degraded_entered_at: None,
            effective_policy: evaluation.effective_policy.clone(),
            triggered_metrics: evaluation.triggered_metrics.clone(),
            last_evaluated_at: now,
            next_evaluation_at: evaluation.next_evaluation_at,
        }
    }

    fn run(
        previous: Option<&EnforcementStateRecord>,
        usage: &UsageSnapshot,
        now: i64,
    ) -> Evaluation {
        evaluate(previous, &healthy(), usage, &EnforcementConfig::default(), 30, now)
    }

    #[test]
    fn warn_when_a_meter_crosses_warn_threshold() {
        let evaluation = run(None, &devices(90), NOW);

        assert_eq!(evaluation.state, EnforcementState::Warn);
        assert_eq!(evaluation.triggered_metrics.len(), 1);
        assert_eq!(evaluation.triggered_metrics[0].metric, MeterKey::Devices);
        assert_eq!(evaluation.triggered_metrics[0].percentage, 90.0);
        assert_eq!(evaluation.next_evaluation_at, NOW + 15 * MINUTE_MS);
    }

    #[test]
    fn hard_threshold_without_record_enters_grace() {
        let evaluation = run(None, &devices(100), NOW);

        assert_eq!(evaluation.state, EnforcementState::Grace);
        assert_eq!(evaluation.grace_ends_at, Some(NOW + 48 * HOUR_MS));
        assert_eq!(evaluation.next_evaluation_at, NOW + 5 * MINUTE_MS);
        assert_eq!(evaluation.effective_policy, EffectivePolicy::full_fidelity(30));
    }

    #[test]
    fn grace_persists_until_deadline_then_degrades() {
        let entered = run(None, &devices(100), NOW);
        let ends_at = NOW + 48 * HOUR_MS;
        assert_eq!(entered.grace_ends_at, Some(ends_at));
        let record = record_from(&entered, NOW);

        let just_before = ends_at - SECOND_MS;
        let still_grace = run(Some(&record), &devices(100), just_before);
        assert_eq!(still_grace.state, EnforcementState::Grace);
        assert_eq!(still_grace.grace_ends_at, Some(ends_at));

        let record = record_from(&still_grace, just_before);
        let just_after = ends_at + SECOND_MS;
        let degraded = run(Some(&record), &devices(100), just_after);
        assert_eq!(degraded.state, EnforcementState::Degraded);
        assert_eq!(degraded.grace_ends_at, None);
    }

    #[test]
    fn expired_grace_degrades_with_sampling() {
        let mut record = record_from(&run(None, &devices(100), NOW), NOW);
        record.grace_ends_at = Some(NOW - HOUR_MS);

        let evaluation = run(Some(&record), &devices(100), NOW);

        assert_eq!(evaluation.state, EnforcementState::Degraded);
        assert_eq!(evaluation.effective_policy.sampling.api_traces.rate, 10);
        assert!(evaluation.effective_policy.sampling.api_traces.enabled);
        assert_eq!(evaluation.next_evaluation_at, NOW + 5 * MINUTE_MS);
    }

    #[test]
    fn grace_without_deadline_starts_a_new_window() {
        let mut record = record_from(&run(None, &devices(100), NOW), NOW);
        record.grace_ends_at = None;

        let evaluation = run(Some(&record), &devices(100), NOW);
        assert_eq!(evaluation.state, EnforcementState::Grace);
        assert_eq!(evaluation.grace_ends_at, Some(NOW + 48 * HOUR_MS));
    }

    #[test]
    fn degraded_tenant_still_over_limit_reenters_grace() {
        let mut record = record_from(&run(None, &devices(100), NOW), NOW);
        record.state = EnforcementState::Degraded;
        record.grace_ends_at = None;

        let later = NOW + HOUR_MS;
        let evaluation = run(Some(&record), &devices(100), later);
        assert_eq!(evaluation.state, EnforcementState::Grace);
        assert_eq!(evaluation.grace_ends_at, Some(later + 48 * HOUR_MS));
    }

    #[test]
    fn dropping_below_hard_threshold_leaves_grace_and_degraded() {
        for state in [EnforcementState::Grace, EnforcementState::Degraded] {
            let mut record = record_from(&run(None, &devices(100), NOW), NOW);
            record.state = state;

            let evaluation = run(Some(&record), &devices(50), NOW + MINUTE_MS);
            assert_eq!(evaluation.state, EnforcementState::Active);
            assert_eq!(evaluation.grace_ends_at, None);
        }
    }

    /// Near the boundary a tenant alternates between WARN and a fresh GRACE
    /// window: dipping below the hard threshold discards the running deadline.
    #[test]
    fn usage_oscillating_at_hard_threshold_restarts_grace() {
        let first = run(None, &devices(100), NOW);
        let first_deadline = first.grace_ends_at;
        let record = record_from(&first, NOW);

        let dip_at = NOW + 5 * MINUTE_MS;
        let dip = run(Some(&record), &devices(99), dip_at);
        assert_eq!(dip.state, EnforcementState::Warn);
        let record = record_from(&dip, dip_at);

        let back_at = dip_at + 15 * MINUTE_MS;
        let back = run(Some(&record), &devices(100), back_at);
        assert_eq!(back.state, EnforcementState::Grace);
        assert_ne!(back.grace_ends_at, first_deadline);
        assert_eq!(back.grace_ends_at, Some(back_at + 48 * HOUR_MS));
    }

    #[test]
    fn disabled_subscription_is_suspended_regardless_of_usage() {
        let mut subscription = healthy();
        subscription.enabled = false;
        let usage = UsageSnapshot::new().with_meter(MeterKey::Devices, Meter::new(0, Some(100)));

        let evaluation = evaluate(
            None,
            &subscription,
            &usage,
            &EnforcementConfig::default(),
            30,
            NOW,
        );

        assert_eq!(evaluation.state, EnforcementState::Suspended);
        assert_eq!(evaluation.effective_policy.retention.logs, 0);
        assert_eq!(evaluation.next_evaluation_at, NOW + 5 * MINUTE_MS);
    }

    #[test]
    fn inactive_status_is_suspended() {
        for status in [
            SubscriptionStatus::Suspended,
            SubscriptionStatus::Cancelled,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Disabled,
        ] {
            let mut subscription = healthy();
            subscription.status = status;
            let evaluation = evaluate(
                None,
                &subscription,
                &devices(100),
                &EnforcementConfig::default(),
                30,
                NOW,
            );
            assert_eq!(evaluation.state, EnforcementState::Suspended);
        }
    }

    #[test]
    fn unlimited_meters_never_leave_active() {
        let usage = UsageSnapshot::new()
            .with_meter(MeterKey::ApiRequests, Meter::unlimited(u64::MAX / 2))
            .with_meter(MeterKey::Sessions, Meter::unlimited(42));

        let evaluation = run(None, &usage, NOW);
        assert_eq!(evaluation.state, EnforcementState::Active);
        assert!(evaluation.triggered_metrics.is_empty());
    }

    #[test]
    fn missing_usage_fails_open() {
        let evaluation = evaluate_without_usage(NOW);

        assert_eq!(evaluation.state, EnforcementState::Active);
        assert!(evaluation.triggered_metrics.is_empty());
        assert_eq!(evaluation.effective_policy, EffectivePolicy::default());
        assert_eq!(evaluation.next_evaluation_at, NOW + 15 * MINUTE_MS);
    }
}
