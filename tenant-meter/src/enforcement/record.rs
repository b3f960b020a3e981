//! Merging an evaluation into the persisted record

use shared::EnforcementState;
use shared::enforcement::EnforcementStateRecord;

use super::machine::Evaluation;

/// Build the record to upsert
///
/// `*_entered_at` timestamps are first-entry only: once set they are never
/// overwritten by a later entry into the same state, and never cleared.
/// The grace deadline is the evaluation's when it has one, otherwise the
/// stored one is carried forward.
pub fn apply_evaluation(
    existing: Option<&EnforcementStateRecord>,
    evaluation: &Evaluation,
    now: i64,
) -> EnforcementStateRecord {
    let first_entry = |state: EnforcementState, stored: Option<i64>| -> Option<i64> {
        stored.or((evaluation.state == state).then_some(now))
    };

    EnforcementStateRecord {
        state: evaluation.state,
        warn_entered_at: first_entry(
            EnforcementState::Warn,
            existing.and_then(|r| r.warn_entered_at),
        ),
        grace_entered_at: first_entry(
            EnforcementState::Grace,
            existing.and_then(|r| r.grace_entered_at),
        ),
        grace_ends_at: evaluation
            .grace_ends_at
            .or(existing.and_then(|r| r.grace_ends_at)),
        degraded_entered_at: first_entry(
            EnforcementState::Degraded,
            existing.and_then(|r| r.degraded_entered_at),
        ),
        effective_policy: evaluation.effective_policy.clone(),
        triggered_metrics: evaluation.triggered_metrics.clone(),
        last_evaluated_at: now,
        next_evaluation_at: evaluation.next_evaluation_at,
    }
}
