//! Enforcement state endpoints

use axum::Json;
use axum::extract::{Path, State};
use serde::Serialize;
use shared::enforcement::{EffectivePolicy, EnforcementStateRecord, TriggeredMetric};
use shared::EnforcementState;

use super::ApiResult;
use crate::state::AppState;

/// What SDKs poll to learn how to degrade
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyView {
    pub state: EnforcementState,
    pub effective_policy: EffectivePolicy,
    pub grace_ends_at: Option<i64>,
    pub next_evaluation_at: i64,
    pub triggered_metrics: Vec<TriggeredMetric>,
}

impl From<EnforcementStateRecord> for PolicyView {
    fn from(record: EnforcementStateRecord) -> Self {
        // The stored deadline outlives GRACE; only report it while it applies
        let grace_ends_at = record
            .grace_ends_at
            .filter(|_| record.state == EnforcementState::Grace);
        Self {
            state: record.state,
            effective_policy: record.effective_policy,
            grace_ends_at,
            next_evaluation_at: record.next_evaluation_at,
            triggered_metrics: record.triggered_metrics,
        }
    }
}

/// GET /api/tenants/{tenant_id}/enforcement
pub async fn get_state(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<EnforcementStateRecord> {
    let record = state.enforcement.current(&tenant_id).await?;
    Ok(Json(record))
}

/// GET /api/tenants/{tenant_id}/enforcement/policy
pub async fn get_policy(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<PolicyView> {
    let record = state.enforcement.current(&tenant_id).await?;
    Ok(Json(record.into()))
}

/// POST /api/tenants/{tenant_id}/enforcement/evaluate
pub async fn evaluate(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<EnforcementStateRecord> {
    let record = state.enforcement.evaluate(&tenant_id).await?;
    tracing::info!(tenant_id = %tenant_id, state = %record.state, "Manual evaluation");
    Ok(Json(record))
}
