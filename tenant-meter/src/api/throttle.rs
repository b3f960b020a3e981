//! Throttle check endpoints
//!
//! A blocked single-meter check answers with the unified error body
//! (429 + `Retry-After` for quota, 403 for suspension). A blocked batch
//! keeps the per-meter results in the body and takes its status from the
//! deciding block.

use axum::Json;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use shared::MeterKey;
use shared::error::{AppError, ErrorCode};

use crate::state::AppState;
use crate::throttle::{BatchThrottleResult, ThrottleResult};

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub meters: Vec<String>,
}

fn parse_meter(name: &str) -> Result<MeterKey, AppError> {
    name.parse::<MeterKey>().map_err(|e| {
        AppError::with_message(ErrorCode::UnknownMeter, e.to_string()).with_detail("meter", name)
    })
}

/// GET /api/tenants/{tenant_id}/throttle/{meter}
pub async fn check(
    State(state): State<AppState>,
    Path((tenant_id, meter)): Path<(String, String)>,
) -> Result<Json<ThrottleResult>, AppError> {
    let meter = parse_meter(&meter)?;
    let result = state.gate.check(&tenant_id, meter).await?;
    if let Some(err) = result.to_app_error() {
        return Err(err);
    }
    Ok(Json(result))
}

/// POST /api/tenants/{tenant_id}/throttle
pub async fn check_batch(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(req): Json<BatchRequest>,
) -> Result<Response, AppError> {
    if req.meters.is_empty() {
        return Err(AppError::validation("meters must not be empty"));
    }
    let meters = req
        .meters
        .iter()
        .map(|m| parse_meter(m))
        .collect::<Result<Vec<_>, _>>()?;

    let batch = state.gate.check_batch(&tenant_id, &meters).await?;
    Ok(batch_response(batch))
}

fn batch_response(batch: BatchThrottleResult) -> Response {
    let Some(err) = batch.first_block().and_then(ThrottleResult::to_app_error) else {
        return Json(batch).into_response();
    };

    let mut response = (err.http_status(), Json(batch)).into_response();
    err.set_retry_after(&mut response);
    response
}
