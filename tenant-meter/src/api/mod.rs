//! HTTP API for tenant-meter
//!
//! Authentication happens upstream; tenants are addressed by path.

pub mod enforcement;
pub mod health;
pub mod throttle;

use axum::Router;
use axum::routing::{get, post};
use shared::error::AppError;

use crate::state::AppState;

pub type ApiResult<T> = Result<axum::Json<T>, AppError>;

/// Create the combined router
pub fn create_router(state: AppState) -> Router {
    let enforcement = Router::new()
        .route(
            "/api/tenants/{tenant_id}/enforcement",
            get(enforcement::get_state),
        )
        .route(
            "/api/tenants/{tenant_id}/enforcement/policy",
            get(enforcement::get_policy),
        )
        .route(
            "/api/tenants/{tenant_id}/enforcement/evaluate",
            post(enforcement::evaluate),
        );

    let throttle = Router::new()
        .route(
            "/api/tenants/{tenant_id}/throttle",
            post(throttle::check_batch),
        )
        .route(
            "/api/tenants/{tenant_id}/throttle/{meter}",
            get(throttle::check),
        );

    Router::new()
        .route("/health", get(health::health_check))
        .merge(enforcement)
        .merge(throttle)
        .with_state(state)
}
