//! Service-layer error type for tenant-meter
//!
//! Only a full evaluation can fail: without a subscription or a plan no
//! enforcement decision can be derived. Everything else (metering outages,
//! malformed cached records, lost upsert races) degrades to "allow" inside
//! the engine and never reaches this type.

use axum::response::IntoResponse;
use shared::error::{AppError, ErrorCode};

use crate::store::BoxError;

#[derive(Debug, thiserror::Error)]
pub enum EnforcementError {
    #[error("no subscription for tenant {0}")]
    SubscriptionNotFound(String),
    #[error("plan {0} not found")]
    PlanNotFound(String),
    /// Billing collaborator failed while a full evaluation needed it
    #[error("store error: {0}")]
    Store(#[source] BoxError),
}

impl From<EnforcementError> for AppError {
    fn from(e: EnforcementError) -> Self {
        match e {
            EnforcementError::SubscriptionNotFound(tenant_id) => {
                AppError::new(ErrorCode::SubscriptionNotFound).with_detail("tenantId", tenant_id)
            }
            EnforcementError::PlanNotFound(plan_id) => {
                AppError::new(ErrorCode::PlanNotFound).with_detail("planId", plan_id)
            }
            EnforcementError::Store(err) => {
                tracing::error!(error = %err, "Enforcement store error");
                AppError::new(ErrorCode::DatabaseError)
            }
        }
    }
}

impl IntoResponse for EnforcementError {
    fn into_response(self) -> axum::response::Response {
        let app_error: AppError = self.into();
        app_error.into_response()
    }
}

pub type EnforcementResult<T> = Result<T, EnforcementError>;
