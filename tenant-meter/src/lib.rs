//! tenant-meter: tenant usage metering and enforcement
//!
//! For every subscribed tenant the service judges whether consumption is
//! within plan limits, decides a soft enforcement posture
//! (ACTIVE / WARN / GRACE / DEGRADED / SUSPENDED) and derives the policy
//! (sampling, retention, freezes) ingestion paths must honour. Hard
//! per-meter limits are enforced separately by the throttle gate.
//!
//! ```text
//! tenant-meter/src/
//! ├── enforcement/   # config, evaluator, state machine, policy, service
//! ├── store/         # collaborator traits, memory + PostgreSQL impls
//! ├── throttle/      # per-request allow / block decisions
//! ├── api/           # HTTP routes and handlers
//! ├── config.rs      # environment configuration
//! ├── error.rs       # service-layer error
//! └── state.rs       # shared application state
//! ```

pub mod api;
pub mod config;
pub mod enforcement;
pub mod error;
pub mod state;
pub mod store;
pub mod throttle;

use axum::Router;
use http::HeaderName;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use enforcement::EnforcementService;
pub use error::{EnforcementError, EnforcementResult};
pub use state::AppState;
pub use throttle::{BatchThrottleResult, ThrottleGate, ThrottleResult};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Router with every route and the HTTP middleware stack
pub fn build_app(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    api::create_router(state).layer(
        ServiceBuilder::new()
            .layer(SetRequestIdLayer::new(request_id.clone(), MakeRequestUuid))
            .layer(TraceLayer::new_for_http())
            .layer(PropagateRequestIdLayer::new(request_id))
            .layer(CorsLayer::permissive())
            .layer(CompressionLayer::new()),
    )
}
