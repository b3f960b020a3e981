//! Enforcement engine
//!
//! Leaves first:
//! - [`config`]: partial plan config resolved into a full [`EnforcementConfig`]
//! - [`evaluator`]: warn / hard threshold classification of the usage snapshot
//! - [`machine`]: next state with grace hysteresis, plus re-evaluation cadence
//! - [`policy`]: state to [`EffectivePolicy`](shared::EffectivePolicy)
//! - [`record`]: first-entry bookkeeping for the persisted record
//! - [`service`]: cache-aside orchestration over the collaborators

pub mod config;
pub mod evaluator;
pub mod machine;
pub mod policy;
pub mod record;
pub mod service;

pub use config::{EnforcementConfig, EnforcementOverrides, PlanSettings};
pub use machine::Evaluation;
pub use service::EnforcementService;
