//! Shared types for the tenant metering service
//!
//! Error types, metering types and enforcement types used by the
//! service, its HTTP API and SDK consumers.

pub mod enforcement;
pub mod error;
pub mod metering;
pub mod util;

// Re-exports
pub use enforcement::{EffectivePolicy, EnforcementState, EnforcementStateRecord};
pub use metering::{Meter, MeterKey, UsageSnapshot};
