//! Usage metering types
//!
//! A [`UsageSnapshot`] is what the usage provider hands to the enforcement
//! engine: one [`Meter`] per [`MeterKey`], with limits already resolved from
//! any per-tenant override against the plan default.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Every meter the platform counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeterKey {
    Devices,
    ApiRequests,
    ApiEndpoints,
    Logs,
    Sessions,
    Crashes,
    Projects,
    BusinessConfigKeys,
    LocalizationLanguages,
    LocalizationKeys,
    MockEndpoints,
    TeamMembers,
}

impl MeterKey {
    pub const ALL: [MeterKey; 12] = [
        MeterKey::Devices,
        MeterKey::ApiRequests,
        MeterKey::ApiEndpoints,
        MeterKey::Logs,
        MeterKey::Sessions,
        MeterKey::Crashes,
        MeterKey::Projects,
        MeterKey::BusinessConfigKeys,
        MeterKey::LocalizationLanguages,
        MeterKey::LocalizationKeys,
        MeterKey::MockEndpoints,
        MeterKey::TeamMembers,
    ];

    /// Meters that drive the enforcement state machine, in evaluation order
    pub const EVALUATED: [MeterKey; 6] = [
        MeterKey::Devices,
        MeterKey::ApiRequests,
        MeterKey::Logs,
        MeterKey::Sessions,
        MeterKey::Crashes,
        MeterKey::Projects,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MeterKey::Devices => "devices",
            MeterKey::ApiRequests => "apiRequests",
            MeterKey::ApiEndpoints => "apiEndpoints",
            MeterKey::Logs => "logs",
            MeterKey::Sessions => "sessions",
            MeterKey::Crashes => "crashes",
            MeterKey::Projects => "projects",
            MeterKey::BusinessConfigKeys => "businessConfigKeys",
            MeterKey::LocalizationLanguages => "localizationLanguages",
            MeterKey::LocalizationKeys => "localizationKeys",
            MeterKey::MockEndpoints => "mockEndpoints",
            MeterKey::TeamMembers => "teamMembers",
        }
    }

    /// Lifetime meters never reset; the rest are counted per billing period
    pub fn is_lifetime(&self) -> bool {
        matches!(
            self,
            MeterKey::Projects
                | MeterKey::BusinessConfigKeys
                | MeterKey::LocalizationLanguages
                | MeterKey::LocalizationKeys
                | MeterKey::MockEndpoints
                | MeterKey::TeamMembers
        )
    }
}

impl fmt::Display for MeterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown meter name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown meter: {0}")]
pub struct UnknownMeter(pub String);

impl FromStr for MeterKey {
    type Err = UnknownMeter;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MeterKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| UnknownMeter(s.to_string()))
    }
}

/// Current-period consumption of one meter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meter {
    pub used: u64,
    /// `None` means unlimited
    pub limit: Option<u64>,
    pub percentage: f64,
}

impl Meter {
    pub fn new(used: u64, limit: Option<u64>) -> Self {
        let percentage = match limit {
            Some(l) if l > 0 => used as f64 / l as f64 * 100.0,
            _ => 0.0,
        };
        Self {
            used,
            limit,
            percentage,
        }
    }

    pub fn unlimited(used: u64) -> Self {
        Self::new(used, None)
    }

    pub fn is_unlimited(&self) -> bool {
        self.limit.is_none()
    }

    /// Usage has reached the hard limit
    pub fn is_exhausted(&self) -> bool {
        self.limit.is_some_and(|limit| self.used >= limit)
    }
}

/// Effective limit: the per-tenant override wins over the plan default
pub fn resolve_limit(override_limit: Option<u64>, plan_limit: Option<u64>) -> Option<u64> {
    override_limit.or(plan_limit)
}

/// All meters of one tenant at one instant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UsageSnapshot {
    meters: BTreeMap<MeterKey, Meter>,
}

impl UsageSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meter(mut self, key: MeterKey, meter: Meter) -> Self {
        self.meters.insert(key, meter);
        self
    }

    pub fn get(&self, key: MeterKey) -> Option<&Meter> {
        self.meters.get(&key)
    }
}

impl FromIterator<(MeterKey, Meter)> for UsageSnapshot {
    fn from_iter<I: IntoIterator<Item = (MeterKey, Meter)>>(iter: I) -> Self {
        Self {
            meters: iter.into_iter().collect(),
        }
    }
}
