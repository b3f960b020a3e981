//! Threshold evaluation over the enforced meters

use shared::MeterKey;
use shared::UsageSnapshot;
use shared::enforcement::TriggeredMetric;

use super::config::EnforcementConfig;

/// Which meters crossed a threshold, and how far
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThresholdReport {
    /// Every warn- or hard-triggered meter, in [`MeterKey::EVALUATED`] order
    pub triggered_metrics: Vec<TriggeredMetric>,
    pub has_hard_threshold: bool,
    /// Highest percentage across limited meters, 0 when none
    pub max_percentage: f64,
}

/// Classify each enforced meter against the warn and hard thresholds
///
/// Unlimited meters are skipped entirely. Meters outside
/// [`MeterKey::EVALUATED`] never influence the enforcement state; they
/// are only subject to the per-request hard cutoff.
pub fn evaluate_thresholds(usage: &UsageSnapshot, config: &EnforcementConfig) -> ThresholdReport {
    let mut report = ThresholdReport::default();

    for key in MeterKey::EVALUATED {
        let Some(meter) = usage.get(key) else {
            continue;
        };
        let Some(limit) = meter.limit else {
            continue;
        };

        let percentage = meter.percentage;
        report.max_percentage = report.max_percentage.max(percentage);

        let hard = percentage >= config.hard_threshold;
        if hard {
            report.has_hard_threshold = true;
        }
        if hard || percentage >= config.warn_threshold {
            report.triggered_metrics.push(TriggeredMetric {
                metric: key,
                usage: meter.used,
                limit,
                percentage,
            });
        }
    }

    report
}
