//! Probability → risk level bucketing.

use std::collections::BTreeMap;

use crate::types::RiskLevel;

/// Thresholds are exclusive lower bounds, highest first.
const RISK_THRESHOLDS: [(f64, RiskLevel); 4] = [
    (0.9, RiskLevel::Critical),
    (0.75, RiskLevel::High),
    (0.5, RiskLevel::Medium),
    (0.3, RiskLevel::Low),
];

/// Maps a probability in `[0, 1]` to a risk level.
///
/// Out-of-range and NaN inputs are clamped (NaN counts as 0).
pub fn risk_level(probability: f64) -> RiskLevel {
    let p = if probability.is_nan() {
        0.0
    } else {
        probability.clamp(0.0, 1.0)
    };

    RISK_THRESHOLDS
        .iter()
        .find(|(threshold, _)| p > *threshold)
        .map(|(_, level)| *level)
        .unwrap_or(RiskLevel::Negligible)
}

/// Highest risk level among `levels`, or `None` for an empty matrix.
pub fn overall_risk<I>(levels: I) -> Option<RiskLevel>
where
    I: IntoIterator<Item = RiskLevel>,
{
    levels.into_iter().max()
}

/// Number of rows per risk level.
pub fn risk_counts<I>(levels: I) -> BTreeMap<RiskLevel, u32>
where
    I: IntoIterator<Item = RiskLevel>,
{
    let mut counts = BTreeMap::new();
    for level in levels {
        *counts.entry(level).or_insert(0) += 1;
    }
    counts
}
