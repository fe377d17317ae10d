//! Weighted portfolio scores.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::Dimension;

/// Weight of the coverage sub-score in the health score.
pub const HEALTH_WEIGHT_COVERAGE: f64 = 0.25;
/// Weight of the concentration sub-score in the health score.
pub const HEALTH_WEIGHT_CONCENTRATION: f64 = 0.15;
/// Weight of the aging sub-score in the health score.
pub const HEALTH_WEIGHT_AGING: f64 = 0.20;
/// Weight of the activity sub-score in the health score.
pub const HEALTH_WEIGHT_ACTIVITY: f64 = 0.20;
/// Weight of the quality sub-score in the health score.
pub const HEALTH_WEIGHT_QUALITY: f64 = 0.20;

/// Sub-scores feeding the portfolio health score.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthInputs {
    pub coverage: f64,
    pub concentration: f64,
    pub aging: f64,
    pub activity: f64,
    pub quality: f64,
}

/// Health score with its weighted breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    pub inputs: HealthInputs,
    pub total: f64,
}

impl HealthScore {
    /// Fixed-weight linear combination of the sub-scores.
    pub fn compute(inputs: HealthInputs) -> Self {
        let total = inputs.coverage * HEALTH_WEIGHT_COVERAGE
            + inputs.concentration * HEALTH_WEIGHT_CONCENTRATION
            + inputs.aging * HEALTH_WEIGHT_AGING
            + inputs.activity * HEALTH_WEIGHT_ACTIVITY
            + inputs.quality * HEALTH_WEIGHT_QUALITY;
        Self { inputs, total }
    }
}

/// Per-dimension weights of the competitiveness index.
pub fn dimension_weight(dimension: Dimension) -> f64 {
    match dimension {
        Dimension::Technology => 0.30,
        Dimension::Legal => 0.20,
        Dimension::Market => 0.25,
        Dimension::Citation => 0.15,
        Dimension::Geographic => 0.10,
    }
}

/// Weighted competitiveness index over the supplied dimension scores.
///
/// Dimensions absent from `scores` contribute nothing.
pub fn competitiveness_index(scores: &BTreeMap<Dimension, f64>) -> f64 {
    scores
        .iter()
        .map(|(dimension, score)| dimension_weight(*dimension) * score)
        .sum()
}
