//! Domain metric computations.
//!
//! Pure functions over successfully collected data:
//!
//! - **Concentration**: Gini coefficient of portfolio value
//! - **Scores**: weighted health score and competitiveness index
//! - **Risk**: probability bucketing and overall matrix risk
//! - **Dedup**: identity fingerprints and target deduplication

pub mod concentration;
pub mod dedup;
pub mod risk;
pub mod scores;

pub use concentration::{gini_coefficient, top_share};
pub use dedup::{dedup_targets, fingerprint, set_fingerprint, Target, TargetSource};
pub use risk::{overall_risk, risk_counts, risk_level};
pub use scores::{competitiveness_index, dimension_weight, HealthInputs, HealthScore};
