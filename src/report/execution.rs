//! Execution mode selection.

use std::time::Duration;

use crate::config::ReportingConfig;
use crate::types::ExecutionMode;

/// Workload estimate of a generation: the product of its target-set sizes.
///
/// Empty optional sets count as one so they do not zero the product.
pub fn complexity(sizes: &[usize]) -> u64 {
    sizes
        .iter()
        .fold(1u64, |acc, size| acc.saturating_mul((*size).max(1) as u64))
}

/// `Async` when `complexity` exceeds `threshold`.
pub fn select_mode(complexity: u64, threshold: u64) -> ExecutionMode {
    if complexity > threshold {
        ExecutionMode::Async
    } else {
        ExecutionMode::Sync
    }
}

/// Mode and duration estimate for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPlan {
    pub complexity: u64,
    pub mode: ExecutionMode,
    pub estimated_duration: Duration,
}

impl ExecutionPlan {
    pub fn for_sizes(sizes: &[usize], config: &ReportingConfig) -> Self {
        let complexity = complexity(sizes);
        Self {
            complexity,
            mode: select_mode(complexity, config.async_threshold),
            estimated_duration: Duration::from_secs(
                complexity.saturating_mul(config.seconds_per_complexity_unit),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complexity_is_product() {
        assert_eq!(complexity(&[3, 4]), 12);
        assert_eq!(complexity(&[5]), 5);
        assert_eq!(complexity(&[2, 0, 3]), 6);
        assert_eq!(complexity(&[]), 1);
    }

    #[test]
    fn test_threshold_is_exclusive() {
        assert_eq!(select_mode(10, 10), ExecutionMode::Sync);
        assert_eq!(select_mode(11, 10), ExecutionMode::Async);
        assert_eq!(select_mode(1, 10), ExecutionMode::Sync);
    }

    #[test]
    fn test_plan_estimates_duration() {
        let config = ReportingConfig::default()
            .with_async_threshold(10)
            .with_seconds_per_complexity_unit(6);
        let plan = ExecutionPlan::for_sizes(&[4, 3], &config);
        assert_eq!(plan.complexity, 12);
        assert_eq!(plan.mode, ExecutionMode::Async);
        assert_eq!(plan.estimated_duration, Duration::from_secs(72));
    }
}
