//! High-level recording interface over the Prometheus statics.
//!
//! Every method is a no-op until [`super::init_metrics`] has run, so library
//! code can record unconditionally.

use std::time::Duration;

use super::prometheus::{
    ACTIVE_ASYNC_GENERATIONS, CHART_FALLBACKS, GENERATIONS_TOTAL, GENERATION_DURATION,
    ITEM_FAILURES, LOCK_CONFLICTS, RENDER_DURATION, TEMPLATE_CACHE,
};
use crate::types::{ExecutionMode, ReportFormat, ReportStatus, ReportType};

/// Metrics collector for report generation.
///
/// ```ignore
/// use reportforge::metrics::{init_metrics, MetricsCollector};
///
/// init_metrics().expect("Failed to init metrics");
/// let collector = MetricsCollector::new();
/// collector.record_generation(ReportType::Fto, ExecutionMode::Sync, ReportStatus::Completed, elapsed);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    pub fn new() -> Self {
        Self
    }

    /// Records a finished generation and its duration.
    pub fn record_generation(
        &self,
        report_type: ReportType,
        mode: ExecutionMode,
        status: ReportStatus,
        elapsed: Duration,
    ) {
        if let Some(total) = GENERATIONS_TOTAL.get() {
            total
                .with_label_values(&[report_type.as_str(), mode.as_str(), status.as_str()])
                .inc();
        }

        if let Some(duration) = GENERATION_DURATION.get() {
            duration
                .with_label_values(&[report_type.as_str(), mode.as_str()])
                .observe(elapsed.as_secs_f64());
        }

        tracing::trace!(
            report_type = %report_type,
            mode = %mode,
            status = %status,
            duration_secs = elapsed.as_secs_f64(),
            "Recorded generation metric"
        );
    }

    /// Records one template render.
    pub fn record_render(&self, format: ReportFormat, elapsed: Duration) {
        if let Some(render) = RENDER_DURATION.get() {
            render
                .with_label_values(&[format.token()])
                .observe(elapsed.as_secs_f64());
        }
    }

    /// Records charts that fell back to the placeholder image.
    pub fn record_chart_fallbacks(&self, count: usize) {
        if count == 0 {
            return;
        }
        if let Some(fallbacks) = CHART_FALLBACKS.get() {
            fallbacks.inc_by(count as f64);
        }
    }

    /// Records a generation rejected by the single-flight lock.
    pub fn record_lock_conflict(&self, report_type: ReportType) {
        if let Some(conflicts) = LOCK_CONFLICTS.get() {
            conflicts.with_label_values(&[report_type.as_str()]).inc();
        }
    }

    /// Records a skipped item in a collection category.
    pub fn record_item_failure(&self, report_type: ReportType, category: &str) {
        if let Some(failures) = ITEM_FAILURES.get() {
            failures
                .with_label_values(&[report_type.as_str(), category])
                .inc();
        }
    }

    /// Records a compiled-template cache lookup.
    pub fn record_template_cache(&self, hit: bool) {
        if let Some(cache) = TEMPLATE_CACHE.get() {
            cache
                .with_label_values(&[if hit { "hit" } else { "miss" }])
                .inc();
        }
    }

    /// Marks a detached generation as started.
    pub fn async_generation_started(&self) {
        if let Some(active) = ACTIVE_ASYNC_GENERATIONS.get() {
            active.inc();
        }
    }

    /// Marks a detached generation as finished.
    pub fn async_generation_finished(&self) {
        if let Some(active) = ACTIVE_ASYNC_GENERATIONS.get() {
            active.dec();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{export_metrics, init_metrics};

    #[test]
    fn test_recording_before_init_is_noop() {
        // Must not panic whether or not another test initialised the registry.
        let collector = MetricsCollector::new();
        collector.record_chart_fallbacks(0);
        collector.record_template_cache(true);
    }

    #[test]
    fn test_recorded_metrics_are_exported() {
        init_metrics().unwrap();
        let collector = MetricsCollector::new();
        collector.record_generation(
            ReportType::Portfolio,
            ExecutionMode::Async,
            ReportStatus::Failed,
            Duration::from_secs(3),
        );
        collector.record_lock_conflict(ReportType::Fto);
        collector.record_item_failure(ReportType::Infringement, "claims");
        collector.record_chart_fallbacks(2);

        let text = export_metrics();
        assert!(text.contains("reportforge_lock_conflicts_total"));
        assert!(text.contains("reportforge_item_failures_total"));
        assert!(text.contains("reportforge_chart_fallbacks_total"));
    }
}
