//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by reportforge and
//! provides functions for initializing, registering, and exporting them.

use prometheus::{
    Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all reportforge metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Total generations, labeled by report type, execution mode and final status.
pub static GENERATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// End-to-end generation duration in seconds, labeled by report type and mode.
pub static GENERATION_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Template render duration in seconds, labeled by output format.
pub static RENDER_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Charts replaced by the fallback image.
pub static CHART_FALLBACKS: OnceLock<Counter> = OnceLock::new();

/// Generations rejected because the target lock was held, labeled by report type.
pub static LOCK_CONFLICTS: OnceLock<CounterVec> = OnceLock::new();

/// Item-level collaborator failures, labeled by report type and category.
pub static ITEM_FAILURES: OnceLock<CounterVec> = OnceLock::new();

/// Compiled-template cache lookups, labeled by result (hit/miss).
pub static TEMPLATE_CACHE: OnceLock<CounterVec> = OnceLock::new();

/// Detached generations currently running.
pub static ACTIVE_ASYNC_GENERATIONS: OnceLock<Gauge> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Call once at startup. Later calls are harmless: the first registered set
/// of metrics stays in place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric construction or registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let generations_total = CounterVec::new(
        Opts::new(
            "reportforge_generations_total",
            "Total number of report generations",
        ),
        &["report_type", "mode", "status"],
    )?;

    let generation_duration = HistogramVec::new(
        HistogramOpts::new(
            "reportforge_generation_duration_seconds",
            "Report generation duration in seconds",
        )
        .buckets(vec![1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 900.0, 1800.0]),
        &["report_type", "mode"],
    )?;

    let render_duration = HistogramVec::new(
        HistogramOpts::new(
            "reportforge_render_duration_seconds",
            "Template render duration in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]),
        &["format"],
    )?;

    let chart_fallbacks = Counter::new(
        "reportforge_chart_fallbacks_total",
        "Charts replaced by the fallback image",
    )?;

    let lock_conflicts = CounterVec::new(
        Opts::new(
            "reportforge_lock_conflicts_total",
            "Generations rejected because another generation held the target lock",
        ),
        &["report_type"],
    )?;

    let item_failures = CounterVec::new(
        Opts::new(
            "reportforge_item_failures_total",
            "Item-level collaborator failures skipped during data collection",
        ),
        &["report_type", "category"],
    )?;

    let template_cache = CounterVec::new(
        Opts::new(
            "reportforge_template_cache_lookups_total",
            "Compiled template cache lookups",
        ),
        &["result"],
    )?;

    let active_async = Gauge::new(
        "reportforge_active_async_generations",
        "Detached report generations currently running",
    )?;

    registry.register(Box::new(generations_total.clone()))?;
    registry.register(Box::new(generation_duration.clone()))?;
    registry.register(Box::new(render_duration.clone()))?;
    registry.register(Box::new(chart_fallbacks.clone()))?;
    registry.register(Box::new(lock_conflicts.clone()))?;
    registry.register(Box::new(item_failures.clone()))?;
    registry.register(Box::new(template_cache.clone()))?;
    registry.register(Box::new(active_async.clone()))?;

    // If any of these fail, another thread initialized first.
    let _ = REGISTRY.set(registry);
    let _ = GENERATIONS_TOTAL.set(generations_total);
    let _ = GENERATION_DURATION.set(generation_duration);
    let _ = RENDER_DURATION.set(render_duration);
    let _ = CHART_FALLBACKS.set(chart_fallbacks);
    let _ = LOCK_CONFLICTS.set(lock_conflicts);
    let _ = ITEM_FAILURES.set(item_failures);
    let _ = TEMPLATE_CACHE.set(template_cache);
    let _ = ACTIVE_ASYNC_GENERATIONS.set(active_async);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns an explanatory comment line if the registry is not initialized
/// or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}
