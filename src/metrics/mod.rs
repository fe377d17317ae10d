//! Metrics module for Prometheus-based monitoring.
//!
//! Counters and latency histograms keyed by report type and execution mode,
//! plus render, chart, lock and cache instrumentation.
//!
//! # Example
//!
//! ```ignore
//! use reportforge::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//! let collector = MetricsCollector::new();
//! collector.record_lock_conflict(ReportType::Fto);
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics};

pub use prometheus::{
    ACTIVE_ASYNC_GENERATIONS, CHART_FALLBACKS, GENERATIONS_TOTAL, GENERATION_DURATION,
    ITEM_FAILURES, LOCK_CONFLICTS, REGISTRY, RENDER_DURATION, TEMPLATE_CACHE,
};
