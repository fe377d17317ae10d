//! Embedded chart rendering.
//!
//! Charts of one render call are rendered concurrently. Each chart gets its
//! own timeout, clipped to a shared group deadline. A chart that fails or
//! times out is replaced by a transparent 1×1 PNG and reported as a warning;
//! chart problems never fail a render.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{timeout_at, Instant};
use tracing::warn;

use crate::error::CollaboratorError;

/// Base64 of a transparent 1×1 PNG.
pub const FALLBACK_PNG_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// Data URI prefix for inlined PNG images.
pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

/// Visual form of a chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartKind {
    Bar,
    Pie,
    Radar,
}

/// Descriptor of one chart embedded in a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Context key under `charts` the image is bound to.
    pub id: String,
    pub title: String,
    pub kind: ChartKind,
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl ChartSpec {
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: ChartKind) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            kind,
            labels: Vec::new(),
            values: Vec::new(),
        }
    }

    pub fn with_point(mut self, label: impl Into<String>, value: f64) -> Self {
        self.labels.push(label.into());
        self.values.push(value);
        self
    }
}

/// Turns a chart descriptor into PNG bytes.
#[async_trait]
pub trait ChartRenderer: Send + Sync {
    async fn render(&self, chart: &ChartSpec) -> Result<Vec<u8>, CollaboratorError>;
}

/// Rendered charts of one render call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChartImages {
    /// Data URI per chart id.
    pub images: BTreeMap<String, String>,
    pub warnings: Vec<String>,
    /// Number of charts replaced by the fallback image.
    pub fallbacks: usize,
}

/// Data URI of the fallback image.
pub fn fallback_data_uri() -> String {
    format!("{}{}", PNG_DATA_URI_PREFIX, FALLBACK_PNG_BASE64)
}

/// Inlines PNG bytes as a data URI.
pub fn png_data_uri(bytes: &[u8]) -> String {
    format!("{}{}", PNG_DATA_URI_PREFIX, BASE64.encode(bytes))
}

/// Renders `charts` concurrently under per-chart and group timeouts.
pub async fn render_charts(
    renderer: Arc<dyn ChartRenderer>,
    charts: Vec<ChartSpec>,
    per_chart: Duration,
    group: Duration,
) -> ChartImages {
    let group_deadline = Instant::now() + group;

    let tasks = charts.into_iter().map(|chart| {
        let renderer = Arc::clone(&renderer);
        async move {
            let deadline = (Instant::now() + per_chart).min(group_deadline);
            let outcome = match timeout_at(deadline, renderer.render(&chart)).await {
                Ok(Ok(bytes)) if !bytes.is_empty() => Ok(bytes),
                Ok(Ok(_)) => Err("renderer returned no image data".to_string()),
                Ok(Err(e)) => Err(e.to_string()),
                Err(_) => Err("timed out".to_string()),
            };
            (chart.id, outcome)
        }
    });

    let mut result = ChartImages::default();
    for (id, outcome) in join_all(tasks).await {
        match outcome {
            Ok(bytes) => {
                result.images.insert(id, png_data_uri(&bytes));
            }
            Err(reason) => {
                warn!(chart = %id, reason = %reason, "Chart rendering failed, using fallback image");
                result
                    .warnings
                    .push(format!("chart '{}' replaced by placeholder: {}", id, reason));
                result.images.insert(id, fallback_data_uri());
                result.fallbacks += 1;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedRenderer;

    #[async_trait]
    impl ChartRenderer for ScriptedRenderer {
        async fn render(&self, chart: &ChartSpec) -> Result<Vec<u8>, CollaboratorError> {
            match chart.id.as_str() {
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(vec![1])
                }
                "broken" => Err(CollaboratorError::failed("chart renderer", "no font")),
                "empty" => Ok(Vec::new()),
                _ => Ok(vec![0x89, b'P', b'N', b'G']),
            }
        }
    }

    fn spec(id: &str) -> ChartSpec {
        ChartSpec::new(id, id, ChartKind::Bar).with_point("a", 1.0)
    }

    #[tokio::test]
    async fn test_failures_fall_back_without_failing() {
        let result = render_charts(
            Arc::new(ScriptedRenderer),
            vec![spec("ok"), spec("broken"), spec("empty"), spec("slow")],
            Duration::from_millis(50),
            Duration::from_millis(200),
        )
        .await;

        assert_eq!(result.images.len(), 4);
        assert_eq!(result.fallbacks, 3);
        assert_eq!(result.warnings.len(), 3);
        assert_eq!(result.images["ok"], png_data_uri(&[0x89, b'P', b'N', b'G']));
        assert_eq!(result.images["broken"], fallback_data_uri());
        assert_eq!(result.images["slow"], fallback_data_uri());
        assert!(result.warnings.iter().any(|w| w.contains("no font")));
    }

    #[tokio::test]
    async fn test_group_deadline_bounds_total_time() {
        let started = std::time::Instant::now();
        let result = render_charts(
            Arc::new(ScriptedRenderer),
            vec![spec("slow"), spec("slow2")],
            Duration::from_secs(10),
            Duration::from_millis(50),
        )
        .await;

        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(result.images["slow"], fallback_data_uri());
        assert!(result.images["slow2"].starts_with(PNG_DATA_URI_PREFIX));
    }

    #[test]
    fn test_fallback_is_valid_base64_png() {
        let bytes = BASE64.decode(FALLBACK_PNG_BASE64).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }
}
