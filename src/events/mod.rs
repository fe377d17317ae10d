//! Fire-and-forget report lifecycle notifications.
//!
//! The orchestrator publishes one event when a generation reaches a
//! terminal status. Publishing failures are logged and never change the
//! outcome of the generation.

pub mod redis;

pub use self::redis::RedisEventPublisher;

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::types::{ReportFormat, ReportMeta, ReportRollup, ReportStatus, ReportType};

/// Topic for successfully completed reports.
pub const TOPIC_REPORT_COMPLETED: &str = "report.completed";

/// Topic for failed reports.
pub const TOPIC_REPORT_FAILED: &str = "report.failed";

/// Errors that can occur while publishing events.
#[derive(Debug, Error)]
pub enum EventError {
    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Failed to connect to the broker.
    #[error("Event broker connection failed: {0}")]
    ConnectionFailed(String),

    /// Event could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Payload published on a terminal status change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportEvent {
    pub report_id: String,
    pub report_type: ReportType,
    pub owner_id: String,
    pub status: ReportStatus,
    #[serde(default)]
    pub formats: Vec<ReportFormat>,
    #[serde(default)]
    pub rollup: Option<ReportRollup>,
    #[serde(default)]
    pub error: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl ReportEvent {
    /// Builds the event for a record that just reached a terminal status.
    pub fn from_meta(meta: &ReportMeta) -> Self {
        Self {
            report_id: meta.report_id.clone(),
            report_type: meta.report_type,
            owner_id: meta.owner_id.clone(),
            status: meta.status,
            formats: meta.export_urls.keys().copied().collect(),
            rollup: (meta.status == ReportStatus::Completed).then(|| meta.rollup.clone()),
            error: meta.error_message.clone(),
            occurred_at: meta.completed_at.unwrap_or_else(Utc::now),
        }
    }

    /// Topic this event is published on.
    pub fn topic(&self) -> &'static str {
        match self.status {
            ReportStatus::Completed => TOPIC_REPORT_COMPLETED,
            _ => TOPIC_REPORT_FAILED,
        }
    }
}

/// Publishes report lifecycle events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, event: &ReportEvent) -> Result<(), EventError>;
}

/// Publisher that only writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventPublisher;

#[async_trait]
impl EventPublisher for LogEventPublisher {
    async fn publish(&self, topic: &str, event: &ReportEvent) -> Result<(), EventError> {
        info!(
            topic = %topic,
            report_id = %event.report_id,
            report_type = %event.report_type,
            status = %event.status,
            "Report event"
        );
        Ok(())
    }
}

/// Publisher that records events in memory.
#[derive(Debug, Default)]
pub struct MemoryEventPublisher {
    events: Mutex<Vec<(String, ReportEvent)>>,
}

impl MemoryEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every published `(topic, event)` pair in order.
    pub fn events(&self) -> Vec<(String, ReportEvent)> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl EventPublisher for MemoryEventPublisher {
    async fn publish(&self, topic: &str, event: &ReportEvent) -> Result<(), EventError> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusUpdate;
    use std::collections::BTreeMap;

    fn meta(status: ReportStatus) -> ReportMeta {
        ReportMeta::new(
            ReportType::Infringement,
            "owner",
            "alice",
            "Infringement",
            ReportFormat::Pdf,
            status,
        )
    }

    #[test]
    fn test_event_topic_follows_status() {
        let mut completed = meta(ReportStatus::Processing);
        let mut urls = BTreeMap::new();
        urls.insert(ReportFormat::Pdf, "reports/infringement/x.PDF".to_string());
        StatusUpdate::completed(ReportRollup::default(), urls).apply(&mut completed);

        let event = ReportEvent::from_meta(&completed);
        assert_eq!(event.topic(), TOPIC_REPORT_COMPLETED);
        assert_eq!(event.formats, vec![ReportFormat::Pdf]);
        assert!(event.rollup.is_some());

        let mut failed = meta(ReportStatus::Processing);
        StatusUpdate::failed("storage down").apply(&mut failed);
        let event = ReportEvent::from_meta(&failed);
        assert_eq!(event.topic(), TOPIC_REPORT_FAILED);
        assert_eq!(event.error.as_deref(), Some("storage down"));
        assert!(event.rollup.is_none());
    }

    #[tokio::test]
    async fn test_memory_publisher_records() {
        let publisher = MemoryEventPublisher::new();
        let event = ReportEvent::from_meta(&meta(ReportStatus::Failed));
        publisher.publish(event.topic(), &event).await.unwrap();
        LogEventPublisher.publish(event.topic(), &event).await.unwrap();

        let events = publisher.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, TOPIC_REPORT_FAILED);
    }
}
