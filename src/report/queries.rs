//! Read-side operations over generated reports.

use std::sync::Arc;

use tracing::info;

use super::pipeline::ReportServices;
use super::retention::delete_artifacts;
use crate::error::ReportError;
use crate::storage::{content_type_for_key, ByteStream};
use crate::types::{Page, ReportFilter, ReportFormat, ReportPage, ReportStatus, ReportStatusInfo};

/// A stored artifact opened for reading.
pub struct ReportStream {
    pub report_id: String,
    pub format: ReportFormat,
    pub content_type: String,
    pub key: String,
    pub stream: ByteStream,
}

impl std::fmt::Debug for ReportStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportStream")
            .field("report_id", &self.report_id)
            .field("format", &self.format)
            .field("content_type", &self.content_type)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Status polling, listing, export and deletion.
#[derive(Clone)]
pub struct ReportQueries {
    services: Arc<ReportServices>,
}

impl ReportQueries {
    pub fn new(services: Arc<ReportServices>) -> Self {
        Self { services }
    }

    /// Cached status projection, falling back to the durable record.
    pub async fn get_status(&self, report_id: &str) -> Result<ReportStatusInfo, ReportError> {
        self.services.status().read(report_id).await
    }

    pub async fn list(&self, filter: &ReportFilter, page: Page) -> Result<ReportPage, ReportError> {
        Ok(self.services.repository.list(filter, page).await?)
    }

    /// Opens the artifact of a completed report in `format`.
    ///
    /// `InvalidState` until the report is completed; `NotFound` when the
    /// format was never persisted for it.
    pub async fn export(
        &self,
        report_id: &str,
        format: ReportFormat,
    ) -> Result<ReportStream, ReportError> {
        let meta = self.services.repository.get(report_id).await?;
        if meta.status != ReportStatus::Completed {
            return Err(ReportError::InvalidState(format!(
                "report '{}' is {}; export is available once it is completed",
                report_id, meta.status
            )));
        }
        let key = meta.export_urls.get(&format).cloned().ok_or_else(|| {
            ReportError::NotFound(format!(
                "report '{}' has no {} artifact",
                report_id, format
            ))
        })?;

        let stream = self.services.storage.get_stream(&key).await?;
        Ok(ReportStream {
            report_id: meta.report_id,
            format,
            content_type: content_type_for_key(&key).to_string(),
            key,
            stream,
        })
    }

    /// Alias of [`export`](Self::export).
    pub async fn get_report_stream(
        &self,
        report_id: &str,
        format: ReportFormat,
    ) -> Result<ReportStream, ReportError> {
        self.export(report_id, format).await
    }

    /// Deletes a finished report's artifacts, record and status entry.
    pub async fn delete(&self, report_id: &str) -> Result<(), ReportError> {
        let meta = self.services.repository.get(report_id).await?;
        if !meta.status.is_terminal() {
            return Err(ReportError::InvalidState(format!(
                "report '{}' is {} and cannot be deleted yet",
                report_id, meta.status
            )));
        }

        delete_artifacts(self.services.storage.as_ref(), &meta).await?;
        self.services.repository.delete(report_id).await?;
        self.services.status().evict(report_id).await;
        info!(report_id = %report_id, report_type = %meta.report_type, "Report deleted");
        Ok(())
    }
}
