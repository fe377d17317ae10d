//! Cache-backed status projection with a durable fallback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{Cache, CacheExt};
use crate::error::ReportError;
use crate::repository::ReportRepository;
use crate::types::{ReportMeta, ReportStatusInfo, StatusUpdate};

/// Cache key of a report's status projection.
pub fn status_key(report_id: &str) -> String {
    format!("report-status:{}", report_id)
}

/// Writes status changes to the repository and the cache, and reads the
/// cache first when polling.
#[derive(Clone)]
pub struct StatusProjection {
    cache: Arc<dyn Cache>,
    repository: Arc<dyn ReportRepository>,
    ttl: Duration,
}

impl StatusProjection {
    pub fn new(cache: Arc<dyn Cache>, repository: Arc<dyn ReportRepository>, ttl: Duration) -> Self {
        Self {
            cache,
            repository,
            ttl,
        }
    }

    /// Applies a durable status change and refreshes the projection.
    pub async fn transition(
        &self,
        report_id: &str,
        update: &StatusUpdate,
        progress: u8,
        message: Option<&str>,
    ) -> Result<ReportMeta, ReportError> {
        let meta = self.repository.update_status(report_id, update).await?;
        let mut info = ReportStatusInfo::new(report_id, meta.status, progress);
        if let Some(message) = message.or(meta.error_message.as_deref()) {
            info = info.with_message(message);
        }
        self.write(&info).await;
        Ok(meta)
    }

    /// Writes an in-phase progress update to the cache only.
    pub async fn progress(&self, info: &ReportStatusInfo) {
        self.write(info).await;
    }

    /// Projection write; cache failures are logged, never fatal.
    pub async fn write(&self, info: &ReportStatusInfo) {
        let key = status_key(&info.report_id);
        match self.cache.set(&key, info, self.ttl).await {
            Ok(()) => debug!(
                report_id = %info.report_id,
                status = %info.status,
                progress = info.progress,
                "Status projection updated"
            ),
            Err(e) => warn!(report_id = %info.report_id, error = %e, "Failed to write status projection"),
        }
    }

    /// Reads the projection, falling back to the durable record and
    /// backfilling the cache from it.
    pub async fn read(&self, report_id: &str) -> Result<ReportStatusInfo, ReportError> {
        let key = status_key(report_id);
        let cached: Result<ReportStatusInfo, _> = self.cache.get(&key).await;
        match cached {
            Ok(info) => return Ok(info),
            Err(e) if e.is_miss() => {}
            Err(e) => warn!(report_id = %report_id, error = %e, "Status cache unavailable, reading durable record"),
        }

        let meta = self.repository.get(report_id).await?;
        let info = ReportStatusInfo::from_meta(&meta);
        self.write(&info).await;
        Ok(info)
    }

    /// Drops the projection.
    pub async fn evict(&self, report_id: &str) {
        if let Err(e) = self.cache.delete(&status_key(report_id)).await {
            warn!(report_id = %report_id, error = %e, "Failed to evict status projection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::repository::MemoryReportRepository;
    use crate::types::{ReportFormat, ReportStatus, ReportType};

    async fn setup() -> (StatusProjection, Arc<MemoryCache>, ReportMeta) {
        let cache = Arc::new(MemoryCache::new());
        let repo = Arc::new(MemoryReportRepository::new());
        let meta = ReportMeta::new(
            ReportType::Fto,
            "alice",
            "alice",
            "FTO",
            ReportFormat::Html,
            ReportStatus::Queued,
        );
        repo.create(&meta).await.unwrap();
        let projection = StatusProjection::new(cache.clone(), repo, Duration::from_secs(60));
        (projection, cache, meta)
    }

    #[tokio::test]
    async fn test_transition_writes_both_stores() {
        let (projection, cache, meta) = setup().await;
        let updated = projection
            .transition(&meta.report_id, &StatusUpdate::new(ReportStatus::Processing), 10, Some("collecting"))
            .await
            .unwrap();
        assert_eq!(updated.status, ReportStatus::Processing);

        let cached: ReportStatusInfo = cache.get(&status_key(&meta.report_id)).await.unwrap();
        assert_eq!(cached.status, ReportStatus::Processing);
        assert_eq!(cached.progress, 10);
        assert_eq!(cached.message.as_deref(), Some("collecting"));
    }

    #[tokio::test]
    async fn test_read_falls_back_and_backfills() {
        let (projection, cache, meta) = setup().await;
        assert!(cache.is_empty());

        let info = projection.read(&meta.report_id).await.unwrap();
        assert_eq!(info.status, ReportStatus::Queued);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_read_unknown_is_not_found() {
        let (projection, _cache, _meta) = setup().await;
        let err = projection.read("missing").await.unwrap_err();
        assert!(matches!(err, ReportError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_illegal_transition_is_invalid_state() {
        let (projection, _cache, meta) = setup().await;
        let err = projection
            .transition(&meta.report_id, &StatusUpdate::new(ReportStatus::Completed), 100, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidState(_)));
    }
}
