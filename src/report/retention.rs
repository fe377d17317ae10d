//! Post-generation housekeeping.

use std::sync::Arc;

use tracing::{info, warn};

use super::status::StatusProjection;
use crate::error::ReportError;
use crate::repository::ReportRepository;
use crate::storage::{artifact_key, ObjectStorage, StorageError};
use crate::types::{ReportFormat, ReportMeta, ReportType};

/// Storage keys of every artifact `meta` may own.
///
/// Uses the recorded export URLs; falls back to every format's key for
/// records that never completed.
pub fn artifact_keys(meta: &ReportMeta) -> Vec<String> {
    if meta.export_urls.is_empty() {
        ReportFormat::ALL
            .into_iter()
            .map(|format| artifact_key(meta.report_type, &meta.report_id, format))
            .collect()
    } else {
        meta.export_urls.values().cloned().collect()
    }
}

/// Deletes every artifact of `meta`. Missing objects are not an error.
pub async fn delete_artifacts(
    storage: &dyn ObjectStorage,
    meta: &ReportMeta,
) -> Result<(), StorageError> {
    for key in artifact_keys(meta) {
        storage.delete(&key).await?;
    }
    Ok(())
}

/// Trims old reports per owning entity to a fixed count.
#[derive(Clone)]
pub struct RetentionEnforcer {
    repository: Arc<dyn ReportRepository>,
    storage: Arc<dyn ObjectStorage>,
    status: StatusProjection,
}

impl RetentionEnforcer {
    pub fn new(
        repository: Arc<dyn ReportRepository>,
        storage: Arc<dyn ObjectStorage>,
        status: StatusProjection,
    ) -> Self {
        Self {
            repository,
            storage,
            status,
        }
    }

    /// Keeps the newest `keep` finished reports of `report_type` owned by
    /// `owner_id`; removes the others with their artifacts and status
    /// entries. Returns the number of reports removed.
    pub async fn enforce(
        &self,
        owner_id: &str,
        report_type: ReportType,
        keep: usize,
    ) -> Result<usize, ReportError> {
        let removed = self
            .repository
            .enforce_retention_policy(owner_id, report_type, keep)
            .await?;

        for meta in &removed {
            if let Err(e) = delete_artifacts(self.storage.as_ref(), meta).await {
                warn!(report_id = %meta.report_id, error = %e, "Failed to delete expired artifact");
            }
            self.status.evict(&meta.report_id).await;
        }

        if !removed.is_empty() {
            info!(
                owner_id = %owner_id,
                report_type = %report_type,
                removed = removed.len(),
                keep,
                "Retention policy enforced"
            );
        }
        Ok(removed.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use crate::cache::MemoryCache;
    use crate::repository::MemoryReportRepository;
    use crate::storage::MemoryObjectStorage;
    use crate::types::{ReportRollup, ReportStatus, StatusUpdate};

    async fn completed(
        repository: &MemoryReportRepository,
        storage: &MemoryObjectStorage,
        owner: &str,
    ) -> ReportMeta {
        let meta = ReportMeta::new(
            ReportType::Fto,
            owner,
            owner,
            "t",
            ReportFormat::Html,
            ReportStatus::Processing,
        );
        repository.create(&meta).await.unwrap();
        let key = artifact_key(ReportType::Fto, &meta.report_id, ReportFormat::Html);
        storage
            .save(&key, b"<html></html>".to_vec(), "text/html")
            .await
            .unwrap();
        let mut urls = BTreeMap::new();
        urls.insert(ReportFormat::Html, key);
        repository
            .update_status(
                &meta.report_id,
                &StatusUpdate::completed(ReportRollup::default(), urls),
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_artifact_keys_fallback() {
        let meta = ReportMeta::new(
            ReportType::Portfolio,
            "pf",
            "u",
            "t",
            ReportFormat::Pdf,
            ReportStatus::Queued,
        );
        let keys = artifact_keys(&meta);
        assert_eq!(keys.len(), ReportFormat::ALL.len());
        assert!(keys[0].starts_with("reports/portfolio/"));
    }

    #[tokio::test]
    async fn test_enforce_removes_oldest_with_artifacts() {
        let repository = Arc::new(MemoryReportRepository::new());
        let storage = Arc::new(MemoryObjectStorage::new());
        let cache = Arc::new(MemoryCache::new());

        let mut reports = Vec::new();
        for _ in 0..3 {
            reports.push(completed(&repository, &storage, "alice").await);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let status = StatusProjection::new(cache, repository.clone(), Duration::from_secs(60));
        let enforcer = RetentionEnforcer::new(repository.clone(), storage.clone(), status);
        assert_eq!(enforcer.enforce("alice", ReportType::Fto, 2).await.unwrap(), 1);

        let oldest = &reports[0];
        assert!(repository.get(&oldest.report_id).await.is_err());
        for key in artifact_keys(oldest) {
            assert!(!storage.exists(&key).await.unwrap());
        }
        assert!(repository.get(&reports[2].report_id).await.is_ok());
    }
}
