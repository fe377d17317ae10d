//! In-memory report repository.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{apply_update, ReportRepository, RepositoryError};
use crate::types::{Page, ReportFilter, ReportMeta, ReportPage, ReportType, StatusUpdate};

/// Report metadata kept in a process-local map.
#[derive(Debug, Default)]
pub struct MemoryReportRepository {
    records: RwLock<HashMap<String, ReportMeta>>,
}

impl MemoryReportRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn newest_first(a: &ReportMeta, b: &ReportMeta) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.report_id.cmp(&a.report_id))
}

#[async_trait]
impl ReportRepository for MemoryReportRepository {
    async fn create(&self, meta: &ReportMeta) -> Result<(), RepositoryError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        if records.contains_key(&meta.report_id) {
            return Err(RepositoryError::Duplicate(meta.report_id.clone()));
        }
        records.insert(meta.report_id.clone(), meta.clone());
        Ok(())
    }

    async fn update_status(
        &self,
        report_id: &str,
        update: &StatusUpdate,
    ) -> Result<ReportMeta, RepositoryError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let current = records
            .get(report_id)
            .ok_or_else(|| RepositoryError::NotFound(report_id.to_string()))?;
        let next = apply_update(current, update)?;
        records.insert(report_id.to_string(), next.clone());
        Ok(next)
    }

    async fn get(&self, report_id: &str) -> Result<ReportMeta, RepositoryError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        records
            .get(report_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(report_id.to_string()))
    }

    async fn list(
        &self,
        filter: &ReportFilter,
        page: Page,
    ) -> Result<ReportPage, RepositoryError> {
        let records = self.records.read().unwrap_or_else(|e| e.into_inner());
        let mut matching: Vec<&ReportMeta> =
            records.values().filter(|m| filter.matches(m)).collect();
        matching.sort_by(|a, b| newest_first(a, b));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.size as usize)
            .cloned()
            .collect();

        Ok(ReportPage {
            items,
            total,
            page: page.number,
            page_size: page.size,
        })
    }

    async fn delete(&self, report_id: &str) -> Result<(), RepositoryError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        records
            .remove(report_id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(report_id.to_string()))
    }

    async fn enforce_retention_policy(
        &self,
        owner_id: &str,
        report_type: ReportType,
        keep: usize,
    ) -> Result<Vec<ReportMeta>, RepositoryError> {
        let mut records = self.records.write().unwrap_or_else(|e| e.into_inner());
        let mut finished: Vec<&ReportMeta> = records
            .values()
            .filter(|m| {
                m.owner_id == owner_id && m.report_type == report_type && m.status.is_terminal()
            })
            .collect();
        finished.sort_by(|a, b| newest_first(a, b));

        let expired: Vec<String> = finished
            .into_iter()
            .skip(keep)
            .map(|m| m.report_id.clone())
            .collect();

        Ok(expired
            .iter()
            .filter_map(|id| records.remove(id))
            .collect())
    }
}
