//! Report metadata, status projection and listing types.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ReportFormat, ReportStatus, ReportType, RiskLevel};

/// Maximum page size accepted by listing operations.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Default page size for listing operations.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Domain rollup counters recorded on completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRollup {
    /// Number of comparison rows per risk level.
    #[serde(default)]
    pub risk_counts: BTreeMap<RiskLevel, u32>,
    /// Highest risk observed across the comparison matrix.
    #[serde(default)]
    pub overall_risk: Option<RiskLevel>,
    /// Number of entities analysed successfully.
    pub items_analyzed: u32,
    /// Number of entities skipped because a collaborator failed.
    pub items_failed: u32,
    /// Family-specific scalar scores (health, gini, competitiveness...).
    #[serde(default)]
    pub scores: BTreeMap<String, f64>,
}

impl ReportRollup {
    /// Count of rows at or above `level`.
    pub fn count_at_least(&self, level: RiskLevel) -> u32 {
        self.risk_counts
            .iter()
            .filter(|(l, _)| **l >= level)
            .map(|(_, c)| *c)
            .sum()
    }
}

/// Durable report record.
///
/// Created when a generation starts and mutated only by the orchestrator
/// that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMeta {
    pub report_id: String,
    /// Entity whose reports are subject to retention (requester or portfolio).
    pub owner_id: String,
    pub report_type: ReportType,
    pub status: ReportStatus,
    pub title: String,
    pub format: ReportFormat,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// Artifact key per persisted format.
    #[serde(default)]
    pub export_urls: BTreeMap<ReportFormat, String>,
    #[serde(default)]
    pub rollup: ReportRollup,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl ReportMeta {
    /// Creates a new record with a generated id.
    pub fn new(
        report_type: ReportType,
        owner_id: impl Into<String>,
        requested_by: impl Into<String>,
        title: impl Into<String>,
        format: ReportFormat,
        status: ReportStatus,
    ) -> Self {
        Self {
            report_id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            report_type,
            status,
            title: title.into(),
            format,
            requested_by: requested_by.into(),
            created_at: Utc::now(),
            completed_at: None,
            export_urls: BTreeMap::new(),
            rollup: ReportRollup::default(),
            error_message: None,
        }
    }
}

/// A status change written to the durable store.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: ReportStatus,
    pub rollup: Option<ReportRollup>,
    pub export_urls: Option<BTreeMap<ReportFormat, String>>,
    pub error_message: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl StatusUpdate {
    pub fn new(status: ReportStatus) -> Self {
        Self {
            status,
            rollup: None,
            export_urls: None,
            error_message: None,
            completed_at: None,
        }
    }

    pub fn completed(rollup: ReportRollup, export_urls: BTreeMap<ReportFormat, String>) -> Self {
        Self {
            status: ReportStatus::Completed,
            rollup: Some(rollup),
            export_urls: Some(export_urls),
            error_message: None,
            completed_at: Some(Utc::now()),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Failed,
            rollup: None,
            export_urls: None,
            error_message: Some(message.into()),
            completed_at: Some(Utc::now()),
        }
    }

    /// Applies this update to a record in place.
    pub fn apply(&self, meta: &mut ReportMeta) {
        meta.status = self.status;
        if let Some(rollup) = &self.rollup {
            meta.rollup = rollup.clone();
        }
        if let Some(urls) = &self.export_urls {
            meta.export_urls = urls.clone();
        }
        if self.error_message.is_some() {
            meta.error_message = self.error_message.clone();
        }
        if self.completed_at.is_some() {
            meta.completed_at = self.completed_at;
        }
    }
}

/// Ephemeral status projection served to pollers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStatusInfo {
    pub report_id: String,
    pub status: ReportStatus,
    /// Progress percentage in `0..=100`.
    pub progress: u8,
    #[serde(default)]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl ReportStatusInfo {
    pub fn new(report_id: impl Into<String>, status: ReportStatus, progress: u8) -> Self {
        Self {
            report_id: report_id.into(),
            status,
            progress: progress.min(100),
            message: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Derives a projection from the durable record.
    pub fn from_meta(meta: &ReportMeta) -> Self {
        let progress = match meta.status {
            ReportStatus::Queued => 0,
            ReportStatus::Processing => 50,
            ReportStatus::Completed | ReportStatus::Failed => 100,
        };
        Self {
            report_id: meta.report_id.clone(),
            status: meta.status,
            progress,
            message: meta.error_message.clone(),
            updated_at: meta.completed_at.unwrap_or(meta.created_at),
        }
    }
}

/// Filter for listing reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportFilter {
    pub owner_id: Option<String>,
    pub report_type: Option<ReportType>,
    pub status: Option<ReportStatus>,
}

impl ReportFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_type(mut self, report_type: ReportType) -> Self {
        self.report_type = Some(report_type);
        self
    }

    pub fn with_status(mut self, status: ReportStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn matches(&self, meta: &ReportMeta) -> bool {
        self.owner_id.as_ref().map_or(true, |o| *o == meta.owner_id)
            && self.report_type.map_or(true, |t| t == meta.report_type)
            && self.status.map_or(true, |s| s == meta.status)
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub number: u32,
    pub size: u32,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Page {
    /// Creates a page, clamping out-of-range values.
    pub fn new(number: u32, size: u32) -> Self {
        Self {
            number: number.max(1),
            size: size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.number - 1) * u64::from(self.size)
    }
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportPage {
    pub items: Vec<ReportMeta>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

/// How a generation was executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Sync,
    Async,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sync => "sync",
            ExecutionMode::Async => "async",
        }
    }
}

impl std::fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Acknowledgement returned by `generate`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerateResponse {
    pub report_id: String,
    pub status: ReportStatus,
    pub mode: ExecutionMode,
    pub complexity: u64,
    /// Only set for queued generations.
    pub estimated_duration: Option<Duration>,
    /// Rollup of a synchronously completed generation.
    pub rollup: Option<ReportRollup>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::enums::RiskLevel;

    fn sample_meta() -> ReportMeta {
        ReportMeta::new(
            ReportType::Portfolio,
            "pf-1",
            "alice",
            "Portfolio review",
            ReportFormat::Pdf,
            ReportStatus::Queued,
        )
    }

    #[test]
    fn test_status_update_apply() {
        let mut meta = sample_meta();
        let mut urls = BTreeMap::new();
        urls.insert(ReportFormat::Pdf, "reports/portfolio/x.PDF".to_string());
        StatusUpdate::completed(ReportRollup::default(), urls).apply(&mut meta);

        assert_eq!(meta.status, ReportStatus::Completed);
        assert!(meta.completed_at.is_some());
        assert!(meta.export_urls.contains_key(&ReportFormat::Pdf));
    }

    #[test]
    fn test_filter_matches() {
        let meta = sample_meta();
        assert!(ReportFilter::new().matches(&meta));
        assert!(ReportFilter::new().with_owner("pf-1").matches(&meta));
        assert!(!ReportFilter::new().with_type(ReportType::Fto).matches(&meta));
        assert!(!ReportFilter::new()
            .with_status(ReportStatus::Completed)
            .matches(&meta));
    }

    #[test]
    fn test_page_clamps() {
        let page = Page::new(0, 1000);
        assert_eq!(page.number, 1);
        assert_eq!(page.size, MAX_PAGE_SIZE);
        assert_eq!(Page::new(3, 10).offset(), 20);
    }

    #[test]
    fn test_rollup_count_at_least() {
        let mut rollup = ReportRollup::default();
        rollup.risk_counts.insert(RiskLevel::Low, 4);
        rollup.risk_counts.insert(RiskLevel::High, 2);
        rollup.risk_counts.insert(RiskLevel::Critical, 1);
        assert_eq!(rollup.count_at_least(RiskLevel::High), 3);
        assert_eq!(rollup.count_at_least(RiskLevel::Negligible), 7);
    }

    #[test]
    fn test_status_info_from_meta() {
        let meta = sample_meta();
        let info = ReportStatusInfo::from_meta(&meta);
        assert_eq!(info.status, ReportStatus::Queued);
        assert_eq!(info.progress, 0);
    }
}
