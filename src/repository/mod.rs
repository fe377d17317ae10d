//! Durable report metadata store.
//!
//! The repository holds the authoritative [`ReportMeta`] record for every
//! report. Only the orchestrator that owns a generation mutates it, through
//! [`ReportRepository::update_status`]; readers never write.
//!
//! # Backends
//!
//! - [`PgReportRepository`]: PostgreSQL via sqlx, schema applied by [`MigrationRunner`]
//! - [`MemoryReportRepository`]: in-process store for tests and embedding

pub mod memory;
pub mod migrations;
pub mod postgres;
pub mod schema;

pub use memory::MemoryReportRepository;
pub use migrations::{AppliedMigration, MigrationError, MigrationRunner};
pub use postgres::PgReportRepository;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{
    Page, ReportFilter, ReportMeta, ReportPage, ReportStatus, ReportType, StatusUpdate,
};

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Record not found.
    #[error("Report not found: {0}")]
    NotFound(String),

    /// A record with this id already exists.
    #[error("Report already exists: {0}")]
    Duplicate(String),

    /// The requested status change is not a legal transition.
    #[error("Illegal status transition for report {report_id}: {from} -> {to}")]
    InvalidTransition {
        report_id: String,
        from: ReportStatus,
        to: ReportStatus,
    },

    /// A stored row could not be decoded.
    #[error("Corrupt record {report_id}: {message}")]
    Corrupt { report_id: String, message: String },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Report metadata persistence.
#[async_trait]
pub trait ReportRepository: Send + Sync {
    /// Inserts a new record. Fails with `Duplicate` if the id exists.
    async fn create(&self, meta: &ReportMeta) -> Result<(), RepositoryError>;

    /// Applies a status change, enforcing the status state machine.
    ///
    /// Returns the updated record.
    async fn update_status(
        &self,
        report_id: &str,
        update: &StatusUpdate,
    ) -> Result<ReportMeta, RepositoryError>;

    /// Loads a record. Fails with `NotFound` if absent.
    async fn get(&self, report_id: &str) -> Result<ReportMeta, RepositoryError>;

    /// Lists records matching `filter`, newest first.
    async fn list(&self, filter: &ReportFilter, page: Page)
        -> Result<ReportPage, RepositoryError>;

    /// Deletes a record. Fails with `NotFound` if absent.
    async fn delete(&self, report_id: &str) -> Result<(), RepositoryError>;

    /// Keeps the newest `keep` finished reports of `report_type` for
    /// `owner_id` and deletes the rest.
    ///
    /// In-flight reports (`Queued`, `Processing`) are never removed and do
    /// not count towards `keep`. Returns the deleted records so the caller
    /// can remove their artifacts.
    async fn enforce_retention_policy(
        &self,
        owner_id: &str,
        report_type: ReportType,
        keep: usize,
    ) -> Result<Vec<ReportMeta>, RepositoryError>;
}

/// Validates `update` against `current` and returns the new record.
pub(crate) fn apply_update(
    current: &ReportMeta,
    update: &StatusUpdate,
) -> Result<ReportMeta, RepositoryError> {
    if !current.status.can_transition_to(update.status) {
        return Err(RepositoryError::InvalidTransition {
            report_id: current.report_id.clone(),
            from: current.status,
            to: update.status,
        });
    }
    let mut next = current.clone();
    update.apply(&mut next);
    Ok(next)
}
