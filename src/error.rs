//! Error types for report generation.
//!
//! Defines the error taxonomy shared by every subsystem:
//! - Request validation
//! - Conflicts and invalid state (lock held, report not ready)
//! - Missing reports and templates
//! - Deadlines and cancellation
//! - Wrapped infrastructure failures (storage, render, database)

use thiserror::Error;

use crate::cache::CacheError;
use crate::events::EventError;
use crate::lock::LockError;
use crate::repository::RepositoryError;
use crate::storage::StorageError;

/// Coarse classification of a [`ReportError`].
///
/// Callers use this to decide whether to retry and which exit code to emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or missing request fields. Never retried.
    Validation,
    /// Lock already held or report not in the required state. Try later.
    Conflict,
    /// Unknown report or template.
    NotFound,
    /// Deadline exceeded or caller cancelled. May be retried.
    Timeout,
    /// Wrapped collaborator or infrastructure failure.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Timeout => write!(f, "timeout"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

/// Top-level error returned by orchestrators and the query service.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Template error: {0}")]
    Template(#[source] TemplateError),

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("Repository error: {0}")]
    Repository(#[source] RepositoryError),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReportError {
    /// Classifies this error into the coarse taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReportError::Validation(_) => ErrorKind::Validation,
            ReportError::Conflict(_) | ReportError::InvalidState(_) => ErrorKind::Conflict,
            ReportError::NotFound(_) => ErrorKind::NotFound,
            ReportError::Timeout(_) | ReportError::Cancelled(_) => ErrorKind::Timeout,
            ReportError::Template(TemplateError::Invalid { .. }) => ErrorKind::Validation,
            ReportError::Template(_)
            | ReportError::Storage(_)
            | ReportError::Repository(_)
            | ReportError::Lock(_)
            | ReportError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Returns true if the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Conflict | ErrorKind::Timeout)
    }
}

impl From<TemplateError> for ReportError {
    fn from(err: TemplateError) -> Self {
        match err {
            TemplateError::NotFound(id) => ReportError::NotFound(format!("template '{}'", id)),
            TemplateError::DuplicateId(id) => {
                ReportError::Conflict(format!("template '{}' already exists", id))
            }
            other => ReportError::Template(other),
        }
    }
}

impl From<StorageError> for ReportError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ReportError::NotFound(format!("artifact '{}'", key)),
            other => ReportError::Storage(other),
        }
    }
}

impl From<RepositoryError> for ReportError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => ReportError::NotFound(format!("report '{}'", id)),
            RepositoryError::Duplicate(id) => {
                ReportError::Conflict(format!("report '{}' already exists", id))
            }
            err @ RepositoryError::InvalidTransition { .. } => {
                ReportError::InvalidState(err.to_string())
            }
            other => ReportError::Repository(other),
        }
    }
}

impl From<CacheError> for ReportError {
    fn from(err: CacheError) -> Self {
        ReportError::Internal(format!("cache: {}", err))
    }
}

impl From<EventError> for ReportError {
    fn from(err: EventError) -> Self {
        ReportError::Internal(format!("event publisher: {}", err))
    }
}

/// Errors that can occur while registering, compiling or rendering templates.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template '{0}' not found")]
    NotFound(String),

    #[error("Template '{0}' already exists")]
    DuplicateId(String),

    #[error("Invalid template ID '{0}': must be non-empty and contain only alphanumeric characters, hyphens, and underscores")]
    InvalidId(String),

    #[error("Template '{id}' failed validation: {}", .errors.join("; "))]
    Invalid { id: String, errors: Vec<String> },

    #[error("Invalid version '{0}': must follow semantic versioning (e.g., '1.0.0')")]
    InvalidVersion(String),

    #[error("Failed to render template '{id}': {message}")]
    RenderFailed { id: String, message: String },

    #[error("No converter registered for output format {0}")]
    UnsupportedFormat(String),

    #[error("Format conversion to {format} failed: {message}")]
    ConversionFailed { format: String, message: String },

    #[error("Failed to parse template file '{path}': {message}")]
    ParseError { path: String, message: String },

    #[error("Tera error: {0}")]
    Tera(#[from] tera::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors returned by opaque domain collaborators.
///
/// These are item-level failures: the pipeline records and skips them.
#[derive(Debug, Clone, Error)]
pub enum CollaboratorError {
    #[error("{collaborator} rejected input '{input}': {reason}")]
    InvalidInput {
        collaborator: String,
        input: String,
        reason: String,
    },

    #[error("{collaborator} call timed out after {seconds}s")]
    Timeout { collaborator: String, seconds: u64 },

    #[error("{collaborator} unavailable: {message}")]
    Unavailable {
        collaborator: String,
        message: String,
    },

    #[error("{collaborator} failed: {message}")]
    Failed {
        collaborator: String,
        message: String,
    },
}

impl CollaboratorError {
    /// Convenience constructor for a generic failure.
    pub fn failed(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        CollaboratorError::Failed {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for a rejected input.
    pub fn invalid_input(
        collaborator: impl Into<String>,
        input: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        CollaboratorError::InvalidInput {
            collaborator: collaborator.into(),
            input: input.into(),
            reason: reason.into(),
        }
    }
}
