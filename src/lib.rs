//! reportforge: report generation orchestration for patent analytics.
//!
//! This library generates freedom-to-operate, infringement and portfolio
//! reports from opaque domain collaborators, renders them through Tera
//! templates and manages the resulting artifacts.

// Core modules
pub mod analytics;
pub mod cache;
pub mod cli;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod events;
pub mod lock;
pub mod metrics;
pub mod report;
pub mod repository;
pub mod storage;
pub mod template;
pub mod types;

// Re-export commonly used error types
pub use error::{CollaboratorError, ErrorKind, ReportError, TemplateError};
