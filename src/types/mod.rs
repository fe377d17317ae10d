//! Shared report DTOs and closed enumerations.

pub mod enums;
pub mod meta;

pub use enums::{
    AnalysisDepth, AnalysisMode, Dimension, Language, ReportFormat, ReportStatus, ReportType,
    RiskLevel,
};
pub use meta::{
    ExecutionMode, GenerateResponse, Page, ReportFilter, ReportMeta, ReportPage, ReportRollup,
    ReportStatusInfo, StatusUpdate, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
