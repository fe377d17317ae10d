//! Report generation orchestration.
//!
//! One orchestrator per report family validates its request, estimates the
//! workload and hands a family-specific [`ReportBuilder`] to the shared
//! [`pipeline`]. Small jobs run inline; large ones are queued on the
//! [`TaskDispatcher`] and observed through the status projection.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reportforge::report::{FtoOrchestrator, FtoRequest, ReportServices};
//!
//! let services = Arc::new(ReportServices::connect(config).await?);
//! let fto = FtoOrchestrator::new(services, collaborators);
//! let response = fto
//!     .generate(FtoRequest::new(vec!["CCO".into()], vec!["US".into()], "alice"))
//!     .await?;
//! ```

pub mod aggregate;
pub mod compare;
pub mod context;
pub mod execution;
pub mod fto;
pub mod infringement;
pub mod pipeline;
pub mod portfolio;
pub mod queries;
pub mod retention;
pub mod status;
pub mod tasks;

pub use aggregate::{Collected, ItemFailure, RiskSummary};
pub use compare::{ClaimAnalysis, ClaimComparison};
pub use context::GenerationContext;
pub use execution::{complexity, select_mode, ExecutionPlan};
pub use fto::{FtoCollaborators, FtoFinding, FtoOrchestrator, FtoReportData, FtoRequest};
pub use infringement::{
    AuxDocument, InfringementCollaborators, InfringementOrchestrator, InfringementReportData,
    InfringementRequest, MatrixEntry,
};
pub use pipeline::{
    lock_key, BuiltReport, JobDescriptor, RenderPlugins, ReportBuilder, ReportServices,
};
pub use portfolio::{
    health_inputs, CompetitorStanding, PortfolioCollaborators, PortfolioOrchestrator,
    PortfolioPatent, PortfolioReportData, PortfolioRequest,
};
pub use queries::{ReportQueries, ReportStream};
pub use retention::RetentionEnforcer;
pub use status::{status_key, StatusProjection};
pub use tasks::{cancellation, CancelHandle, CancelToken, TaskDispatcher, TaskHandle, TaskOutcome};
