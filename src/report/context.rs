//! Per-generation execution context.
//!
//! Every collaborator call made by a report builder goes through
//! [`GenerationContext::call`], which races the call against the caller's
//! cancellation token, the per-call timeout and the generation deadline.
//! A per-call timeout is an item failure; deadline expiry and cancellation
//! abort the generation.

use std::future::Future;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{timeout_at, Instant};
use tracing::warn;

use super::aggregate::Collected;
use super::status::StatusProjection;
use super::tasks::CancelToken;
use crate::error::{CollaboratorError, ReportError};
use crate::metrics::MetricsCollector;
use crate::types::{ReportStatus, ReportStatusInfo, ReportType};

pub struct GenerationContext {
    report_id: String,
    report_type: ReportType,
    deadline: Instant,
    cancel: CancelToken,
    call_timeout: Duration,
    max_concurrent_calls: usize,
    min_successful_items: usize,
    status: StatusProjection,
    metrics: MetricsCollector,
}

impl GenerationContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        report_id: impl Into<String>,
        report_type: ReportType,
        deadline: Instant,
        cancel: CancelToken,
        call_timeout: Duration,
        max_concurrent_calls: usize,
        min_successful_items: usize,
        status: StatusProjection,
        metrics: MetricsCollector,
    ) -> Self {
        Self {
            report_id: report_id.into(),
            report_type,
            deadline,
            cancel,
            call_timeout,
            max_concurrent_calls: max_concurrent_calls.max(1),
            min_successful_items,
            status,
            metrics,
        }
    }

    pub fn report_id(&self) -> &str {
        &self.report_id
    }

    pub fn report_type(&self) -> ReportType {
        self.report_type
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Successes required in a mandatory category.
    pub fn min_successful_items(&self) -> usize {
        self.min_successful_items
    }

    /// Fails if the caller cancelled or the deadline passed.
    pub fn checkpoint(&self) -> Result<(), ReportError> {
        if self.cancel.is_cancelled() {
            return Err(ReportError::Cancelled(format!(
                "generation of report '{}' was cancelled",
                self.report_id
            )));
        }
        if Instant::now() >= self.deadline {
            return Err(self.deadline_exceeded());
        }
        Ok(())
    }

    fn deadline_exceeded(&self) -> ReportError {
        ReportError::Timeout(format!(
            "generation deadline exceeded for report '{}'",
            self.report_id
        ))
    }

    /// Runs one collaborator call.
    ///
    /// The outer `Result` aborts the generation; the inner one is the
    /// item-level outcome.
    pub async fn call<T, F>(
        &self,
        collaborator: &str,
        call: F,
    ) -> Result<Result<T, CollaboratorError>, ReportError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        self.checkpoint()?;
        let call_deadline = (Instant::now() + self.call_timeout).min(self.deadline);

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReportError::Cancelled(format!(
                "generation of report '{}' was cancelled during {}",
                self.report_id, collaborator
            ))),
            outcome = timeout_at(call_deadline, call) => match outcome {
                Ok(result) => Ok(result),
                Err(_) if Instant::now() >= self.deadline => Err(self.deadline_exceeded()),
                Err(_) => Ok(Err(CollaboratorError::Timeout {
                    collaborator: collaborator.to_string(),
                    seconds: self.call_timeout.as_secs(),
                })),
            },
        }
    }

    /// Runs a fatal phase (render, store) under cancellation and the deadline.
    pub async fn bounded<T, E, F>(&self, phase: &str, work: F) -> Result<T, ReportError>
    where
        F: Future<Output = Result<T, E>>,
        ReportError: From<E>,
    {
        self.checkpoint()?;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ReportError::Cancelled(format!(
                "generation of report '{}' was cancelled during {}",
                self.report_id, phase
            ))),
            outcome = timeout_at(self.deadline, work) => match outcome {
                Ok(result) => result.map_err(ReportError::from),
                Err(_) => Err(self.deadline_exceeded()),
            },
        }
    }

    /// Runs `fetch` for every labelled item with bounded concurrency.
    ///
    /// Results keep input order. Item failures are logged, counted and
    /// returned in [`Collected::failures`].
    pub async fn collect<I, T, F, Fut>(
        &self,
        category: &str,
        items: Vec<(String, I)>,
        fetch: F,
    ) -> Result<Collected<T>, ReportError>
    where
        F: Fn(I) -> Fut,
        Fut: Future<Output = Result<T, CollaboratorError>>,
    {
        let outcomes: Vec<(String, Result<Result<T, CollaboratorError>, ReportError>)> =
            stream::iter(items)
                .map(|(label, item)| {
                    let call = fetch(item);
                    async move {
                        let outcome = self.call(category, call).await;
                        (label, outcome)
                    }
                })
                .buffered(self.max_concurrent_calls)
                .collect()
                .await;

        let mut collected = Collected::new(category);
        for (label, outcome) in outcomes {
            let outcome = outcome?;
            if let Err(e) = &outcome {
                warn!(
                    report_id = %self.report_id,
                    category = %category,
                    item = %label,
                    error = %e,
                    "Item failed, skipping"
                );
                self.metrics.record_item_failure(self.report_type, category);
            }
            collected.record(label, outcome);
        }
        Ok(collected)
    }

    /// Publishes in-phase progress to the status projection.
    pub async fn progress(&self, percent: u8, message: &str) {
        let info = ReportStatusInfo::new(&self.report_id, ReportStatus::Processing, percent)
            .with_message(message);
        self.status.progress(&info).await;
    }
}
