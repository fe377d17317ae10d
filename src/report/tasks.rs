//! Detached generation tasks.
//!
//! Every asynchronous generation gets a [`TaskHandle`] carrying its id, a
//! cancellation handle and a completion receiver. Running tasks are also
//! tracked by report id so a later caller can cancel or await them; the
//! entry is dropped as soon as the task finishes.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{watch, Semaphore};
use tracing::{debug, warn};

use crate::error::ReportError;
use crate::types::ReportStatus;

/// Cooperative cancellation signal observed by a generation.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

/// Triggers the paired [`CancelToken`]s.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

/// Creates a connected handle/token pair.
pub fn cancellation() -> (CancelHandle, CancelToken) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx: Arc::new(tx) }, CancelToken { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelToken {
    /// A token that is never cancelled.
    pub fn never() -> Self {
        let (_handle, token) = cancellation();
        token
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    ///
    /// Pending forever if every handle was dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Terminal outcome of a detached generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub report_id: String,
    pub status: ReportStatus,
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn from_result<T>(report_id: &str, result: &Result<T, ReportError>) -> Self {
        match result {
            Ok(_) => Self {
                report_id: report_id.to_string(),
                status: ReportStatus::Completed,
                error: None,
            },
            Err(e) => Self {
                report_id: report_id.to_string(),
                status: ReportStatus::Failed,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Finished outcomes kept for late [`TaskDispatcher::wait`] calls.
pub const FINISHED_OUTCOMES_KEPT: usize = 256;

type Completion = watch::Receiver<Option<TaskOutcome>>;

/// Handle to one detached generation.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub id: String,
    pub cancel: CancelHandle,
    completion: Completion,
}

impl TaskHandle {
    /// Waits for the task to finish.
    pub async fn wait(mut self) -> Result<TaskOutcome, ReportError> {
        let outcome = self
            .completion
            .wait_for(Option::is_some)
            .await
            .map(|outcome| outcome.clone())
            .ok()
            .flatten();
        outcome.ok_or_else(|| {
            ReportError::Internal(format!("task '{}' ended without an outcome", self.id))
        })
    }
}

#[derive(Debug, Default)]
struct Registry {
    running: HashMap<String, TaskHandle>,
    finished: VecDeque<TaskOutcome>,
}

impl Registry {
    fn finish(&mut self, outcome: &TaskOutcome) {
        self.running.remove(&outcome.report_id);
        self.finished.push_back(outcome.clone());
        while self.finished.len() > FINISHED_OUTCOMES_KEPT {
            self.finished.pop_front();
        }
    }
}

/// Spawns detached generations under a concurrency bound.
///
/// Running tasks are tracked by id until they finish; afterwards only their
/// outcome is kept, and only for the most recent [`FINISHED_OUTCOMES_KEPT`].
#[derive(Debug)]
pub struct TaskDispatcher {
    permits: Arc<Semaphore>,
    registry: Arc<Mutex<Registry>>,
}

impl TaskDispatcher {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Spawns `make(token)` onto the runtime and returns its handle.
    ///
    /// The task waits for a permit before running; a task cancelled while
    /// waiting still runs `make` so it can record its own terminal status.
    pub fn spawn<F, Fut, T>(&self, id: impl Into<String>, make: F) -> TaskHandle
    where
        F: FnOnce(CancelToken) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, ReportError>> + Send + 'static,
        T: Send + 'static,
    {
        let id = id.into();
        let (cancel, token) = cancellation();
        let (done_tx, done_rx) = watch::channel(None);
        let handle = TaskHandle {
            id: id.clone(),
            cancel,
            completion: done_rx,
        };
        self.registry().running.insert(id.clone(), handle.clone());

        let permits = Arc::clone(&self.permits);
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.ok();
            debug!(report_id = %id, "Detached generation started");
            let result = make(token).await;
            let outcome = TaskOutcome::from_result(&id, &result);
            if let Err(e) = &result {
                warn!(report_id = %id, error = %e, "Detached generation failed");
            }
            registry
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .finish(&outcome);
            done_tx.send_replace(Some(outcome));
        });

        handle
    }

    /// Requests cancellation of a running task. Returns false if unknown or
    /// already finished.
    pub fn cancel(&self, id: &str) -> bool {
        match self.registry().running.get(id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Handle of a running task.
    pub fn handle(&self, id: &str) -> Option<TaskHandle> {
        self.registry().running.get(id).cloned()
    }

    /// Waits for task `id` to finish.
    ///
    /// Also answers for recently finished tasks; `NotFound` for ids that
    /// were never spawned or whose outcome has been rotated out.
    pub async fn wait(&self, id: &str) -> Result<TaskOutcome, ReportError> {
        let handle = {
            let registry = self.registry();
            if let Some(handle) = registry.running.get(id) {
                handle.clone()
            } else if let Some(outcome) = registry.finished.iter().rev().find(|o| o.report_id == id) {
                return Ok(outcome.clone());
            } else {
                return Err(ReportError::NotFound(format!("task '{}'", id)));
            }
        };
        handle.wait().await
    }

    /// True while task `id` is running.
    pub fn contains(&self, id: &str) -> bool {
        self.registry().running.contains_key(id)
    }

    /// Number of running tasks.
    pub fn len(&self) -> usize {
        self.registry().running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_outcome() {
        let dispatcher = TaskDispatcher::new(2);
        dispatcher.spawn("r1", |_token| async { Ok::<_, ReportError>(()) });
        dispatcher.spawn("r2", |_token| async {
            Err::<(), _>(ReportError::Internal("storage down".into()))
        });

        let ok = dispatcher.wait("r1").await.unwrap();
        assert_eq!(ok.status, ReportStatus::Completed);

        let failed = dispatcher.wait("r2").await.unwrap();
        assert_eq!(failed.status, ReportStatus::Failed);
        assert!(failed.error.unwrap().contains("storage down"));
        assert!(dispatcher.is_empty());

        // Finished outcomes stay answerable.
        assert_eq!(dispatcher.wait("r1").await.unwrap().status, ReportStatus::Completed);
    }

    #[tokio::test]
    async fn test_finished_tasks_leave_the_registry() {
        let dispatcher = TaskDispatcher::new(2);
        let handles: Vec<TaskHandle> = (0..5)
            .map(|i| dispatcher.spawn(format!("r{}", i), |_token| async { Ok::<_, ReportError>(()) }))
            .collect();
        assert_eq!(dispatcher.len(), 5);

        for handle in handles {
            assert_eq!(handle.wait().await.unwrap().status, ReportStatus::Completed);
        }
        assert!(dispatcher.is_empty());
        assert!(!dispatcher.contains("r0"));
        assert!(!dispatcher.cancel("r0"));
    }

    #[tokio::test]
    async fn test_finished_outcomes_are_bounded() {
        let dispatcher = TaskDispatcher::new(4);
        let mut last: Option<TaskHandle> = None;
        for i in 0..FINISHED_OUTCOMES_KEPT + 10 {
            last = Some(dispatcher.spawn(format!("r{}", i), |_token| async {
                Ok::<_, ReportError>(())
            }));
        }
        if let Some(handle) = last {
            handle.wait().await.unwrap();
        }
        while !dispatcher.is_empty() {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            dispatcher.wait("r0").await.unwrap_err(),
            ReportError::NotFound(_)
        ));
        let newest = format!("r{}", FINISHED_OUTCOMES_KEPT + 9);
        assert!(dispatcher.wait(&newest).await.is_ok());
    }

    #[tokio::test]
    async fn test_cancel_reaches_token() {
        let dispatcher = TaskDispatcher::new(1);
        dispatcher.spawn("r1", |token| async move {
            tokio::select! {
                _ = token.cancelled() => Err(ReportError::Cancelled("caller".into())),
                _ = tokio::time::sleep(Duration::from_secs(30)) => Ok(()),
            }
        });

        assert!(dispatcher.cancel("r1"));
        assert!(!dispatcher.cancel("unknown"));
        let outcome = dispatcher.wait("r1").await.unwrap();
        assert_eq!(outcome.status, ReportStatus::Failed);
    }

    #[tokio::test]
    async fn test_wait_unknown_is_not_found() {
        let dispatcher = TaskDispatcher::new(1);
        assert!(matches!(
            dispatcher.wait("nope").await.unwrap_err(),
            ReportError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_never_token_stays_pending() {
        let token = CancelToken::never();
        assert!(!token.is_cancelled());
        let waited = tokio::time::timeout(Duration::from_millis(20), token.cancelled()).await;
        assert!(waited.is_err());
    }
}
