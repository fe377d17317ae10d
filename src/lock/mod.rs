//! Single-flight distributed locking.
//!
//! At most one generation may run per target. The orchestrator acquires a
//! TTL-bounded lock keyed by the target before collecting any data and
//! releases it on every exit path:
//!
//! - normal completion and error returns release inline through [`with_lock`]
//! - panics inside the guarded future are caught, released, and reported
//! - if the guarded future itself is dropped mid-flight, [`LockGuard`]'s
//!   `Drop` spawns the release onto the runtime
//!
//! Every acquire hands out a [`LockToken`]; extend and release are
//! compare-and-set on that token. While the guarded work runs the TTL is
//! renewed, so the TTL only bounds how long a crashed process can block a
//! target.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryLock;
pub use self::redis::RedisLock;

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::ReportError;

/// Errors that can occur while talking to the lock backend.
#[derive(Debug, Error)]
pub enum LockError {
    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Failed to connect to the backend.
    #[error("Lock backend connection failed: {0}")]
    ConnectionFailed(String),
}

/// Proof of one successful acquire.
///
/// Extending and releasing require the token, so a holder whose TTL lapsed
/// can never touch a lock that has since been taken by someone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cross-process mutual exclusion keyed by string.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Attempts to take the lock without waiting.
    ///
    /// Returns `Ok(None)` when another holder owns an unexpired lock.
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError>;

    /// Pushes the expiry of a lock still held under `token` to `ttl` from
    /// now. Returns false if the lock expired or belongs to another holder.
    async fn extend(&self, key: &str, token: &LockToken, ttl: Duration)
        -> Result<bool, LockError>;

    /// Releases the lock if it is still held under `token`. Returns false
    /// (and leaves the lock alone) otherwise.
    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, LockError>;
}

/// Holds an acquired lock and releases it when dropped.
pub struct LockGuard {
    lock: Arc<dyn DistributedLock>,
    key: String,
    token: LockToken,
    released: bool,
}

impl LockGuard {
    /// Tries to acquire `key`; `Ok(None)` if it is already held.
    pub async fn acquire(
        lock: Arc<dyn DistributedLock>,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<Self>, LockError> {
        match lock.acquire(key, ttl).await? {
            Some(token) => {
                debug!(lock_key = %key, ttl_ms = ttl.as_millis() as u64, "Lock acquired");
                Ok(Some(Self {
                    lock,
                    key: key.to_string(),
                    token,
                    released: false,
                }))
            }
            None => Ok(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &LockToken {
        &self.token
    }

    /// Renews the TTL every third of `ttl` until the lock is lost.
    ///
    /// Backend errors are logged and retried on the next tick; the lock is
    /// only considered lost when the backend says it is no longer ours.
    pub async fn keep_alive(&self, ttl: Duration) {
        let period = (ttl / 3).max(Duration::from_millis(1));
        loop {
            tokio::time::sleep(period).await;
            match self.lock.extend(&self.key, &self.token, ttl).await {
                Ok(true) => {}
                Ok(false) => {
                    warn!(lock_key = %self.key, "Lock lost before the guarded work finished");
                    return;
                }
                Err(e) => warn!(lock_key = %self.key, error = %e, "Failed to extend lock"),
            }
        }
    }

    /// Releases the lock now.
    pub async fn release(mut self) {
        self.released = true;
        match self.lock.release(&self.key, &self.token).await {
            Ok(true) => debug!(lock_key = %self.key, "Lock released"),
            Ok(false) => debug!(lock_key = %self.key, "Lock already expired or taken over"),
            Err(e) => warn!(lock_key = %self.key, error = %e, "Failed to release lock"),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let lock = Arc::clone(&self.lock);
        let key = std::mem::take(&mut self.key);
        let token = self.token.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.release(&key, &token).await {
                        warn!(lock_key = %key, error = %e, "Failed to release dropped lock");
                    }
                });
            }
            Err(_) => {
                warn!(lock_key = %key, "Lock guard dropped outside a runtime; relying on TTL expiry");
            }
        }
    }
}

/// Runs `work` while holding `key`.
///
/// Fails fast with [`ReportError::Conflict`] if the lock is already held.
/// The TTL is renewed while `work` runs; if the lock is lost anyway,
/// `work` is dropped and the result is a `Conflict`. The lock is released
/// whether `work` succeeds, fails or panics.
pub async fn with_lock<F, T>(
    lock: Arc<dyn DistributedLock>,
    key: &str,
    ttl: Duration,
    work: F,
) -> Result<T, ReportError>
where
    F: Future<Output = Result<T, ReportError>>,
{
    let guard = LockGuard::acquire(lock, key, ttl).await?.ok_or_else(|| {
        ReportError::Conflict(format!(
            "a report generation for '{}' is currently running",
            key
        ))
    })?;

    let work = AssertUnwindSafe(work).catch_unwind();
    tokio::pin!(work);
    let outcome = tokio::select! {
        outcome = &mut work => Some(outcome),
        _ = guard.keep_alive(ttl) => None,
    };
    guard.release().await;

    match outcome {
        Some(Ok(result)) => result,
        Some(Err(panic)) => Err(ReportError::Internal(format!(
            "generation panicked: {}",
            panic_message(&panic)
        ))),
        None => Err(ReportError::Conflict(format!(
            "lock '{}' expired while the generation was running",
            key
        ))),
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn memory_lock() -> Arc<dyn DistributedLock> {
        Arc::new(MemoryLock::new())
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_success() {
        let lock = memory_lock();
        let value = with_lock(Arc::clone(&lock), "k", Duration::from_secs(60), async {
            Ok::<_, ReportError>(7)
        })
        .await
        .unwrap();
        assert_eq!(value, 7);
        assert!(lock.acquire("k", Duration::from_secs(60)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_error() {
        let lock = memory_lock();
        let result: Result<(), _> =
            with_lock(Arc::clone(&lock), "k", Duration::from_secs(60), async {
                Err(ReportError::Internal("render failed".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(lock.acquire("k", Duration::from_secs(60)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_with_lock_releases_on_panic() {
        let lock = memory_lock();
        let result: Result<(), _> =
            with_lock(Arc::clone(&lock), "k", Duration::from_secs(60), async {
                panic!("boom");
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("boom"));
        assert!(lock.acquire("k", Duration::from_secs(60)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_with_lock_conflict() {
        let lock = memory_lock();
        assert!(lock.acquire("k", Duration::from_secs(60)).await.unwrap().is_some());

        let result: Result<(), _> =
            with_lock(Arc::clone(&lock), "k", Duration::from_secs(60), async { Ok(()) }).await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("currently running"));
    }

    #[tokio::test]
    async fn test_dropped_guard_releases() {
        let lock = memory_lock();
        let guard = LockGuard::acquire(Arc::clone(&lock), "k", Duration::from_secs(60))
            .await
            .unwrap()
            .unwrap();
        drop(guard);

        // Release runs on a spawned task.
        for _ in 0..50 {
            if lock.acquire("k", Duration::from_secs(60)).await.unwrap().is_some() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("lock was not released after guard drop");
    }

    #[tokio::test]
    async fn test_with_lock_renews_ttl_while_running() {
        let lock = memory_lock();
        let ttl = Duration::from_millis(30);
        let contender = Arc::clone(&lock);

        let value = with_lock(Arc::clone(&lock), "k", ttl, async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let stolen = contender.acquire("k", ttl).await.unwrap();
            Ok::<_, ReportError>(stolen.is_some())
        })
        .await
        .unwrap();

        assert!(!value, "lock expired while its holder was still running");
        assert!(lock.acquire("k", ttl).await.unwrap().is_some());
    }

    /// Acquires and releases normally but can never renew.
    struct NonRenewingLock(MemoryLock);

    #[async_trait]
    impl DistributedLock for NonRenewingLock {
        async fn acquire(
            &self,
            key: &str,
            ttl: Duration,
        ) -> Result<Option<LockToken>, LockError> {
            self.0.acquire(key, ttl).await
        }

        async fn extend(
            &self,
            _key: &str,
            _token: &LockToken,
            _ttl: Duration,
        ) -> Result<bool, LockError> {
            Ok(false)
        }

        async fn release(&self, key: &str, token: &LockToken) -> Result<bool, LockError> {
            self.0.release(key, token).await
        }
    }

    #[tokio::test]
    async fn test_with_lock_aborts_when_lock_is_lost() {
        let lock: Arc<dyn DistributedLock> = Arc::new(NonRenewingLock(MemoryLock::new()));
        let result: Result<(), _> = with_lock(lock, "k", Duration::from_millis(30), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert!(err.to_string().contains("expired"), "{}", err);
    }
}
