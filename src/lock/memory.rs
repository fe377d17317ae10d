//! In-process lock with TTL semantics.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::{DistributedLock, LockError, LockToken};

#[derive(Debug)]
struct Held {
    token: LockToken,
    expires_at: Instant,
}

/// Lock table for single-process deployments and tests.
#[derive(Debug, Default)]
pub struct MemoryLock {
    held: Mutex<HashMap<String, Held>>,
}

impl MemoryLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `key` is currently held and unexpired.
    pub fn is_held(&self, key: &str) -> bool {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.get(key).is_some_and(|h| h.expires_at > Instant::now())
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        if held.get(key).is_some_and(|h| h.expires_at > now) {
            return Ok(None);
        }
        let token = LockToken::new();
        held.insert(
            key.to_string(),
            Held {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn extend(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        match held.get_mut(key) {
            Some(h) if h.token == *token && h.expires_at > now => {
                h.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, LockError> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if held.get(key).is_some_and(|h| h.token == *token) {
            held.remove(key);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
