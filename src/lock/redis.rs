//! Redis-backed distributed lock.
//!
//! Acquire is `SET key token NX PX ttl`. Extend and release are
//! compare-and-set scripts so a holder whose TTL lapsed never touches a lock
//! that another process has since taken.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::{DistributedLock, LockError, LockToken};

const EXTEND_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

/// Distributed lock over a Redis connection manager.
pub struct RedisLock {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
}

impl RedisLock {
    /// Connects to Redis.
    ///
    /// # Errors
    ///
    /// Returns `LockError::ConnectionFailed` if the connection fails.
    pub async fn connect(redis_url: &str) -> Result<Self, LockError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| LockError::ConnectionFailed(e.to_string()))?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| LockError::ConnectionFailed(e.to_string()))?;
        Ok(Self::from_connection(redis))
    }

    /// Creates a lock from an existing connection manager.
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self { redis }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    ttl.as_millis().max(1) as u64
}

#[async_trait]
impl DistributedLock for RedisLock {
    async fn acquire(&self, key: &str, ttl: Duration) -> Result<Option<LockToken>, LockError> {
        let token = LockToken::new();
        let mut conn = self.redis.clone();

        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token.as_str())
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        Ok(reply.map(|_| token))
    }

    async fn extend(
        &self,
        key: &str,
        token: &LockToken,
        ttl: Duration,
    ) -> Result<bool, LockError> {
        let mut conn = self.redis.clone();
        let extended: i64 = redis::Script::new(EXTEND_SCRIPT)
            .key(key)
            .arg(token.as_str())
            .arg(ttl_millis(ttl))
            .invoke_async(&mut conn)
            .await?;
        Ok(extended == 1)
    }

    async fn release(&self, key: &str, token: &LockToken) -> Result<bool, LockError> {
        let mut conn = self.redis.clone();
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token.as_str())
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }
}
