//! Redis-backed cache.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{Cache, CacheError};

/// Cache over a Redis connection manager. Values are JSON strings set with `EX`.
#[derive(Clone)]
pub struct RedisCache {
    redis: ConnectionManager,
    /// Prefix prepended to every key.
    namespace: String,
}

impl RedisCache {
    /// Connects to Redis.
    pub async fn connect(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        Ok(Self::from_connection(redis))
    }

    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self {
            redis,
            namespace: String::new(),
        }
    }

    /// Sets a key prefix, e.g. `"reportforge:"`.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_raw(&self, key: &str) -> Result<String, CacheError> {
        let mut conn = self.redis.clone();
        let value: Option<String> = conn.get(self.full_key(key)).await?;
        value.ok_or_else(|| CacheError::Miss(key.to_string()))
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        redis::cmd("SET")
            .arg(self.full_key(key))
            .arg(value)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(self.full_key(key)).await?;
        Ok(())
    }
}
