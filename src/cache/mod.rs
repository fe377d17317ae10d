//! Ephemeral key/value cache for status projections.
//!
//! Entries carry a TTL and are never authoritative: the durable repository
//! always wins. A missing key is the typed [`CacheError::Miss`] condition,
//! which callers treat as "fall back to the repository".
//!
//! Values are stored as JSON strings; [`CacheExt`] adds typed helpers on top
//! of the raw trait so backends stay object-safe.

pub mod memory;
pub mod redis;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Errors that can occur during cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Key absent or expired.
    #[error("Cache miss: {0}")]
    Miss(String),

    /// Redis operation failed.
    #[error("Redis operation failed: {0}")]
    Redis(#[from] ::redis::RedisError),

    /// Failed to connect to the backend.
    #[error("Cache connection failed: {0}")]
    ConnectionFailed(String),

    /// Stored value could not be (de)serialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn is_miss(&self) -> bool {
        matches!(self, CacheError::Miss(_))
    }
}

/// Raw string cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Returns the stored value or `CacheError::Miss`.
    async fn get_raw(&self, key: &str) -> Result<String, CacheError>;

    /// Stores `value` under `key` for `ttl`.
    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Typed JSON access over any [`Cache`].
#[async_trait]
pub trait CacheExt: Cache {
    /// Loads and decodes the value under `key`.
    async fn get<T>(&self, key: &str) -> Result<T, CacheError>
    where
        T: DeserializeOwned + Send,
    {
        let raw = self.get_raw(key).await?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Encodes and stores `value` under `key`.
    async fn set<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), CacheError>
    where
        T: Serialize + Sync + ?Sized,
    {
        let raw = serde_json::to_string(value)?;
        self.set_raw(key, raw, ttl).await
    }
}

impl<C: Cache + ?Sized> CacheExt for C {}
