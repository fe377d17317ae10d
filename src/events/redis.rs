//! Redis pub/sub event publisher.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use super::{EventError, EventPublisher, ReportEvent};

/// Publishes events as JSON with `PUBLISH <prefix><topic> <json>`.
#[derive(Clone)]
pub struct RedisEventPublisher {
    redis: ConnectionManager,
    channel_prefix: String,
}

impl RedisEventPublisher {
    /// Connects to Redis.
    pub async fn connect(redis_url: &str) -> Result<Self, EventError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| EventError::ConnectionFailed(e.to_string()))?;
        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| EventError::ConnectionFailed(e.to_string()))?;
        Ok(Self::from_connection(redis))
    }

    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self {
            redis,
            channel_prefix: String::new(),
        }
    }

    /// Sets a channel prefix, e.g. `"reportforge:"`.
    pub fn with_channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = prefix.into();
        self
    }
}

#[async_trait]
impl EventPublisher for RedisEventPublisher {
    async fn publish(&self, topic: &str, event: &ReportEvent) -> Result<(), EventError> {
        let payload = serde_json::to_string(event)?;
        let channel = format!("{}{}", self.channel_prefix, topic);
        let mut conn = self.redis.clone();
        let receivers: i64 = conn.publish(&channel, payload).await?;
        debug!(channel = %channel, report_id = %event.report_id, receivers, "Published event");
        Ok(())
    }
}
