//! Redis pub/sub broadcast transport
//!
//! python-socketio's Redis manager subscribes to one channel and decodes
//! each message as an emit instruction, falling back to JSON when the
//! payload is not pickled. Publishing is fire-and-forget: at-most-once,
//! no ordering guarantee across relay processes.

use super::envelope::EmitEnvelope;
use super::Broadcaster;
use crate::error::GatewayError;
use crate::events::EventKind;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Publishes emit envelopes on a single Redis channel
pub struct RedisBroadcaster {
    connection: ConnectionManager,
    channel: String,
    host_id: String,
    connected: AtomicBool,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
}

impl RedisBroadcaster {
    /// Connect to Redis
    ///
    /// The connection manager reconnects on its own after a dropped
    /// connection; a failed publish is reported and not retried.
    pub async fn connect(url: &str, channel: impl Into<String>) -> Result<Arc<Self>, GatewayError> {
        let channel = channel.into();
        info!(url, %channel, "Connecting to Redis");

        let client = Client::open(url)
            .map_err(|e| GatewayError::BroadcastConnectionFailed(Box::new(e)))?;
        let connection = client
            .get_connection_manager()
            .await
            .map_err(|e| GatewayError::BroadcastConnectionFailed(Box::new(e)))?;

        let host_id = Uuid::new_v4().simple().to_string();
        info!(%host_id, "Connected to Redis");

        Ok(Arc::new(Self {
            connection,
            channel,
            host_id,
            connected: AtomicBool::new(true),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
        }))
    }

    /// Whether the last publish went through
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Identifier stamped on every envelope from this process
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Get total messages published
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Get total publish failures
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    /// Stop reporting as connected
    pub fn close(&self) {
        info!("Closing Redis connection");
        self.connected.store(false, Ordering::SeqCst);
    }
}

impl Broadcaster for RedisBroadcaster {
    async fn publish(
        &self,
        event: EventKind,
        data: Value,
        room: &str,
        namespace: &str,
    ) -> Result<(), GatewayError> {
        let envelope = EmitEnvelope::emit(event, &data, room, namespace, &self.host_id);
        let payload = serde_json::to_string(&envelope).map_err(|source| {
            GatewayError::SerializationFailed {
                event: event.as_str(),
                source,
            }
        })?;

        let mut connection = self.connection.clone();
        let result: redis::RedisResult<i64> =
            connection.publish(self.channel.as_str(), payload.as_str()).await;

        match result {
            Ok(receivers) => {
                self.connected.store(true, Ordering::SeqCst);
                self.messages_published.fetch_add(1, Ordering::Relaxed);
                debug!(%event, room, channel = %self.channel, receivers, "Published event");
                Ok(())
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                self.publish_failures.fetch_add(1, Ordering::Relaxed);
                warn!(%event, room, error = %e, "Failed to publish event");
                Err(GatewayError::PublishFailed {
                    event: event.as_str(),
                    room: room.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a running Redis; opt in with REDIS_INTEGRATION_TEST=1
    #[tokio::test]
    async fn test_publish_round_trip() {
        if std::env::var("REDIS_INTEGRATION_TEST").is_err() {
            return;
        }

        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let broadcaster = RedisBroadcaster::connect(&url, "embed-relay-test").await.unwrap();
        let data = serde_json::json!({"id": "1", "guild_id": "2"});

        broadcaster
            .publish(EventKind::ChannelCreate, data, "GUILD_2", "/gateway")
            .await
            .unwrap();

        assert!(broadcaster.is_connected());
        assert_eq!(broadcaster.messages_published(), 1);
        assert_eq!(broadcaster.publish_failures(), 0);
        assert_eq!(broadcaster.host_id().len(), 32);
    }

    #[tokio::test]
    async fn test_invalid_url_is_connection_error() {
        let err = RedisBroadcaster::connect("not a redis url", "flask-socketio")
            .await
            .err()
            .unwrap();
        assert!(matches!(err, GatewayError::BroadcastConnectionFailed(_)));
    }
}
