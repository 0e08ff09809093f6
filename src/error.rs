//! Domain error types for the embed relay
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All application code returns Result<T, GatewayError>.

use thiserror::Error;

/// Relay domain errors
///
/// Every variant carries structured context fields for diagnostics.
/// Missing-context skips (direct messages, voice channels, empty emoji
/// lists) are not errors and never surface here.
///
/// Example log output:
/// ```text
/// GatewayError::PublishFailed { event: "MESSAGE_CREATE", room: "CHANNEL_42", .. }
/// → "publish of MESSAGE_CREATE to room 'CHANNEL_42' failed"
/// ```
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Shard exceeded consecutive error threshold (circuit breaker tripped)
    #[error("shard {shard_id} exceeded consecutive error threshold ({count}/{max})")]
    ShardCircuitBroken {
        shard_id: u64,
        count: u32,
        max: u32,
    },

    /// Shard reconnection failed (fatal, shard marked dead)
    #[error("shard {shard_id} reconnection failed")]
    ShardReconnectFailed {
        shard_id: u64,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Broadcast publish failed for a room
    #[error("publish of {event} to room '{room}' failed")]
    PublishFailed {
        event: &'static str,
        room: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Broadcast service connection failed
    #[error("broadcast connection failed")]
    BroadcastConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Envelope serialization failed
    #[error("payload serialization failed for {event}")]
    SerializationFailed {
        event: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration error (environment variable missing or invalid)
    #[error("configuration error: {0}")]
    Config(String),

    /// Shard ID overflow: u64 value exceeds u32::MAX (Twilight API boundary)
    #[error("shard ID overflow: {value} exceeds u32::MAX")]
    ShardIdOverflow { value: u64 },

    /// Prometheus recorder could not be installed
    #[error("metrics recorder installation failed")]
    MetricsRecorder(#[source] metrics_exporter_prometheus::BuildError),
}

impl GatewayError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `error_type` label on `relay_errors_total`.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::ShardCircuitBroken { .. } => "circuit_broken",
            Self::ShardReconnectFailed { .. } => "reconnect_failed",
            Self::PublishFailed { .. } => "publish",
            Self::BroadcastConnectionFailed(_) => "broadcast_connection",
            Self::SerializationFailed { .. } => "serialization",
            Self::Config(_) => "config",
            Self::ShardIdOverflow { .. } => "shard_overflow",
            Self::MetricsRecorder(_) => "metrics_recorder",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_error() -> Box<dyn std::error::Error + Send + Sync> {
        Box::new(std::io::Error::other("test"))
    }

    #[test]
    fn every_variant_has_distinct_error_type_label() {
        let labels = [
            GatewayError::ShardCircuitBroken { shard_id: 0, count: 10, max: 10 }
                .error_type_label(),
            GatewayError::ShardReconnectFailed {
                shard_id: 0,
                source: test_error(),
            }
            .error_type_label(),
            GatewayError::PublishFailed {
                event: "GUILD_UPDATE",
                room: "GUILD_1".to_string(),
                source: test_error(),
            }
            .error_type_label(),
            GatewayError::BroadcastConnectionFailed(test_error()).error_type_label(),
            GatewayError::SerializationFailed {
                event: "GUILD_UPDATE",
                source: serde_json::from_str::<()>("invalid").unwrap_err(),
            }
            .error_type_label(),
            GatewayError::Config("test".to_string()).error_type_label(),
            GatewayError::ShardIdOverflow { value: u64::MAX }.error_type_label(),
        ];

        let mut unique = labels.to_vec();
        unique.sort();
        unique.dedup();
        assert_eq!(labels.len(), unique.len(), "Duplicate error_type_label found");
    }

    #[test]
    fn publish_error_names_event_and_room() {
        let err = GatewayError::PublishFailed {
            event: "MESSAGE_CREATE",
            room: "CHANNEL_42".to_string(),
            source: test_error(),
        };
        let msg = err.to_string();
        assert!(msg.contains("MESSAGE_CREATE"));
        assert!(msg.contains("CHANNEL_42"));

        let err = GatewayError::ShardCircuitBroken {
            shard_id: 3,
            count: 10,
            max: 10,
        };
        assert!(err.to_string().contains("10/10"));
    }

    #[test]
    fn config_error_preserves_message() {
        let err = GatewayError::Config("DISCORD_TOKEN must be set".to_string());
        assert_eq!(
            err.to_string(),
            "configuration error: DISCORD_TOKEN must be set"
        );
    }
}
