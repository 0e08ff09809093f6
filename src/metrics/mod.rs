//! Prometheus metrics module

use crate::error::GatewayError;
use crate::events::EventKind;
use metrics::{counter, gauge, histogram, describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use twilight_model::gateway::event::Event;

/// Relay metrics collector
#[derive(Clone)]
pub struct GatewayMetrics {
    handle: Arc<PrometheusHandle>,
}

impl GatewayMetrics {
    /// Install the Prometheus recorder and return a handle
    pub fn new() -> Result<Self, GatewayError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(GatewayError::MetricsRecorder)?;

        Self::register_metrics();

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Metrics backed by a recorder that is not installed globally
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: Arc::new(recorder.handle()),
        }
    }

    /// Register metric descriptions
    fn register_metrics() {
        describe_counter!(
            "relay_events_received_total",
            Unit::Count,
            "Total events received from Discord"
        );
        describe_counter!(
            "relay_events_dispatched_total",
            Unit::Count,
            "Relayed events handled without error"
        );
        describe_counter!(
            "relay_dispatch_failures_total",
            Unit::Count,
            "Relayed events whose publish failed"
        );
        describe_counter!(
            "relay_events_skipped_total",
            Unit::Count,
            "Relayable events dropped for missing context"
        );
        describe_counter!(
            "relay_errors_total",
            Unit::Count,
            "Total relay errors"
        );

        describe_histogram!(
            "relay_dispatch_duration_seconds",
            Unit::Seconds,
            "Time to format and publish one event"
        );

        describe_gauge!(
            "relay_shards_ready",
            Unit::Count,
            "Number of shards in ready state"
        );
        describe_gauge!(
            "relay_guilds_total",
            Unit::Count,
            "Guilds per shard"
        );
        describe_gauge!(
            "relay_broadcast_connected",
            Unit::Count,
            "Broadcast connection status (1=connected, 0=disconnected)"
        );
    }

    /// Record an event received
    pub fn record_event(&self, shard_id: u64, event: &Event) {
        let event_type = match event {
            Event::MessageCreate(_) => "message_create",
            Event::MessageUpdate(_) => "message_update",
            Event::MessageDelete(_) => "message_delete",
            Event::MessageDeleteBulk(_) => "message_delete_bulk",
            Event::MemberAdd(_) => "member_add",
            Event::MemberRemove(_) => "member_remove",
            Event::MemberUpdate(_) => "member_update",
            Event::GuildEmojisUpdate(_) => "guild_emojis_update",
            Event::GuildCreate(_) => "guild_create",
            Event::GuildDelete(_) => "guild_delete",
            Event::GuildUpdate(_) => "guild_update",
            Event::ChannelCreate(_) => "channel_create",
            Event::ChannelDelete(_) => "channel_delete",
            Event::ChannelUpdate(_) => "channel_update",
            Event::RoleCreate(_) => "role_create",
            Event::RoleDelete(_) => "role_delete",
            Event::RoleUpdate(_) => "role_update",
            Event::PresenceUpdate(_) => "presence_update",
            Event::Ready(_) => "ready",
            Event::Resumed => "resumed",
            Event::GatewayHeartbeatAck => "heartbeat_ack",
            _ => "other",
        };

        counter!(
            "relay_events_received_total",
            "shard_id" => shard_id.to_string(),
            "event_type" => event_type
        )
        .increment(1);
    }

    /// Record a relayed event handled without error
    pub fn record_dispatch_success(&self, event: EventKind, duration: Duration) {
        counter!(
            "relay_events_dispatched_total",
            "event" => event.as_str()
        )
        .increment(1);

        histogram!(
            "relay_dispatch_duration_seconds",
            "event" => event.as_str()
        )
        .record(duration.as_secs_f64());
    }

    /// Record a relayed event whose publish failed
    pub fn record_dispatch_failure(&self, event: EventKind, error: &GatewayError) {
        counter!(
            "relay_dispatch_failures_total",
            "event" => event.as_str(),
            "error_type" => error.error_type_label()
        )
        .increment(1);
    }

    /// Record a relayable event dropped for missing context
    ///
    /// Called from handlers, which carry no metrics handle.
    pub fn record_skip(event: EventKind, reason: &'static str) {
        counter!(
            "relay_events_skipped_total",
            "event" => event.as_str(),
            "reason" => reason
        )
        .increment(1);
    }

    /// Record shard error
    pub fn record_error(&self, shard_id: u64, error_type: &'static str) {
        counter!(
            "relay_errors_total",
            "shard_id" => shard_id.to_string(),
            "error_type" => error_type
        )
        .increment(1);
    }

    /// Record heartbeat
    pub fn record_heartbeat(&self, shard_id: u64) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0.0, |elapsed| elapsed.as_secs_f64());

        gauge!(
            "relay_last_heartbeat_timestamp",
            "shard_id" => shard_id.to_string()
        )
        .set(now);
    }

    /// Set guild count for a shard
    pub fn set_guilds(&self, shard_id: u64, count: u64) {
        gauge!(
            "relay_guilds_total",
            "shard_id" => shard_id.to_string()
        )
        .set(count as f64);
    }

    /// Set shards ready count
    pub fn set_shards_ready(&self, pool_id: u64, count: usize) {
        gauge!(
            "relay_shards_ready",
            "pool_id" => pool_id.to_string()
        )
        .set(count as f64);
    }

    /// Set broadcast connection status
    pub fn set_broadcast_connected(&self, connected: bool) {
        gauge!("relay_broadcast_connected").set(if connected { 1.0 } else { 0.0 });
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
