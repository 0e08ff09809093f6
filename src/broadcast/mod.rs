//! Broadcast layer
//!
//! Publishes views to socket.io rooms. The transport only needs to
//! deliver one JSON envelope per publish; room fan-out happens in the
//! web tier's socket.io manager.

mod envelope;
mod publisher;

pub use envelope::EmitEnvelope;
pub use publisher::RedisBroadcaster;

use crate::error::GatewayError;
use crate::events::EventKind;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use twilight_model::id::marker::{ChannelMarker, GuildMarker};
use twilight_model::id::Id;

/// socket.io namespace isolating relay traffic
pub const NAMESPACE: &str = "/gateway";

/// Room for everything scoped to one channel
pub fn channel_room(channel_id: Id<ChannelMarker>) -> String {
    format!("CHANNEL_{channel_id}")
}

/// Room for everything scoped to one guild
pub fn guild_room(guild_id: Id<GuildMarker>) -> String {
    format!("GUILD_{guild_id}")
}

/// Publishes one event to one room.
///
/// Failures are returned to the caller untouched; no retries here.
pub trait Broadcaster: Send + Sync {
    fn publish(
        &self,
        event: EventKind,
        data: Value,
        room: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

impl<T: Broadcaster> Broadcaster for Arc<T> {
    fn publish(
        &self,
        event: EventKind,
        data: Value,
        room: &str,
        namespace: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send {
        (**self).publish(event, data, room, namespace)
    }
}
