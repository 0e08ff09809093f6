//! socket.io manager message format

use crate::events::EventKind;
use serde::Serialize;
use serde_json::Value;

/// One `emit` instruction for the socket.io manager
///
/// Mirrors the message a socket.io pub/sub manager exchanges between
/// hosts, so the web tier can consume relay output as if another host
/// had emitted it.
#[derive(Debug, Clone, Serialize)]
pub struct EmitEnvelope<'a> {
    pub method: &'static str,
    pub event: EventKind,
    pub data: &'a Value,
    pub namespace: &'a str,
    pub room: &'a str,
    pub skip_sid: Option<String>,
    pub callback: Option<String>,
    pub host_id: &'a str,
}

impl<'a> EmitEnvelope<'a> {
    pub fn emit(
        event: EventKind,
        data: &'a Value,
        room: &'a str,
        namespace: &'a str,
        host_id: &'a str,
    ) -> Self {
        Self {
            method: "emit",
            event,
            data,
            namespace,
            room,
            skip_sid: None,
            callback: None,
            host_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_field_names() {
        let data = json!({"id": "1", "guild_id": "2"});
        let envelope = EmitEnvelope::emit(
            EventKind::ChannelCreate,
            &data,
            "GUILD_2",
            "/gateway",
            "host-a",
        );

        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "method": "emit",
                "event": "CHANNEL_CREATE",
                "data": {"id": "1", "guild_id": "2"},
                "namespace": "/gateway",
                "room": "GUILD_2",
                "skip_sid": null,
                "callback": null,
                "host_id": "host-a"
            })
        );
    }
}
