//! Event names emitted to subscribers

use serde::Serialize;
use std::fmt;

/// Event tag attached to every publish
///
/// Serializes to the literal name existing subscribers listen for,
/// e.g. `GUILD_EMOJIS_UPDATE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    MessageCreate,
    MessageUpdate,
    MessageDelete,
    GuildMemberAdd,
    GuildMemberRemove,
    GuildMemberUpdate,
    GuildEmojisUpdate,
    GuildUpdate,
    ChannelCreate,
    ChannelDelete,
    ChannelUpdate,
    GuildRoleCreate,
    GuildRoleUpdate,
    GuildRoleDelete,
}

impl EventKind {
    pub const ALL: [EventKind; 14] = [
        Self::MessageCreate,
        Self::MessageUpdate,
        Self::MessageDelete,
        Self::GuildMemberAdd,
        Self::GuildMemberRemove,
        Self::GuildMemberUpdate,
        Self::GuildEmojisUpdate,
        Self::GuildUpdate,
        Self::ChannelCreate,
        Self::ChannelDelete,
        Self::ChannelUpdate,
        Self::GuildRoleCreate,
        Self::GuildRoleUpdate,
        Self::GuildRoleDelete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageCreate => "MESSAGE_CREATE",
            Self::MessageUpdate => "MESSAGE_UPDATE",
            Self::MessageDelete => "MESSAGE_DELETE",
            Self::GuildMemberAdd => "GUILD_MEMBER_ADD",
            Self::GuildMemberRemove => "GUILD_MEMBER_REMOVE",
            Self::GuildMemberUpdate => "GUILD_MEMBER_UPDATE",
            Self::GuildEmojisUpdate => "GUILD_EMOJIS_UPDATE",
            Self::GuildUpdate => "GUILD_UPDATE",
            Self::ChannelCreate => "CHANNEL_CREATE",
            Self::ChannelDelete => "CHANNEL_DELETE",
            Self::ChannelUpdate => "CHANNEL_UPDATE",
            Self::GuildRoleCreate => "GUILD_ROLE_CREATE",
            Self::GuildRoleUpdate => "GUILD_ROLE_UPDATE",
            Self::GuildRoleDelete => "GUILD_ROLE_DELETE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_name_matches_label() {
        for kind in EventKind::ALL {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, serde_json::Value::String(kind.as_str().to_string()));
        }
    }
}
