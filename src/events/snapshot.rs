//! Owned source objects handed to the formatter
//!
//! Snapshots are taken synchronously from a Twilight event plus the
//! in-memory cache, so no cache guard is ever held across a publish.

use serde_json::Value;
use twilight_model::channel::message::Mention;
use twilight_model::channel::ChannelType;
use twilight_model::gateway::presence::Status;
use twilight_model::guild::{Emoji, Role};
use twilight_model::id::marker::{
    ChannelMarker, EmojiMarker, GuildMarker, MessageMarker, RoleMarker, UserMarker,
};
use twilight_model::id::Id;
use twilight_model::user::User;
use twilight_model::util::{ImageHash, Timestamp};

/// Identity fields shared by authors, mentions and members
#[derive(Debug, Clone, PartialEq)]
pub struct UserSnapshot {
    pub id: Id<UserMarker>,
    pub name: String,
    pub discriminator: u16,
    pub avatar: Option<ImageHash>,
    pub bot: bool,
}

impl From<&User> for UserSnapshot {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            discriminator: user.discriminator,
            avatar: user.avatar,
            bot: user.bot,
        }
    }
}

impl From<&Mention> for UserSnapshot {
    fn from(mention: &Mention) -> Self {
        Self {
            id: mention.id,
            name: mention.name.clone(),
            discriminator: mention.discriminator,
            avatar: mention.avatar,
            bot: mention.bot,
        }
    }
}

/// A mentioned user with the nickname resolved in the message's guild
#[derive(Debug, Clone, PartialEq)]
pub struct MentionSnapshot {
    pub user: UserSnapshot,
    pub nick: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageSnapshot {
    pub id: Id<MessageMarker>,
    pub channel_id: Id<ChannelMarker>,
    /// `None` for direct messages
    pub guild_id: Option<Id<GuildMarker>>,
    pub content: String,
    pub author: UserSnapshot,
    pub author_nick: Option<String>,
    pub timestamp: Timestamp,
    pub edited_timestamp: Option<Timestamp>,
    pub mentions: Vec<MentionSnapshot>,
    /// Platform attachment objects, passed through untouched
    pub attachments: Vec<Value>,
}

/// Role details needed for color and hoist resolution
#[derive(Debug, Clone, PartialEq)]
pub struct RoleSnapshot {
    pub id: Id<RoleMarker>,
    pub name: String,
    pub position: i64,
    pub hoist: bool,
    pub color: u32,
}

impl From<&Role> for RoleSnapshot {
    fn from(role: &Role) -> Self {
        Self {
            id: role.id,
            name: role.name.clone(),
            position: role.position,
            hoist: role.hoist,
            color: role.colors.primary_color,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MemberSnapshot {
    pub guild_id: Id<GuildMarker>,
    pub user: UserSnapshot,
    pub nick: Option<String>,
    /// Resolved roles; ids missing from the cache are dropped
    pub roles: Vec<RoleSnapshot>,
    /// `Offline` when no presence is known
    pub status: Status,
    /// Name of the current activity
    pub activity: Option<String>,
}

/// Channel kinds the relay distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Category,
    Voice,
    Other,
}

impl From<ChannelType> for ChannelKind {
    fn from(kind: ChannelType) -> Self {
        match kind {
            ChannelType::GuildText => Self::Text,
            ChannelType::GuildCategory => Self::Category,
            ChannelType::GuildVoice | ChannelType::GuildStageVoice => Self::Voice,
            _ => Self::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChannelSnapshot {
    pub id: Id<ChannelMarker>,
    pub guild_id: Id<GuildMarker>,
    pub kind: ChannelKind,
}

/// Role identity only; subscribers re-fetch the rest
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleRef {
    pub id: Id<RoleMarker>,
    pub guild_id: Id<GuildMarker>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuildSnapshot {
    pub id: Id<GuildMarker>,
    pub name: String,
    pub icon: Option<ImageHash>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmojiSnapshot {
    pub id: Id<EmojiMarker>,
    pub guild_id: Id<GuildMarker>,
    pub name: String,
    pub managed: bool,
    pub require_colons: bool,
    pub animated: bool,
    pub roles: Vec<Id<RoleMarker>>,
}

impl EmojiSnapshot {
    pub fn from_emoji(guild_id: Id<GuildMarker>, emoji: &Emoji) -> Self {
        Self {
            id: emoji.id,
            guild_id,
            name: emoji.name.clone(),
            managed: emoji.managed,
            require_colons: emoji.require_colons,
            animated: emoji.animated,
            roles: emoji.roles.clone(),
        }
    }
}
