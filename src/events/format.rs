//! View records and field-mapping rules
//!
//! Every view is a pure projection of its snapshot. Field names are the
//! wire contract with existing web subscribers and must not change.

use super::snapshot::{
    ChannelSnapshot, EmojiSnapshot, GuildSnapshot, MemberSnapshot, MessageSnapshot, RoleRef,
    RoleSnapshot, UserSnapshot,
};
use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;
use twilight_model::gateway::presence::Status;
use twilight_model::id::marker::{ChannelMarker, EmojiMarker, GuildMarker, MessageMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;
use twilight_model::util::{ImageHash, Timestamp};

const CDN: &str = "https://cdn.discordapp.com";

/// Trimmed user record used for message authors and mentions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthorView {
    pub id: Id<UserMarker>,
    pub username: String,
    pub discriminator: String,
    pub avatar: Option<ImageHash>,
    pub bot: bool,
    pub nickname: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageView {
    pub id: Id<MessageMarker>,
    pub channel_id: Id<ChannelMarker>,
    pub content: String,
    pub author: AuthorView,
    pub timestamp: String,
    pub edited_timestamp: Option<String>,
    pub mentions: Vec<AuthorView>,
    pub attachments: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GameView {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoistRoleView {
    pub id: Id<RoleMarker>,
    pub name: String,
    pub position: i64,
}

/// Full member record for member add/remove/update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserView {
    pub id: Id<UserMarker>,
    pub username: String,
    pub discriminator: String,
    pub avatar: Option<ImageHash>,
    pub avatar_url: String,
    pub color: Option<String>,
    pub game: Option<GameView>,
    pub status: Status,
    pub nick: Option<String>,
    #[serde(rename = "hoist-role")]
    pub hoist_role: Option<HoistRoleView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmojiView {
    pub id: Id<EmojiMarker>,
    pub name: String,
    pub managed: bool,
    pub require_colons: bool,
    pub roles: Vec<Id<RoleMarker>>,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuildView {
    pub id: Id<GuildMarker>,
    pub name: String,
    pub icon: Option<ImageHash>,
    pub icon_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelView {
    pub id: Id<ChannelMarker>,
    pub guild_id: Id<GuildMarker>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoleView {
    pub id: Id<RoleMarker>,
    pub guild_id: Id<GuildMarker>,
}

/// Render a timestamp as RFC-2822
///
/// The platform timestamp's UTC wall-clock fields are read as a wall-clock
/// time in `zone`, and the resulting instant is printed in UTC with the
/// `-0000` marker. Subscribers were built against exactly this output.
pub fn format_timestamp<Tz: TimeZone>(timestamp: Timestamp, zone: &Tz) -> String {
    let naive = DateTime::from_timestamp_micros(timestamp.as_micros())
        .map(|utc| utc.naive_utc())
        .unwrap_or_default();

    // Nonexistent local times (DST gaps) fall back to UTC
    let instant = zone
        .from_local_datetime(&naive)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc());

    instant.format("%a, %d %b %Y %H:%M:%S -0000").to_string()
}

/// Four-digit discriminator as the platform displays it
pub fn format_discriminator(discriminator: u16) -> String {
    format!("{discriminator:04}")
}

/// Six hex digits without `#`; the zero "no color" sentinel becomes `None`
pub fn format_color(color: u32) -> Option<String> {
    let hex = format!("{:06x}", color & 0x00FF_FFFF);
    (hex != "000000").then_some(hex)
}

/// Color of the highest-positioned role that carries one, zero if none do
pub fn display_color(roles: &[RoleSnapshot]) -> u32 {
    roles
        .iter()
        .filter(|role| role.color != 0)
        .max_by_key(|role| role.position)
        .map_or(0, |role| role.color)
}

/// Highest-positioned hoisted role
///
/// Ties keep input order, matching a stable descending sort.
pub fn hoisted_role(roles: &[RoleSnapshot]) -> Option<&RoleSnapshot> {
    let mut sorted: Vec<&RoleSnapshot> = roles.iter().collect();
    sorted.sort_by(|a, b| b.position.cmp(&a.position));
    sorted.into_iter().find(|role| role.hoist)
}

pub fn avatar_url(user: &UserSnapshot) -> String {
    match user.avatar {
        Some(hash) => {
            let ext = if hash.is_animated() { "gif" } else { "webp" };
            format!("{CDN}/avatars/{}/{hash}.{ext}?size=1024", user.id)
        }
        // Migrated usernames carry discriminator 0 and pick by id instead
        None if user.discriminator == 0 => {
            format!("{CDN}/embed/avatars/{}.png", (user.id.get() >> 22) % 6)
        }
        None => format!("{CDN}/embed/avatars/{}.png", user.discriminator % 5),
    }
}

pub fn emoji_url(emoji: &EmojiSnapshot) -> String {
    let ext = if emoji.animated { "gif" } else { "png" };
    format!("{CDN}/emojis/{}.{ext}", emoji.id)
}

/// Icon URL, or an empty string when the guild has no icon
pub fn guild_icon_url(guild: &GuildSnapshot) -> String {
    guild
        .icon
        .map(|hash| format!("{CDN}/icons/{}/{hash}.jpg", guild.id))
        .unwrap_or_default()
}

fn author_view(user: &UserSnapshot, nickname: Option<&str>) -> AuthorView {
    AuthorView {
        id: user.id,
        username: user.name.clone(),
        discriminator: format_discriminator(user.discriminator),
        avatar: user.avatar,
        bot: user.bot,
        nickname: nickname.map(str::to_owned),
    }
}

pub fn message_view<Tz: TimeZone>(message: &MessageSnapshot, zone: &Tz) -> MessageView {
    MessageView {
        id: message.id,
        channel_id: message.channel_id,
        content: message.content.clone(),
        author: author_view(&message.author, message.author_nick.as_deref()),
        timestamp: format_timestamp(message.timestamp, zone),
        edited_timestamp: message
            .edited_timestamp
            .map(|edited| format_timestamp(edited, zone)),
        mentions: message
            .mentions
            .iter()
            .map(|mention| author_view(&mention.user, mention.nick.as_deref()))
            .collect(),
        attachments: message.attachments.clone(),
    }
}

pub fn user_view(member: &MemberSnapshot) -> UserView {
    UserView {
        id: member.user.id,
        username: member.user.name.clone(),
        discriminator: format_discriminator(member.user.discriminator),
        avatar: member.user.avatar,
        avatar_url: avatar_url(&member.user),
        color: format_color(display_color(&member.roles)),
        game: member
            .activity
            .as_ref()
            .map(|name| GameView { name: name.clone() }),
        status: member.status,
        nick: member.nick.clone(),
        hoist_role: hoisted_role(&member.roles).map(|role| HoistRoleView {
            id: role.id,
            name: role.name.clone(),
            position: role.position,
        }),
    }
}

pub fn emoji_views(emojis: &[EmojiSnapshot]) -> Vec<EmojiView> {
    emojis
        .iter()
        .map(|emoji| EmojiView {
            id: emoji.id,
            name: emoji.name.clone(),
            managed: emoji.managed,
            require_colons: emoji.require_colons,
            roles: emoji.roles.clone(),
            url: emoji_url(emoji),
        })
        .collect()
}

pub fn guild_view(guild: &GuildSnapshot) -> GuildView {
    GuildView {
        id: guild.id,
        name: guild.name.clone(),
        icon: guild.icon,
        icon_url: guild_icon_url(guild),
    }
}

pub fn channel_view(channel: &ChannelSnapshot) -> ChannelView {
    ChannelView {
        id: channel.id,
        guild_id: channel.guild_id,
    }
}

pub fn role_view(role: &RoleRef) -> RoleView {
    RoleView {
        id: role.id,
        guild_id: role.guild_id,
    }
}
