//! Event handler trait and the room publisher
//!
//! `GatewayHandler` has one method per relayed event. The shard loop
//! resolves Twilight events into [`RelayEvent`]s and hands them to
//! [`dispatch`], which is the only place events meet handlers.

use super::format::{channel_view, emoji_views, guild_view, message_view, role_view, user_view};
use super::kind::EventKind;
use super::resolve::RelayEvent;
use super::snapshot::{
    ChannelKind, ChannelSnapshot, EmojiSnapshot, GuildSnapshot, MemberSnapshot, MessageSnapshot,
    RoleRef,
};
use crate::broadcast::{channel_room, guild_room, Broadcaster, NAMESPACE};
use crate::error::GatewayError;
use crate::metrics::GatewayMetrics;
use chrono::{Local, TimeZone};
use serde::Serialize;
use std::future::Future;
use tracing::debug;

type HandlerResult = Result<(), GatewayError>;

/// Receiver for relayed gateway events
pub trait GatewayHandler: Send + Sync {
    fn on_message_create(&self, message: &MessageSnapshot) -> impl Future<Output = HandlerResult> + Send;
    fn on_message_update(&self, message: &MessageSnapshot) -> impl Future<Output = HandlerResult> + Send;
    fn on_message_delete(&self, message: &MessageSnapshot) -> impl Future<Output = HandlerResult> + Send;

    fn on_guild_member_add(&self, member: &MemberSnapshot) -> impl Future<Output = HandlerResult> + Send;
    fn on_guild_member_remove(&self, member: &MemberSnapshot) -> impl Future<Output = HandlerResult> + Send;
    fn on_guild_member_update(&self, member: &MemberSnapshot) -> impl Future<Output = HandlerResult> + Send;

    fn on_guild_emojis_update(&self, emojis: &[EmojiSnapshot]) -> impl Future<Output = HandlerResult> + Send;
    fn on_guild_update(&self, guild: &GuildSnapshot) -> impl Future<Output = HandlerResult> + Send;

    fn on_channel_create(&self, channel: &ChannelSnapshot) -> impl Future<Output = HandlerResult> + Send;
    fn on_channel_delete(&self, channel: &ChannelSnapshot) -> impl Future<Output = HandlerResult> + Send;
    fn on_channel_update(&self, channel: &ChannelSnapshot) -> impl Future<Output = HandlerResult> + Send;

    fn on_guild_role_create(&self, role: &RoleRef) -> impl Future<Output = HandlerResult> + Send;
    fn on_guild_role_update(&self, role: &RoleRef) -> impl Future<Output = HandlerResult> + Send;
    fn on_guild_role_delete(&self, role: &RoleRef) -> impl Future<Output = HandlerResult> + Send;
}

/// Route a resolved event to its handler method
pub async fn dispatch<H: GatewayHandler>(handler: &H, event: &RelayEvent) -> HandlerResult {
    match event {
        RelayEvent::MessageCreate(message) => handler.on_message_create(message).await,
        RelayEvent::MessageUpdate(message) => handler.on_message_update(message).await,
        RelayEvent::MessageDelete(message) => handler.on_message_delete(message).await,
        RelayEvent::MemberAdd(member) => handler.on_guild_member_add(member).await,
        RelayEvent::MemberRemove(member) => handler.on_guild_member_remove(member).await,
        RelayEvent::MemberUpdate(member) => handler.on_guild_member_update(member).await,
        RelayEvent::EmojisUpdate(emojis) => handler.on_guild_emojis_update(emojis).await,
        RelayEvent::GuildUpdate(guild) => handler.on_guild_update(guild).await,
        RelayEvent::ChannelCreate(channel) => handler.on_channel_create(channel).await,
        RelayEvent::ChannelDelete(channel) => handler.on_channel_delete(channel).await,
        RelayEvent::ChannelUpdate(channel) => handler.on_channel_update(channel).await,
        RelayEvent::RoleCreate(role) => handler.on_guild_role_create(role).await,
        RelayEvent::RoleUpdate(role) => handler.on_guild_role_update(role).await,
        RelayEvent::RoleDelete(role) => handler.on_guild_role_delete(role).await,
    }
}

/// Formats events into views and publishes them to rooms
///
/// Stateless apart from the broadcaster and the time zone used to read
/// platform timestamps.
pub struct RoomPublisher<B, Tz = Local> {
    broadcaster: B,
    zone: Tz,
}

impl<B: Broadcaster> RoomPublisher<B> {
    pub fn new(broadcaster: B) -> Self {
        Self::with_time_zone(broadcaster, Local)
    }
}

impl<B, Tz> RoomPublisher<B, Tz>
where
    B: Broadcaster,
    Tz: TimeZone + Send + Sync,
{
    pub fn with_time_zone(broadcaster: B, zone: Tz) -> Self {
        Self { broadcaster, zone }
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    async fn publish<T: Serialize>(&self, event: EventKind, view: &T, room: String) -> HandlerResult {
        let data = serde_json::to_value(view).map_err(|source| GatewayError::SerializationFailed {
            event: event.as_str(),
            source,
        })?;
        self.broadcaster.publish(event, data, &room, NAMESPACE).await
    }

    fn skip(event: EventKind, reason: &'static str) -> HandlerResult {
        debug!(%event, reason, "Event not relayed");
        GatewayMetrics::record_skip(event, reason);
        Ok(())
    }

    async fn emit_message(&self, event: EventKind, message: &MessageSnapshot) -> HandlerResult {
        if message.guild_id.is_none() {
            return Self::skip(event, "direct_message");
        }
        // Build the view before awaiting so only owned data crosses the await
        let view = message_view(message, &self.zone);
        self.publish(event, &view, channel_room(message.channel_id)).await
    }

    async fn emit_member(&self, event: EventKind, member: &MemberSnapshot) -> HandlerResult {
        self.publish(event, &user_view(member), guild_room(member.guild_id))
            .await
    }

    async fn emit_channel(
        &self,
        event: EventKind,
        channel: &ChannelSnapshot,
        accept: &[ChannelKind],
    ) -> HandlerResult {
        if !accept.contains(&channel.kind) {
            return Self::skip(event, "channel_kind");
        }
        self.publish(event, &channel_view(channel), guild_room(channel.guild_id))
            .await
    }

    async fn emit_role(&self, event: EventKind, role: &RoleRef) -> HandlerResult {
        self.publish(event, &role_view(role), guild_room(role.guild_id))
            .await
    }
}

impl<B, Tz> GatewayHandler for RoomPublisher<B, Tz>
where
    B: Broadcaster,
    Tz: TimeZone + Send + Sync,
{
    async fn on_message_create(&self, message: &MessageSnapshot) -> HandlerResult {
        self.emit_message(EventKind::MessageCreate, message).await
    }

    async fn on_message_update(&self, message: &MessageSnapshot) -> HandlerResult {
        self.emit_message(EventKind::MessageUpdate, message).await
    }

    async fn on_message_delete(&self, message: &MessageSnapshot) -> HandlerResult {
        self.emit_message(EventKind::MessageDelete, message).await
    }

    async fn on_guild_member_add(&self, member: &MemberSnapshot) -> HandlerResult {
        self.emit_member(EventKind::GuildMemberAdd, member).await
    }

    async fn on_guild_member_remove(&self, member: &MemberSnapshot) -> HandlerResult {
        self.emit_member(EventKind::GuildMemberRemove, member).await
    }

    async fn on_guild_member_update(&self, member: &MemberSnapshot) -> HandlerResult {
        self.emit_member(EventKind::GuildMemberUpdate, member).await
    }

    async fn on_guild_emojis_update(&self, emojis: &[EmojiSnapshot]) -> HandlerResult {
        let event = EventKind::GuildEmojisUpdate;
        let Some(first) = emojis.first() else {
            return Self::skip(event, "empty_emoji_list");
        };
        self.publish(event, &emoji_views(emojis), guild_room(first.guild_id))
            .await
    }

    async fn on_guild_update(&self, guild: &GuildSnapshot) -> HandlerResult {
        self.publish(EventKind::GuildUpdate, &guild_view(guild), guild_room(guild.id))
            .await
    }

    async fn on_channel_create(&self, channel: &ChannelSnapshot) -> HandlerResult {
        self.emit_channel(EventKind::ChannelCreate, channel, &[ChannelKind::Text])
            .await
    }

    async fn on_channel_delete(&self, channel: &ChannelSnapshot) -> HandlerResult {
        self.emit_channel(EventKind::ChannelDelete, channel, &[ChannelKind::Text])
            .await
    }

    async fn on_channel_update(&self, channel: &ChannelSnapshot) -> HandlerResult {
        self.emit_channel(
            EventKind::ChannelUpdate,
            channel,
            &[ChannelKind::Text, ChannelKind::Category],
        )
        .await
    }

    async fn on_guild_role_create(&self, role: &RoleRef) -> HandlerResult {
        self.emit_role(EventKind::GuildRoleCreate, role).await
    }

    async fn on_guild_role_update(&self, role: &RoleRef) -> HandlerResult {
        self.emit_role(EventKind::GuildRoleUpdate, role).await
    }

    async fn on_guild_role_delete(&self, role: &RoleRef) -> HandlerResult {
        self.emit_role(EventKind::GuildRoleDelete, role).await
    }
}
