//! Twilight event resolution
//!
//! Turns raw gateway events into snapshots, reading nested references
//! (members, roles, presences, cached messages) from the relay cache.
//! Resolution is synchronous; every cache guard is released before the
//! snapshot leaves this module.

use super::cache::RelayCache;
use super::kind::EventKind;
use super::snapshot::{
    ChannelSnapshot, EmojiSnapshot, GuildSnapshot, MemberSnapshot, MentionSnapshot,
    MessageSnapshot, RoleRef, RoleSnapshot, UserSnapshot,
};
use serde_json::Value;
use tracing::debug;
use twilight_cache_inmemory::DefaultInMemoryCache;
use twilight_model::channel::{Attachment, Channel, Message};
use twilight_model::gateway::event::Event;
use twilight_model::gateway::presence::{ActivityType, Presence, Status, UserOrId};
use twilight_model::id::marker::{GuildMarker, MessageMarker, RoleMarker, UserMarker};
use twilight_model::id::Id;

/// A gateway event the relay forwards, with its source resolved
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    MessageCreate(MessageSnapshot),
    MessageUpdate(MessageSnapshot),
    MessageDelete(MessageSnapshot),
    MemberAdd(MemberSnapshot),
    MemberRemove(MemberSnapshot),
    MemberUpdate(MemberSnapshot),
    EmojisUpdate(Vec<EmojiSnapshot>),
    GuildUpdate(GuildSnapshot),
    ChannelCreate(ChannelSnapshot),
    ChannelDelete(ChannelSnapshot),
    ChannelUpdate(ChannelSnapshot),
    RoleCreate(RoleRef),
    RoleUpdate(RoleRef),
    RoleDelete(RoleRef),
}

impl RelayEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::MessageCreate(_) => EventKind::MessageCreate,
            Self::MessageUpdate(_) => EventKind::MessageUpdate,
            Self::MessageDelete(_) => EventKind::MessageDelete,
            Self::MemberAdd(_) => EventKind::GuildMemberAdd,
            Self::MemberRemove(_) => EventKind::GuildMemberRemove,
            Self::MemberUpdate(_) => EventKind::GuildMemberUpdate,
            Self::EmojisUpdate(_) => EventKind::GuildEmojisUpdate,
            Self::GuildUpdate(_) => EventKind::GuildUpdate,
            Self::ChannelCreate(_) => EventKind::ChannelCreate,
            Self::ChannelDelete(_) => EventKind::ChannelDelete,
            Self::ChannelUpdate(_) => EventKind::ChannelUpdate,
            Self::RoleCreate(_) => EventKind::GuildRoleCreate,
            Self::RoleUpdate(_) => EventKind::GuildRoleUpdate,
            Self::RoleDelete(_) => EventKind::GuildRoleDelete,
        }
    }
}

/// Build the relay cache
pub fn build_cache(message_cache_size: usize) -> RelayCache {
    RelayCache::new(message_cache_size)
}

/// Apply an event to the cache and resolve what should be relayed
///
/// Removals are resolved before the cache forgets the object; everything
/// else is resolved against the updated cache.
pub fn apply(cache: &RelayCache, event: &Event) -> Vec<RelayEvent> {
    let relayed = if resolves_before_update(event) {
        let relayed = resolve(cache, event);
        cache.discord().update(event);
        relayed
    } else {
        cache.discord().update(event);
        resolve(cache, event)
    };

    track_mentions(cache, event, &relayed);
    relayed
}

fn resolves_before_update(event: &Event) -> bool {
    matches!(
        event,
        Event::MessageDelete(_) | Event::MessageDeleteBulk(_) | Event::MemberRemove(_)
    )
}

fn track_mentions(cache: &RelayCache, event: &Event, relayed: &[RelayEvent]) {
    match event {
        Event::MessageDelete(delete) => cache.forget_message(delete.channel_id, delete.id),
        Event::MessageDeleteBulk(bulk) => {
            for id in &bulk.ids {
                cache.forget_message(bulk.channel_id, *id);
            }
        }
        _ => {
            for relay in relayed {
                if let RelayEvent::MessageCreate(message) | RelayEvent::MessageUpdate(message) = relay {
                    cache.remember_mentions(message);
                }
            }
        }
    }
}

/// Resolve an event without touching the cache
pub fn resolve(cache: &RelayCache, event: &Event) -> Vec<RelayEvent> {
    let discord = cache.discord();

    match event {
        Event::MessageCreate(create) => {
            vec![RelayEvent::MessageCreate(message_snapshot(discord, &create.0))]
        }
        Event::MessageUpdate(update) => {
            vec![RelayEvent::MessageUpdate(message_snapshot(discord, &update.0))]
        }
        Event::MessageDelete(delete) => cached_message_snapshot(cache, delete.id)
            .map(RelayEvent::MessageDelete)
            .into_iter()
            .collect(),
        Event::MessageDeleteBulk(bulk) => bulk
            .ids
            .iter()
            .filter_map(|id| cached_message_snapshot(cache, *id))
            .map(RelayEvent::MessageDelete)
            .collect(),

        Event::MemberAdd(add) => vec![RelayEvent::MemberAdd(member_snapshot(
            discord,
            add.guild_id,
            UserSnapshot::from(&add.member.user),
            add.member.nick.clone(),
            &add.member.roles,
        ))],
        Event::MemberUpdate(update) => vec![RelayEvent::MemberUpdate(member_snapshot(
            discord,
            update.guild_id,
            UserSnapshot::from(&update.user),
            update.nick.clone(),
            &update.roles,
        ))],
        Event::MemberRemove(remove) => {
            let (nick, roles) = discord
                .member(remove.guild_id, remove.user.id)
                .map(|member| (member.nick().map(str::to_owned), member.roles().to_vec()))
                .unwrap_or_default();
            vec![RelayEvent::MemberRemove(member_snapshot(
                discord,
                remove.guild_id,
                UserSnapshot::from(&remove.user),
                nick,
                &roles,
            ))]
        }
        // Status and activity changes refresh the member view
        Event::PresenceUpdate(update) => presence_member(discord, &update.0)
            .map(RelayEvent::MemberUpdate)
            .into_iter()
            .collect(),

        Event::GuildEmojisUpdate(update) => vec![RelayEvent::EmojisUpdate(
            update
                .emojis
                .iter()
                .map(|emoji| EmojiSnapshot::from_emoji(update.guild_id, emoji))
                .collect(),
        )],
        Event::GuildUpdate(update) => vec![RelayEvent::GuildUpdate(GuildSnapshot {
            id: update.0.id,
            name: update.0.name.clone(),
            icon: update.0.icon,
        })],

        Event::ChannelCreate(create) => channel_snapshot(&create.0)
            .map(RelayEvent::ChannelCreate)
            .into_iter()
            .collect(),
        Event::ChannelDelete(delete) => channel_snapshot(&delete.0)
            .map(RelayEvent::ChannelDelete)
            .into_iter()
            .collect(),
        Event::ChannelUpdate(update) => channel_snapshot(&update.0)
            .map(RelayEvent::ChannelUpdate)
            .into_iter()
            .collect(),

        Event::RoleCreate(create) => vec![RelayEvent::RoleCreate(RoleRef {
            id: create.role.id,
            guild_id: create.guild_id,
        })],
        Event::RoleUpdate(update) => vec![RelayEvent::RoleUpdate(RoleRef {
            id: update.role.id,
            guild_id: update.guild_id,
        })],
        Event::RoleDelete(delete) => vec![RelayEvent::RoleDelete(RoleRef {
            id: delete.role_id,
            guild_id: delete.guild_id,
        })],

        // Everything else only feeds the cache
        _ => Vec::new(),
    }
}

fn attachments_json(attachments: &[Attachment]) -> Vec<Value> {
    attachments
        .iter()
        .filter_map(|attachment| serde_json::to_value(attachment).ok())
        .collect()
}

fn cached_nick(
    cache: &DefaultInMemoryCache,
    guild_id: Id<GuildMarker>,
    user_id: Id<UserMarker>,
) -> Option<String> {
    cache
        .member(guild_id, user_id)
        .and_then(|member| member.nick().map(str::to_owned))
}

fn cached_user(cache: &DefaultInMemoryCache, user_id: Id<UserMarker>) -> Option<UserSnapshot> {
    cache.user(user_id).map(|user| UserSnapshot::from(user.value()))
}

fn message_snapshot(cache: &DefaultInMemoryCache, message: &Message) -> MessageSnapshot {
    let author_nick = message
        .member
        .as_ref()
        .and_then(|member| member.nick.clone())
        .or_else(|| {
            message
                .guild_id
                .and_then(|guild_id| cached_nick(cache, guild_id, message.author.id))
        });

    let mentions = message
        .mentions
        .iter()
        .map(|mention| MentionSnapshot {
            user: UserSnapshot::from(mention),
            nick: message
                .guild_id
                .and_then(|guild_id| cached_nick(cache, guild_id, mention.id))
                .or_else(|| mention.member.as_ref().and_then(|member| member.nick.clone())),
        })
        .collect();

    MessageSnapshot {
        id: message.id,
        channel_id: message.channel_id,
        guild_id: message.guild_id,
        content: message.content.clone(),
        author: UserSnapshot::from(&message.author),
        author_nick,
        timestamp: message.timestamp,
        edited_timestamp: message.edited_timestamp,
        mentions,
        attachments: attachments_json(&message.attachments),
    }
}

/// Snapshot of a message the platform only referenced by id
///
/// `None` when the message or its author is not cached. Mentions come from
/// the identities recorded at create/edit time; a nickname is re-read from
/// the member cache and keeps the recorded value otherwise.
fn cached_message_snapshot(
    cache: &RelayCache,
    message_id: Id<MessageMarker>,
) -> Option<MessageSnapshot> {
    let discord = cache.discord();
    let Some(cached) = discord.message(message_id) else {
        debug!(%message_id, "Deleted message not cached");
        return None;
    };
    let channel_id = cached.channel_id();
    let guild_id = cached.guild_id();
    let author_id = cached.author();
    let content = cached.content().to_owned();
    let timestamp = cached.timestamp();
    let edited_timestamp = cached.edited_timestamp();
    let mention_ids = cached.mentions().to_vec();
    let attachments = attachments_json(cached.attachments());
    let member_nick = cached.member().and_then(|member| member.nick.clone());
    drop(cached);

    let author = cached_user(discord, author_id)?;
    let author_nick = member_nick.or_else(|| {
        guild_id.and_then(|guild_id| cached_nick(discord, guild_id, author_id))
    });

    let current_nick =
        |user_id| guild_id.and_then(|guild_id| cached_nick(discord, guild_id, user_id));

    let mentions = match cache.mentions(message_id) {
        Some(recorded) => recorded
            .into_iter()
            .map(|mention| MentionSnapshot {
                nick: current_nick(mention.user.id).or(mention.nick),
                user: mention.user,
            })
            .collect(),
        None => mention_ids
            .into_iter()
            .filter_map(|user_id| {
                let user = cached_user(discord, user_id)?;
                Some(MentionSnapshot {
                    user,
                    nick: current_nick(user_id),
                })
            })
            .collect(),
    };

    Some(MessageSnapshot {
        id: message_id,
        channel_id,
        guild_id,
        content,
        author,
        author_nick,
        timestamp,
        edited_timestamp,
        mentions,
        attachments,
    })
}

fn member_snapshot(
    cache: &DefaultInMemoryCache,
    guild_id: Id<GuildMarker>,
    user: UserSnapshot,
    nick: Option<String>,
    role_ids: &[Id<RoleMarker>],
) -> MemberSnapshot {
    let roles = role_ids
        .iter()
        .filter_map(|role_id| {
            cache
                .role(*role_id)
                .map(|role| RoleSnapshot::from(role.resource()))
        })
        .collect();

    // Custom statuses are not games
    let (status, activity) = cache
        .presence(guild_id, user.id)
        .map(|presence| {
            let activity = presence
                .activities()
                .iter()
                .find(|activity| activity.kind != ActivityType::Custom)
                .map(|activity| activity.name.clone());
            (presence.status(), activity)
        })
        .unwrap_or((Status::Offline, None));

    MemberSnapshot {
        guild_id,
        user,
        nick,
        roles,
        status,
        activity,
    }
}

/// Member snapshot for a presence change, `None` when the member is not cached
fn presence_member(cache: &DefaultInMemoryCache, presence: &Presence) -> Option<MemberSnapshot> {
    let user_id = presence.user.id();
    let Some((nick, roles)) = cache
        .member(presence.guild_id, user_id)
        .map(|member| (member.nick().map(str::to_owned), member.roles().to_vec()))
    else {
        debug!(%user_id, guild_id = %presence.guild_id, "Presence for uncached member");
        return None;
    };

    let user = cached_user(cache, user_id).or_else(|| match &presence.user {
        UserOrId::User(user) => Some(UserSnapshot::from(user)),
        UserOrId::UserId { .. } => None,
    })?;

    Some(member_snapshot(cache, presence.guild_id, user, nick, &roles))
}

fn channel_snapshot(channel: &Channel) -> Option<ChannelSnapshot> {
    let Some(guild_id) = channel.guild_id else {
        debug!(channel_id = %channel.id, "Channel without guild");
        return None;
    };
    Some(ChannelSnapshot {
        id: channel.id,
        guild_id,
        kind: channel.kind.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use twilight_model::gateway::payload::incoming::{
        GuildEmojisUpdate, MemberAdd, MemberRemove, MessageCreate, MessageDelete,
        MessageDeleteBulk, PresenceUpdate, RoleCreate, RoleDelete,
    };

    const GUILD: u64 = 77;

    fn user_json(id: u64, name: &str) -> Value {
        json!({
            "id": id.to_string(),
            "username": name,
            "discriminator": "0042",
            "avatar": null,
        })
    }

    fn partial_member_json(nick: &str) -> Value {
        json!({
            "communication_disabled_until": null,
            "deaf": false,
            "flags": 0,
            "joined_at": null,
            "mute": false,
            "nick": nick,
            "roles": [],
        })
    }

    fn role_create(role_id: u64, position: i64, hoist: bool, color: u32) -> Event {
        let create: RoleCreate = serde_json::from_value(json!({
            "guild_id": GUILD.to_string(),
            "role": {
                "id": role_id.to_string(),
                "name": format!("role-{role_id}"),
                "color": 0,
                "colors": {
                    "primary_color": color,
                    "secondary_color": null,
                    "tertiary_color": null,
                },
                "hoist": hoist,
                "managed": false,
                "mentionable": false,
                "permissions": "0",
                "position": position,
                "flags": 0,
            },
        }))
        .unwrap();
        Event::RoleCreate(create)
    }

    fn member_add(user_id: u64, name: &str, nick: Option<&str>, roles: &[u64]) -> Event {
        let add: MemberAdd = serde_json::from_value(json!({
            "guild_id": GUILD.to_string(),
            "communication_disabled_until": null,
            "deaf": false,
            "flags": 0,
            "joined_at": null,
            "mute": false,
            "nick": nick,
            "roles": roles.iter().map(u64::to_string).collect::<Vec<_>>(),
            "user": user_json(user_id, name),
        }))
        .unwrap();
        Event::MemberAdd(Box::new(add))
    }

    fn presence_update(user_id: u64, status: &str, activities: Value) -> Event {
        let update: PresenceUpdate = serde_json::from_value(json!({
            "guild_id": GUILD.to_string(),
            "status": status,
            "client_status": {},
            "activities": activities,
            "user": {"id": user_id.to_string()},
        }))
        .unwrap();
        Event::PresenceUpdate(Box::new(update))
    }

    /// Message 500 in channel 300 by user 1 (nick "Tester") mentioning user 2 (nick "Bee")
    fn message_create(id: u64) -> Event {
        let mut mention = user_json(2, "bee");
        mention["public_flags"] = json!(0);
        mention["member"] = partial_member_json("Bee");

        let create: MessageCreate = serde_json::from_value(json!({
            "id": id.to_string(),
            "channel_id": "300",
            "guild_id": GUILD.to_string(),
            "type": 0,
            "author": user_json(1, "tester"),
            "member": partial_member_json("Tester"),
            "content": "hello <@2>",
            "timestamp": "2023-11-14T22:13:20.000000+00:00",
            "edited_timestamp": null,
            "tts": false,
            "mention_everyone": false,
            "mention_roles": [],
            "mentions": [mention],
            "attachments": [],
            "embeds": [],
            "pinned": false,
        }))
        .unwrap();
        Event::MessageCreate(Box::new(create))
    }

    fn message_delete(id: u64) -> Event {
        Event::MessageDelete(MessageDelete {
            channel_id: Id::new(300),
            guild_id: Some(Id::new(GUILD)),
            id: Id::new(id),
        })
    }

    fn only(mut relayed: Vec<RelayEvent>) -> RelayEvent {
        assert_eq!(relayed.len(), 1, "expected one relayed event: {relayed:?}");
        relayed.remove(0)
    }

    fn member_of(event: RelayEvent) -> MemberSnapshot {
        match event {
            RelayEvent::MemberAdd(member)
            | RelayEvent::MemberUpdate(member)
            | RelayEvent::MemberRemove(member) => member,
            other => panic!("expected a member event, got {other:?}"),
        }
    }

    fn message_of(event: RelayEvent) -> MessageSnapshot {
        match event {
            RelayEvent::MessageCreate(message)
            | RelayEvent::MessageUpdate(message)
            | RelayEvent::MessageDelete(message) => message,
            other => panic!("expected a message event, got {other:?}"),
        }
    }

    #[test]
    fn test_heartbeat_is_not_relayed() {
        let cache = build_cache(10);
        assert!(apply(&cache, &Event::GatewayHeartbeatAck).is_empty());
    }

    #[test]
    fn test_role_delete_resolves_ids() {
        let cache = build_cache(10);
        let event = Event::RoleDelete(RoleDelete {
            guild_id: Id::new(1),
            role_id: Id::new(2),
        });

        let relayed = apply(&cache, &event);
        assert_eq!(
            relayed,
            vec![RelayEvent::RoleDelete(RoleRef {
                id: Id::new(2),
                guild_id: Id::new(1),
            })]
        );
        assert_eq!(relayed[0].kind(), EventKind::GuildRoleDelete);
    }

    #[test]
    fn test_uncached_message_delete_is_skipped() {
        let cache = build_cache(10);
        assert!(apply(&cache, &message_delete(99)).is_empty());
    }

    #[test]
    fn test_empty_emoji_update_reaches_handler() {
        // The handler owns the empty-list precondition
        let cache = build_cache(10);
        let event = Event::GuildEmojisUpdate(GuildEmojisUpdate {
            emojis: Vec::new(),
            guild_id: Id::new(1),
        });
        assert_eq!(apply(&cache, &event), vec![RelayEvent::EmojisUpdate(Vec::new())]);
    }

    #[test]
    fn test_removals_resolve_before_update() {
        assert!(resolves_before_update(&message_delete(99)));
        assert!(!resolves_before_update(&Event::GatewayHeartbeatAck));
    }

    #[test]
    fn test_presence_update_refreshes_member() {
        let cache = build_cache(10);
        apply(&cache, &role_create(10, 1, false, 0x3498db));
        assert_eq!(apply(&cache, &member_add(5, "nelly", Some("Nels"), &[10])).len(), 1);

        let activities = json!([
            {"type": 4, "name": "Custom Status"},
            {"type": 0, "name": "Factorio"},
        ]);
        let member = member_of(only(apply(&cache, &presence_update(5, "online", activities))));

        assert_eq!(member.user.id, Id::new(5));
        assert_eq!(member.user.name, "nelly");
        assert_eq!(member.nick.as_deref(), Some("Nels"));
        assert_eq!(member.status, Status::Online);
        assert_eq!(member.activity.as_deref(), Some("Factorio"));
        assert_eq!(member.roles.len(), 1);
    }

    #[test]
    fn test_presence_of_uncached_member_is_skipped() {
        let cache = build_cache(10);
        let event = presence_update(5, "idle", json!([]));
        assert!(apply(&cache, &event).is_empty());
    }

    #[test]
    fn test_status_defaults_to_offline_without_presence() {
        let cache = build_cache(10);
        let member = member_of(only(apply(&cache, &member_add(5, "nelly", None, &[]))));

        assert_eq!(member.status, Status::Offline);
        assert_eq!(member.activity, None);
        assert_eq!(member.nick, None);
    }

    #[test]
    fn test_unknown_role_ids_are_dropped() {
        let cache = build_cache(10);
        apply(&cache, &role_create(10, 3, true, 0xff0000));
        let member = member_of(only(apply(&cache, &member_add(5, "nelly", None, &[10, 99]))));

        assert_eq!(member.roles.len(), 1);
        assert_eq!(member.roles[0].id, Id::new(10));
        // Read from the gradient primary, not the legacy field
        assert_eq!(member.roles[0].color, 0xff0000);
        assert!(member.roles[0].hoist);
    }

    #[test]
    fn test_member_remove_reads_cache_before_removal() {
        let cache = build_cache(10);
        apply(&cache, &role_create(10, 1, false, 0));
        apply(&cache, &member_add(5, "nelly", Some("Nels"), &[10]));

        let remove: MemberRemove = serde_json::from_value(json!({
            "guild_id": GUILD.to_string(),
            "user": user_json(5, "nelly"),
        }))
        .unwrap();
        let member = member_of(only(apply(&cache, &Event::MemberRemove(remove))));

        assert_eq!(member.nick.as_deref(), Some("Nels"));
        assert_eq!(member.roles.len(), 1);
        assert!(cache.discord().member(Id::new(GUILD), Id::new(5)).is_none());
    }

    #[test]
    fn test_mention_nick_prefers_member_cache() {
        let cache = build_cache(10);
        let message = message_of(only(apply(&cache, &message_create(500))));
        assert_eq!(message.author_nick.as_deref(), Some("Tester"));
        assert_eq!(message.mentions[0].nick.as_deref(), Some("Bee"));

        apply(&cache, &member_add(2, "bee", Some("Queen"), &[]));
        let message = message_of(only(apply(&cache, &message_create(501))));
        assert_eq!(message.mentions[0].nick.as_deref(), Some("Queen"));
    }

    #[test]
    fn test_deleted_message_matches_created_message() {
        let cache = build_cache(10);
        let created = message_of(only(apply(&cache, &message_create(500))));

        let deleted = only(apply(&cache, &message_delete(500)));
        assert_eq!(deleted.kind(), EventKind::MessageDelete);
        let deleted = message_of(deleted);

        // User 2 is only known through the mention
        assert!(cache.discord().user(Id::new(2)).is_none());
        assert_eq!(deleted, created);
        assert_eq!(deleted.mentions.len(), 1);

        // Gone from both the message cache and the mention store
        assert!(apply(&cache, &message_delete(500)).is_empty());
        assert!(cache.mentions(Id::new(500)).is_none());
    }

    #[test]
    fn test_bulk_delete_relays_each_cached_message() {
        let cache = build_cache(10);
        apply(&cache, &message_create(500));
        apply(&cache, &message_create(501));

        let bulk = Event::MessageDeleteBulk(MessageDeleteBulk {
            channel_id: Id::new(300),
            guild_id: Some(Id::new(GUILD)),
            ids: vec![Id::new(500), Id::new(501), Id::new(502)],
        });
        let relayed = apply(&cache, &bulk);

        assert_eq!(relayed.len(), 2);
        assert!(relayed.iter().all(|event| event.kind() == EventKind::MessageDelete));
    }
}
