//! Relay cache
//!
//! The Twilight in-memory cache keeps only the ids of mentioned users, so
//! a deleted message would lose every mention whose user was never cached.
//! `RelayCache` keeps the mention identities next to it, bounded per
//! channel exactly like Twilight's message cache.

use super::snapshot::{MentionSnapshot, MessageSnapshot};
use dashmap::DashMap;
use std::collections::VecDeque;
use twilight_cache_inmemory::{DefaultInMemoryCache, ResourceType};
use twilight_model::id::marker::{ChannelMarker, MessageMarker};
use twilight_model::id::Id;

pub struct RelayCache {
    discord: DefaultInMemoryCache,
    mentions: DashMap<Id<MessageMarker>, Vec<MentionSnapshot>>,
    channel_messages: DashMap<Id<ChannelMarker>, VecDeque<Id<MessageMarker>>>,
    message_cache_size: usize,
}

impl RelayCache {
    /// Build the cache with the resources resolution reads
    pub fn new(message_cache_size: usize) -> Self {
        let discord = DefaultInMemoryCache::builder()
            .resource_types(
                ResourceType::GUILD
                    | ResourceType::CHANNEL
                    | ResourceType::EMOJI
                    | ResourceType::MEMBER
                    | ResourceType::MESSAGE
                    | ResourceType::PRESENCE
                    | ResourceType::ROLE
                    | ResourceType::USER,
            )
            .message_cache_size(message_cache_size)
            .build();

        Self {
            discord,
            mentions: DashMap::new(),
            channel_messages: DashMap::new(),
            message_cache_size,
        }
    }

    /// The underlying Twilight cache
    pub fn discord(&self) -> &DefaultInMemoryCache {
        &self.discord
    }

    /// Remember the mentions of a created or edited message
    pub fn remember_mentions(&self, message: &MessageSnapshot) {
        if self.message_cache_size == 0 {
            return;
        }
        if self
            .mentions
            .insert(message.id, message.mentions.clone())
            .is_some()
        {
            return;
        }

        let mut channel = self.channel_messages.entry(message.channel_id).or_default();
        if channel.len() >= self.message_cache_size {
            if let Some(popped) = channel.pop_back() {
                self.mentions.remove(&popped);
            }
        }
        channel.push_front(message.id);
    }

    /// Mentions recorded for a message, if it is still remembered
    pub fn mentions(&self, message_id: Id<MessageMarker>) -> Option<Vec<MentionSnapshot>> {
        self.mentions.get(&message_id).map(|entry| entry.value().clone())
    }

    /// Forget a deleted message
    pub fn forget_message(&self, channel_id: Id<ChannelMarker>, message_id: Id<MessageMarker>) {
        self.mentions.remove(&message_id);
        if let Some(mut channel) = self.channel_messages.get_mut(&channel_id) {
            channel.retain(|id| *id != message_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::snapshot::UserSnapshot;
    use twilight_model::util::Timestamp;

    fn message(id: u64, channel_id: u64) -> MessageSnapshot {
        let user = UserSnapshot {
            id: Id::new(2),
            name: "bee".to_string(),
            discriminator: 7,
            avatar: None,
            bot: false,
        };
        MessageSnapshot {
            id: Id::new(id),
            channel_id: Id::new(channel_id),
            guild_id: Some(Id::new(1)),
            content: "hi".to_string(),
            author: user.clone(),
            author_nick: None,
            timestamp: Timestamp::from_secs(1_700_000_000).unwrap(),
            edited_timestamp: None,
            mentions: vec![MentionSnapshot { user, nick: None }],
            attachments: Vec::new(),
        }
    }

    #[test]
    fn test_mentions_are_bounded_per_channel() {
        let cache = RelayCache::new(2);
        cache.remember_mentions(&message(10, 3));
        cache.remember_mentions(&message(11, 3));
        cache.remember_mentions(&message(12, 3));
        cache.remember_mentions(&message(20, 4));

        assert!(cache.mentions(Id::new(10)).is_none());
        assert!(cache.mentions(Id::new(11)).is_some());
        assert!(cache.mentions(Id::new(12)).is_some());
        assert!(cache.mentions(Id::new(20)).is_some());
    }

    #[test]
    fn test_edit_replaces_without_evicting() {
        let cache = RelayCache::new(2);
        cache.remember_mentions(&message(10, 3));
        cache.remember_mentions(&message(11, 3));

        let mut edited = message(10, 3);
        edited.mentions.clear();
        cache.remember_mentions(&edited);

        assert_eq!(cache.mentions(Id::new(10)), Some(Vec::new()));
        assert!(cache.mentions(Id::new(11)).is_some());
    }

    #[test]
    fn test_forget_message() {
        let cache = RelayCache::new(5);
        cache.remember_mentions(&message(10, 3));
        cache.forget_message(Id::new(3), Id::new(10));
        assert!(cache.mentions(Id::new(10)).is_none());
    }
}
