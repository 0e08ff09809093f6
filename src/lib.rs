//! Embed relay - Discord live-update relay using Twilight
//!
//! Listens to guild, channel, member, role and message events and
//! republishes normalized views to socket.io rooms:
//! - `CHANNEL_<id>` rooms receive message create/update/delete
//! - `GUILD_<id>` rooms receive member, emoji, guild, channel and role changes
//!
//! Views are published on the `/gateway` namespace on the Redis channel
//! the web tier's socket.io manager listens on.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod events;
pub mod health;
pub mod metrics;
pub mod shard;
