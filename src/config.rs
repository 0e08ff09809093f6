//! Relay configuration module
//!
//! Handles loading configuration from environment variables.

use crate::error::GatewayError;
use std::env;
use twilight_gateway::Intents;

/// Channel the web tier's socket.io manager listens on
pub const DEFAULT_BROADCAST_CHANNEL: &str = "flask-socketio";

/// Relay configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Discord bot token
    pub discord_token: String,

    /// Pool ID for this relay instance (0-indexed)
    pub pool_id: u64,

    /// Total number of shards across all pools
    pub total_shards: u64,

    /// Redis URL of the broadcast service
    pub broadcast_url: Option<String>,

    /// Redis channel carrying socket.io emit envelopes
    pub broadcast_channel: String,

    /// Messages kept per channel so deletes can still be rendered
    pub message_cache_size: usize,

    /// Health/metrics HTTP port
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl GatewayConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, GatewayError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, GatewayError> {
        let discord_token = lookup("DISCORD_TOKEN")
            .or_else(|| lookup("DISCORD_BOT_TOKEN"))
            .ok_or_else(|| {
                GatewayError::Config("DISCORD_TOKEN or DISCORD_BOT_TOKEN must be set".to_string())
            })?;

        let pool_id = lookup("POOL_ID")
            .unwrap_or_else(|| "0".to_string())
            .parse()
            .map_err(|e| GatewayError::Config(format!("POOL_ID must be a valid number: {e}")))?;

        let total_shards = lookup("TOTAL_SHARDS")
            .unwrap_or_else(|| "1".to_string())
            .parse()
            .map_err(|e| GatewayError::Config(format!("TOTAL_SHARDS must be a valid number: {e}")))?;

        let broadcast_url = lookup("REDIS_URL").or_else(|| lookup("BROADCAST_URL"));

        let broadcast_channel = lookup("BROADCAST_CHANNEL")
            .filter(|channel| !channel.is_empty())
            .unwrap_or_else(|| DEFAULT_BROADCAST_CHANNEL.to_string());

        let message_cache_size = lookup("MESSAGE_CACHE_SIZE")
            .unwrap_or_else(|| "100".to_string())
            .parse()
            .map_err(|e| {
                GatewayError::Config(format!("MESSAGE_CACHE_SIZE must be a valid number: {e}"))
            })?;

        let http_port = lookup("HTTP_PORT")
            .unwrap_or_else(|| "9090".to_string())
            .parse()
            .map_err(|e| GatewayError::Config(format!("HTTP_PORT must be a valid port number: {e}")))?;

        let log_level = lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            discord_token,
            pool_id,
            total_shards,
            broadcast_url,
            broadcast_channel,
            message_cache_size,
            http_port,
            log_level,
        })
    }

    /// Get configured Discord intents
    ///
    /// - GUILDS: channel, role and guild updates
    /// - GUILD_MEMBERS: member add/remove/update (privileged)
    /// - GUILD_PRESENCES: status and activity for member views (privileged)
    /// - GUILD_MESSAGES + MESSAGE_CONTENT: message bodies
    /// - GUILD_EMOJIS_AND_STICKERS: emoji updates
    pub fn intents() -> Intents {
        Intents::GUILDS
            | Intents::GUILD_MEMBERS
            | Intents::GUILD_PRESENCES
            | Intents::GUILD_MESSAGES
            | Intents::MESSAGE_CONTENT
            | Intents::GUILD_EMOJIS_AND_STICKERS
    }
}
