//! Shard pool implementation
//!
//! Manages multiple Discord shards per process. Every shard feeds the
//! shared cache and dispatches resolved events to the handler.

use crate::error::GatewayError;
use crate::events::{apply, dispatch, GatewayHandler, RelayCache};
use crate::metrics::GatewayMetrics;
use crate::shard::state::{ShardHealth, ShardState};

use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use twilight_gateway::{Config, EventTypeFlags, Intents, Shard, StreamExt as _};
use twilight_model::gateway::{event::Event, ShardId};

/// Number of shards per relay process (pool)
pub const SHARDS_PER_POOL: u64 = 25;

/// Circuit breaker: mark shard dead after N consecutive errors without success
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Shard ids owned by a pool, clamped to the cluster size
pub fn pool_shard_range(pool_id: u64, total_shards: u64) -> std::ops::Range<u64> {
    let start = (pool_id * SHARDS_PER_POOL).min(total_shards);
    let end = ((pool_id + 1) * SHARDS_PER_POOL).min(total_shards);
    start..end
}

/// Signals every shard task of a pool to stop
#[derive(Debug, Clone)]
pub struct ShutdownHandle(broadcast::Sender<()>);

impl ShutdownHandle {
    /// Signal shutdown to all shards
    pub fn shutdown(&self) {
        let _ = self.0.send(());
    }
}

/// Shard pool managing multiple Discord shards
pub struct ShardPool<H> {
    pool_id: u64,
    shards: Vec<Shard>,
    cache: Arc<RelayCache>,
    handler: Option<Arc<H>>,
    state: ShardState,
    metrics: Arc<GatewayMetrics>,
    shutdown_tx: broadcast::Sender<()>,
}

impl<H: GatewayHandler + 'static> ShardPool<H> {
    /// Create a new shard pool
    ///
    /// # Arguments
    /// * `pool_id` - Pool identifier (0, 1, 2, ...)
    /// * `total_shards` - Total shards across all pools
    /// * `token` - Discord bot token
    /// * `intents` - Discord gateway intents
    /// * `cache` - Cache shared by every shard in the pool
    /// * `handler` - Event handler (None for local mode: cache only)
    /// * `metrics` - Prometheus metrics
    pub fn new(
        pool_id: u64,
        total_shards: u64,
        token: String,
        intents: Intents,
        cache: Arc<RelayCache>,
        handler: Option<Arc<H>>,
        metrics: Arc<GatewayMetrics>,
    ) -> Result<Self, GatewayError> {
        let range = pool_shard_range(pool_id, total_shards);

        info!(
            pool_id,
            start_shard = range.start,
            end_shard = range.end,
            shard_count = range.end - range.start,
            "Creating shard pool"
        );

        let state = ShardState::new(pool_id, range.clone());

        // Safe u64 → u32 cast at Twilight API boundary
        let total_shards_u32 = u32::try_from(total_shards)
            .map_err(|_| GatewayError::ShardIdOverflow { value: total_shards })?;

        let mut shards = Vec::with_capacity(range.clone().count());

        for shard_id in range {
            let shard_id_u32 = u32::try_from(shard_id)
                .map_err(|_| GatewayError::ShardIdOverflow { value: shard_id })?;
            let config = Config::new(token.clone(), intents);

            shards.push(Shard::with_config(
                ShardId::new(shard_id_u32, total_shards_u32),
                config,
            ));
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            pool_id,
            shards,
            cache,
            handler,
            state,
            metrics,
            shutdown_tx,
        })
    }

    /// Get the shared state handle
    pub fn state(&self) -> ShardState {
        self.state.clone()
    }

    /// Handle that stops the pool once [`run`](Self::run) has taken it
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    /// Run all shards in the pool
    ///
    /// This spawns a task for each shard and waits for all to complete.
    pub async fn run(self) -> Result<(), GatewayError> {
        let mut handles = Vec::with_capacity(self.shards.len());

        for shard in self.shards {
            let shard_id: u64 = shard.id().number().into();
            let cache = Arc::clone(&self.cache);
            let handler = self.handler.clone();
            let state = self.state.clone();
            let metrics = Arc::clone(&self.metrics);
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            let handle = tokio::spawn(async move {
                tokio::select! {
                    result = run_shard(shard, cache, handler, state, metrics) => {
                        if let Err(e) = result {
                            error!(shard_id, error = %e, "Shard task failed");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!(shard_id, "Shard received shutdown signal");
                    }
                }
            });

            handles.push(handle);
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!(pool_id = self.pool_id, "Shard pool shut down");
        Ok(())
    }
}

/// Run a single shard's event loop
async fn run_shard<H: GatewayHandler>(
    mut shard: Shard,
    cache: Arc<RelayCache>,
    handler: Option<Arc<H>>,
    state: ShardState,
    metrics: Arc<GatewayMetrics>,
) -> Result<(), GatewayError> {
    let shard_id: u64 = shard.id().number().into();
    let pool_id = state.pool_id();

    state.set_health(shard_id, ShardHealth::Connecting);

    info!(shard_id, pool_id, "Shard starting");

    let mut consecutive_errors: u32 = 0;

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => {
                consecutive_errors = 0;
                event
            }
            Err(source) => {
                consecutive_errors += 1;
                warn!(shard_id, error = %source, consecutive = consecutive_errors, "Error receiving event");

                if matches!(source.kind(), twilight_gateway::error::ReceiveMessageErrorType::Reconnect) {
                    let err = GatewayError::ShardReconnectFailed {
                        shard_id,
                        source: Box::new(source),
                    };
                    metrics.record_error(shard_id, err.error_type_label());
                    state.set_health(shard_id, ShardHealth::Dead);
                    error!(shard_id, "Fatal gateway error (reconnect failed)");
                    return Err(err);
                }

                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    let err = GatewayError::ShardCircuitBroken {
                        shard_id,
                        count: consecutive_errors,
                        max: MAX_CONSECUTIVE_ERRORS,
                    };
                    metrics.record_error(shard_id, err.error_type_label());
                    state.set_health(shard_id, ShardHealth::Dead);
                    error!(shard_id, consecutive = consecutive_errors, "Shard dead: consecutive error threshold exceeded");
                    return Err(err);
                }

                metrics.record_error(shard_id, "receive_error");
                state.set_health(shard_id, ShardHealth::Disconnected);
                continue;
            }
        };

        state.record_event(shard_id);
        metrics.record_event(shard_id, &event);

        match &event {
            Event::Ready(ready) => {
                state.set_health(shard_id, ShardHealth::Ready);
                let guilds = state.set_guilds(shard_id, ready.guilds.len() as u64);
                metrics.set_guilds(shard_id, guilds);
                info!(
                    shard_id,
                    guilds,
                    session_id = %ready.session_id,
                    "Shard ready"
                );
            }
            Event::Resumed => {
                state.set_health(shard_id, ShardHealth::Ready);
                info!(shard_id, "Shard resumed");
            }
            Event::GatewayHeartbeatAck => {
                metrics.record_heartbeat(shard_id);
            }
            Event::GuildCreate(guild) => {
                let guilds = state.adjust_guilds(shard_id, true);
                metrics.set_guilds(shard_id, guilds);
                debug!(shard_id, guild_id = %guild.id(), "Guild joined");
            }
            Event::GuildDelete(guild) => {
                // Outages arrive as unavailable deletes; the bot is still in the guild
                if guild.unavailable != Some(true) {
                    let guilds = state.adjust_guilds(shard_id, false);
                    metrics.set_guilds(shard_id, guilds);
                }
                debug!(shard_id, guild_id = %guild.id, "Guild left");
            }
            _ => {}
        }

        let relayed = apply(&cache, &event);

        let Some(handler) = handler.as_deref() else {
            if !relayed.is_empty() {
                debug!(shard_id, count = relayed.len(), "Local mode: events resolved, not published");
            }
            continue;
        };

        for relay in &relayed {
            let start = Instant::now();

            match dispatch(handler, relay).await {
                Ok(()) => {
                    state.record_dispatch(shard_id);
                    metrics.record_dispatch_success(relay.kind(), start.elapsed());
                }
                Err(e) => {
                    state.record_dispatch_failure(shard_id);
                    metrics.record_dispatch_failure(relay.kind(), &e);
                    warn!(shard_id, event = %relay.kind(), error = %e, "Failed to relay event");
                }
            }
        }
    }

    info!(shard_id, "Shard event stream ended");
    Ok(())
}
