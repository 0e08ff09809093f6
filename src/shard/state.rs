//! Shard state tracking
//!
//! Tracks health and relay counters of individual shards

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Health status for a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardHealth {
    /// Shard is connecting
    Connecting,
    /// Shard is ready and receiving events
    Ready,
    /// Shard is disconnected
    Disconnected,
    /// Shard encountered a fatal error
    Dead,
}

impl ShardHealth {
    /// Returns true if the shard is ready to receive events
    pub fn is_ready(&self) -> bool {
        matches!(self, ShardHealth::Ready)
    }
}

/// State for a single shard
#[derive(Debug)]
pub struct ShardStateEntry {
    pub health: ShardHealth,
    pub guilds: u64,
    pub events_received: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub dispatch_failures: AtomicU64,
}

impl Default for ShardStateEntry {
    fn default() -> Self {
        Self {
            health: ShardHealth::Connecting,
            guilds: 0,
            events_received: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            dispatch_failures: AtomicU64::new(0),
        }
    }
}

/// Shared state across all shards in a pool
#[derive(Debug, Clone)]
pub struct ShardState {
    inner: Arc<ShardStateInner>,
}

#[derive(Debug)]
struct ShardStateInner {
    pool_id: u64,
    shards: DashMap<u64, ShardStateEntry>,
}

impl ShardState {
    /// Create a new shard state tracker
    pub fn new(pool_id: u64, shard_ids: impl Iterator<Item = u64>) -> Self {
        let shards = DashMap::new();
        for shard_id in shard_ids {
            shards.insert(shard_id, ShardStateEntry::default());
        }

        Self {
            inner: Arc::new(ShardStateInner { pool_id, shards }),
        }
    }

    /// Get the pool ID
    pub fn pool_id(&self) -> u64 {
        self.inner.pool_id
    }

    /// Update shard health
    pub fn set_health(&self, shard_id: u64, health: ShardHealth) {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.health = health;
        }
    }

    /// Replace a shard's guild count, returning the new value
    pub fn set_guilds(&self, shard_id: u64, count: u64) -> u64 {
        if let Some(mut entry) = self.inner.shards.get_mut(&shard_id) {
            entry.guilds = count;
        }
        count
    }

    /// Adjust a shard's guild count by one, returning the new value
    pub fn adjust_guilds(&self, shard_id: u64, joined: bool) -> u64 {
        match self.inner.shards.get_mut(&shard_id) {
            Some(mut entry) => {
                entry.guilds = if joined {
                    entry.guilds + 1
                } else {
                    entry.guilds.saturating_sub(1)
                };
                entry.guilds
            }
            None => 0,
        }
    }

    /// Increment event received counter
    pub fn record_event(&self, shard_id: u64) {
        if let Some(entry) = self.inner.shards.get(&shard_id) {
            entry.events_received.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Increment event dispatched counter
    pub fn record_dispatch(&self, shard_id: u64) {
        if let Some(entry) = self.inner.shards.get(&shard_id) {
            entry.events_dispatched.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Increment dispatch failure counter
    pub fn record_dispatch_failure(&self, shard_id: u64) {
        if let Some(entry) = self.inner.shards.get(&shard_id) {
            entry.dispatch_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Get health for a specific shard
    pub fn get_health(&self, shard_id: u64) -> Option<ShardHealth> {
        self.inner.shards.get(&shard_id).map(|e| e.health)
    }

    /// Get total events received across all shards
    pub fn total_events_received(&self) -> u64 {
        self.inner
            .shards
            .iter()
            .map(|e| e.events_received.load(Ordering::Relaxed))
            .sum()
    }

    /// Get total events dispatched across all shards
    pub fn total_events_dispatched(&self) -> u64 {
        self.inner
            .shards
            .iter()
            .map(|e| e.events_dispatched.load(Ordering::Relaxed))
            .sum()
    }

    /// Get total dispatch failures across all shards
    pub fn total_dispatch_failures(&self) -> u64 {
        self.inner
            .shards
            .iter()
            .map(|e| e.dispatch_failures.load(Ordering::Relaxed))
            .sum()
    }

    /// Get total guilds across all shards
    pub fn total_guilds(&self) -> u64 {
        self.inner.shards.iter().map(|e| e.guilds).sum()
    }

    /// Get count of ready shards
    pub fn ready_shards(&self) -> usize {
        self.inner
            .shards
            .iter()
            .filter(|e| e.health.is_ready())
            .count()
    }

    /// Get total shard count in this pool
    pub fn shard_count(&self) -> usize {
        self.inner.shards.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_and_counters() {
        let state = ShardState::new(1, [25, 26].into_iter());
        assert_eq!(state.shard_count(), 2);
        assert_eq!(state.ready_shards(), 0);

        state.set_health(25, ShardHealth::Ready);
        assert_eq!(state.get_health(25), Some(ShardHealth::Ready));
        assert_eq!(state.ready_shards(), 1);

        state.record_event(25);
        state.record_event(26);
        state.record_dispatch(25);
        state.record_dispatch_failure(26);
        assert_eq!(state.total_events_received(), 2);
        assert_eq!(state.total_events_dispatched(), 1);
        assert_eq!(state.total_dispatch_failures(), 1);

        // Unknown shards are ignored
        state.record_event(99);
        assert_eq!(state.get_health(99), None);
        assert_eq!(state.total_events_received(), 2);
    }

    #[test]
    fn test_guild_counts_are_per_shard() {
        let state = ShardState::new(0, [0, 1].into_iter());
        state.set_guilds(0, 10);
        assert_eq!(state.adjust_guilds(1, true), 1);
        assert_eq!(state.adjust_guilds(0, false), 9);
        assert_eq!(state.total_guilds(), 10);

        // Never underflows
        assert_eq!(state.adjust_guilds(1, false), 0);
        assert_eq!(state.adjust_guilds(1, false), 0);
    }
}
