//! Shard management module
//!
//! Runs Twilight shards in pools and feeds their events to the relay

mod pool;
mod state;

pub use pool::{pool_shard_range, ShardPool, ShutdownHandle, SHARDS_PER_POOL};
pub use state::{ShardHealth, ShardState};
