//! Event handling module
//!
//! Resolves gateway events into snapshots, formats them into views and
//! publishes them to socket.io rooms.

pub mod cache;
pub mod format;
pub mod handler;
pub mod kind;
pub mod resolve;
pub mod snapshot;

pub use cache::RelayCache;
pub use handler::{dispatch, GatewayHandler, RoomPublisher};
pub use kind::EventKind;
pub use resolve::{apply, build_cache, RelayEvent};
