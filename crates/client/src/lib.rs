//! Client side of the content-generation backend.
//!
//! [`tracker::GenerationTracker`] creates a job over HTTP and follows it
//! over two channels at once: a fixed-interval status poll
//! ([`poller::IntervalPoller`]) and a WebSocket stream
//! ([`stream::WsStreamAdapter`]) kept alive by a [`heartbeat::Heartbeat`].
//! Updates from both are merged by `quill_core`'s reconciler and
//! published as [`tracker::TrackerSnapshot`]s.

pub mod api;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod messages;
pub mod poller;
pub mod stream;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod tracker;
pub mod transport;

pub use config::{ClientConfig, TrackerConfig};
pub use error::{SyncError, TransportError};
pub use tracker::{GenerationTracker, TrackerSnapshot};
