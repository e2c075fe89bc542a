//! Wire constants shared by the poll and stream channels.

/// Keepalive text frame sent by the client on the job stream.
pub const MSG_PING: &str = "ping";

/// Text reply the backend sends for every [`MSG_PING`].
pub const MSG_PONG: &str = "pong";

/// `type` tag of the backend's idle keepalive frame.
pub const MSG_TYPE_KEEPALIVE: &str = "keepalive";

/// Failure reason used when the backend reports `failed` without a cause.
pub const DEFAULT_FAILURE_REASON: &str = "Generation failed";

/// Prefix of the user-visible error when the job could not be created.
pub const START_FAILURE_PREFIX: &str = "Failed to start generation";
