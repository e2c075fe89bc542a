use quill_core::error::CoreError;
use quill_core::types::JobId;

/// Failures of a single transport operation (HTTP call or stream).
///
/// These are transient from the tracker's point of view: poll failures
/// are retried on the next tick and stream failures are reported as
/// diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// A response or frame could not be decoded.
    #[error("Malformed response: {0}")]
    Decode(String),

    /// Failed to establish the job stream.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The stream has already been closed.
    #[error("Stream closed")]
    Closed,
}

/// Errors surfaced by [`GenerationTracker`](crate::tracker::GenerationTracker).
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// A cycle is already running; the new request was not sent.
    #[error("A generation is already in progress")]
    RequestRejected { job_id: Option<JobId> },

    /// The request failed validation before any network call.
    #[error("Invalid generation request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The job reached the `failed` phase.
    #[error("Generation failed: {0}")]
    JobFailed(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    /// The cycle was reset before it produced a result.
    #[error("Generation was cancelled")]
    Cancelled,

    /// The tracker has been disposed and accepts no more work.
    #[error("Tracker has been disposed")]
    Disposed,
}

impl From<CoreError> for SyncError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Validation(msg) => SyncError::InvalidRequest(msg),
            CoreError::InvariantViolation(msg) => SyncError::InvariantViolation(msg),
            CoreError::UnknownPhase(phase) => {
                SyncError::Transport(TransportError::Decode(format!("unknown phase {phase:?}")))
            }
        }
    }
}
