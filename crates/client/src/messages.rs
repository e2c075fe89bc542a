//! Backend wire types and the job-stream frame parser.
//!
//! The poll endpoint returns a full job record; the stream pushes loose
//! JSON objects where any field may be missing, plus a
//! `{"type": "keepalive"}` frame and the plain-text `pong` reply.

use serde::{Deserialize, Serialize};

use quill_core::job::{GeneratedPost, Phase};
use quill_core::job_events::{MSG_PONG, MSG_TYPE_KEEPALIVE};
use quill_core::types::{JobId, Timestamp};
use quill_core::update::{clamp_progress, StatusReport, StreamUpdate};

use crate::error::TransportError;

/// Response of `POST /generate/`.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateResponse {
    pub job_id: JobId,
    pub status: String,
    pub message: String,
}

/// One line of the backend's own job log, as returned by the poll
/// endpoint. The tracker takes its log from the stream instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobLogLine {
    pub message: String,
    pub timestamp: String,
}

/// Response of `GET /generate/status/{job_id}` and items of
/// `GET /generate/jobs`.
#[derive(Debug, Clone, Deserialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub status: String,
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub result: Option<GeneratedPost>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub logs: Vec<JobLogLine>,
}

impl JobStatusResponse {
    /// Reduce the record to the fields the reconciler consumes.
    pub fn into_report(self) -> Result<StatusReport, TransportError> {
        let phase: Phase = self
            .status
            .parse()
            .map_err(|e| TransportError::Decode(format!("job {}: {e}", self.job_id)))?;
        Ok(StatusReport {
            phase,
            progress: clamp_progress(self.progress),
            result: self.result,
            error: self.error,
        })
    }
}

/// Response of `DELETE /generate/jobs/{job_id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeleteJobResponse {
    pub message: String,
}

/// Raw JSON frame from the job stream.
#[derive(Debug, Clone, Deserialize)]
struct StreamFrame {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<f64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A decoded job-stream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Status and/or narrative update.
    Update(StreamUpdate),
    /// Idle keepalive from the backend.
    Keepalive,
    /// Reply to our `ping`.
    Pong,
}

/// Parse a text frame from the job stream.
///
/// Status strings the tracker does not know (the backend sends
/// `"unknown"` for jobs it has lost) are treated as absent.
pub fn parse_stream_message(
    text: &str,
    received_at: Timestamp,
) -> Result<StreamMessage, serde_json::Error> {
    if text.trim() == MSG_PONG {
        return Ok(StreamMessage::Pong);
    }

    let frame: StreamFrame = serde_json::from_str(text)?;
    if frame.kind.as_deref() == Some(MSG_TYPE_KEEPALIVE) {
        return Ok(StreamMessage::Keepalive);
    }

    let mut update = StreamUpdate::new(received_at);
    update.message = frame.message;
    update.timestamp = frame.timestamp;
    update.phase = frame.status.and_then(|s| s.parse::<Phase>().ok());
    update.progress = frame.progress.map(clamp_progress);
    update.error = frame.error;
    Ok(StreamMessage::Update(update))
}
