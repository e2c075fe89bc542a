//! Inputs to the [`Reconciler`](crate::reconciler::Reconciler), one per
//! kind of transport event.

use crate::job::{GeneratedPost, Phase};
use crate::types::Timestamp;

/// Coarse job status returned by one poll request.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub phase: Phase,
    pub progress: u8,
    pub result: Option<GeneratedPost>,
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(phase: Phase, progress: u8) -> Self {
        Self {
            phase,
            progress,
            result: None,
            error: None,
        }
    }

    pub fn with_result(mut self, result: GeneratedPost) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// One message pushed over the stream channel. Every field is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamUpdate {
    pub message: Option<String>,
    /// Raw backend timestamp for `message`.
    pub timestamp: Option<String>,
    pub phase: Option<Phase>,
    pub progress: Option<u8>,
    pub error: Option<String>,
    /// Arrival time, stamped by the receiving side.
    pub received_at: Timestamp,
}

impl StreamUpdate {
    pub fn new(received_at: Timestamp) -> Self {
        Self {
            message: None,
            timestamp: None,
            phase: None,
            progress: None,
            error: None,
            received_at,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_phase(mut self, phase: Phase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// A transport event, tagged by the channel it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    /// A poll request succeeded.
    Poll(StatusReport),
    /// A poll request failed; carries the transport error text.
    PollFailed(String),
    /// The stream delivered a message.
    Stream(StreamUpdate),
    /// The stream reported an error. Never fatal on its own.
    StreamError(String),
}

/// Clamp a wire progress value into `0..=100`.
pub fn clamp_progress(value: f64) -> u8 {
    if value.is_nan() || value <= 0.0 {
        0
    } else if value >= 100.0 {
        100
    } else {
        value as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_progress_bounds() {
        assert_eq!(clamp_progress(-5.0), 0);
        assert_eq!(clamp_progress(f64::NAN), 0);
        assert_eq!(clamp_progress(42.9), 42);
        assert_eq!(clamp_progress(250.0), 100);
    }
}
