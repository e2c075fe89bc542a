//! Transport adapter contracts.
//!
//! The tracker never talks to a socket or timer directly. It starts a
//! [`PollAdapter`] and a [`StreamAdapter`] per cycle and hands each an
//! [`EventSink`] tagged with that cycle. Adapters report back through the
//! sink; the handles they return are how the tracker tears them down.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;

use quill_core::types::{CycleId, JobId};
use quill_core::update::{ChannelUpdate, StatusReport, StreamUpdate};

use crate::error::TransportError;

/// Something the tracker can stop. Stopping twice is a no-op.
pub trait Cancelable: Send + Sync {
    fn cancel(&self);
}

/// Outbound half of an open job stream.
pub trait StreamHandle: Send + Sync {
    /// Queue a text frame for sending.
    fn send(&self, text: &str) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is a no-op.
    fn close(&self);
}

/// Starts periodic status polling for a job.
pub trait PollAdapter: Send + Sync {
    /// Poll `job_id` every `interval`, reporting each result to `sink`.
    /// The first poll happens one interval after the call.
    fn start_polling(
        &self,
        job_id: &JobId,
        interval: Duration,
        sink: EventSink,
    ) -> Box<dyn Cancelable>;
}

/// Opens the push channel for a job.
#[async_trait]
pub trait StreamAdapter: Send + Sync {
    async fn open_stream(
        &self,
        job_id: &JobId,
        sink: EventSink,
    ) -> Result<Arc<dyn StreamHandle>, TransportError>;
}

/// What an adapter can report.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Update(ChannelUpdate),
    /// The stream connection ended (remote close or read failure).
    StreamClosed,
}

/// Receiver of adapter events.
pub trait EventTarget: Send + Sync {
    fn deliver(&self, cycle: CycleId, event: TransportEvent);
}

/// Cycle-tagged callback handle given to adapters.
///
/// Holds only a weak reference to its target, so a running adapter never
/// keeps a dropped tracker alive; events sent after that are discarded.
#[derive(Clone)]
pub struct EventSink {
    cycle: CycleId,
    target: Weak<dyn EventTarget>,
}

impl EventSink {
    pub fn new(cycle: CycleId, target: Weak<dyn EventTarget>) -> Self {
        Self { cycle, target }
    }

    pub fn cycle(&self) -> CycleId {
        self.cycle
    }

    /// A poll request succeeded.
    pub fn status(&self, report: StatusReport) {
        self.emit(TransportEvent::Update(ChannelUpdate::Poll(report)));
    }

    /// A poll request failed.
    pub fn poll_failed(&self, error: impl fmt::Display) {
        self.emit(TransportEvent::Update(ChannelUpdate::PollFailed(error.to_string())));
    }

    /// The stream delivered a message.
    pub fn message(&self, update: StreamUpdate) {
        self.emit(TransportEvent::Update(ChannelUpdate::Stream(update)));
    }

    /// The stream reported an error.
    pub fn error(&self, error: impl fmt::Display) {
        self.emit(TransportEvent::Update(ChannelUpdate::StreamError(error.to_string())));
    }

    /// The stream connection ended.
    pub fn closed(&self) {
        self.emit(TransportEvent::StreamClosed);
    }

    fn emit(&self, event: TransportEvent) {
        match self.target.upgrade() {
            Some(target) => target.deliver(self.cycle, event),
            None => tracing::trace!(cycle = %self.cycle, "Dropping event for released tracker"),
        }
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink")
            .field("cycle", &self.cycle)
            .field("live", &(self.target.strong_count() > 0))
            .finish()
    }
}
