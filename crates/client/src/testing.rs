//! In-memory transport doubles.
//!
//! Compiled for this crate's tests and, with the `test-support` feature,
//! for downstream crates. Every double counts the calls made on it so
//! tests can assert that each transport was started and closed exactly
//! once. None of them call back into a sink from `cancel`, `close` or
//! `start_polling`; events are only delivered when a test pushes them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use quill_core::request::GenerateRequest;
use quill_core::types::{CycleId, JobId};
use quill_core::update::StatusReport;

use crate::api::JobApi;
use crate::error::TransportError;
use crate::messages::GenerateResponse;
use crate::transport::{
    Cancelable, EventSink, EventTarget, PollAdapter, StreamAdapter, StreamHandle, TransportEvent,
};

// ---------------------------------------------------------------------------
// FakeJobApi
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeApiState {
    created: u64,
    fail_next_create: Option<String>,
    statuses: VecDeque<StatusReport>,
}

/// Scripted [`JobApi`].
///
/// `create_job` mints `job-1`, `job-2`, ... in call order. `poll_status`
/// pops the queued reports and fails once the queue is empty.
#[derive(Default)]
pub struct FakeJobApi {
    state: Mutex<FakeApiState>,
    create_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    creates_paused: AtomicBool,
    create_gate: Notify,
}

impl FakeJobApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the report returned by the next successful poll.
    pub fn push_status(&self, report: StatusReport) {
        self.state.lock().statuses.push_back(report);
    }

    /// Make the next `create_job` call fail with `message`.
    pub fn fail_next_create(&self, message: impl Into<String>) {
        self.state.lock().fail_next_create = Some(message.into());
    }

    /// Hold every `create_job` call until [`release_create`](Self::release_create).
    pub fn pause_creates(&self) {
        self.creates_paused.store(true, Ordering::SeqCst);
    }

    /// Let one held `create_job` call finish and stop holding new ones.
    pub fn release_create(&self) {
        self.creates_paused.store(false, Ordering::SeqCst);
        self.create_gate.notify_one();
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobApi for FakeJobApi {
    async fn create_job(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse, TransportError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.creates_paused.load(Ordering::SeqCst) {
            self.create_gate.notified().await;
        }

        let mut state = self.state.lock();
        if let Some(message) = state.fail_next_create.take() {
            return Err(TransportError::Connection(message));
        }
        state.created += 1;
        Ok(GenerateResponse {
            job_id: JobId::new(format!("job-{}", state.created)),
            status: "queued".to_string(),
            message: format!("Content generation started for: {}", request.topic),
        })
    }

    async fn poll_status(&self, _job_id: &JobId) -> Result<StatusReport, TransportError> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.state
            .lock()
            .statuses
            .pop_front()
            .ok_or_else(|| TransportError::Connection("no status queued".to_string()))
    }
}

// ---------------------------------------------------------------------------
// FakePoller
// ---------------------------------------------------------------------------

/// [`PollAdapter`] that records its sinks instead of polling.
#[derive(Default)]
pub struct FakePoller {
    sinks: Mutex<Vec<(JobId, Duration, EventSink)>>,
    cancel_calls: Arc<AtomicUsize>,
}

impl FakePoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink of the most recent `start_polling` call.
    pub fn sink(&self) -> Option<EventSink> {
        self.sinks.lock().last().map(|(_, _, sink)| sink.clone())
    }

    /// Job and interval of the most recent `start_polling` call.
    pub fn last_started(&self) -> Option<(JobId, Duration)> {
        self.sinks
            .lock()
            .last()
            .map(|(job_id, interval, _)| (job_id.clone(), *interval))
    }

    pub fn start_calls(&self) -> usize {
        self.sinks.lock().len()
    }

    /// Total `cancel` calls across every handle this poller returned.
    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

impl PollAdapter for FakePoller {
    fn start_polling(
        &self,
        job_id: &JobId,
        interval: Duration,
        sink: EventSink,
    ) -> Box<dyn Cancelable> {
        self.sinks.lock().push((job_id.clone(), interval, sink));
        Box::new(FakePollHandle {
            cancel_calls: Arc::clone(&self.cancel_calls),
        })
    }
}

struct FakePollHandle {
    cancel_calls: Arc<AtomicUsize>,
}

impl Cancelable for FakePollHandle {
    fn cancel(&self) {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// FakeStream
// ---------------------------------------------------------------------------

/// [`StreamHandle`] that records outbound frames.
#[derive(Default)]
pub struct FakeStreamHandle {
    sent: Mutex<Vec<String>>,
    send_attempts: AtomicUsize,
    close_calls: AtomicUsize,
    closed: AtomicBool,
    fail_sends: AtomicBool,
}

impl FakeStreamHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `send` fail.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Frames accepted so far.
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl StreamHandle for FakeStreamHandle {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.is_closed() || self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.lock().push(text.to_string());
        Ok(())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// [`StreamAdapter`] handing out [`FakeStreamHandle`]s.
#[derive(Default)]
pub struct FakeStream {
    opened: Mutex<Vec<(EventSink, Arc<FakeStreamHandle>)>>,
    fail_open: AtomicBool,
}

impl FakeStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `open_stream` call fail.
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn open_calls(&self) -> usize {
        self.opened.lock().len()
    }

    /// Sink of the most recently opened stream.
    pub fn sink(&self) -> Option<EventSink> {
        self.opened.lock().last().map(|(sink, _)| sink.clone())
    }

    /// Handle of the most recently opened stream.
    pub fn handle(&self) -> Option<Arc<FakeStreamHandle>> {
        self.opened.lock().last().map(|(_, handle)| Arc::clone(handle))
    }

    /// Total `close` calls across every opened stream.
    pub fn close_calls(&self) -> usize {
        self.opened
            .lock()
            .iter()
            .map(|(_, handle)| handle.close_calls())
            .sum()
    }
}

#[async_trait]
impl StreamAdapter for FakeStream {
    async fn open_stream(
        &self,
        job_id: &JobId,
        sink: EventSink,
    ) -> Result<Arc<dyn StreamHandle>, TransportError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(TransportError::Connection(format!(
                "stream for {job_id} refused"
            )));
        }
        let handle = Arc::new(FakeStreamHandle::new());
        self.opened.lock().push((sink, Arc::clone(&handle)));
        Ok(handle)
    }
}

// ---------------------------------------------------------------------------
// RecordingTarget
// ---------------------------------------------------------------------------

/// [`EventTarget`] that keeps every delivered event.
#[derive(Default)]
pub struct RecordingTarget {
    events: Mutex<Vec<(CycleId, TransportEvent)>>,
}

impl RecordingTarget {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A sink for `cycle` that reports into this target.
    pub fn sink(self: &Arc<Self>, cycle: CycleId) -> EventSink {
        let weak = Arc::downgrade(self);
        let target: Weak<dyn EventTarget> = weak;
        EventSink::new(cycle, target)
    }

    pub fn events(&self) -> Vec<(CycleId, TransportEvent)> {
        self.events.lock().clone()
    }
}

impl EventTarget for RecordingTarget {
    fn deliver(&self, cycle: CycleId, event: TransportEvent) {
        self.events.lock().push((cycle, event));
    }
}
