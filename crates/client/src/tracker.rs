//! Lifecycle controller for generation jobs.
//!
//! A [`GenerationTracker`] runs at most one cycle at a time. A cycle
//! starts with [`GenerationTracker::start`] and ends when the job reaches
//! a terminal phase or the tracker is reset. During a cycle the tracker
//! owns three transports: the poll task, the job stream, and the stream
//! heartbeat. All of them are released through one teardown path,
//! which takes each handle out of its slot so nothing is closed twice.
//!
//! Adapter events arrive through an [`EventSink`] tagged with the cycle
//! that created it. Events are merged under a single lock, and the
//! resulting [`TrackerSnapshot`] is published on a `watch` channel while
//! that lock is still held, so subscribers see snapshots in merge order.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use quill_core::job::{GeneratedPost, JobView, Phase};
use quill_core::job_events::{DEFAULT_FAILURE_REASON, START_FAILURE_PREFIX};
use quill_core::log::LogEntry;
use quill_core::reconciler::{Outcome, Reconciler};
use quill_core::request::GenerateRequest;
use quill_core::types::{CycleId, JobId};
use quill_core::update::{ChannelUpdate, StatusReport};

use crate::api::{HttpJobApi, JobApi};
use crate::config::{ClientConfig, TrackerConfig};
use crate::error::{SyncError, TransportError};
use crate::heartbeat::Heartbeat;
use crate::poller::IntervalPoller;
use crate::stream::WsStreamAdapter;
use crate::transport::{
    Cancelable, EventSink, EventTarget, PollAdapter, StreamAdapter, StreamHandle, TransportEvent,
};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything a consumer needs to render the current job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackerSnapshot {
    pub view: JobView,
    pub logs: Vec<LogEntry>,
    /// A cycle is running: from `start` until a terminal phase or reset.
    pub is_generating: bool,
    /// The job completed over the stream and its result is still being
    /// fetched.
    pub awaiting_result: bool,
    /// User-visible error: the failure reason, or why the job could not
    /// be created.
    pub error: Option<String>,
    /// Latest non-fatal transport problem.
    pub transport_warning: Option<String>,
}

impl TrackerSnapshot {
    pub fn progress(&self) -> u8 {
        self.view.progress()
    }

    /// Nothing further will change without a new `start` or `reset`.
    pub fn is_settled(&self) -> bool {
        !self.is_generating && !self.awaiting_result
    }

    /// Convert a settled snapshot into the outcome of its cycle.
    ///
    /// A completed job yields its result (which may be absent if the
    /// backend never reported one). A failed job, or a cycle that could
    /// not be started, yields [`SyncError::JobFailed`]. Anything else was
    /// abandoned and yields [`SyncError::Cancelled`].
    pub fn into_result(self) -> Result<Option<GeneratedPost>, SyncError> {
        match self.view.phase {
            Phase::Completed => Ok(self.view.result),
            Phase::Failed => Err(SyncError::JobFailed(
                self.view
                    .failure_reason
                    .or(self.error)
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
            )),
            _ => match self.error {
                Some(error) => Err(SyncError::JobFailed(error)),
                None => Err(SyncError::Cancelled),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Cycle state
// ---------------------------------------------------------------------------

/// Transport handles owned by one cycle.
#[derive(Default)]
struct Transports {
    poll: Option<Box<dyn Cancelable>>,
    stream: Option<Arc<dyn StreamHandle>>,
    heartbeat: Option<Heartbeat>,
}

impl Transports {
    fn close_stream(&mut self) {
        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.stop();
        }
        if let Some(stream) = self.stream.take() {
            stream.close();
        }
    }

    fn close_all(&mut self) {
        if let Some(poll) = self.poll.take() {
            poll.cancel();
        }
        self.close_stream();
    }
}

struct ActiveCycle {
    id: CycleId,
    job_id: Option<JobId>,
    transports: Transports,
    /// Reached a terminal phase. Kept around so a late result fetch can
    /// still find its cycle.
    finished: bool,
}

struct TrackerState {
    reconciler: Reconciler,
    last_cycle: CycleId,
    active: Option<ActiveCycle>,
    error: Option<String>,
    transport_warning: Option<String>,
    awaiting_result: bool,
    disposed: bool,
}

impl TrackerState {
    fn new(max_poll_failures: u32) -> Self {
        Self {
            reconciler: Reconciler::new(max_poll_failures),
            last_cycle: CycleId(0),
            active: None,
            error: None,
            transport_warning: None,
            awaiting_result: false,
            disposed: false,
        }
    }

    fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            view: self.reconciler.view().clone(),
            logs: self.reconciler.log().entries().to_vec(),
            is_generating: self.active.as_ref().is_some_and(|a| !a.finished),
            awaiting_result: self.awaiting_result,
            error: self.error.clone(),
            transport_warning: self.transport_warning.clone(),
        }
    }

    /// `cycle` is the tracker's current cycle, finished or not.
    fn is_current(&self, cycle: CycleId) -> bool {
        self.active.as_ref().is_some_and(|a| a.id == cycle)
    }

    /// The current cycle, if it is `cycle` and still running.
    fn live_cycle(&mut self, cycle: CycleId) -> Option<&mut ActiveCycle> {
        self.active
            .as_mut()
            .filter(|a| a.id == cycle && !a.finished)
    }

    fn teardown(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.transports.close_all();
        }
        self.reconciler.reset();
        self.error = None;
        self.transport_warning = None;
        self.awaiting_result = false;
    }
}

/// Releases a cycle whose `start` future is dropped before setup finishes.
struct StartGuard<'a> {
    core: &'a TrackerCore,
    cycle: CycleId,
}

impl StartGuard<'_> {
    fn disarm(self) {
        std::mem::forget(self);
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.core.abandon_cycle(self.cycle);
    }
}

// ---------------------------------------------------------------------------
// TrackerCore
// ---------------------------------------------------------------------------

/// Shared state behind a [`GenerationTracker`]. Adapters reach it only
/// through weak references held by their sinks.
struct TrackerCore {
    me: Weak<TrackerCore>,
    api: Arc<dyn JobApi>,
    poller: Arc<dyn PollAdapter>,
    streams: Arc<dyn StreamAdapter>,
    config: TrackerConfig,
    state: Mutex<TrackerState>,
    snapshots: watch::Sender<TrackerSnapshot>,
    disposed: CancellationToken,
}

impl TrackerCore {
    fn sink(&self, cycle: CycleId) -> EventSink {
        let target: Weak<dyn EventTarget> = self.me.clone();
        EventSink::new(cycle, target)
    }

    fn publish(&self, state: &TrackerState) {
        self.snapshots.send_replace(state.snapshot());
    }

    /// Open a new cycle, replacing a finished one.
    fn open_cycle(&self) -> Result<CycleId, SyncError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(SyncError::Disposed);
        }
        if let Some(active) = state.active.as_ref().filter(|a| !a.finished) {
            return Err(SyncError::RequestRejected {
                job_id: active.job_id.clone(),
            });
        }

        state.teardown();
        let cycle = state.last_cycle.next();
        state.last_cycle = cycle;
        state.active = Some(ActiveCycle {
            id: cycle,
            job_id: None,
            transports: Transports::default(),
            finished: false,
        });
        self.publish(&state);
        Ok(cycle)
    }

    /// Job creation failed: end the cycle with a user-visible error.
    fn abort_cycle(&self, cycle: CycleId, error: &TransportError) {
        let mut state = self.state.lock();
        if !state.is_current(cycle) {
            return;
        }
        state.active = None;
        state.reconciler.reset();
        state.error = Some(format!("{START_FAILURE_PREFIX}: {error}"));
        self.publish(&state);
    }

    /// The caller driving `cycle` went away before it was fully set up.
    fn abandon_cycle(&self, cycle: CycleId) {
        let mut state = self.state.lock();
        if state.live_cycle(cycle).is_none() {
            return;
        }
        tracing::debug!(cycle = %cycle, "Start was dropped, releasing cycle");
        state.teardown();
        if !state.disposed {
            self.publish(&state);
        }
    }

    fn adopt_job(&self, cycle: CycleId, job_id: &JobId) -> Result<(), SyncError> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(SyncError::Disposed);
        }
        let Some(active) = state.live_cycle(cycle) else {
            tracing::info!(
                cycle = %cycle,
                job_id = %job_id,
                "Cycle ended while the job was being created, abandoning job",
            );
            return Err(SyncError::Cancelled);
        };
        active.job_id = Some(job_id.clone());
        state.reconciler.begin(job_id.clone());
        self.publish(&state);
        Ok(())
    }

    fn start_polling(&self, cycle: CycleId, job_id: &JobId) {
        let handle = self
            .poller
            .start_polling(job_id, self.config.poll_interval, self.sink(cycle));

        let mut state = self.state.lock();
        match state.live_cycle(cycle) {
            Some(active) => active.transports.poll = Some(handle),
            None => handle.cancel(),
        }
    }

    async fn open_stream(&self, cycle: CycleId, job_id: &JobId) {
        match self.streams.open_stream(job_id, self.sink(cycle)).await {
            Ok(stream) => {
                let mut state = self.state.lock();
                match state.live_cycle(cycle) {
                    Some(active) => {
                        active.transports.heartbeat = Some(Heartbeat::start(
                            Arc::clone(&stream),
                            self.config.heartbeat_interval,
                            job_id.clone(),
                        ));
                        active.transports.stream = Some(stream);
                    }
                    None => stream.close(),
                }
            }
            Err(e) => {
                tracing::warn!(
                    cycle = %cycle,
                    job_id = %job_id,
                    error = %e,
                    "Job stream unavailable, relying on polling",
                );
                let mut state = self.state.lock();
                if state.live_cycle(cycle).is_some() {
                    state.transport_warning = Some(e.to_string());
                    self.publish(&state);
                }
            }
        }
    }

    fn merge(&self, state: &mut TrackerState, cycle: CycleId, update: ChannelUpdate) {
        match state.reconciler.apply(update) {
            Outcome::Unchanged => {}
            Outcome::Updated => self.publish(state),
            Outcome::Diagnostic(message) => {
                tracing::warn!(cycle = %cycle, warning = %message, "Transport problem");
                state.transport_warning = Some(message);
                self.publish(state);
            }
            Outcome::Terminal => self.finish_cycle(state, cycle),
        }
    }

    fn finish_cycle(&self, state: &mut TrackerState, cycle: CycleId) {
        if let Some(active) = state.active.as_mut() {
            active.finished = true;
            active.transports.close_all();
        }

        let view = state.reconciler.view().clone();
        match view.phase {
            Phase::Failed => {
                tracing::info!(
                    cycle = %cycle,
                    job_id = ?view.job_id,
                    reason = ?view.failure_reason,
                    "Generation failed",
                );
                state.error = view.failure_reason;
            }
            _ => {
                tracing::info!(cycle = %cycle, job_id = ?view.job_id, "Generation completed");
                if view.result.is_none() {
                    if let Some(job_id) = view.job_id {
                        state.awaiting_result = self.spawn_result_fetch(cycle, job_id);
                    }
                }
            }
        }
        self.publish(state);
    }

    /// Fetch the result of a job whose completion arrived over the stream.
    fn spawn_result_fetch(&self, cycle: CycleId, job_id: JobId) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(job_id = %job_id, "No runtime to fetch the job result on");
            return false;
        };

        let api = Arc::clone(&self.api);
        let me = self.me.clone();
        runtime.spawn(async move {
            let fetched = api.poll_status(&job_id).await;
            if let Some(core) = me.upgrade() {
                core.attach_result(cycle, &job_id, fetched);
            }
        });
        true
    }

    fn attach_result(
        &self,
        cycle: CycleId,
        job_id: &JobId,
        fetched: Result<StatusReport, TransportError>,
    ) {
        let mut state = self.state.lock();
        if state.disposed || !state.is_current(cycle) || !state.awaiting_result {
            return;
        }
        state.awaiting_result = false;

        match fetched {
            Ok(StatusReport {
                result: Some(result),
                ..
            }) => {
                state.reconciler.attach_result(result);
            }
            Ok(_) => {
                tracing::debug!(job_id = %job_id, "Completed job reported no result");
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Failed to fetch job result");
            }
        }
        self.publish(&state);
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.teardown();
        if !state.disposed {
            self.publish(&state);
        }
    }

    fn dispose(&self) {
        let mut state = self.state.lock();
        if state.disposed {
            return;
        }
        state.disposed = true;
        state.teardown();
        self.disposed.cancel();
    }
}

impl EventTarget for TrackerCore {
    fn deliver(&self, cycle: CycleId, event: TransportEvent) {
        let mut state = self.state.lock();
        if state.disposed || state.live_cycle(cycle).is_none() {
            tracing::trace!(cycle = %cycle, "Dropping event from inactive cycle");
            return;
        }

        match event {
            TransportEvent::StreamClosed => {
                tracing::debug!(cycle = %cycle, "Job stream ended, polling continues");
                if let Some(active) = state.live_cycle(cycle) {
                    active.transports.close_stream();
                }
            }
            TransportEvent::Update(update) => self.merge(&mut state, cycle, update),
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationTracker
// ---------------------------------------------------------------------------

/// Tracks one generation job at a time over a poll and a stream channel.
///
/// Dropping the tracker disposes it.
pub struct GenerationTracker {
    core: Arc<TrackerCore>,
}

impl GenerationTracker {
    pub fn new(
        api: Arc<dyn JobApi>,
        poller: Arc<dyn PollAdapter>,
        streams: Arc<dyn StreamAdapter>,
        config: TrackerConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(TrackerSnapshot::default());
        let core = Arc::new_cyclic(|me| TrackerCore {
            me: me.clone(),
            api,
            poller,
            streams,
            config,
            state: Mutex::new(TrackerState::new(config.max_poll_failures)),
            snapshots,
            disposed: CancellationToken::new(),
        });
        Self { core }
    }

    /// Tracker talking to a real backend over HTTP and WebSocket.
    pub fn connect(client: &ClientConfig, config: TrackerConfig) -> Self {
        let api: Arc<dyn JobApi> = Arc::new(HttpJobApi::new(client.api_url.clone()));
        let poller = Arc::new(IntervalPoller::new(Arc::clone(&api)));
        let streams = Arc::new(WsStreamAdapter::new(client.ws_url.clone()));
        Self::new(api, poller, streams, config)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.core.config
    }

    /// Create a job for `request` and start tracking it.
    ///
    /// Fails without a network call when the request is invalid, a cycle
    /// is already running, or the tracker was disposed. If the tracker is
    /// reset while the job is being created, the job is abandoned and
    /// [`SyncError::Cancelled`] is returned. A stream that cannot be
    /// opened is reported as a transport warning; polling still runs.
    /// Dropping the returned future before it resolves releases the cycle.
    pub async fn start(&self, request: &GenerateRequest) -> Result<JobId, SyncError> {
        request.check()?;
        let core = &self.core;

        let cycle = core.open_cycle()?;
        let guard = StartGuard {
            core: core.as_ref(),
            cycle,
        };
        tracing::info!(cycle = %cycle, topic = %request.topic, "Generation cycle started");

        let created = match core.api.create_job(request).await {
            Ok(created) => created,
            Err(e) => {
                tracing::warn!(cycle = %cycle, error = %e, "Failed to create generation job");
                core.abort_cycle(cycle, &e);
                return Err(e.into());
            }
        };
        let job_id = created.job_id;

        core.adopt_job(cycle, &job_id)?;
        core.start_polling(cycle, &job_id);
        core.open_stream(cycle, &job_id).await;
        guard.disarm();

        tracing::info!(cycle = %cycle, job_id = %job_id, "Tracking generation job");
        Ok(job_id)
    }

    /// Stop the current cycle and return to idle. Safe to call at any time.
    pub fn reset(&self) {
        self.core.reset();
        tracing::debug!("Tracker reset");
    }

    /// Stop everything for good. Later `start` calls fail with
    /// [`SyncError::Disposed`]; no further snapshots are published.
    pub fn dispose(&self) {
        self.core.dispose();
    }

    pub fn subscribe(&self) -> watch::Receiver<TrackerSnapshot> {
        self.core.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.core.snapshots.borrow().clone()
    }

    pub fn progress(&self) -> u8 {
        self.core.snapshots.borrow().progress()
    }

    pub fn is_generating(&self) -> bool {
        self.core.snapshots.borrow().is_generating
    }

    pub fn job_id(&self) -> Option<JobId> {
        self.core.snapshots.borrow().view.job_id.clone()
    }

    /// Wait until the current cycle settles and return its outcome.
    ///
    /// Returns at once when no cycle is running.
    pub async fn wait_for_terminal(&self) -> Result<Option<GeneratedPost>, SyncError> {
        let mut updates = self.subscribe();
        loop {
            if self.core.disposed.is_cancelled() {
                return Err(SyncError::Disposed);
            }
            {
                let snapshot = updates.borrow_and_update();
                if snapshot.is_settled() {
                    return snapshot.clone().into_result();
                }
            }
            tokio::select! {
                _ = self.core.disposed.cancelled() => return Err(SyncError::Disposed),
                changed = updates.changed() => {
                    if changed.is_err() {
                        return Err(SyncError::Disposed);
                    }
                }
            }
        }
    }
}

impl Drop for GenerationTracker {
    fn drop(&mut self) {
        self.core.dispose();
    }
}
