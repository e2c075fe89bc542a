//! Fixed-interval status polling over a [`JobApi`].
//!
//! Each failed request is reported to the sink and retried on the next
//! tick; deciding when too many failures end the job is left to the
//! reconciler.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use quill_core::types::JobId;

use crate::api::JobApi;
use crate::transport::{Cancelable, EventSink, PollAdapter};

/// [`PollAdapter`] that spawns one Tokio task per polled job.
pub struct IntervalPoller {
    api: Arc<dyn JobApi>,
}

impl IntervalPoller {
    pub fn new(api: Arc<dyn JobApi>) -> Self {
        Self { api }
    }
}

impl PollAdapter for IntervalPoller {
    fn start_polling(
        &self,
        job_id: &JobId,
        interval: Duration,
        sink: EventSink,
    ) -> Box<dyn Cancelable> {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_poll_loop(
            Arc::clone(&self.api),
            job_id.clone(),
            interval,
            sink,
            cancel.clone(),
        ));
        Box::new(PollTask { cancel, task })
    }
}

/// Handle to a running poll loop.
struct PollTask {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Cancelable for PollTask {
    fn cancel(&self) {
        self.cancel.cancel();
        self.task.abort();
    }
}

/// Poll until cancelled or until the backend reports a terminal phase.
async fn run_poll_loop(
    api: Arc<dyn JobApi>,
    job_id: JobId,
    interval: Duration,
    sink: EventSink,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::debug!(
        job_id = %job_id,
        cycle = %sink.cycle(),
        interval_ms = interval.as_millis() as u64,
        "Status polling started",
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            result = api.poll_status(&job_id) => result,
        };

        match result {
            Ok(report) => {
                let terminal = report.phase.is_terminal();
                tracing::debug!(
                    job_id = %job_id,
                    phase = %report.phase,
                    progress = report.progress,
                    "Polled job status",
                );
                sink.status(report);
                if terminal {
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "Status poll failed");
                sink.poll_failed(e);
            }
        }
    }

    tracing::debug!(job_id = %job_id, "Status polling stopped");
}

#[cfg(test)]
mod tests {
    use quill_core::job::Phase;
    use quill_core::types::CycleId;
    use quill_core::update::{ChannelUpdate, StatusReport};

    use super::*;
    use crate::testing::{FakeJobApi, RecordingTarget};
    use crate::transport::TransportEvent;

    #[tokio::test(start_paused = true)]
    async fn polls_once_per_interval() {
        let api = Arc::new(FakeJobApi::new());
        for progress in [10, 20, 30] {
            api.push_status(StatusReport::new(Phase::Processing, progress));
        }
        let target = RecordingTarget::new();
        let poller = IntervalPoller::new(api.clone());

        let handle = poller.start_polling(
            &JobId::new("job-1"),
            Duration::from_secs(2),
            target.sink(CycleId(1)),
        );

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert_eq!(api.poll_calls(), 0, "first poll waits one interval");

        tokio::time::sleep(Duration::from_millis(4_200)).await;
        assert_eq!(api.poll_calls(), 3);
        handle.cancel();

        let progress: Vec<u8> = target
            .events()
            .into_iter()
            .filter_map(|(_, event)| match event {
                TransportEvent::Update(ChannelUpdate::Poll(report)) => Some(report.progress),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![10, 20, 30]);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_reported_and_retried() {
        let api = Arc::new(FakeJobApi::new());
        let target = RecordingTarget::new();
        let poller = IntervalPoller::new(api.clone());

        let handle = poller.start_polling(
            &JobId::new("job-1"),
            Duration::from_secs(1),
            target.sink(CycleId(7)),
        );
        tokio::time::sleep(Duration::from_millis(2_500)).await;
        handle.cancel();

        let events = target.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|(cycle, event)| *cycle == CycleId(7)
            && matches!(event, TransportEvent::Update(ChannelUpdate::PollFailed(_)))));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_terminal_report() {
        let api = Arc::new(FakeJobApi::new());
        api.push_status(StatusReport::new(Phase::Completed, 100));
        api.push_status(StatusReport::new(Phase::Completed, 100));
        let target = RecordingTarget::new();
        let poller = IntervalPoller::new(api.clone());

        let _handle = poller.start_polling(
            &JobId::new("job-1"),
            Duration::from_secs(1),
            target.sink(CycleId(1)),
        );
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(api.poll_calls(), 1);
        assert_eq!(target.events().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_polling_and_is_idempotent() {
        let api = Arc::new(FakeJobApi::new());
        let target = RecordingTarget::new();
        let poller = IntervalPoller::new(api.clone());

        let handle = poller.start_polling(
            &JobId::new("job-1"),
            Duration::from_secs(1),
            target.sink(CycleId(1)),
        );
        handle.cancel();
        handle.cancel();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(api.poll_calls(), 0);
        assert!(target.events().is_empty());
    }
}
