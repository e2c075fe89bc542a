//! Keepalive pings on an open job stream.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use quill_core::job_events::MSG_PING;
use quill_core::types::JobId;

use crate::transport::StreamHandle;

/// Periodic keepalive on an open job stream.
///
/// Sends [`MSG_PING`] every `period`, independent of job progress. Send
/// failures are logged and otherwise ignored: the poll channel decides
/// whether the job is still alive. The task stops when the handle is
/// stopped or dropped.
pub struct Heartbeat {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Heartbeat {
    pub fn start(stream: Arc<dyn StreamHandle>, period: Duration, job_id: JobId) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        match stream.send(MSG_PING) {
                            Ok(()) => tracing::debug!(job_id = %job_id, "Job stream heartbeat"),
                            Err(e) => tracing::debug!(
                                job_id = %job_id,
                                error = %e,
                                "Heartbeat not sent",
                            ),
                        }
                    }
                }
            }
        });

        Self { cancel, task }
    }

    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.task.abort();
    }
}
