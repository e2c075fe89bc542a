//! Merges poll and stream updates into one [`JobView`].
//!
//! Both channels report phase and progress independently and may
//! disagree or arrive out of order. The reconciler keeps the view
//! monotonic:
//!
//! - a phase ranked below the held phase is ignored,
//! - progress only moves forward (reset to 0 only by [`Reconciler::reset`]),
//! - once the phase is terminal, every update is ignored until the next
//!   [`Reconciler::begin`] or [`Reconciler::reset`].
//!
//! Poll failures are counted; reaching the configured cap ends the job
//! as failed. Stream errors are surfaced as diagnostics only.

use crate::job::{GeneratedPost, JobView, Phase, MAX_PROGRESS};
use crate::job_events::DEFAULT_FAILURE_REASON;
use crate::log::{LogAccumulator, LogEntry};
use crate::types::JobId;
use crate::update::{ChannelUpdate, StatusReport, StreamUpdate};

/// Consecutive poll failures tolerated before the job is declared failed.
pub const DEFAULT_MAX_POLL_FAILURES: u32 = 3;

/// Effect of applying one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing observable changed.
    Unchanged,
    /// The view or log changed; the job is still running.
    Updated,
    /// The job entered a terminal phase with this update.
    Terminal,
    /// A non-fatal transport problem worth reporting to the consumer.
    Diagnostic(String),
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Outcome::Terminal)
    }
}

/// State machine behind a single tracked job.
#[derive(Debug, Clone)]
pub struct Reconciler {
    view: JobView,
    log: LogAccumulator,
    consecutive_poll_failures: u32,
    max_poll_failures: u32,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POLL_FAILURES)
    }
}

impl Reconciler {
    /// Create an idle reconciler. A cap of 0 is treated as 1.
    pub fn new(max_poll_failures: u32) -> Self {
        Self {
            view: JobView::default(),
            log: LogAccumulator::new(),
            consecutive_poll_failures: 0,
            max_poll_failures: max_poll_failures.max(1),
        }
    }

    pub fn view(&self) -> &JobView {
        &self.view
    }

    pub fn log(&self) -> &LogAccumulator {
        &self.log
    }

    pub fn consecutive_poll_failures(&self) -> u32 {
        self.consecutive_poll_failures
    }

    /// Start tracking a freshly created job. Clears everything held for
    /// a previous job.
    pub fn begin(&mut self, job_id: JobId) {
        self.reset();
        self.view.job_id = Some(job_id);
        self.view.phase = Phase::Queued;
        self.verify();
    }

    /// Return to idle: no job, progress 0, empty log.
    pub fn reset(&mut self) {
        self.view = JobView::default();
        self.log.clear();
        self.consecutive_poll_failures = 0;
    }

    /// Merge one transport event.
    pub fn apply(&mut self, update: ChannelUpdate) -> Outcome {
        if self.view.phase == Phase::Idle || self.view.is_terminal() {
            return Outcome::Unchanged;
        }

        match update {
            ChannelUpdate::Poll(report) => self.apply_poll(report),
            ChannelUpdate::PollFailed(error) => self.apply_poll_failure(error),
            ChannelUpdate::Stream(update) => self.apply_stream(update),
            ChannelUpdate::StreamError(error) => Outcome::Diagnostic(error),
        }
    }

    /// Fill in the result of a job that completed without one.
    ///
    /// This is the only write accepted after a terminal phase: it never
    /// touches phase, progress or failure, and an existing result is
    /// never replaced.
    pub fn attach_result(&mut self, result: GeneratedPost) -> Outcome {
        if self.view.phase != Phase::Completed || self.view.result.is_some() {
            return Outcome::Unchanged;
        }
        self.view.result = Some(result);
        self.verify();
        Outcome::Updated
    }

    // ---- private helpers ----

    fn apply_poll(&mut self, report: StatusReport) -> Outcome {
        self.consecutive_poll_failures = 0;
        let error = report.error;
        self.merge(
            Some(report.phase),
            Some(report.progress),
            report.result,
            || error.unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string()),
            false,
        )
    }

    fn apply_poll_failure(&mut self, error: String) -> Outcome {
        self.consecutive_poll_failures += 1;
        let failures = self.consecutive_poll_failures;

        if failures < self.max_poll_failures {
            return Outcome::Diagnostic(format!(
                "Status poll failed ({failures}/{}): {error}",
                self.max_poll_failures
            ));
        }

        tracing::warn!(
            job_id = ?self.view.job_id,
            failures,
            error = %error,
            "Poll failure cap reached, failing job",
        );
        self.view.phase = Phase::Failed;
        self.view.result = None;
        self.view.failure_reason = Some(format!(
            "Lost contact with job status after {failures} consecutive poll failures: {error}"
        ));
        self.verify();
        Outcome::Terminal
    }

    fn apply_stream(&mut self, update: StreamUpdate) -> Outcome {
        let mut logged = false;
        if let Some(message) = &update.message {
            logged = self.log.push(LogEntry {
                message: message.clone(),
                observed_at: update.received_at,
                reported_at: update.timestamp.clone(),
            });
        }

        let StreamUpdate {
            message,
            phase,
            progress,
            error,
            ..
        } = update;

        self.merge(
            phase,
            progress,
            None,
            || {
                error
                    .or(message.filter(|m| !m.is_empty()))
                    .unwrap_or_else(|| DEFAULT_FAILURE_REASON.to_string())
            },
            logged,
        )
    }

    fn merge(
        &mut self,
        phase: Option<Phase>,
        progress: Option<u8>,
        result: Option<GeneratedPost>,
        failure_reason: impl FnOnce() -> String,
        already_changed: bool,
    ) -> Outcome {
        let mut changed = already_changed;

        if let Some(progress) = progress.map(|p| p.min(MAX_PROGRESS)) {
            if progress > self.view.progress {
                self.view.progress = progress;
                changed = true;
            }
        }

        if let Some(next) = phase {
            if next.rank() > self.view.phase.rank() {
                tracing::debug!(
                    job_id = ?self.view.job_id,
                    from = %self.view.phase,
                    to = %next,
                    "Job phase advanced",
                );
                self.view.phase = next;
                changed = true;
                match next {
                    Phase::Completed => self.view.result = result,
                    Phase::Failed => self.view.failure_reason = Some(failure_reason()),
                    _ => {}
                }
            }
        }

        if !changed {
            return Outcome::Unchanged;
        }
        self.verify();
        if self.view.is_terminal() {
            Outcome::Terminal
        } else {
            Outcome::Updated
        }
    }

    fn verify(&self) {
        if let Err(e) = self.view.check_invariants() {
            tracing::error!(error = %e, view = ?self.view, "Job view invariant violated");
            debug_assert!(false, "{e}");
        }
    }
}
