//! Turns successive tracker snapshots into log lines.

use quill_client::tracker::TrackerSnapshot;
use quill_core::job::{GeneratedPost, Phase};
use quill_core::types::JobId;

/// One observable change between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    Started(JobId),
    Phase(Phase),
    Progress(u8),
    Log(String),
    Warning(String),
    Completed(Option<GeneratedPost>),
    Failed(String),
}

impl Change {
    pub fn log(&self) {
        match self {
            Change::Started(job_id) => tracing::info!(job_id = %job_id, "Job created"),
            Change::Phase(phase) => tracing::info!(phase = %phase, "Phase changed"),
            Change::Progress(progress) => tracing::info!(progress, "Progress"),
            Change::Log(message) => tracing::info!(message = %message, "Job log"),
            Change::Warning(warning) => tracing::warn!(warning = %warning, "Transport warning"),
            Change::Completed(Some(post)) => tracing::info!(
                title = ?post.title,
                word_count = ?post.word_count,
                file_path = ?post.file_path,
                "Post generated",
            ),
            Change::Completed(None) => tracing::info!("Job completed without a result"),
            Change::Failed(reason) => tracing::error!(reason = %reason, "Job failed"),
        }
    }
}

/// Remembers what has already been reported.
#[derive(Debug, Default)]
pub struct Reporter {
    job_id: Option<JobId>,
    phase: Phase,
    progress: u8,
    logs_seen: usize,
    warning: Option<String>,
    settled: bool,
}

impl Reporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Changes since the previously observed snapshot.
    pub fn observe(&mut self, snapshot: &TrackerSnapshot) -> Vec<Change> {
        let mut changes = Vec::new();
        let view = &snapshot.view;

        if view.job_id != self.job_id {
            *self = Self {
                job_id: view.job_id.clone(),
                ..Self::default()
            };
            if let Some(job_id) = &view.job_id {
                changes.push(Change::Started(job_id.clone()));
            }
        }

        if view.phase != self.phase && view.phase != Phase::Idle {
            self.phase = view.phase;
            changes.push(Change::Phase(view.phase));
        }

        if snapshot.progress() > self.progress {
            self.progress = snapshot.progress();
            changes.push(Change::Progress(self.progress));
        }

        for entry in snapshot.logs.iter().skip(self.logs_seen) {
            changes.push(Change::Log(entry.message.clone()));
        }
        self.logs_seen = snapshot.logs.len();

        if snapshot.transport_warning != self.warning {
            self.warning = snapshot.transport_warning.clone();
            if let Some(warning) = &self.warning {
                changes.push(Change::Warning(warning.clone()));
            }
        }

        if !self.settled && view.is_terminal() && !snapshot.awaiting_result {
            self.settled = true;
            changes.push(match view.phase {
                Phase::Completed => Change::Completed(view.result.clone()),
                _ => Change::Failed(
                    snapshot
                        .error
                        .clone()
                        .or_else(|| view.failure_reason.clone())
                        .unwrap_or_default(),
                ),
            });
        }

        changes
    }
}
