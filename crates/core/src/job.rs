//! The externally observable state of a generation job.
//!
//! [`JobView`] is the single snapshot handed to consumers. Its fields
//! only change through the [`Reconciler`](crate::reconciler::Reconciler),
//! which enforces the phase ordering defined by [`Phase::rank`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::JobId;

/// Maximum value of [`JobView::progress`].
pub const MAX_PROGRESS: u8 = 100;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

/// Coarse lifecycle stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl Phase {
    /// Position in the lifecycle ordering. Both terminal phases share
    /// the highest rank.
    pub fn rank(self) -> u8 {
        match self {
            Phase::Idle => 0,
            Phase::Queued => 1,
            Phase::Processing => 2,
            Phase::Completed | Phase::Failed => 3,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Queued => "queued",
            Phase::Processing => "processing",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Phase::Idle),
            "queued" => Ok(Phase::Queued),
            "processing" => Ok(Phase::Processing),
            "completed" => Ok(Phase::Completed),
            "failed" => Ok(Phase::Failed),
            other => Err(CoreError::UnknownPhase(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Result payload
// ---------------------------------------------------------------------------

/// Summary of the post produced by a completed job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneratedPost {
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub word_count: Option<u32>,
    /// Where the backend wrote the rendered post.
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub seo_score: Option<f64>,
    /// Number of write/evaluate rounds the agent needed.
    #[serde(default)]
    pub iterations: Option<u32>,
}

// ---------------------------------------------------------------------------
// JobView
// ---------------------------------------------------------------------------

/// Canonical merged view of one job.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct JobView {
    pub job_id: Option<JobId>,
    pub phase: Phase,
    pub progress: u8,
    /// Set only when `phase` is [`Phase::Completed`].
    pub result: Option<GeneratedPost>,
    /// Set only when `phase` is [`Phase::Failed`].
    pub failure_reason: Option<String>,
}

impl JobView {
    /// Progress as shown to the user; always 0 while idle.
    pub fn progress(&self) -> u8 {
        if self.phase == Phase::Idle {
            0
        } else {
            self.progress
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Verify the result/failure exclusivity rules.
    pub fn check_invariants(&self) -> Result<(), CoreError> {
        if self.result.is_some() && self.failure_reason.is_some() {
            return Err(CoreError::InvariantViolation(
                "result and failure reason are both set".to_string(),
            ));
        }
        if self.result.is_some() && self.phase != Phase::Completed {
            return Err(CoreError::InvariantViolation(format!(
                "result present in phase {}",
                self.phase
            )));
        }
        if self.failure_reason.is_some() && self.phase != Phase::Failed {
            return Err(CoreError::InvariantViolation(format!(
                "failure reason present in phase {}",
                self.phase
            )));
        }
        if self.progress > MAX_PROGRESS {
            return Err(CoreError::InvariantViolation(format!(
                "progress {} exceeds {MAX_PROGRESS}",
                self.progress
            )));
        }
        if self.phase == Phase::Idle && self.job_id.is_some() {
            return Err(CoreError::InvariantViolation(
                "idle view still holds a job id".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn phase_ranks_are_ordered() {
        assert!(Phase::Idle.rank() < Phase::Queued.rank());
        assert!(Phase::Queued.rank() < Phase::Processing.rank());
        assert!(Phase::Processing.rank() < Phase::Completed.rank());
        assert_eq!(Phase::Completed.rank(), Phase::Failed.rank());
    }

    #[test]
    fn phase_parses_wire_names() {
        for phase in [
            Phase::Idle,
            Phase::Queued,
            Phase::Processing,
            Phase::Completed,
            Phase::Failed,
        ] {
            assert_eq!(phase.as_str().parse::<Phase>().unwrap(), phase);
        }
        assert_matches!("unknown".parse::<Phase>(), Err(CoreError::UnknownPhase(s)) if s == "unknown");
    }

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Processing).unwrap(), "\"processing\"");
    }

    #[test]
    fn idle_progress_reads_as_zero() {
        let view = JobView {
            progress: 40,
            ..Default::default()
        };
        assert_eq!(view.progress(), 0);
    }

    #[test]
    fn default_view_is_valid() {
        assert!(JobView::default().check_invariants().is_ok());
    }

    #[test]
    fn result_and_failure_together_are_rejected() {
        let view = JobView {
            job_id: Some(JobId::new("j")),
            phase: Phase::Completed,
            progress: 100,
            result: Some(GeneratedPost::default()),
            failure_reason: Some("boom".into()),
        };
        assert_matches!(view.check_invariants(), Err(CoreError::InvariantViolation(_)));
    }

    #[test]
    fn failure_outside_failed_phase_is_rejected() {
        let view = JobView {
            job_id: Some(JobId::new("j")),
            phase: Phase::Processing,
            failure_reason: Some("boom".into()),
            ..Default::default()
        };
        assert_matches!(view.check_invariants(), Err(CoreError::InvariantViolation(_)));
    }

    #[test]
    fn generated_post_tolerates_missing_fields() {
        let post: GeneratedPost = serde_json::from_str(r#"{"title":"Rust","iterations":2}"#).unwrap();
        assert_eq!(post.title.as_deref(), Some("Rust"));
        assert_eq!(post.iterations, Some(2));
        assert!(post.slug.is_none());
    }
}
