//! `quill-watch` library: input parsing and snapshot reporting for the
//! command-line job follower.

pub mod cli;
pub mod report;

use quill_client::error::SyncError;
use quill_client::tracker::GenerationTracker;
use quill_core::job::GeneratedPost;

use report::Reporter;

/// Log every change of the tracker's current cycle until it settles.
pub async fn follow(tracker: &GenerationTracker) -> Result<Option<GeneratedPost>, SyncError> {
    let mut updates = tracker.subscribe();
    let mut reporter = Reporter::new();

    loop {
        let snapshot = updates.borrow_and_update().clone();
        for change in reporter.observe(&snapshot) {
            change.log();
        }
        if snapshot.is_settled() {
            return snapshot.into_result();
        }
        if updates.changed().await.is_err() {
            return Err(SyncError::Disposed);
        }
    }
}
