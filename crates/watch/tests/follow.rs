//! End-to-end runs of `follow` over the in-memory transports.

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::Utc;

use quill_client::config::TrackerConfig;
use quill_client::error::SyncError;
use quill_client::testing::{FakeJobApi, FakePoller, FakeStream};
use quill_client::tracker::GenerationTracker;
use quill_core::job::{GeneratedPost, Phase};
use quill_core::request::GenerateRequest;
use quill_core::update::{StatusReport, StreamUpdate};

struct Setup {
    api: Arc<FakeJobApi>,
    poller: Arc<FakePoller>,
    streams: Arc<FakeStream>,
    tracker: GenerationTracker,
}

fn setup() -> Setup {
    let api = Arc::new(FakeJobApi::new());
    let poller = Arc::new(FakePoller::new());
    let streams = Arc::new(FakeStream::new());
    let tracker = GenerationTracker::new(
        api.clone(),
        poller.clone(),
        streams.clone(),
        TrackerConfig::default(),
    );
    Setup {
        api,
        poller,
        streams,
        tracker,
    }
}

async fn yield_a_bit() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// Test: a job that completes over the stream returns the fetched result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn follow_returns_result_of_completed_job() {
    let s = setup();
    let post = GeneratedPost {
        title: Some("Async Rust in Practice".to_string()),
        slug: Some("async-rust-in-practice".to_string()),
        ..Default::default()
    };
    s.api
        .push_status(StatusReport::new(Phase::Completed, 100).with_result(post.clone()));
    s.tracker
        .start(&GenerateRequest::new("Async Rust in Practice"))
        .await
        .unwrap();
    let poll = s.poller.sink().unwrap();
    let stream = s.streams.sink().unwrap();

    let (outcome, ()) = tokio::join!(quill_watch::follow(&s.tracker), async {
        yield_a_bit().await;
        poll.status(StatusReport::new(Phase::Processing, 20));
        stream.message(
            StreamUpdate::new(Utc::now())
                .with_message("Outline ready")
                .with_progress(35),
        );
        yield_a_bit().await;
        stream.message(
            StreamUpdate::new(Utc::now())
                .with_phase(Phase::Completed)
                .with_progress(100),
        );
    });

    assert_eq!(outcome.unwrap(), Some(post));
    assert_eq!(s.poller.cancel_calls(), 1);
    assert_eq!(s.streams.close_calls(), 1);
}

// ---------------------------------------------------------------------------
// Test: a failed job surfaces its reason
// ---------------------------------------------------------------------------

#[tokio::test]
async fn follow_reports_failed_job() {
    let s = setup();
    s.tracker
        .start(&GenerateRequest::new("Async Rust in Practice"))
        .await
        .unwrap();
    let poll = s.poller.sink().unwrap();

    let (outcome, ()) = tokio::join!(quill_watch::follow(&s.tracker), async {
        yield_a_bit().await;
        poll.status(StatusReport::new(Phase::Failed, 60).with_error("Model unavailable"));
    });

    assert_matches!(outcome, Err(SyncError::JobFailed(reason)) if reason == "Model unavailable");
}

// ---------------------------------------------------------------------------
// Test: resetting the tracker ends follow with Cancelled
// ---------------------------------------------------------------------------

#[tokio::test]
async fn follow_ends_when_tracker_is_reset() {
    let s = setup();
    s.tracker
        .start(&GenerateRequest::new("Async Rust in Practice"))
        .await
        .unwrap();

    let (outcome, ()) = tokio::join!(quill_watch::follow(&s.tracker), async {
        yield_a_bit().await;
        s.tracker.reset();
    });

    assert_matches!(outcome, Err(SyncError::Cancelled));
    assert_eq!(s.api.create_calls(), 1);
}
