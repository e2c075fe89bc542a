//! `quill-watch` -- start a blog-post generation job and follow it.
//!
//! Creates a job on the generation backend, then tracks it over status
//! polling and the job WebSocket at the same time, logging phase,
//! progress and narrative lines until the job completes or fails.
//! Ctrl-C stops tracking.
//!
//! # Usage
//!
//! ```text
//! quill-watch [generate]        create a job from QUILL_* and follow it
//! quill-watch jobs [STATUS]     list recent jobs
//! quill-watch delete JOB_ID     remove a job
//! ```
//!
//! # Environment variables
//!
//! | Variable                      | Required | Default                     |
//! |-------------------------------|----------|-----------------------------|
//! | `QUILL_API_URL`               | no       | `http://localhost:8000/api` |
//! | `QUILL_WS_URL`                | no       | derived from the API URL    |
//! | `QUILL_POLL_INTERVAL_MS`      | no       | `2000`                      |
//! | `QUILL_HEARTBEAT_INTERVAL_MS` | no       | `25000`                     |
//! | `QUILL_MAX_POLL_FAILURES`     | no       | `3`                         |
//! | `QUILL_TOPIC`                 | generate | --                          |
//!
//! See [`quill_watch::cli::request_from_env`] for the other request
//! variables.

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quill_client::api::HttpJobApi;
use quill_client::config::{ClientConfig, TrackerConfig};
use quill_client::tracker::GenerationTracker;
use quill_core::job::Phase;
use quill_core::types::JobId;
use quill_watch::cli::{self, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "quill_watch=info,quill_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let command = cli::parse_command(std::env::args().skip(1))?;
    let client = ClientConfig::from_env();
    tracing::info!(api_url = %client.api_url, ws_url = %client.ws_url, "Loaded client configuration");

    match command {
        Command::Generate => generate(&client).await,
        Command::ListJobs { limit, phase } => list_jobs(&client, limit, phase).await,
        Command::DeleteJob(job_id) => delete_job(&client, &job_id).await,
    }
}

async fn generate(client: &ClientConfig) -> anyhow::Result<()> {
    let request = cli::request_from_env()?;
    let config = TrackerConfig::from_env();
    tracing::info!(
        topic = %request.topic,
        poll_interval_ms = config.poll_interval.as_millis() as u64,
        max_poll_failures = config.max_poll_failures,
        "Starting generation",
    );

    let tracker = GenerationTracker::connect(client, config);
    tracker.start(&request).await?;

    let outcome = tokio::select! {
        outcome = quill_watch::follow(&tracker) => outcome,
        () = shutdown_signal() => {
            tracker.reset();
            tracing::info!("Stopped tracking; the job keeps running on the backend");
            return Ok(());
        }
    };
    tracker.dispose();

    if let Some(post) = outcome? {
        println!("{}", serde_json::to_string_pretty(&post)?);
    }
    Ok(())
}

async fn list_jobs(client: &ClientConfig, limit: u32, phase: Option<Phase>) -> anyhow::Result<()> {
    let api = HttpJobApi::new(client.api_url.clone());
    let jobs = api
        .list_jobs(limit, phase)
        .await
        .context("Failed to list jobs")?;

    tracing::info!(count = jobs.len(), "Fetched jobs");
    for job in jobs {
        println!(
            "{}\t{}\t{:>3.0}%\t{}",
            job.job_id, job.status, job.progress, job.topic
        );
    }
    Ok(())
}

async fn delete_job(client: &ClientConfig, job_id: &JobId) -> anyhow::Result<()> {
    let api = HttpJobApi::new(client.api_url.clone());
    let response = api
        .delete_job(job_id)
        .await
        .with_context(|| format!("Failed to delete job {job_id}"))?;

    tracing::info!(job_id = %job_id, message = %response.message, "Job deleted");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Received SIGINT (Ctrl-C)");
}
