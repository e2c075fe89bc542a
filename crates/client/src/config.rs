use std::time::Duration;

use quill_core::reconciler::DEFAULT_MAX_POLL_FAILURES;

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Default interval between keepalive pings on the job stream.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(25_000);

/// Default HTTP base URL of the generation backend.
pub const DEFAULT_API_URL: &str = "http://localhost:8000/api";

/// Where the backend lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP base URL, e.g. `http://host:8000/api`.
    pub api_url: String,
    /// WebSocket base URL, e.g. `ws://host:8000/api`.
    pub ws_url: String,
}

impl ClientConfig {
    /// Build a config whose WebSocket URL mirrors the HTTP one.
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let ws_url = ws_url_for(&api_url);
        Self { api_url, ws_url }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var         | Default                          |
    /// |-----------------|----------------------------------|
    /// | `QUILL_API_URL` | `http://localhost:8000/api`      |
    /// | `QUILL_WS_URL`  | `QUILL_API_URL` with a ws scheme |
    pub fn from_env() -> Self {
        let mut config =
            Self::new(std::env::var("QUILL_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()));
        if let Ok(ws_url) = std::env::var("QUILL_WS_URL") {
            config.ws_url = ws_url.trim_end_matches('/').to_string();
        }
        config
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_URL)
    }
}

/// Swap an `http(s)://` scheme for `ws(s)://`.
fn ws_url_for(api_url: &str) -> String {
    if let Some(rest) = api_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        api_url.to_string()
    }
}

/// Timing and failure policy of a [`GenerationTracker`](crate::tracker::GenerationTracker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerConfig {
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Consecutive poll failures after which the job is marked failed.
    pub max_poll_failures: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            max_poll_failures: DEFAULT_MAX_POLL_FAILURES,
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `QUILL_POLL_INTERVAL_MS`      | `2000`  |
    /// | `QUILL_HEARTBEAT_INTERVAL_MS` | `25000` |
    /// | `QUILL_MAX_POLL_FAILURES`     | `3`     |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let poll_interval = env_millis("QUILL_POLL_INTERVAL_MS").unwrap_or(defaults.poll_interval);
        let heartbeat_interval =
            env_millis("QUILL_HEARTBEAT_INTERVAL_MS").unwrap_or(defaults.heartbeat_interval);
        let max_poll_failures: u32 = std::env::var("QUILL_MAX_POLL_FAILURES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_poll_failures);

        Self {
            poll_interval,
            heartbeat_interval,
            max_poll_failures,
        }
    }
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}
