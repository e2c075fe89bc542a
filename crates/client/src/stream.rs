//! WebSocket job stream.
//!
//! [`WsStreamAdapter`] connects to `{ws_url}/generate/ws/{job_id}` and
//! spawns one task per connection that forwards decoded frames to the
//! [`EventSink`] and writes queued outbound frames. Dropping or closing
//! the returned handle ends the task and sends a Close frame.

use std::sync::Arc;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use quill_core::types::JobId;

use crate::error::TransportError;
use crate::messages::{parse_stream_message, StreamMessage};
use crate::transport::{EventSink, StreamAdapter, StreamHandle};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// [`StreamAdapter`] backed by `tokio-tungstenite`.
pub struct WsStreamAdapter {
    ws_url: String,
}

impl WsStreamAdapter {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8000/api`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }
}

#[async_trait]
impl StreamAdapter for WsStreamAdapter {
    async fn open_stream(
        &self,
        job_id: &JobId,
        sink: EventSink,
    ) -> Result<Arc<dyn StreamHandle>, TransportError> {
        let url = format!("{}/generate/ws/{}", self.ws_url, job_id);

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            TransportError::Connection(format!("Failed to connect to job stream at {url}: {e}"))
        })?;

        tracing::info!(job_id = %job_id, cycle = %sink.cycle(), "Job stream connected");

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        tokio::spawn(run_connection(
            ws_stream,
            job_id.clone(),
            sink,
            outbound_rx,
            cancel.clone(),
        ));

        Ok(Arc::new(WsStreamHandle {
            outbound: outbound_tx,
            cancel,
        }))
    }
}

/// Outbound handle of a live WebSocket connection.
pub struct WsStreamHandle {
    outbound: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
}

impl StreamHandle for WsStreamHandle {
    fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.cancel.is_cancelled() {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(text.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

impl Drop for WsStreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drive one connection: forward inbound frames, write outbound ones,
/// and exit on cancellation or when the connection drops.
async fn run_connection(
    ws_stream: WsStream,
    job_id: JobId,
    sink: EventSink,
    mut outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
) {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    tracing::debug!(job_id = %job_id, error = %e, "Close frame not delivered");
                }
                tracing::info!(job_id = %job_id, "Job stream closed by client");
                break;
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = write.send(Message::Text(text)).await {
                    tracing::warn!(job_id = %job_id, error = %e, "Job stream send failed");
                    sink.error(&e);
                    sink.closed();
                    break;
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => handle_text(&job_id, &sink, &text),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                        // Handled automatically by tungstenite.
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(job_id = %job_id, ?frame, "Backend closed job stream");
                        sink.closed();
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary / Frame -- not used by the backend.
                    }
                    Some(Err(e)) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Job stream receive error");
                        sink.error(&e);
                        sink.closed();
                        break;
                    }
                    None => {
                        tracing::info!(job_id = %job_id, "Job stream exhausted");
                        sink.closed();
                        break;
                    }
                }
            }
        }
    }
}

/// Decode a text frame and forward status updates to the sink.
fn handle_text(job_id: &JobId, sink: &EventSink, text: &str) {
    match parse_stream_message(text, chrono::Utc::now()) {
        Ok(StreamMessage::Update(update)) => sink.message(update),
        Ok(StreamMessage::Keepalive | StreamMessage::Pong) => {
            tracing::trace!(job_id = %job_id, "Job stream keepalive");
        }
        Err(e) => {
            tracing::warn!(
                job_id = %job_id,
                error = %e,
                raw_message = %text,
                "Failed to parse job stream message",
            );
        }
    }
}
