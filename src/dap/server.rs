//! DAP server side: read requests, write responses and events
//!
//! A reader task decodes requests from the editor into a channel, the
//! session consumes them, and a writer task serializes everything the
//! session emits through [`DapOutput`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;

use crate::common::error::ErrorMessage;
use crate::common::{config::Config, Error, Result};
use crate::engine::Connector;
use crate::launcher::Launcher;
use crate::session::DebugSession;

use super::codec;
use super::types::{Event, EventMessage, ProtocolMessage, RequestMessage, ResponseMessage};

/// Outbound half of the DAP stream
///
/// Shared by the session and the tasks it spawns; every message gets the
/// next sequence number when it is queued.
pub struct DapOutput {
    seq: AtomicI64,
    tx: mpsc::UnboundedSender<ProtocolMessage>,
}

impl DapOutput {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ProtocolMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                seq: AtomicI64::new(1),
                tx,
            }),
            rx,
        )
    }

    fn next_seq(&self) -> i64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }

    fn queue(&self, message: ProtocolMessage) {
        if self.tx.send(message).is_err() {
            tracing::debug!("DAP writer is gone, message dropped");
        }
    }

    /// Answer a request; an error becomes a failed response
    pub fn respond(&self, request: &RequestMessage, result: Result<Option<Value>>) {
        let response = match result {
            Ok(body) => ResponseMessage {
                seq: self.next_seq(),
                request_seq: request.seq,
                success: true,
                command: request.command.clone(),
                message: None,
                body,
            },
            Err(e) => {
                tracing::debug!(command = %request.command, error = %e, "Request failed");
                let error = ErrorMessage::from(&e);
                ResponseMessage {
                    seq: self.next_seq(),
                    request_seq: request.seq,
                    success: false,
                    command: request.command.clone(),
                    message: Some(e.to_string()),
                    body: serde_json::to_value(&error)
                        .ok()
                        .map(|error| serde_json::json!({ "error": error })),
                }
            }
        };
        self.queue(ProtocolMessage::Response(response));
    }

    /// Answer a request with a serializable body
    pub fn respond_with<T: serde::Serialize>(&self, request: &RequestMessage, result: Result<T>) {
        let result = result.and_then(|body| Ok(Some(serde_json::to_value(body)?)));
        self.respond(request, result);
    }

    pub fn event(&self, event: Event) {
        let message = EventMessage {
            seq: self.next_seq(),
            event: event.name().to_string(),
            body: event.body(),
        };
        self.queue(ProtocolMessage::Event(message));
    }
}

/// Decode requests from the editor until the stream ends
async fn read_requests<R: AsyncRead + Unpin>(reader: R, requests: mpsc::UnboundedSender<RequestMessage>) {
    let mut reader = BufReader::new(reader);
    loop {
        let body = match codec::read_message(&mut reader).await {
            Ok(Some(body)) => body,
            Ok(None) => {
                tracing::debug!("DAP client closed the stream");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read DAP message");
                break;
            }
        };
        tracing::trace!(%body, "DAP <<<");

        match serde_json::from_str::<ProtocolMessage>(&body) {
            Ok(ProtocolMessage::Request(request)) => {
                if requests.send(request).is_err() {
                    break;
                }
            }
            Ok(other) => tracing::warn!(?other, "Ignoring non-request DAP message"),
            Err(e) => tracing::warn!(error = %e, "Ignoring malformed DAP message"),
        }
    }
}

/// Encode queued responses and events to the editor
async fn write_messages<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut messages: mpsc::UnboundedReceiver<ProtocolMessage>,
) -> Result<()> {
    while let Some(message) = messages.recv().await {
        let json = serde_json::to_string(&message)?;
        tracing::trace!(%json, "DAP >>>");
        codec::write_message(&mut writer, &json).await?;
    }
    Ok(())
}

/// Serve one DAP client over a byte stream
pub async fn serve<R, W>(
    reader: R,
    writer: W,
    config: Config,
    connector: Arc<dyn Connector>,
    launcher: Arc<dyn Launcher>,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (output, messages) = DapOutput::new();
    let (request_tx, request_rx) = mpsc::unbounded_channel();

    let reader_task = tokio::spawn(read_requests(reader, request_tx));
    let writer_task = tokio::spawn(write_messages(writer, messages));

    let session = DebugSession::new(config, connector, launcher, output);
    let outcome = session.run(request_rx).await;

    // The session held the last senders; the writer drains and stops
    reader_task.abort();
    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "DAP writer failed"),
        Err(e) => tracing::warn!(error = %e, "DAP writer task panicked"),
    }

    outcome
}

/// Serve a single client that connects on `127.0.0.1:port`
pub async fn serve_tcp(
    port: u16,
    config: Config,
    connector: Arc<dyn Connector>,
    launcher: Arc<dyn Launcher>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await?;
    tracing::info!(port, "Waiting for a DAP client");

    let (stream, peer) = listener.accept().await?;
    tracing::info!(%peer, "DAP client connected");

    let (reader, writer) = stream.into_split();
    serve(reader, writer, config, connector, launcher).await
}

/// Serve the editor that spawned us over stdin/stdout
pub async fn serve_stdio(
    config: Config,
    connector: Arc<dyn Connector>,
    launcher: Arc<dyn Launcher>,
) -> Result<()> {
    serve(tokio::io::stdin(), tokio::io::stdout(), config, connector, launcher)
        .await
        .map_err(|e| match e {
            Error::Io(io) if io.kind() == std::io::ErrorKind::BrokenPipe => Error::ConnectionClosed,
            other => other,
        })
}
