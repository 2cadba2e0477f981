//! Message-oriented duplex channel to the engine
//!
//! The connection layer only sees a [`TransportChannel`]: an outbound queue
//! of text frames and an inbound stream of lifecycle events and frames. The
//! production transport is the engine's WebSocket console server; tests
//! use the in-memory [`MemoryConnector`].

use std::fmt;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use super::frame::Frame;

/// Engine console endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Inbound transport event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The channel is established and frames may be sent
    Opened,
    /// A frame arrived
    Frame(Frame),
    /// The remote side closed the channel
    Closed,
    /// The channel failed (refused, aborted, protocol violation)
    Error(String),
}

/// Both halves of an engine channel as seen by the connection
pub struct TransportChannel {
    /// Outbound text frames; dropping it closes the channel
    pub outbound: mpsc::UnboundedSender<String>,
    /// Lifecycle events and inbound frames
    pub inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens channels to an engine endpoint
pub trait Connector: Send + Sync {
    /// Start connecting; the outcome is reported on the returned channel
    fn connect(&self, endpoint: &Endpoint) -> TransportChannel;
}

/// WebSocket transport to the engine console server
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketConnector;

impl Connector for WebSocketConnector {
    fn connect(&self, endpoint: &Endpoint) -> TransportChannel {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_websocket(endpoint.url(), out_rx, in_tx));

        TransportChannel {
            outbound: out_tx,
            inbound: in_rx,
        }
    }
}

async fn run_websocket(
    url: String,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<TransportEvent>,
) {
    tracing::debug!(%url, "Connecting to engine");

    let ws = match tokio_tungstenite::connect_async(url.as_str()).await {
        Ok((ws, _response)) => ws,
        Err(e) => {
            tracing::warn!(%url, error = %e, "Engine connection failed");
            let _ = inbound.send(TransportEvent::Error(e.to_string()));
            return;
        }
    };

    let _ = inbound.send(TransportEvent::Opened);
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            out = outbound.recv() => match out {
                Some(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        let _ = inbound.send(TransportEvent::Error(e.to_string()));
                        break;
                    }
                }
                None => {
                    // Connection side dropped its sender: local close
                    let _ = sink.close().await;
                    break;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let _ = inbound.send(TransportEvent::Frame(Frame::Text(text)));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    let _ = inbound.send(TransportEvent::Frame(Frame::Binary(bytes)));
                }
                Some(Ok(Message::Close(_))) | None => {
                    let _ = inbound.send(TransportEvent::Closed);
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let _ = inbound.send(TransportEvent::Error(e.to_string()));
                    break;
                }
            },
        }
    }

    tracing::debug!(%url, "Engine socket task finished");
}

/// Engine side of an in-memory channel
pub struct EngineEnd {
    /// Endpoint the adapter asked for
    pub endpoint: Endpoint,
    /// Text frames written by the adapter
    pub received: mpsc::UnboundedReceiver<String>,
    /// Events delivered to the adapter
    pub events: mpsc::UnboundedSender<TransportEvent>,
}

impl EngineEnd {
    /// Report the channel as open
    pub fn open(&self) {
        let _ = self.events.send(TransportEvent::Opened);
    }

    /// Push a JSON text frame to the adapter
    pub fn push(&self, value: &serde_json::Value) {
        let _ = self
            .events
            .send(TransportEvent::Frame(Frame::Text(value.to_string())));
    }

    /// Push a raw event to the adapter
    pub fn push_event(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Wait for the next frame written by the adapter, parsed as JSON
    pub async fn next_json(&mut self) -> Option<serde_json::Value> {
        let text = self.received.recv().await?;
        serde_json::from_str(&text).ok()
    }
}

/// Create a connected in-memory channel pair
pub fn memory_pair(endpoint: Endpoint) -> (TransportChannel, EngineEnd) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    (
        TransportChannel {
            outbound: out_tx,
            inbound: in_rx,
        },
        EngineEnd {
            endpoint,
            received: out_rx,
            events: in_tx,
        },
    )
}

/// Connector handing every engine side to whoever holds the receiver
pub struct MemoryConnector {
    accepted: mpsc::UnboundedSender<EngineEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEnd>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { accepted: tx }, rx)
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, endpoint: &Endpoint) -> TransportChannel {
        let (channel, engine) = memory_pair(endpoint.clone());
        if self.accepted.send(engine).is_err() {
            tracing::warn!(%endpoint, "Nobody is accepting in-memory engine connections");
        }
        channel
    }
}
