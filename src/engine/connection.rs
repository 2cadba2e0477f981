//! Engine connection
//!
//! Owns one channel to the engine, tracks its lifecycle and fans inbound
//! messages out to registered listeners. Sends are fire-and-forget: when the
//! channel is not open the payload is logged and dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::frame::{self, InboundMessage};
use super::message::outbound;
use super::transport::{Connector, Endpoint, TransportChannel, TransportEvent};

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
    Errored,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Errored => write!(f, "errored"),
        }
    }
}

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Registry<T> {
    next_id: u64,
    entries: Vec<(u64, Callback<T>)>,
}

/// Ordered list of listeners for one event kind
///
/// Dispatch works on a snapshot and re-checks registration before each call,
/// so listeners may unsubscribe (or close the whole connection) while an
/// event is being delivered.
pub struct Listeners<T> {
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Listeners<T> {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry {
                next_id: 1,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener, returning the handle that removes it
    pub fn add(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = {
            let mut registry = self.registry.lock();
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push((id, Arc::new(callback)));
            id
        };

        let weak: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription {
            remove: Some(Box::new(move || {
                if let Some(registry) = weak.upgrade() {
                    registry.lock().entries.retain(|(entry, _)| *entry != id);
                }
            })),
        }
    }

    /// Deliver a value to every listener registered at call time
    pub fn emit(&self, value: &T) {
        let snapshot: Vec<(u64, Callback<T>)> = self.registry.lock().entries.clone();
        for (id, callback) in snapshot {
            let still_registered = self
                .registry
                .lock()
                .entries
                .iter()
                .any(|(entry, _)| *entry == id);
            if still_registered {
                callback(value);
            }
        }
    }

    pub fn clear(&self) {
        self.registry.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.registry.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: 'static> Default for Listeners<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by every listener registration
///
/// Dropping the handle keeps the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
#[must_use = "dropping a Subscription keeps the listener registered forever"]
pub struct Subscription {
    remove: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    /// A handle with nothing to remove
    pub fn noop() -> Self {
        Self { remove: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(remove) = self.remove.take() {
            remove();
        }
    }
}

struct Inner {
    endpoint: Endpoint,
    state: Mutex<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    on_message: Listeners<InboundMessage>,
    on_open: Listeners<()>,
    on_close: Listeners<()>,
    on_error: Listeners<String>,
    by_type: Mutex<HashMap<String, Arc<Listeners<InboundMessage>>>>,
    /// Taken by [`EngineConnection::start`]
    inbound: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
}

impl Inner {
    fn clear_listeners(&self) {
        self.on_message.clear();
        self.on_open.clear();
        self.on_close.clear();
        self.on_error.clear();
        self.by_type.lock().clear();
    }

    fn set_state(&self, state: ConnectionState) {
        *self.state.lock() = state;
    }

    fn is_finished(&self) -> bool {
        matches!(
            *self.state.lock(),
            ConnectionState::Closed | ConnectionState::Errored
        )
    }

    fn dispatch(&self, message: InboundMessage) {
        tracing::trace!(header = %message.header, "Engine <<<");

        self.on_message.emit(&message);

        let typed = message
            .message_type()
            .and_then(|t| self.by_type.lock().get(t).cloned());
        if let Some(listeners) = typed {
            listeners.emit(&message);
        }
    }
}

/// Connection to the engine console server
#[derive(Clone)]
pub struct EngineConnection {
    inner: Arc<Inner>,
}

impl EngineConnection {
    /// Start connecting to an endpoint
    ///
    /// Nothing is dispatched until [`start`](Self::start) is called, so
    /// listeners registered in between see every event.
    pub fn open(connector: &dyn Connector, endpoint: Endpoint) -> Self {
        let channel = connector.connect(&endpoint);
        Self::from_channel(endpoint, channel)
    }

    /// Wrap an already created transport channel
    pub fn from_channel(endpoint: Endpoint, channel: TransportChannel) -> Self {
        let inner = Arc::new(Inner {
            endpoint,
            state: Mutex::new(ConnectionState::Connecting),
            outbound: Mutex::new(Some(channel.outbound)),
            on_message: Listeners::new(),
            on_open: Listeners::new(),
            on_close: Listeners::new(),
            on_error: Listeners::new(),
            by_type: Mutex::new(HashMap::new()),
            inbound: Mutex::new(Some(channel.inbound)),
        });

        Self { inner }
    }

    /// Begin dispatching transport events to listeners
    ///
    /// Events that arrived earlier are queued and delivered in order. Only
    /// the first call has an effect.
    pub fn start(&self) {
        let Some(inbound) = self.inner.inbound.lock().take() else {
            tracing::debug!(endpoint = %self.inner.endpoint, "Engine connection already started");
            return;
        };
        tokio::spawn(pump(self.inner.clone(), inbound));
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.inner.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_finished()
    }

    /// Listen for every inbound message
    pub fn on_message(
        &self,
        callback: impl Fn(&InboundMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.inner.on_message.add(callback)
    }

    /// Listen for inbound messages of one application type
    pub fn on_type(
        &self,
        message_type: &str,
        callback: impl Fn(&InboundMessage) + Send + Sync + 'static,
    ) -> Subscription {
        let listeners = self
            .inner
            .by_type
            .lock()
            .entry(message_type.to_string())
            .or_insert_with(|| Arc::new(Listeners::new()))
            .clone();
        listeners.add(callback)
    }

    /// Listen for the channel opening; runs immediately if already open
    pub fn on_open(&self, callback: impl Fn(&()) + Send + Sync + 'static) -> Subscription {
        if self.is_ready() {
            callback(&());
            return Subscription::noop();
        }
        self.inner.on_open.add(callback)
    }

    pub fn on_close(&self, callback: impl Fn(&()) + Send + Sync + 'static) -> Subscription {
        self.inner.on_close.add(callback)
    }

    pub fn on_error(&self, callback: impl Fn(&String) + Send + Sync + 'static) -> Subscription {
        self.inner.on_error.add(callback)
    }

    /// Serialize and send a payload; dropped with a warning unless open
    pub fn send(&self, payload: &Value) {
        if !self.is_ready() {
            tracing::warn!(
                state = %self.state(),
                payload = %payload,
                "Connection not ready, dropping engine message"
            );
            return;
        }

        let text = payload.to_string();
        tracing::trace!(payload = %text, "Engine >>>");

        let sent = match self.inner.outbound.lock().as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        };
        if !sent {
            tracing::warn!("Engine channel is gone, message dropped");
        }
    }

    /// Run a Lua script in the engine
    pub fn send_script(&self, script: &str) {
        self.send(&outbound::script(script));
    }

    /// Run an engine console command
    pub fn send_command(&self, command: &str, args: &[Value]) {
        self.send(&outbound::command(command, args));
    }

    /// Send a script debugger command, merging `extra` fields into it
    pub fn send_debugger_command(&self, command: &str, extra: Option<Value>) {
        self.send(&outbound::debugger_command(command, extra));
    }

    /// Drop every listener, then close the channel
    ///
    /// Safe to call from inside a listener and more than once.
    pub fn close(&self) {
        self.inner.clear_listeners();
        if !self.inner.is_finished() {
            self.inner.set_state(ConnectionState::Closed);
        }
        // Dropping the sender makes the transport close the socket
        self.inner.outbound.lock().take();
    }
}

async fn pump(inner: Arc<Inner>, mut inbound: mpsc::UnboundedReceiver<TransportEvent>) {
    while let Some(event) = inbound.recv().await {
        if inner.is_finished() {
            break;
        }

        match event {
            TransportEvent::Opened => {
                tracing::info!(endpoint = %inner.endpoint, "Engine connection opened");
                inner.set_state(ConnectionState::Open);
                inner.on_open.emit(&());
            }
            TransportEvent::Frame(frame) => match frame::decode(frame) {
                Ok(message) => inner.dispatch(message),
                Err(e) => tracing::warn!(error = %e, "Dropping undecodable engine frame"),
            },
            TransportEvent::Closed => {
                tracing::info!(endpoint = %inner.endpoint, "Engine connection closed");
                inner.set_state(ConnectionState::Closed);
                inner.on_close.emit(&());
                inner.clear_listeners();
                inner.outbound.lock().take();
                break;
            }
            TransportEvent::Error(reason) => {
                tracing::warn!(endpoint = %inner.endpoint, %reason, "Engine connection error");
                inner.set_state(ConnectionState::Errored);
                inner.on_error.emit(&reason);
                inner.clear_listeners();
                inner.outbound.lock().take();
                break;
            }
        }
    }
}
