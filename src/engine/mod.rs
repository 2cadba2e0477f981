//! Engine side of the bridge
//!
//! This module talks to the script debugger embedded in the engine: it owns
//! the socket, decodes frames, classifies messages and correlates replies.

pub mod client;
pub mod connection;
pub mod correlator;
pub mod frame;
pub mod message;
pub mod snippets;
pub mod transport;

pub use client::{EngineClient, EngineQueries, IdentifierInfo, ScopeKind, SnippetResult, TablePath};
pub use connection::{ConnectionState, EngineConnection, Subscription};
pub use correlator::{CorrelationId, Correlator};
pub use frame::{Frame, InboundMessage};
pub use message::{DebuggerEvent, EngineMessage, RawFrame, RawVariable};
pub use transport::{Connector, Endpoint, MemoryConnector, TransportEvent, WebSocketConnector};
