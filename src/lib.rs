//! Engine DAP - debug Lua scripts running inside a game engine
//!
//! This library bridges the Debug Adapter Protocol (DAP) spoken by editors
//! and the script debugger embedded in the engine, reached over its
//! WebSocket console server.

pub mod common;
pub mod dap;
pub mod engine;
pub mod launcher;
pub mod session;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use session::{DebugSession, SessionState};
