//! Debug Adapter Protocol (DAP) implementation
//!
//! This module implements the adapter side of DAP: it reads requests from
//! the editor and writes responses and events back.

pub mod codec;
pub mod server;
pub mod types;

pub use server::DapOutput;
pub use types::*;
