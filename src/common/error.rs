//! Error types for the engine debug adapter
//!
//! Errors are reported back to the editor as failed DAP responses, so the
//! messages are written to be shown to a user as-is.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the debug adapter
#[derive(Error, Debug)]
pub enum Error {
    // === Engine Connection Errors ===
    #[error("Engine connection failure with {endpoint}: {reason}")]
    ConnectionFailed { endpoint: String, reason: String },

    #[error("Engine connection closed")]
    ConnectionClosed,

    #[error("Not connected to the engine")]
    NotConnected,

    #[error("Invalid engine frame: {0}")]
    InvalidFrame(String),

    #[error("Engine protocol error: {0}")]
    EngineProtocol(String),

    // === DAP Protocol Errors ===
    #[error("DAP protocol error: {0}")]
    DapProtocol(String),

    #[error("Unsupported request '{0}'")]
    UnsupportedRequest(String),

    // === Inspection Errors ===
    #[error("No callstack available")]
    NoCallstack,

    #[error("Stack frame {0} not found")]
    FrameNotFound(i64),

    #[error("Unknown variables reference {0}")]
    UnknownVariablesReference(i64),

    #[error("Variable '{name}' not found")]
    VariableNotFound { name: String },

    #[error("Cannot convert '{value}' to a Lua {lua_type}")]
    UnsupportedValue { lua_type: String, value: String },

    // === Evaluation Errors ===
    #[error("Evaluation timed out after {0} ms")]
    EvaluationTimeout(u64),

    #[error("Evaluation failed: {0}")]
    EvaluationFailed(String),

    #[error("Engine request timed out after {0} ms")]
    RequestTimeout(u64),

    // === Session Errors ===
    #[error("Cannot {action} while session is {state}")]
    InvalidState { action: String, state: String },

    #[error("Failed to launch engine: {0}")]
    LaunchFailed(String),

    // === Configuration Errors ===
    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a connection failure error for an endpoint
    pub fn connection_failed(endpoint: &str, reason: impl std::fmt::Display) -> Self {
        Self::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(action: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            action: action.to_string(),
            state: state.to_string(),
        }
    }

    /// Create a variable not found error
    pub fn variable_not_found(name: &str) -> Self {
        Self::VariableNotFound {
            name: name.to_string(),
        }
    }

    /// Numeric id reported in the DAP error response body
    pub fn dap_error_id(&self) -> i64 {
        match self {
            Error::NoCallstack | Error::FrameNotFound(_) => 1000,
            Error::UnknownVariablesReference(_) | Error::VariableNotFound { .. } => 1001,
            Error::UnsupportedValue { .. } => 1002,
            Error::EvaluationTimeout(_) | Error::EvaluationFailed(_) => 2001,
            Error::RequestTimeout(_) => 2002,
            Error::LaunchFailed(_) => 3001,
            Error::InvalidState { .. } => 4001,
            Error::UnsupportedRequest(_) => 4002,
            Error::ConnectionFailed { .. }
            | Error::ConnectionClosed
            | Error::NotConnected => 5656,
            _ => 9000,
        }
    }
}

/// DAP-serializable error for failed responses
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorMessage {
    pub id: i64,
    pub format: String,
    #[serde(rename = "showUser")]
    pub show_user: bool,
}

impl From<&Error> for ErrorMessage {
    fn from(e: &Error) -> Self {
        // Inspection failures are routine while hovering; keep them out of popups
        let show_user = !matches!(
            e,
            Error::UnknownVariablesReference(_)
                | Error::VariableNotFound { .. }
                | Error::EvaluationFailed(_)
                | Error::EvaluationTimeout(_)
        );

        Self {
            id: e.dap_error_id(),
            format: e.to_string(),
            show_user,
        }
    }
}
