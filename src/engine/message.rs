//! Engine wire messages
//!
//! Inbound messages are classified into one closed enum; outbound messages
//! are built by the helpers in [`outbound`].

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::correlator::CorrelationId;
use super::frame::InboundMessage;
use crate::common::{Error, Result};

/// Wire field names that carry a correlation id
///
/// Both name the same concept; they only differ per command.
pub const CORRELATION_FIELDS: [&str; 2] = ["requestId", "node_index"];

/// Extract the correlation id of a reply, whatever field carries it
pub fn correlation_id(header: &Value) -> Option<CorrelationId> {
    CORRELATION_FIELDS
        .iter()
        .find_map(|field| header.get(*field).and_then(Value::as_u64))
        .map(CorrelationId)
}

/// A classified inbound engine message
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    /// A reply to a correlated request, whatever its outer type
    Reply { id: CorrelationId, body: Value },
    /// Script debugger state signal
    Debugger(DebuggerEvent),
    /// Engine log line
    Log(LogMessage),
    /// Uncorrelated console or script output
    Output(String),
    /// Anything else; ignored by the session
    Other { message_type: String },
}

/// Script debugger state signals (`type: "lua_debugger"`)
#[derive(Debug, Clone, PartialEq)]
pub enum DebuggerEvent {
    Running,
    Waiting,
    Halted { source: String, line: u32 },
    Callstack(Vec<RawFrame>),
    /// A status value the session has no transition for
    Status(String),
}

impl DebuggerEvent {
    /// Status name as the engine reported it
    pub fn status(&self) -> &str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Halted { .. } => "halted",
            Self::Callstack(_) => "callstack",
            Self::Status(status) => status,
        }
    }
}

/// Engine log line (`type: "message"`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LogMessage {
    #[serde(default)]
    pub system: Option<String>,
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub message: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl LogMessage {
    /// Render the line the way the engine console shows it
    pub fn render(&self) -> String {
        match &self.system {
            Some(system) => format!(
                "[{}] {} / {}\n",
                self.level.to_uppercase(),
                system,
                self.message
            ),
            None => format!("[{}] {}\n", self.level.to_uppercase(), self.message),
        }
    }
}

/// One frame of a `callstack` event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawFrame {
    pub source: String,
    pub line: u32,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub local: Vec<RawVariable>,
    #[serde(default)]
    pub up_values: Vec<RawVariable>,
}

/// A `{name, type, value}` triple as reported by the engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawVariable {
    #[serde(alias = "var_name")]
    pub name: String,
    #[serde(rename = "type", default)]
    pub type_name: String,
    #[serde(default, deserialize_with = "value_as_string")]
    pub value: String,
}

impl RawVariable {
    pub fn new(name: &str, type_name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
            value: value.to_string(),
        }
    }
}

/// Values usually arrive pre-rendered, but numbers and booleans may not
fn value_as_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(render_value(&value))
}

/// Render a JSON value the way a Lua console would print it
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "nil".to_string(),
        other => other.to_string(),
    }
}

impl EngineMessage {
    /// Classify an inbound message
    ///
    /// A correlation id wins over the outer `type`.
    pub fn parse(message: &InboundMessage) -> Result<Self> {
        let header = &message.header;

        if let Some(id) = correlation_id(header) {
            return Ok(Self::Reply {
                id,
                body: header.clone(),
            });
        }

        let message_type = message.message_type().unwrap_or_default();
        match message_type {
            "lua_debugger" => Self::parse_debugger(header),
            "message" => Ok(Self::Log(LogMessage::deserialize(header)?)),
            "command_output" | "script_output" => {
                let text = ["message", "output", "result"]
                    .iter()
                    .find_map(|field| header.get(*field))
                    .map(render_value)
                    .unwrap_or_default();
                Ok(Self::Output(text))
            }
            other => Ok(Self::Other {
                message_type: other.to_string(),
            }),
        }
    }

    fn parse_debugger(header: &Value) -> Result<Self> {
        let Some(status) = header.get("message").and_then(Value::as_str) else {
            return Ok(Self::Other {
                message_type: "lua_debugger".to_string(),
            });
        };

        let event = match status {
            "running" => DebuggerEvent::Running,
            "waiting" => DebuggerEvent::Waiting,
            "halted" => {
                let source = header
                    .get("source")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::EngineProtocol("halted event without source".into()))?;
                let line = header
                    .get("line")
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Error::EngineProtocol("halted event without line".into()))?;
                DebuggerEvent::Halted {
                    source: source.to_string(),
                    line: line as u32,
                }
            }
            "callstack" => {
                let stack = header.get("stack").cloned().unwrap_or(Value::Array(Vec::new()));
                DebuggerEvent::Callstack(serde_json::from_value(stack)?)
            }
            other => DebuggerEvent::Status(other.to_string()),
        };

        Ok(Self::Debugger(event))
    }
}

/// Outbound message builders
pub mod outbound {
    use serde_json::{json, Value};

    /// `{type: "script", script}`
    pub fn script(script: &str) -> Value {
        json!({ "type": "script", "script": script })
    }

    /// `{type: "command", command, arg: [...]}`
    pub fn command(command: &str, args: &[Value]) -> Value {
        json!({ "type": "command", "command": command, "arg": args })
    }

    /// `{type: "lua_debugger", command, ...extra}`
    pub fn debugger_command(command: &str, extra: Option<Value>) -> Value {
        let mut message = json!({ "type": "lua_debugger", "command": command });
        if let (Some(Value::Object(fields)), Value::Object(target)) = (extra, &mut message) {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        message
    }
}
