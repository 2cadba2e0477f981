//! Correlated engine queries
//!
//! Every query that needs an answer from the engine goes through
//! [`EngineQueries`]. The session talks to the trait, so the scope cache and
//! the evaluator can be exercised without a socket.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::connection::EngineConnection;
use super::correlator::Correlator;
use super::message::{render_value, RawVariable};
use super::snippets;
use crate::common::config::Timeouts;
use crate::common::{Error, Result};

/// Which frame slot list a variable comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Local,
    Upvalue,
}

impl ScopeKind {
    /// Key naming the owning variable in a table path
    pub fn wire_key(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Upvalue => "upvalue",
        }
    }

    /// Scope name shown by the editor
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Local => "Local",
            Self::Upvalue => "Upvalues",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_key())
    }
}

/// Address of a value inside a halted frame
///
/// `path` holds 1-based entry positions walked from the owning variable;
/// an empty path addresses the variable itself.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TablePath {
    pub level: usize,
    pub scope: ScopeKind,
    pub variable: String,
    pub path: Vec<usize>,
}

impl TablePath {
    pub fn to_wire(&self) -> Value {
        let mut wire = json!({ "level": self.level, "path": self.path });
        wire[self.scope.wire_key()] = Value::String(self.variable.clone());
        wire
    }

    /// Address of the entry at `position` inside this table
    pub fn child(&self, position: usize) -> Self {
        let mut path = self.path.clone();
        path.push(position);
        Self {
            path,
            ..self.clone()
        }
    }
}

/// Engine metadata about a top-level identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierInfo {
    pub type_name: String,
    pub value: String,
}

impl IdentifierInfo {
    pub fn is_table(&self) -> bool {
        self.type_name == "table"
    }
}

/// Result of a remote snippet evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetResult {
    pub result: String,
    pub type_name: String,
}

/// Queries answered by a correlated engine reply
#[async_trait]
pub trait EngineQueries: Send + Sync {
    /// Fetch the entries of a remote table
    async fn expand_table(&self, table: &TablePath) -> Result<Vec<RawVariable>>;

    /// Look up type and value of a top-level identifier
    async fn identifier_info(&self, identifier: &str) -> Result<IdentifierInfo>;

    /// Run a Lua snippet and capture its result (bounded wait)
    async fn evaluate_snippet(&self, expression: &str) -> Result<SnippetResult>;

    /// Assign a new value; returns the value as the engine renders it, if reported
    async fn modify_variable(&self, target: &TablePath, value: Value) -> Result<Option<String>>;
}

/// [`EngineQueries`] over a live engine connection
pub struct EngineClient {
    connection: EngineConnection,
    correlator: Arc<Correlator>,
    timeouts: Timeouts,
}

impl EngineClient {
    pub fn new(connection: EngineConnection, correlator: Arc<Correlator>, timeouts: Timeouts) -> Self {
        Self {
            connection,
            correlator,
            timeouts,
        }
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.connection.is_ready() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    /// Send a correlated debugger command and wait for its reply
    async fn debugger_request(&self, command: &str, id_field: &str, mut fields: Value) -> Result<Value> {
        self.ensure_ready()?;

        let pending = self.correlator.allocate();
        fields[id_field] = json!(pending.id.0);
        tracing::debug!(command, id = %pending.id, "Correlated engine request");
        self.connection.send_debugger_command(command, Some(fields));

        let reply = self.correlator.wait(pending, self.timeouts.request()).await?;
        if let Some(error) = reply.get("error") {
            return Err(Error::EvaluationFailed(render_value(error)));
        }
        Ok(reply)
    }
}

#[async_trait]
impl EngineQueries for EngineClient {
    async fn expand_table(&self, table: &TablePath) -> Result<Vec<RawVariable>> {
        let reply = self
            .debugger_request(
                "expand_table",
                "node_index",
                json!({ "table_path": table.to_wire() }),
            )
            .await?;

        match reply.get("table") {
            Some(entries) => Ok(serde_json::from_value(entries.clone())?),
            None => Ok(Vec::new()),
        }
    }

    async fn identifier_info(&self, identifier: &str) -> Result<IdentifierInfo> {
        let reply = self
            .debugger_request(
                "get_identifier_info",
                "requestId",
                json!({ "identifier": identifier }),
            )
            .await?;

        let info = reply
            .get("identifier_info")
            .ok_or_else(|| Error::EngineProtocol("identifier reply without identifier_info".into()))?;

        Ok(IdentifierInfo {
            type_name: info
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("nil")
                .to_string(),
            value: info.get("value").map(render_value).unwrap_or_default(),
        })
    }

    async fn evaluate_snippet(&self, expression: &str) -> Result<SnippetResult> {
        self.ensure_ready()?;

        let pending = self.correlator.allocate();
        let id = pending.id;
        tracing::debug!(%id, expression, "Evaluating snippet");
        self.connection
            .send_script(&snippets::evaluate_call(expression, id.0));

        let timeout = self.timeouts.snippet_evaluation();
        let reply = match self.correlator.wait(pending, Some(timeout)).await {
            Ok(reply) => reply,
            Err(Error::RequestTimeout(ms)) => return Err(Error::EvaluationTimeout(ms)),
            Err(e) => return Err(e),
        };

        if let Some(error) = reply.get("error") {
            return Err(Error::EvaluationFailed(render_value(error)));
        }

        Ok(SnippetResult {
            result: reply.get("result").map(render_value).unwrap_or_else(|| "nil".into()),
            type_name: reply
                .get("result_type")
                .and_then(Value::as_str)
                .unwrap_or("nil")
                .to_string(),
        })
    }

    async fn modify_variable(&self, target: &TablePath, value: Value) -> Result<Option<String>> {
        let reply = self
            .debugger_request(
                "modify_variable",
                "requestId",
                json!({ "variable": target.to_wire(), "value": value }),
            )
            .await?;

        Ok(reply.get("value").map(render_value))
    }
}
