//! Expression evaluation
//!
//! Plain dotted paths (`player.stats.health`) are resolved against the scope
//! tree of the halted frame, paging tables in as needed, so the editor gets
//! a browsable handle back. Anything else is shipped to the engine as a Lua
//! snippet.

use std::sync::Arc;

use crate::common::{Error, Result};
use crate::engine::EngineQueries;

use super::scopes::{ScopeCache, ScopeNode, ScopeVariable};

/// Where the editor is evaluating from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluateContext {
    Watch,
    Repl,
    Hover,
    Clipboard,
    Variables,
}

impl EvaluateContext {
    pub fn from_dap(context: Option<&str>) -> Self {
        match context {
            Some("watch") => Self::Watch,
            Some("hover") => Self::Hover,
            Some("clipboard") => Self::Clipboard,
            Some("variables") => Self::Variables,
            _ => Self::Repl,
        }
    }
}

/// How an expression will be evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpressionKind<'a> {
    /// Opaque Lua, executed remotely
    Snippet(&'a str),
    /// Dotted identifier path, resolved through the scope tree
    IdentifierPath(Vec<&'a str>),
}

/// Result of an evaluation, ready for the DAP response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluateResult {
    pub result: String,
    pub type_name: Option<String>,
    pub variables_reference: i64,
}

impl From<ScopeVariable> for EvaluateResult {
    fn from(variable: ScopeVariable) -> Self {
        Self {
            result: variable.value,
            type_name: Some(variable.type_name),
            variables_reference: variable.variables_reference,
        }
    }
}

fn is_identifier_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Classify an expression
///
/// Only letters, digits, `_` and `.` may appear in an identifier path, and
/// no segment may be empty.
pub fn classify(expression: &str) -> ExpressionKind<'_> {
    if expression.is_empty() || !expression.chars().all(is_identifier_char) {
        return ExpressionKind::Snippet(expression);
    }

    let segments: Vec<&str> = expression.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return ExpressionKind::Snippet(expression);
    }
    ExpressionKind::IdentifierPath(segments)
}

/// Rewrite an expression for its context
///
/// Hovering `self:update` asks about the `update` field, so method-call
/// colons become dots.
pub fn normalize(expression: &str, context: EvaluateContext) -> String {
    let expression = expression.trim();
    match context {
        EvaluateContext::Hover => expression.replace(':', "."),
        _ => expression.to_string(),
    }
}

/// Scope walker for one halted frame
pub struct Evaluator<'a> {
    cache: &'a ScopeCache,
    queries: &'a dyn EngineQueries,
    /// Frame scopes in lookup order: locals, then upvalues
    scopes: Vec<Arc<ScopeNode>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(cache: &'a ScopeCache, queries: &'a dyn EngineQueries, scopes: Vec<Arc<ScopeNode>>) -> Self {
        Self {
            cache,
            queries,
            scopes,
        }
    }

    pub async fn evaluate(&self, expression: &str, context: EvaluateContext) -> Result<EvaluateResult> {
        let expression = normalize(expression, context);
        if expression.is_empty() {
            return Err(Error::EvaluationFailed("empty expression".to_string()));
        }

        if let ExpressionKind::IdentifierPath(segments) = classify(&expression) {
            if let Some(result) = self.resolve_path(&segments).await? {
                return Ok(result);
            }
            tracing::debug!(%expression, "Identifier not resolved locally, evaluating as snippet");
        }

        self.evaluate_snippet(&expression).await
    }

    async fn evaluate_snippet(&self, expression: &str) -> Result<EvaluateResult> {
        let snippet = self.queries.evaluate_snippet(expression).await?;
        Ok(EvaluateResult {
            result: snippet.result,
            type_name: Some(snippet.type_name),
            variables_reference: 0,
        })
    }

    /// Resolve a dotted path; `None` means "not found, use a snippet"
    pub async fn resolve_path(&self, segments: &[&str]) -> Result<Option<EvaluateResult>> {
        let Some((root, rest)) = segments.split_first() else {
            return Ok(None);
        };

        let info = match self.queries.identifier_info(root).await {
            Ok(info) => info,
            Err(Error::EvaluationFailed(reason)) => {
                tracing::debug!(identifier = root, %reason, "Identifier lookup failed");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        if !info.is_table() {
            if rest.is_empty() {
                return Ok(Some(EvaluateResult {
                    result: info.value,
                    type_name: Some(info.type_name),
                    variables_reference: 0,
                }));
            }
            return Ok(None);
        }

        let Some(mut current) = self.find_in_scopes(root) else {
            return Ok(None);
        };

        for segment in rest {
            if !current.is_table() {
                return Ok(None);
            }
            let node = self.cache.get(current.variables_reference)?;
            let entries = self.cache.fetch(&node, self.queries).await?;
            match entries.into_iter().find(|v| segment_matches(&v.name, segment)) {
                Some(next) => current = next,
                None => return Ok(None),
            }
        }

        Ok(Some(current.into()))
    }

    fn find_in_scopes(&self, name: &str) -> Option<ScopeVariable> {
        self.scopes.iter().find_map(|scope| {
            scope
                .variables()?
                .iter()
                .find(|v| v.name == name)
                .cloned()
        })
    }
}

/// Table keys may be listed as `key` or, for array slots, `[1]`
fn segment_matches(name: &str, segment: &str) -> bool {
    name == segment
        || name
            .strip_prefix('[')
            .and_then(|n| n.strip_suffix(']'))
            .is_some_and(|n| n == segment)
}
