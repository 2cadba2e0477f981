//! Scope and variable cache
//!
//! A halted frame is exposed as a tree of nodes addressed by DAP
//! `variablesReference` ids. Frame scopes come fully populated with the
//! callstack; nested tables are only fetched from the engine the first time
//! somebody opens them, then memoized until the engine resumes.
//!
//! On resume the whole table is dropped and ids restart at 1. Nodes still
//! held by in-flight requests belong to an older generation: they can finish
//! their fetch, but they never register children in the new table.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::common::{Error, Result};
use crate::engine::{EngineQueries, RawVariable, ScopeKind, TablePath};

/// Marker the engine uses for anonymous stack temporaries
const TEMPORARY_MARKER: &str = "(*temporary)";
/// Rendered value of native functions; nothing to inspect there
const NATIVE_FUNCTION_VALUE: &str = "C function";

/// A materialized variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeVariable {
    pub name: String,
    pub type_name: String,
    pub value: String,
    /// Child node for tables, 0 for leaves
    pub variables_reference: i64,
    /// 1-based position in the engine's listing
    pub position: usize,
}

impl ScopeVariable {
    pub fn is_table(&self) -> bool {
        self.variables_reference != 0
    }
}

/// One node of the scope tree
#[derive(Debug)]
pub struct ScopeNode {
    pub reference: i64,
    pub frame_index: usize,
    pub scope: ScopeKind,
    /// Remote table this node mirrors; `None` for a frame scope
    pub table: Option<TablePath>,
    generation: u64,
    variables: OnceCell<Vec<ScopeVariable>>,
}

impl ScopeNode {
    pub fn is_populated(&self) -> bool {
        self.variables.initialized()
    }

    /// Materialized variables, if fetched already
    pub fn variables(&self) -> Option<&[ScopeVariable]> {
        self.variables.get().map(Vec::as_slice)
    }

    /// Address of one of this node's variables
    pub fn address_of(&self, variable: &ScopeVariable) -> TablePath {
        match &self.table {
            Some(table) => table.child(variable.position),
            None => TablePath {
                level: self.frame_index,
                scope: self.scope,
                variable: variable.name.clone(),
                path: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct NodeTable {
    generation: u64,
    next_reference: i64,
    nodes: HashMap<i64, Arc<ScopeNode>>,
    frame_scopes: HashMap<(usize, ScopeKind), i64>,
}

impl NodeTable {
    fn allocate(&mut self, frame_index: usize, scope: ScopeKind, table: Option<TablePath>) -> Arc<ScopeNode> {
        self.next_reference += 1;
        let node = Arc::new(ScopeNode {
            reference: self.next_reference,
            frame_index,
            scope,
            table,
            generation: self.generation,
            variables: OnceCell::new(),
        });
        self.nodes.insert(node.reference, node.clone());
        node
    }

    /// Turn engine entries into variables, allocating a child per table
    fn materialize(&mut self, node: &ScopeNode, raw: Vec<RawVariable>) -> Result<Vec<ScopeVariable>> {
        if node.generation != self.generation {
            return Err(Error::UnknownVariablesReference(node.reference));
        }

        let mut variables = Vec::with_capacity(raw.len());
        for (index, entry) in raw.into_iter().enumerate() {
            if entry.name == TEMPORARY_MARKER || entry.value == NATIVE_FUNCTION_VALUE {
                continue;
            }

            let position = index + 1;
            let variables_reference = if entry.type_name == "table" {
                let table = match &node.table {
                    Some(parent) => parent.child(position),
                    None => TablePath {
                        level: node.frame_index,
                        scope: node.scope,
                        variable: entry.name.clone(),
                        path: Vec::new(),
                    },
                };
                self.allocate(node.frame_index, node.scope, Some(table)).reference
            } else {
                0
            };

            variables.push(ScopeVariable {
                name: entry.name,
                type_name: entry.type_name,
                value: entry.value,
                variables_reference,
                position,
            });
        }
        Ok(variables)
    }
}

/// Reference-addressed scope tree for the current halt
#[derive(Debug, Default)]
pub struct ScopeCache {
    table: Mutex<NodeTable>,
}

impl ScopeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh, unpopulated node
    pub fn create_node(&self, frame_index: usize, scope: ScopeKind, table: Option<TablePath>) -> Arc<ScopeNode> {
        self.table.lock().allocate(frame_index, scope, table)
    }

    /// Scope node of a frame, populated from the callstack entries
    ///
    /// Repeated calls for the same frame and scope return the same node.
    pub fn frame_scope(&self, frame_index: usize, scope: ScopeKind, entries: &[RawVariable]) -> Result<Arc<ScopeNode>> {
        let mut table = self.table.lock();
        if let Some(existing) = table
            .frame_scopes
            .get(&(frame_index, scope))
            .and_then(|reference| table.nodes.get(reference))
        {
            return Ok(existing.clone());
        }

        let node = table.allocate(frame_index, scope, None);
        let variables = table.materialize(&node, entries.to_vec())?;
        // Freshly allocated, nobody else can have set it
        let _ = node.variables.set(variables);
        table.frame_scopes.insert((frame_index, scope), node.reference);
        Ok(node)
    }

    /// Set a node's variables from engine entries
    ///
    /// A node that is already populated keeps its list.
    pub fn populate(&self, node: &ScopeNode, raw: Vec<RawVariable>) -> Result<Vec<ScopeVariable>> {
        if let Some(existing) = node.variables.get() {
            return Ok(existing.clone());
        }
        let variables = self.table.lock().materialize(node, raw)?;
        let _ = node.variables.set(variables);
        Ok(node.variables.get().cloned().unwrap_or_default())
    }

    /// Resolve a reference issued during the current halt
    pub fn get(&self, reference: i64) -> Result<Arc<ScopeNode>> {
        self.table
            .lock()
            .nodes
            .get(&reference)
            .cloned()
            .ok_or(Error::UnknownVariablesReference(reference))
    }

    /// Variables of a node, fetching the remote table on first access
    ///
    /// Concurrent calls for the same node share one engine query.
    pub async fn fetch(&self, node: &ScopeNode, queries: &dyn EngineQueries) -> Result<Vec<ScopeVariable>> {
        let variables = node
            .variables
            .get_or_try_init(|| async {
                let Some(table) = &node.table else {
                    return Ok::<_, Error>(Vec::new());
                };
                tracing::debug!(reference = node.reference, ?table, "Expanding remote table");
                let raw = queries.expand_table(table).await?;
                self.table.lock().materialize(node, raw)
            })
            .await?;
        Ok(variables.clone())
    }

    /// Discard every node; ids restart
    pub fn reset(&self) {
        let mut table = self.table.lock();
        let generation = table.generation + 1;
        *table = NodeTable {
            generation,
            ..NodeTable::default()
        };
        tracing::trace!(generation, "Scope cache reset");
    }

    pub fn len(&self) -> usize {
        self.table.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
