//! # Parse graph
//!
//! The DAG of operator invocations (spec 4.G) plus the arenas that make
//! the column↔context cycle representable without back-pointers (design
//! note, §9). [`GraphBuilder`] is the single owner of the universe
//! solver, the column arena, the context arena, and the node list — no
//! global/static state, per "re-architect as explicit context objects
//! threaded through the plan-building API".

use crate::column::{Column, Lineage};
use crate::context::Context;
use crate::errors::{EngineError, EngineResult};
use crate::expression::ColumnTypeLookup;
use crate::ids::{ColumnId, ContextId, NodeId};
use crate::universe::{Universe, UniverseSolver};
use crate::value::DType;

#[derive(Debug, Default)]
struct ColumnArena {
    columns: Vec<Column>,
}

impl ColumnArena {
    fn alloc(&mut self, column: Column) -> ColumnId {
        let id = ColumnId(self.columns.len() as u64);
        self.columns.push(column);
        id
    }

    fn get(&self, id: ColumnId) -> &Column {
        &self.columns[id.0 as usize]
    }

    fn get_mut(&mut self, id: ColumnId) -> &mut Column {
        &mut self.columns[id.0 as usize]
    }
}

#[derive(Debug, Default)]
struct ContextArena {
    contexts: Vec<Context>,
}

impl ContextArena {
    fn alloc(&mut self, context: Context) -> ContextId {
        let id = ContextId(self.contexts.len() as u64);
        self.contexts.push(context);
        id
    }

    fn get(&self, id: ContextId) -> &Context {
        &self.contexts[id.0 as usize]
    }
}

/// A single recorded operator invocation. `inputs` are the dependency
/// columns it consumed; `outputs` are the columns it minted, in the
/// order lineage was bound to them.
#[derive(Debug, Clone)]
pub struct OperatorNode {
    pub id: NodeId,
    pub kind: &'static str,
    pub inputs: Vec<ColumnId>,
    pub outputs: Vec<ColumnId>,
}

#[derive(Debug, Default)]
struct ParseGraphInner {
    nodes: Vec<OperatorNode>,
}

impl ParseGraphInner {
    fn add_node(&mut self, kind: &'static str, inputs: Vec<ColumnId>, outputs: Vec<ColumnId>) -> NodeId {
        let id = NodeId(self.nodes.len() as u64);
        self.nodes.push(OperatorNode {
            id,
            kind,
            inputs,
            outputs,
        });
        id
    }
}

/// Owns every mutable piece of plan-building state: the universe solver,
/// the column and context arenas, and the operator DAG. Table-building
/// methods (spec 4.F) take `&mut GraphBuilder` explicitly rather than a
/// table holding a reference back to it.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    pub solver: UniverseSolver,
    columns: ColumnArena,
    contexts: ContextArena,
    graph: ParseGraphInner,
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder::default()
    }

    pub fn new_universe(&mut self) -> Universe {
        self.solver.new_universe()
    }

    pub fn alloc_column(&mut self, column: Column) -> ColumnId {
        self.columns.alloc(column)
    }

    pub fn alloc_context(&mut self, context: Context) -> ContextId {
        self.contexts.alloc(context)
    }

    pub fn column(&self, id: ColumnId) -> &Column {
        self.columns.get(id)
    }

    pub fn context(&self, id: ContextId) -> &Context {
        self.contexts.get(id)
    }

    pub fn nodes(&self) -> &[OperatorNode] {
        &self.graph.nodes
    }

    pub fn node(&self, id: NodeId) -> &OperatorNode {
        &self.graph.nodes[id.0 as usize]
    }

    /// Records an operator: allocates a node id, stores `inputs` as its
    /// dependency columns, then binds lineage to each `(column, name)` in
    /// `fresh_outputs` — exactly once, per the spec 4.G invariant. Fails
    /// with [`EngineError::InvariantViolation`] if any output already has
    /// lineage bound.
    pub fn record_operator(
        &mut self,
        kind: &'static str,
        inputs: Vec<ColumnId>,
        fresh_outputs: Vec<(ColumnId, String)>,
    ) -> EngineResult<NodeId> {
        let output_ids: Vec<ColumnId> = fresh_outputs.iter().map(|(id, _)| *id).collect();
        let node_id = self.graph.add_node(kind, inputs, output_ids);
        for (column_id, name) in fresh_outputs {
            self.columns
                .get_mut(column_id)
                .set_lineage(Lineage { name, node: node_id })?;
        }
        Ok(node_id)
    }
}

impl ColumnTypeLookup for GraphBuilder {
    fn dtype_of(&self, column: ColumnId) -> EngineResult<DType> {
        Ok(self.column(column).dtype())
    }
}

impl GraphBuilder {
    pub fn require_column(&self, id: ColumnId) -> EngineResult<&Column> {
        self.columns
            .columns
            .get(id.0 as usize)
            .ok_or_else(|| EngineError::unknown_column(format!("{id}")))
    }
}
