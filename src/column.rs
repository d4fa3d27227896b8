//! # Columns
//!
//! A [`Column`] is always `(universe, properties)`, optionally extended
//! with `(context, expression, lineage)` for computed columns. Grounded on
//! spec component 4.C; shaped like the teacher's `IRNode` tagged-variant
//! (`src/ir/mod.rs`) — one enum, one set of small accessor methods, no
//! trait objects.

use crate::errors::{EngineError, EngineResult};
use crate::ids::{ContextId, NodeId};
use crate::universe::Universe;
use crate::value::DType;
use std::fmt;

/// Declared type and update discipline of a column, independent of how it
/// is produced.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnProperties {
    pub dtype: DType,
    pub append_only: bool,
}

impl ColumnProperties {
    pub fn new(dtype: DType, append_only: bool) -> Self {
        ColumnProperties { dtype, append_only }
    }
}

/// A display name plus a back-reference to the operator node that produced
/// the column. Assigned exactly once, by [`crate::parse_graph::GraphBuilder`]
/// when the node is recorded — see invariant in spec 4.G.
#[derive(Debug, Clone, PartialEq)]
pub struct Lineage {
    pub name: String,
    pub node: NodeId,
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.name, self.node)
    }
}

/// A per-row value bound to exactly one [`Universe`].
///
/// `WithExpression` is the only variant that refers to other columns
/// (through its context and expression); it does so via [`crate::ids::ColumnId`],
/// never a direct reference, so the arena can be mutated freely while
/// columns are built — see design note on cyclic references.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Physically produced by an operator; gains an engine-side handle
    /// once lowered into a scope.
    Materialized {
        universe: Universe,
        properties: ColumnProperties,
    },
    /// Lazily defined as `expression` evaluated within `context`.
    WithExpression {
        universe: Universe,
        properties: ColumnProperties,
        context: ContextId,
        expression: Box<crate::expression::Expression>,
        lineage: Option<Lineage>,
    },
    /// The implicit identity column of a table's universe.
    IdColumn { universe: Universe },
    /// Engine-supplied data with no logical storage of its own.
    ExternalMaterialized {
        universe: Universe,
        properties: ColumnProperties,
    },
}

impl Column {
    pub fn universe(&self) -> Universe {
        match self {
            Column::Materialized { universe, .. }
            | Column::WithExpression { universe, .. }
            | Column::IdColumn { universe }
            | Column::ExternalMaterialized { universe, .. } => *universe,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            Column::Materialized { properties, .. }
            | Column::WithExpression { properties, .. }
            | Column::ExternalMaterialized { properties, .. } => properties.dtype.clone(),
            Column::IdColumn { .. } => DType::Pointer,
        }
    }

    pub fn append_only(&self) -> bool {
        match self {
            Column::Materialized { properties, .. }
            | Column::WithExpression { properties, .. }
            | Column::ExternalMaterialized { properties, .. } => properties.append_only,
            Column::IdColumn { .. } => true,
        }
    }

    pub fn lineage(&self) -> Option<&Lineage> {
        match self {
            Column::WithExpression { lineage, .. } => lineage.as_ref(),
            _ => None,
        }
    }

    /// Bind lineage for the first time. Fatal if already bound — lineage
    /// is set-once by construction (spec 4.G invariant).
    pub fn set_lineage(&mut self, lineage: Lineage) -> EngineResult<()> {
        match self {
            Column::WithExpression {
                lineage: slot @ None,
                ..
            } => {
                *slot = Some(lineage);
                Ok(())
            }
            Column::WithExpression { lineage: Some(_), .. } => Err(EngineError::InvariantViolation(
                "attempted to reassign already-bound column lineage".to_string(),
            )),
            _ => Err(EngineError::InvariantViolation(
                "lineage only applies to WithExpression columns".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::Expression;
    use crate::ids::ColumnId;
    use crate::universe::UniverseSolver;

    fn sample_with_expression(universe: Universe, context: ContextId) -> Column {
        Column::WithExpression {
            universe,
            properties: ColumnProperties::new(DType::Int, false),
            context,
            expression: Box::new(Expression::ColumnReference {
                table: ColumnId(0),
                column: ColumnId(0),
                name: "age".to_string(),
            }),
            lineage: None,
        }
    }

    #[test]
    fn id_column_is_pointer_and_append_only() {
        let mut solver = UniverseSolver::new();
        let u = solver.new_universe();
        let col = Column::IdColumn { universe: u };
        assert_eq!(col.dtype(), DType::Pointer);
        assert!(col.append_only());
    }

    #[test]
    fn lineage_can_only_be_set_once() {
        let mut solver = UniverseSolver::new();
        let u = solver.new_universe();
        let mut col = sample_with_expression(u, ContextId(0));
        let lineage = Lineage {
            name: "age".into(),
            node: NodeId(0),
        };
        col.set_lineage(lineage.clone()).unwrap();
        assert_eq!(col.lineage(), Some(&lineage));

        let err = col
            .set_lineage(Lineage {
                name: "age2".into(),
                node: NodeId(1),
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn materialized_and_external_share_accessors() {
        let mut solver = UniverseSolver::new();
        let u = solver.new_universe();
        let props = ColumnProperties::new(DType::String, true);
        let a = Column::Materialized {
            universe: u,
            properties: props.clone(),
        };
        let b = Column::ExternalMaterialized {
            universe: u,
            properties: props,
        };
        assert_eq!(a.dtype(), b.dtype());
        assert_eq!(a.append_only(), b.append_only());
        assert_eq!(a.universe(), u);
    }
}
