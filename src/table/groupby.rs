//! # Grouping and reduction
//!
//! `groupby(cols, id?, sort_by?) → GroupedTable → reduce(...)` (spec 4.F).
//! There is no dedicated "Grouped" context in the spec's context table —
//! a grouped reduction reuses [`Context::Reindex`] (the result universe is
//! a fresh identity derived from the group key, exactly like `with_id_from`)
//! and the "only reducers allowed" rule is enforced by `reduce` itself via
//! the `grouped` flag threaded into [`Expression::infer_dtype`], not by a
//! separate context variant.

use super::{pointer_from, Table};
use crate::column::{Column, ColumnProperties};
use crate::context::Context;
use crate::errors::{EngineError, EngineResult};
use crate::expression::Expression;
use crate::ids::ColumnId;
use crate::parse_graph::GraphBuilder;
use crate::schema::{FieldSchema, Schema};

/// Builder for a grouped reduction over `source`.
pub struct GroupedTable<'a> {
    source: &'a Table,
    group_columns: Vec<String>,
    id_override: Option<ColumnId>,
    sort_by: Option<ColumnId>,
}

impl<'a> GroupedTable<'a> {
    pub(super) fn new(source: &'a Table, group_columns: Vec<String>) -> Self {
        GroupedTable {
            source,
            group_columns,
            id_override: None,
            sort_by: None,
        }
    }

    /// Overrides the default `pointer_from(group cols)` identity.
    pub fn with_id(mut self, id_column: ColumnId) -> Self {
        self.id_override = Some(id_column);
        self
    }

    /// Per-instance ordering used by order-sensitive reducers
    /// (`argmin`/`argmax`/`sort_by`-dependent aggregation).
    pub fn sort_by(mut self, column_name: &str) -> EngineResult<Self> {
        self.sort_by = Some(self.source.column_id(column_name)?);
        Ok(self)
    }

    /// `reduce(assignments)` — grouping columns must appear as a plain
    /// passthrough reference; every other assignment must be built
    /// entirely out of reducers (spec 4.F: "reducers must be the only
    /// non-grouping expressions in `reduce`").
    pub fn reduce(
        self,
        builder: &mut GraphBuilder,
        assignments: Vec<(String, Expression)>,
    ) -> EngineResult<Table> {
        let group_ids: Vec<ColumnId> = self
            .group_columns
            .iter()
            .map(|n| self.source.column_id(n))
            .collect::<EngineResult<_>>()?;

        let key_column = match self.id_override {
            Some(id) => id,
            None => {
                let names: Vec<&str> = self.group_columns.iter().map(|s| s.as_str()).collect();
                pointer_from(builder, self.source, &names)?
            }
        };

        let new_universe = builder.new_universe();
        let ctx = builder.alloc_context(Context::Reindex { key_column });
        if let Some(sort_column) = self.sort_by {
            builder.alloc_context(Context::Sorting {
                key_column: sort_column,
                instance_column: key_column,
            });
        }
        let new_id_column = builder.alloc_column(Column::IdColumn { universe: new_universe });

        let mut schema = Schema::empty();
        let mut new_columns = Vec::with_capacity(assignments.len());
        let mut fresh = Vec::new();
        let mut inputs = vec![key_column];

        for (name, expr) in assignments {
            let is_group_passthrough = matches!(
                &expr,
                Expression::ColumnReference { column, .. } if group_ids.contains(column)
            );
            if !is_group_passthrough && !is_reducer_safe(&expr) {
                return Err(EngineError::InvariantViolation(format!(
                    "reduce assignment `{name}` is neither a grouping column nor built from reducers"
                )));
            }
            let dtype = expr.infer_dtype(builder, true)?;
            inputs.extend(expr.collect_tables());
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: new_universe,
                properties: ColumnProperties::new(dtype.clone(), false),
                context: ctx,
                expression: Box::new(expr),
                lineage: None,
            });
            schema.push(FieldSchema::new(name.clone(), dtype, false));
            fresh.push((new_id, name.clone()));
            new_columns.push((name, new_id));
        }

        builder.record_operator("reduce", inputs, fresh)?;
        Ok(Table {
            universe: new_universe,
            columns: new_columns,
            schema,
            primary_key_columns: Vec::new(),
            id_column: new_id_column,
        })
    }
}

/// True when `expr` is a reducer, a constant, or built only from
/// reducers/constants — i.e. it never exposes a bare per-row column value
/// into the grouped result.
fn is_reducer_safe(expr: &Expression) -> bool {
    match expr {
        Expression::Reducer { .. } | Expression::ColumnConstExpression { .. } => true,
        Expression::ColumnReference { .. } | Expression::PointerExpression { .. } => false,
        Expression::Arith { left, right, .. }
        | Expression::Compare { left, right, .. }
        | Expression::Logical { left, right, .. } => is_reducer_safe(left) && is_reducer_safe(right),
        Expression::Not(inner)
        | Expression::IsNone(inner)
        | Expression::Cast { inner, .. }
        | Expression::Declare { inner, .. } => is_reducer_safe(inner),
    }
}

impl Table {
    /// `groupby(cols, id?, sort_by?)` — begins a grouped reduction.
    pub fn groupby<'a>(&'a self, columns: &[&str]) -> EngineResult<GroupedTable<'a>> {
        for name in columns {
            self.column_id(name)?;
        }
        Ok(GroupedTable::new(
            self,
            columns.iter().map(|s| s.to_string()).collect(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::DType;

    fn sample_table(builder: &mut GraphBuilder) -> Table {
        let universe = builder.new_universe();
        let owner = builder.alloc_column(Column::Materialized {
            universe,
            properties: ColumnProperties::new(DType::String, false),
        });
        let age = builder.alloc_column(Column::Materialized {
            universe,
            properties: ColumnProperties::new(DType::Int, false),
        });
        Table::from_columns(
            builder,
            universe,
            vec![
                ("owner".to_string(), owner, DType::String, false),
                ("age".to_string(), age, DType::Int, false),
            ],
            vec![],
        )
        .unwrap()
    }

    #[test]
    fn reduce_produces_fresh_identity_universe() {
        let mut builder = GraphBuilder::new();
        let t = sample_table(&mut builder);
        let owner_col = t.column_id("owner").unwrap();
        let age_col = t.column_id("age").unwrap();
        let grouped = t.groupby(&["owner"]).unwrap();
        let reduced = grouped
            .reduce(
                &mut builder,
                vec![
                    (
                        "owner".to_string(),
                        Expression::ColumnReference {
                            table: t.id_column(),
                            column: owner_col,
                            name: "owner".to_string(),
                        },
                    ),
                    (
                        "total".to_string(),
                        Expression::Reducer {
                            kind: crate::expression::ReducerKind::Sum,
                            arg: Box::new(Expression::ColumnReference {
                                table: t.id_column(),
                                column: age_col,
                                name: "age".to_string(),
                            }),
                        },
                    ),
                ],
            )
            .unwrap();
        assert_ne!(reduced.universe(), t.universe());
        assert_eq!(reduced.schema().names(), vec!["owner", "total"]);
    }

    #[test]
    fn bare_column_outside_group_keys_is_rejected() {
        let mut builder = GraphBuilder::new();
        let t = sample_table(&mut builder);
        let age_col = t.column_id("age").unwrap();
        let grouped = t.groupby(&["owner"]).unwrap();
        let err = grouped.reduce(
            &mut builder,
            vec![(
                "age".to_string(),
                Expression::ColumnReference {
                    table: t.id_column(),
                    column: age_col,
                    name: "age".to_string(),
                },
            )],
        );
        assert!(err.is_err());
    }
}
