//! # Table algebra
//!
//! The logical operators (spec 4.F). A [`Table`] is an immutable value:
//! `(ordered name→column mapping, universe, primary-key columns, schema,
//! id column)`. Every operator here takes `&mut GraphBuilder` explicitly
//! (no hidden global graph, per design note §9) and returns a fresh
//! `Table` sharing arena column ids with its input where the operator
//! contract allows.

pub mod groupby;

use crate::column::{Column, ColumnProperties};
use crate::context::{Context, TemporalLifecycleKind};
use crate::errors::{type_mismatch, EngineError, EngineResult};
use crate::expression::{ColumnTypeLookup, Expression};
use crate::ids::ColumnId;
use crate::parse_graph::GraphBuilder;
use crate::schema::{FieldSchema, Schema};
use crate::universe::Universe;
use crate::value::{types_lca, DType};
use std::collections::HashSet;

/// `(ordered mapping name→Column, universe, primary-key columns subset,
/// schema, identity column)` — spec 3.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    universe: Universe,
    columns: Vec<(String, ColumnId)>,
    schema: Schema,
    primary_key_columns: Vec<String>,
    id_column: ColumnId,
}

impl Table {
    pub fn universe(&self) -> Universe {
        self.universe
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn id_column(&self) -> ColumnId {
        self.id_column
    }

    pub fn arity(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn column_id(&self, name: &str) -> EngineResult<ColumnId> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, id)| *id)
            .ok_or_else(|| EngineError::unknown_column(name))
    }

    pub fn columns(&self) -> &[(String, ColumnId)] {
        &self.columns
    }

    fn column_reference(&self, builder: &GraphBuilder, name: &str) -> EngineResult<Expression> {
        let column = self.column_id(name)?;
        let _ = builder.require_column(column)?;
        Ok(Expression::ColumnReference {
            table: self.id_column,
            column,
            name: name.to_string(),
        })
    }

    /// Constructs a table from an ordered, non-empty list of `(name,
    /// column)` pairs sharing `universe`. Empty input is the boundary
    /// condition the spec calls out (original `ValueError`) — realized as
    /// [`EngineError::InvariantViolation`] since it is a plan-construction
    /// contract violation, not a recoverable lookup failure (see
    /// DESIGN.md Open Questions).
    pub fn from_columns(
        builder: &mut GraphBuilder,
        universe: Universe,
        fields: Vec<(String, ColumnId, DType, bool)>,
        primary_key_columns: Vec<String>,
    ) -> EngineResult<Table> {
        if fields.is_empty() {
            return Err(EngineError::InvariantViolation(
                "from_columns requires at least one column".to_string(),
            ));
        }
        let id_column = builder.alloc_column(Column::IdColumn { universe });
        let mut columns = Vec::with_capacity(fields.len());
        let mut schema = Schema::empty();
        for (name, column_id, dtype, append_only) in fields {
            schema.push(FieldSchema::new(name.clone(), dtype, append_only));
            columns.push((name, column_id));
        }
        Ok(Table {
            universe,
            columns,
            schema,
            primary_key_columns,
            id_column,
        })
    }

    /// Identity operator producing a structurally distinct table value
    /// over the same universe and columns — grounds round-trip property
    /// 8.5 without aliasing. [EXPANSION], `table.py` `Table.copy`.
    pub fn copy(&self, builder: &mut GraphBuilder) -> EngineResult<Table> {
        let rowwise = builder.alloc_context(Context::Rowwise {
            universe: self.universe,
        });
        let mut new_columns = Vec::with_capacity(self.columns.len());
        let mut fresh = Vec::new();
        for (name, old_id) in &self.columns {
            let expr = self.column_reference(builder, name)?;
            let dtype = builder.column(*old_id).dtype();
            let append_only = builder.column(*old_id).append_only();
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: self.universe,
                properties: ColumnProperties::new(dtype, append_only),
                context: rowwise,
                expression: Box::new(expr),
                lineage: None,
            });
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        builder.record_operator("copy", self.columns.iter().map(|(_, id)| *id).collect(), fresh)?;
        Ok(Table {
            universe: self.universe,
            columns: new_columns,
            schema: self.schema.clone(),
            primary_key_columns: self.primary_key_columns.clone(),
            id_column: self.id_column,
        })
    }

    /// `select(exprs, assignments)` — spec 4.F. Fails if any expression
    /// references a column outside this table's universe.
    pub fn select(
        &self,
        builder: &mut GraphBuilder,
        assignments: Vec<(String, Expression)>,
    ) -> EngineResult<Table> {
        let rowwise = builder.alloc_context(Context::Rowwise {
            universe: self.universe,
        });
        let mut new_columns = Vec::with_capacity(assignments.len());
        let mut schema = Schema::empty();
        let mut fresh = Vec::new();
        let mut inputs = Vec::new();
        for (name, expr) in assignments {
            for table_ref in expr.collect_tables() {
                if table_ref != self.id_column {
                    return Err(EngineError::UniverseMismatch);
                }
            }
            let dtype = expr.infer_dtype(builder, false)?;
            inputs.extend(expr.collect_tables());
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: self.universe,
                properties: ColumnProperties::new(dtype.clone(), false),
                context: rowwise,
                expression: Box::new(expr),
                lineage: None,
            });
            schema.push(FieldSchema::new(name.clone(), dtype, false));
            fresh.push((new_id, name.clone()));
            new_columns.push((name, new_id));
        }
        builder.record_operator("select", inputs, fresh)?;
        Ok(Table {
            universe: self.universe,
            columns: new_columns,
            schema,
            primary_key_columns: Vec::new(),
            id_column: self.id_column,
        })
    }

    /// `filter(boolExpr)` — spec 4.F. Narrows a column's type via
    /// `unoptionalize` when the predicate is `col is not None`.
    pub fn filter(&self, builder: &mut GraphBuilder, predicate: Expression) -> EngineResult<Table> {
        let predicate_dtype = predicate.infer_dtype(builder, false)?;
        if predicate_dtype.unoptionalize() != DType::Bool {
            return Err(type_mismatch("filter", DType::Bool, predicate_dtype));
        }
        let narrowed_column = predicate.get_column_filtered_by_is_none();

        let rowwise = builder.alloc_context(Context::Rowwise {
            universe: self.universe,
        });
        let pred_inputs: Vec<ColumnId> = predicate.collect_tables().into_iter().collect();
        let pred_col = builder.alloc_column(Column::WithExpression {
            universe: self.universe,
            properties: ColumnProperties::new(DType::Bool, false),
            context: rowwise,
            expression: Box::new(predicate),
            lineage: None,
        });

        let new_universe = builder.new_universe();
        builder.solver.promise_is_subset_of(new_universe, self.universe)?;
        let filter_ctx = builder.alloc_context(Context::Filter {
            filter_column: pred_col,
            original_universe: self.universe,
        });

        let new_id_column = builder.alloc_column(Column::IdColumn { universe: new_universe });
        let mut new_columns = Vec::with_capacity(self.columns.len());
        let mut schema = Schema::empty();
        let mut fresh = vec![(pred_col, "__filter_predicate".to_string())];
        for (name, old_id) in &self.columns {
            let old_col = builder.column(*old_id);
            let mut dtype = old_col.dtype();
            if narrowed_column == Some(*old_id) {
                dtype = dtype.unoptionalize();
            }
            let append_only = old_col.append_only();
            let expr = self.column_reference(builder, name)?;
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: new_universe,
                properties: ColumnProperties::new(dtype.clone(), append_only),
                context: filter_ctx,
                expression: Box::new(expr),
                lineage: None,
            });
            schema.push(FieldSchema::new(name.clone(), dtype, append_only));
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        let mut inputs = pred_inputs;
        inputs.extend(self.columns.iter().map(|(_, id)| *id));
        builder.record_operator("filter", inputs, fresh)?;
        Ok(Table {
            universe: new_universe,
            columns: new_columns,
            schema,
            primary_key_columns: self.primary_key_columns.clone(),
            id_column: new_id_column,
        })
    }

    /// `restrict(other)` — precondition `other.U ⊆ self.U`.
    pub fn restrict(&self, builder: &mut GraphBuilder, other: &Table) -> EngineResult<Table> {
        if !builder.solver.query_is_subset(other.universe, self.universe) {
            return Err(EngineError::UniverseMismatch);
        }
        self.rewrap_onto(
            builder,
            other.universe,
            Context::Restrict {
                target_universe: other.universe,
                original_universe: self.universe,
            },
            "restrict",
        )
    }

    /// `difference(other)` — result universe = `solver.difference(U, V)`.
    pub fn difference(&self, builder: &mut GraphBuilder, other: &Table) -> EngineResult<Table> {
        let new_universe = builder.solver.get_difference(self.universe, other.universe);
        self.rewrap_onto(
            builder,
            new_universe,
            Context::Difference {
                left: self.universe,
                right: other.universe,
            },
            "difference",
        )
    }

    /// `intersect(others…)`.
    pub fn intersect(&self, builder: &mut GraphBuilder, others: &[&Table]) -> EngineResult<Table> {
        let mut universes = vec![self.universe];
        universes.extend(others.iter().map(|t| t.universe));
        let new_universe = builder.solver.get_intersection(&universes);
        self.rewrap_onto(builder, new_universe, Context::Intersect { universes }, "intersect")
    }

    /// Shared plumbing for operators that keep the same columns (by name)
    /// but move them onto a new universe via a plain rowwise context —
    /// `restrict`/`difference`/`intersect` all follow this shape.
    fn rewrap_onto(
        &self,
        builder: &mut GraphBuilder,
        new_universe: Universe,
        context: Context,
        kind: &'static str,
    ) -> EngineResult<Table> {
        let ctx = builder.alloc_context(context);
        let new_id_column = builder.alloc_column(Column::IdColumn { universe: new_universe });
        let mut new_columns = Vec::with_capacity(self.columns.len());
        let mut fresh = Vec::new();
        let mut inputs = Vec::new();
        for (name, old_id) in &self.columns {
            let old_col = builder.column(*old_id);
            let dtype = old_col.dtype();
            let append_only = old_col.append_only();
            let expr = self.column_reference(builder, name)?;
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: new_universe,
                properties: ColumnProperties::new(dtype, append_only),
                context: ctx,
                expression: Box::new(expr),
                lineage: None,
            });
            inputs.push(*old_id);
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        builder.record_operator(kind, inputs, fresh)?;
        Ok(Table {
            universe: new_universe,
            columns: new_columns,
            schema: self.schema.clone(),
            primary_key_columns: self.primary_key_columns.clone(),
            id_column: new_id_column,
        })
    }

    /// `concat(others…)` — preconditions: identical column key-sets,
    /// pairwise disjoint universes; schema merged by `types_lca`.
    pub fn concat(&self, builder: &mut GraphBuilder, others: &[&Table]) -> EngineResult<Table> {
        for other in others {
            if !self.schema.same_keys(&other.schema) {
                return Err(EngineError::schema_mismatch(self.schema.symmetric_difference(&other.schema)));
            }
        }
        let mut universes = vec![self.universe];
        universes.extend(others.iter().map(|t| t.universe));
        if !builder.solver.query_are_disjoint(&universes) {
            return Err(EngineError::UniverseMismatch);
        }
        let new_universe = builder.solver.get_union(&universes);

        let mut all_tables: Vec<&Table> = vec![self];
        all_tables.extend(others.iter().copied());

        let mut source_columns = Vec::with_capacity(self.columns.len());
        for name in self.column_names() {
            let source_ids: Vec<ColumnId> = all_tables
                .iter()
                .map(|table| table.column_id(name))
                .collect::<EngineResult<_>>()?;
            source_columns.push(source_ids);
        }
        let ctx = builder.alloc_context(Context::ConcatUnsafe {
            universes: universes.clone(),
            source_columns: source_columns.clone(),
        });

        let mut merged_schema = Schema::empty();
        let mut new_columns = Vec::new();
        let mut fresh = Vec::new();
        let mut inputs = Vec::new();

        for (name, source_ids) in self.column_names().into_iter().zip(source_columns) {
            let mut dtype = self.schema.dtype_of(name).cloned().unwrap_or(DType::Any);
            let mut append_only = true;
            for id in &source_ids {
                let col = builder.column(*id);
                dtype = types_lca(&dtype, &col.dtype()).map_err(|e| EngineError::type_mismatch(name, e))?;
                append_only &= col.append_only();
            }
            inputs.extend(source_ids.iter().copied());
            // Per-source column picked by an expression over whichever
            // source universe is live for a given row; realized here as
            // a reference to the first source, with the remaining ids
            // recorded as ConcatUnsafe dependencies for the evaluator.
            let expr = Expression::ColumnReference {
                table: self.id_column,
                column: source_ids[0],
                name: name.to_string(),
            };
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: new_universe,
                properties: ColumnProperties::new(dtype.clone(), append_only),
                context: ctx,
                expression: Box::new(expr),
                lineage: None,
            });
            merged_schema.push(FieldSchema::new(name.to_string(), dtype, append_only));
            fresh.push((new_id, name.to_string()));
            new_columns.push((name.to_string(), new_id));
        }
        let new_id_column = builder.alloc_column(Column::IdColumn { universe: new_universe });
        builder.record_operator("concat", inputs, fresh)?;
        Ok(Table {
            universe: new_universe,
            columns: new_columns,
            schema: merged_schema,
            primary_key_columns: Vec::new(),
            id_column: new_id_column,
        })
    }

    /// `update_cells(other)` — `other.columns ⊆ self.columns`,
    /// `other.U ⊆ self.U`; per-cell overwrite, result universe `self.U`.
    /// Warns (does not error) when the universes are equal, suggesting
    /// `with_columns`.
    pub fn update_cells(&self, builder: &mut GraphBuilder, other: &Table) -> EngineResult<Table> {
        for name in other.column_names() {
            if self.column_id(name).is_err() {
                return Err(EngineError::unknown_column(name));
            }
        }
        if !builder.solver.query_is_subset(other.universe, self.universe) {
            return Err(EngineError::UniverseMismatch);
        }
        if builder.solver.query_are_equal(self.universe, other.universe) {
            tracing::warn!("update_cells called with equal universes; consider with_columns instead");
        }
        let overwrites: Vec<ColumnId> = other
            .column_names()
            .iter()
            .map(|n| other.column_id(n))
            .collect::<EngineResult<_>>()?;
        let ctx = builder.alloc_context(Context::UpdateCells {
            union_universe: self.universe,
            overwrites: overwrites.clone(),
        });
        let mut new_columns = Vec::with_capacity(self.columns.len());
        let mut fresh = Vec::new();
        let mut inputs = overwrites.clone();
        for (name, old_id) in &self.columns {
            let dtype = builder.column(*old_id).dtype();
            let append_only = builder.column(*old_id).append_only();
            let expr = if let Ok(override_id) = other.column_id(name) {
                Expression::ColumnReference {
                    table: other.id_column,
                    column: override_id,
                    name: name.clone(),
                }
            } else {
                self.column_reference(builder, name)?
            };
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: self.universe,
                properties: ColumnProperties::new(dtype, append_only),
                context: ctx,
                expression: Box::new(expr),
                lineage: None,
            });
            inputs.push(*old_id);
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        builder.record_operator("update_cells", inputs, fresh)?;
        Ok(Table {
            universe: self.universe,
            columns: new_columns,
            schema: self.schema.clone(),
            primary_key_columns: self.primary_key_columns.clone(),
            id_column: self.id_column,
        })
    }

    /// Sugar for `update_cells` restricted to the same-universe case.
    /// [EXPANSION], `table.py` `with_columns`.
    pub fn with_columns(&self, builder: &mut GraphBuilder, other: &Table) -> EngineResult<Table> {
        if !builder.solver.query_are_equal(self.universe, other.universe) {
            return Err(EngineError::UniverseMismatch);
        }
        self.update_cells(builder, other)
    }

    /// `update_rows(other)` — identical column key-sets, LCA-merged
    /// dtypes, result universe = union; shortcut to `other` when `self.U
    /// ⊆ other.U`.
    pub fn update_rows(&self, builder: &mut GraphBuilder, other: &Table) -> EngineResult<Table> {
        if !self.schema.same_keys(&other.schema) {
            return Err(EngineError::schema_mismatch(self.schema.symmetric_difference(&other.schema)));
        }
        if builder.solver.query_are_equal(self.universe, other.universe) {
            tracing::warn!("update_rows called with equal universes; consider update_cells/with_columns instead");
        }
        if builder.solver.query_is_subset(self.universe, other.universe) {
            return other.copy(builder);
        }
        let new_universe = builder.solver.get_union(&[self.universe, other.universe]);
        let overwrites: Vec<ColumnId> = other
            .column_names()
            .iter()
            .map(|n| other.column_id(n))
            .collect::<EngineResult<_>>()?;
        let ctx = builder.alloc_context(Context::UpdateRows {
            union_universe: new_universe,
            overwrites: overwrites.clone(),
        });
        let mut new_columns = Vec::with_capacity(self.columns.len());
        let mut schema = Schema::empty();
        let mut fresh = Vec::new();
        let mut inputs = overwrites;
        for name in self.column_names() {
            let self_id = self.column_id(name)?;
            let other_id = other.column_id(name)?;
            let dtype = types_lca(&builder.column(self_id).dtype(), &builder.column(other_id).dtype())
                .map_err(|e| EngineError::type_mismatch(name, e))?;
            let append_only = builder.column(self_id).append_only() && builder.column(other_id).append_only();
            let expr = Expression::ColumnReference {
                table: other.id_column,
                column: other_id,
                name: name.to_string(),
            };
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: new_universe,
                properties: ColumnProperties::new(dtype.clone(), append_only),
                context: ctx,
                expression: Box::new(expr),
                lineage: None,
            });
            inputs.push(self_id);
            schema.push(FieldSchema::new(name.to_string(), dtype, append_only));
            fresh.push((new_id, name.to_string()));
            new_columns.push((name.to_string(), new_id));
        }
        let new_id_column = builder.alloc_column(Column::IdColumn { universe: new_universe });
        builder.record_operator("update_rows", inputs, fresh)?;
        Ok(Table {
            universe: new_universe,
            columns: new_columns,
            schema,
            primary_key_columns: Vec::new(),
            id_column: new_id_column,
        })
    }

    /// `with_id(colref)` — new identity universe from an existing pointer
    /// column.
    pub fn with_id(&self, builder: &mut GraphBuilder, key_column_name: &str) -> EngineResult<Table> {
        let key_column = self.column_id(key_column_name)?;
        if !builder.column(key_column).dtype().is_pointer_like() {
            return Err(type_mismatch(key_column_name, DType::Pointer, builder.column(key_column).dtype()));
        }
        self.reindex_on(builder, key_column)
    }

    /// `with_id_from(exprs…)` — identity derived from `pointer_from`.
    pub fn with_id_from(&self, builder: &mut GraphBuilder, columns: &[&str]) -> EngineResult<Table> {
        let key_column = pointer_from(builder, self, columns)?;
        self.reindex_on(builder, key_column)
    }

    fn reindex_on(&self, builder: &mut GraphBuilder, key_column: ColumnId) -> EngineResult<Table> {
        let new_universe = builder.new_universe();
        self.rewrap_onto(builder, new_universe, Context::Reindex { key_column }, "with_id")
    }

    /// `ix(expr, optional)` — pointer-indexed lookup into `target`.
    pub fn ix(
        &self,
        builder: &mut GraphBuilder,
        key_column_name: &str,
        target: &Table,
        optional: bool,
    ) -> EngineResult<Table> {
        let key_column = self.column_id(key_column_name)?;
        let key_dtype = builder.column(key_column).dtype();
        let required = if optional {
            DType::Optional(Box::new(DType::Pointer))
        } else {
            DType::Pointer
        };
        if optional {
            if !matches!(key_dtype, DType::Optional(ref inner) if **inner == DType::Pointer) {
                return Err(type_mismatch(key_column_name, required, key_dtype));
            }
        } else if key_dtype != DType::Pointer {
            return Err(type_mismatch(key_column_name, required, key_dtype));
        }

        let ctx = builder.alloc_context(Context::Ix { key_column, optional });
        let new_id_column = builder.alloc_column(Column::IdColumn { universe: self.universe });
        let mut new_columns = Vec::with_capacity(target.columns.len());
        let mut schema = Schema::empty();
        let mut fresh = Vec::new();
        for (name, target_id) in &target.columns {
            let mut dtype = builder.column(*target_id).dtype();
            if optional {
                dtype = dtype.optional();
            }
            let expr = Expression::ColumnReference {
                table: target.id_column,
                column: *target_id,
                name: name.clone(),
            };
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: self.universe,
                properties: ColumnProperties::new(dtype.clone(), false),
                context: ctx,
                expression: Box::new(expr),
                lineage: None,
            });
            schema.push(FieldSchema::new(name.clone(), dtype, false));
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        builder.record_operator("ix", vec![key_column], fresh)?;
        Ok(Table {
            universe: self.universe,
            columns: new_columns,
            schema,
            primary_key_columns: Vec::new(),
            id_column: new_id_column,
        })
    }

    /// Resolves `key_column_name` to `target` and calls `ix` against its
    /// id column. [EXPANSION], `table.py:2033`.
    pub fn ix_ref(&self, builder: &mut GraphBuilder, key_column_name: &str, target: &Table) -> EngineResult<Table> {
        self.ix(builder, key_column_name, target, false)
    }

    /// `having(indexers…)` — result universe restricted to keys present
    /// in every indexer. Zero indexers returns `self` unchanged (boundary
    /// behavior).
    pub fn having(&self, builder: &mut GraphBuilder, indexers: &[ColumnId]) -> EngineResult<Table> {
        if indexers.is_empty() {
            return self.copy(builder);
        }
        let new_universe = builder.new_universe();
        builder.solver.promise_is_subset_of(new_universe, self.universe)?;
        let ctx = Context::Having {
            indexer_columns: indexers.to_vec(),
        };
        self.rewrap_onto(builder, new_universe, ctx, "having")
    }

    /// `flatten(col)` — one row per element of the iterable column.
    pub fn flatten(&self, builder: &mut GraphBuilder, column_name: &str) -> EngineResult<Table> {
        let flatten_column = self.column_id(column_name)?;
        let elem_dtype = match builder.column(flatten_column).dtype() {
            DType::Array(inner) => *inner,
            other => return Err(type_mismatch(column_name, DType::Array(Box::new(DType::Any)), other)),
        };
        let new_universe = builder.new_universe();
        // `result_column` would normally be the freshly minted flattened
        // column's id, but that id doesn't exist until after the context
        // it belongs to is allocated; alias it to the source column until
        // the scope lowering pass rebinds it during evaluator construction.
        let ctx = builder.alloc_context(Context::Flatten {
            flatten_column,
            result_column: flatten_column,
            original_universe: self.universe,
        });
        let new_id_column = builder.alloc_column(Column::IdColumn { universe: new_universe });
        let mut new_columns = Vec::with_capacity(self.columns.len());
        let mut schema = Schema::empty();
        let mut fresh = Vec::new();
        for (name, old_id) in &self.columns {
            let dtype = if *old_id == flatten_column {
                elem_dtype.clone()
            } else {
                builder.column(*old_id).dtype()
            };
            let expr = self.column_reference(builder, name)?;
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: new_universe,
                properties: ColumnProperties::new(dtype.clone(), false),
                context: ctx,
                expression: Box::new(expr),
                lineage: None,
            });
            schema.push(FieldSchema::new(name.clone(), dtype, false));
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        builder.record_operator("flatten", vec![flatten_column], fresh)?;
        Ok(Table {
            universe: new_universe,
            columns: new_columns,
            schema,
            primary_key_columns: Vec::new(),
            id_column: new_id_column,
        })
    }

    /// One of the temporal lifecycle controls (`forget`/`freeze`/
    /// `buffer`/`filter_out_results_of_forgetting`) — universe-preserving,
    /// differs only by `kind`.
    pub fn temporal_lifecycle(
        &self,
        builder: &mut GraphBuilder,
        kind: TemporalLifecycleKind,
        threshold_column: &str,
        time_column: &str,
    ) -> EngineResult<Table> {
        let threshold = self.column_id(threshold_column)?;
        let time = self.column_id(time_column)?;
        let ctx = Context::TemporalLifecycle {
            kind,
            threshold_column: threshold,
            time_column: time,
        };
        self.rewrap_onto(builder, self.universe, ctx, "temporal_lifecycle")
    }

    /// `rename_by_dict` — rowwise rewrite, universe preserved.
    pub fn rename(&self, builder: &mut GraphBuilder, renames: &[(&str, &str)]) -> EngineResult<Table> {
        let rowwise = builder.alloc_context(Context::Rowwise { universe: self.universe });
        let mut new_columns = Vec::with_capacity(self.columns.len());
        let mut schema = Schema::empty();
        let mut fresh = Vec::new();
        let mut inputs = Vec::new();
        for (name, old_id) in &self.columns {
            let new_name = renames
                .iter()
                .find(|(from, _)| from == name)
                .map(|(_, to)| to.to_string())
                .unwrap_or_else(|| name.clone());
            let dtype = builder.column(*old_id).dtype();
            let append_only = builder.column(*old_id).append_only();
            let expr = self.column_reference(builder, name)?;
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: self.universe,
                properties: ColumnProperties::new(dtype.clone(), append_only),
                context: rowwise,
                expression: Box::new(expr),
                lineage: None,
            });
            inputs.push(*old_id);
            schema.push(FieldSchema::new(new_name.clone(), dtype, append_only));
            fresh.push((new_id, new_name.clone()));
            new_columns.push((new_name, new_id));
        }
        builder.record_operator("rename", inputs, fresh)?;
        Ok(Table {
            universe: self.universe,
            columns: new_columns,
            schema,
            primary_key_columns: self.primary_key_columns.clone(),
            id_column: self.id_column,
        })
    }

    pub fn with_prefix(&self, builder: &mut GraphBuilder, prefix: &str) -> EngineResult<Table> {
        let renames: Vec<(String, String)> = self
            .column_names()
            .into_iter()
            .map(|n| (n.to_string(), format!("{prefix}{n}")))
            .collect();
        let pairs: Vec<(&str, &str)> = renames.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        self.rename(builder, &pairs)
    }

    pub fn with_suffix(&self, builder: &mut GraphBuilder, suffix: &str) -> EngineResult<Table> {
        let renames: Vec<(String, String)> = self
            .column_names()
            .into_iter()
            .map(|n| (n.to_string(), format!("{n}{suffix}")))
            .collect();
        let pairs: Vec<(&str, &str)> = renames.iter().map(|(a, b)| (a.as_str(), b.as_str())).collect();
        self.rename(builder, &pairs)
    }

    /// `without(names…)` — projects out the given columns, rowwise.
    pub fn without(&self, builder: &mut GraphBuilder, names: &[&str]) -> EngineResult<Table> {
        let drop: HashSet<&str> = names.iter().copied().collect();
        let rowwise = builder.alloc_context(Context::Rowwise { universe: self.universe });
        let mut new_columns = Vec::new();
        let mut schema = Schema::empty();
        let mut fresh = Vec::new();
        let mut inputs = Vec::new();
        for (name, old_id) in &self.columns {
            if drop.contains(name.as_str()) {
                continue;
            }
            let dtype = builder.column(*old_id).dtype();
            let append_only = builder.column(*old_id).append_only();
            let expr = self.column_reference(builder, name)?;
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: self.universe,
                properties: ColumnProperties::new(dtype.clone(), append_only),
                context: rowwise,
                expression: Box::new(expr),
                lineage: None,
            });
            inputs.push(*old_id);
            schema.push(FieldSchema::new(name.clone(), dtype, append_only));
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        builder.record_operator("without", inputs, fresh)?;
        Ok(Table {
            universe: self.universe,
            columns: new_columns,
            schema,
            primary_key_columns: self.primary_key_columns.clone(),
            id_column: self.id_column,
        })
    }

    /// `update_types(overrides…)` — declares a column's type without
    /// emitting a conversion, unlike `cast_to_types`'s `Expression::Cast`.
    pub fn update_types(&self, builder: &mut GraphBuilder, overrides: &[(&str, DType)]) -> EngineResult<Table> {
        let rowwise = builder.alloc_context(Context::Rowwise { universe: self.universe });
        let mut new_columns = Vec::with_capacity(self.columns.len());
        let mut schema = Schema::empty();
        let mut fresh = Vec::new();
        let mut inputs = Vec::new();
        for (name, old_id) in &self.columns {
            let append_only = builder.column(*old_id).append_only();
            let declared = overrides.iter().find(|(n, _)| n == name).map(|(_, t)| t.clone());
            let inner = self.column_reference(builder, name)?;
            let (dtype, expr) = match declared {
                Some(target) => (
                    target.clone(),
                    Expression::Declare {
                        target,
                        inner: Box::new(inner),
                    },
                ),
                None => (builder.column(*old_id).dtype(), inner),
            };
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: self.universe,
                properties: ColumnProperties::new(dtype.clone(), append_only),
                context: rowwise,
                expression: Box::new(expr),
                lineage: None,
            });
            inputs.push(*old_id);
            schema.push(FieldSchema::new(name.clone(), dtype, append_only));
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        builder.record_operator("update_types", inputs, fresh)?;
        Ok(Table {
            universe: self.universe,
            columns: new_columns,
            schema,
            primary_key_columns: self.primary_key_columns.clone(),
            id_column: self.id_column,
        })
    }

    /// `cast_to_types(casts…)` — rowwise type conversion via
    /// `Expression::Cast`.
    pub fn cast_to_types(&self, builder: &mut GraphBuilder, casts: &[(&str, DType)]) -> EngineResult<Table> {
        let rowwise = builder.alloc_context(Context::Rowwise { universe: self.universe });
        let mut new_columns = Vec::with_capacity(self.columns.len());
        let mut schema = Schema::empty();
        let mut fresh = Vec::new();
        let mut inputs = Vec::new();
        for (name, old_id) in &self.columns {
            let append_only = builder.column(*old_id).append_only();
            let dtype = casts
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, t)| t.clone())
                .unwrap_or_else(|| builder.column(*old_id).dtype());
            let inner = self.column_reference(builder, name)?;
            let expr = Expression::Cast {
                target: dtype.clone(),
                inner: Box::new(inner),
            };
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: self.universe,
                properties: ColumnProperties::new(dtype.clone(), append_only),
                context: rowwise,
                expression: Box::new(expr),
                lineage: None,
            });
            inputs.push(*old_id);
            schema.push(FieldSchema::new(name.clone(), dtype, append_only));
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        builder.record_operator("cast_to_types", inputs, fresh)?;
        Ok(Table {
            universe: self.universe,
            columns: new_columns,
            schema,
            primary_key_columns: self.primary_key_columns.clone(),
            id_column: self.id_column,
        })
    }

    /// `with_universe_of(other)` — no-op copy when universes are already
    /// proven equal, otherwise inserts a `PromiseSameUniverse` context
    /// asserting equality to the runtime.
    pub fn with_universe_of(&self, builder: &mut GraphBuilder, other: &Table) -> EngineResult<Table> {
        if builder.solver.query_are_equal(self.universe, other.universe) {
            return self.copy(builder);
        }
        let ctx = Context::PromiseSameUniverse {
            claimed_universe: other.universe,
        };
        self.rewrap_onto(builder, other.universe, ctx, "with_universe_of")
    }

    /// `concat_reindex(others…)` — reindex each input by row index,
    /// promise disjoint, concat.
    pub fn concat_reindex(&self, builder: &mut GraphBuilder, others: &[&Table]) -> EngineResult<Table> {
        let self_reindexed = self.reindex_on(builder, self.id_column)?;
        let mut reindexed_others = Vec::with_capacity(others.len());
        for other in others {
            reindexed_others.push(other.reindex_on(builder, other.id_column)?);
        }
        let universes: Vec<Universe> = std::iter::once(self_reindexed.universe)
            .chain(reindexed_others.iter().map(|t| t.universe))
            .collect();
        builder.solver.promise_are_pairwise_disjoint(&universes)?;
        let refs: Vec<&Table> = reindexed_others.iter().collect();
        self_reindexed.concat(builder, &refs)
    }

    /// `+` — union of columns; requires proven-equal universes.
    pub fn union_columns(&self, builder: &mut GraphBuilder, other: &Table) -> EngineResult<Table> {
        if !builder.solver.query_are_equal(self.universe, other.universe) {
            return Err(EngineError::UniverseMismatch);
        }
        let rowwise = builder.alloc_context(Context::Rowwise { universe: self.universe });
        let mut new_columns = self.columns.clone();
        let mut schema = self.schema.clone();
        let mut fresh = Vec::new();
        let mut inputs: Vec<ColumnId> = self.columns.iter().map(|(_, id)| *id).collect();
        for (name, other_id) in &other.columns {
            let dtype = builder.column(*other_id).dtype();
            let append_only = builder.column(*other_id).append_only();
            let expr = Expression::ColumnReference {
                table: other.id_column,
                column: *other_id,
                name: name.clone(),
            };
            let new_id = builder.alloc_column(Column::WithExpression {
                universe: self.universe,
                properties: ColumnProperties::new(dtype.clone(), append_only),
                context: rowwise,
                expression: Box::new(expr),
                lineage: None,
            });
            inputs.push(*other_id);
            schema.push(FieldSchema::new(name.clone(), dtype, append_only));
            fresh.push((new_id, name.clone()));
            new_columns.push((name.clone(), new_id));
        }
        builder.record_operator("union_columns", inputs, fresh)?;
        Ok(Table {
            universe: self.universe,
            columns: new_columns,
            schema,
            primary_key_columns: self.primary_key_columns.clone(),
            id_column: self.id_column,
        })
    }
}

/// Standalone `pointer_from` — a pure pseudo-random hash of the named
/// columns' expressions, guaranteeing row-wise uniqueness when inputs
/// differ. Backs `with_id_from` and is exposed directly for ad hoc key
/// construction (e.g. join keys). [EXPANSION], `table.py:2011`.
pub fn pointer_from(builder: &mut GraphBuilder, table: &Table, columns: &[&str]) -> EngineResult<ColumnId> {
    let args = columns
        .iter()
        .map(|name| table.column_reference(builder, name))
        .collect::<EngineResult<Vec<_>>>()?;
    let rowwise = builder.alloc_context(Context::Rowwise {
        universe: table.universe,
    });
    let expr = Expression::PointerExpression {
        table: table.id_column,
        args,
        optional: false,
    };
    Ok(builder.alloc_column(Column::WithExpression {
        universe: table.universe,
        properties: ColumnProperties::new(DType::Pointer, true),
        context: rowwise,
        expression: Box::new(expr),
        lineage: None,
    }))
}
