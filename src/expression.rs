//! # Expression tree
//!
//! Pure expressions over column references (spec 4.D). Shaped like the
//! teacher's `IRExpression`/`Predicate` tagged enums (`src/ir/mod.rs`): a
//! flat set of leaf and inner variants, a `collect_tables` visitor, and a
//! pattern recognizer for narrowing casts — generalized from the
//! teacher's integer/string-constant predicates to a typed tree over the
//! full [`DType`] lattice.

use crate::errors::{type_mismatch, EngineError, EngineResult};
use crate::ids::ColumnId;
use crate::value::{types_lca, DType, Value};
use std::collections::HashSet;

/// Looks up the declared dtype of a column by id. Implemented by whatever
/// owns the column arena ([`crate::parse_graph::GraphBuilder`]); kept as a
/// trait so expression type inference does not need to know about arenas.
pub trait ColumnTypeLookup {
    fn dtype_of(&self, column: ColumnId) -> EngineResult<DType>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    And,
    Or,
    Xor,
}

/// Reducer kinds valid only inside a grouped context (`reduce`/
/// `groupby().reduce`), named after the teacher's `AggregateFunction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReducerKind {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// `(table, column, name)` — `table` identifies the owning table by
    /// the [`ColumnId`] of its id-column, since tables are plain values
    /// rather than arena entries.
    ColumnReference {
        table: ColumnId,
        column: ColumnId,
        name: String,
    },
    ColumnConstExpression { value: Value },
    PointerExpression {
        table: ColumnId,
        args: Vec<Expression>,
        optional: bool,
    },
    Arith {
        op: ArithOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    Not(Box<Expression>),
    /// `expr is None` — the building block `get_column_filtered_by_is_none`
    /// looks for, usually wrapped in [`Expression::Not`].
    IsNone(Box<Expression>),
    Cast {
        target: DType,
        inner: Box<Expression>,
    },
    /// Overrides the inferred type without runtime conversion.
    Declare {
        target: DType,
        inner: Box<Expression>,
    },
    Reducer {
        kind: ReducerKind,
        arg: Box<Expression>,
    },
}

impl Expression {
    /// All table identities (id-column ids) referenced anywhere in this
    /// subtree.
    pub fn collect_tables(&self) -> HashSet<ColumnId> {
        let mut out = HashSet::new();
        self.collect_tables_into(&mut out);
        out
    }

    fn collect_tables_into(&self, out: &mut HashSet<ColumnId>) {
        match self {
            Expression::ColumnReference { table, .. } => {
                out.insert(*table);
            }
            Expression::PointerExpression { table, args, .. } => {
                out.insert(*table);
                for a in args {
                    a.collect_tables_into(out);
                }
            }
            Expression::ColumnConstExpression { .. } => {}
            Expression::Arith { left, right, .. }
            | Expression::Compare { left, right, .. }
            | Expression::Logical { left, right, .. } => {
                left.collect_tables_into(out);
                right.collect_tables_into(out);
            }
            Expression::Not(inner)
            | Expression::IsNone(inner)
            | Expression::Cast { inner, .. }
            | Expression::Declare { inner, .. }
            | Expression::Reducer { arg: inner, .. } => inner.collect_tables_into(out),
        }
    }

    /// Recognizes `col is not None`, i.e. `Not(IsNone(ColumnReference))`,
    /// and returns the referenced column — used by `filter` to narrow the
    /// result type via [`DType::unoptionalize`].
    pub fn get_column_filtered_by_is_none(&self) -> Option<ColumnId> {
        if let Expression::Not(inner) = self {
            if let Expression::IsNone(target) = inner.as_ref() {
                if let Expression::ColumnReference { column, .. } = target.as_ref() {
                    return Some(*column);
                }
            }
        }
        None
    }

    /// Type inference by structural evaluation. `grouped` must be true for
    /// [`Expression::Reducer`] to typecheck (spec 4.D).
    pub fn infer_dtype(
        &self,
        lookup: &dyn ColumnTypeLookup,
        grouped: bool,
    ) -> EngineResult<DType> {
        match self {
            Expression::ColumnReference { column, .. } => lookup.dtype_of(*column),
            Expression::ColumnConstExpression { value } => Ok(value.dtype()),
            Expression::PointerExpression { optional, .. } => {
                if *optional {
                    Ok(DType::Optional(Box::new(DType::Pointer)))
                } else {
                    Ok(DType::Pointer)
                }
            }
            Expression::Arith { op, left, right } => {
                let l = left.infer_dtype(lookup, grouped)?;
                let r = right.infer_dtype(lookup, grouped)?;
                let merged = types_lca(&l.unoptionalize(), &r.unoptionalize())
                    .map_err(|e| EngineError::type_mismatch(arith_op_name(*op), e))?;
                if !matches!(merged, DType::Int | DType::Float) {
                    return Err(type_mismatch(arith_op_name(*op), merged.clone(), merged));
                }
                Ok(merged)
            }
            Expression::Compare { op, left, right } => {
                let l = left.infer_dtype(lookup, grouped)?;
                let r = right.infer_dtype(lookup, grouped)?;
                if l.is_pointer_like() || r.is_pointer_like() {
                    if !(l.is_pointer_like() && r.is_pointer_like()) {
                        return Err(type_mismatch("compare", l, r));
                    }
                    return Ok(DType::Bool);
                }
                types_lca(&l, &r).map_err(|e| EngineError::type_mismatch(compare_op_name(*op), e))?;
                Ok(DType::Bool)
            }
            Expression::Logical { left, right, .. } => {
                require_bool(left.infer_dtype(lookup, grouped)?, "logical")?;
                require_bool(right.infer_dtype(lookup, grouped)?, "logical")?;
                Ok(DType::Bool)
            }
            Expression::Not(inner) => {
                require_bool(inner.infer_dtype(lookup, grouped)?, "not")?;
                Ok(DType::Bool)
            }
            Expression::IsNone(inner) => {
                inner.infer_dtype(lookup, grouped)?;
                Ok(DType::Bool)
            }
            Expression::Cast { target, inner } => {
                inner.infer_dtype(lookup, grouped)?;
                Ok(target.clone())
            }
            Expression::Declare { target, .. } => Ok(target.clone()),
            Expression::Reducer { arg, .. } => {
                if !grouped {
                    return Err(type_mismatch(
                        "reducer",
                        DType::Any,
                        DType::Any,
                    ));
                }
                arg.infer_dtype(lookup, grouped)
            }
        }
    }
}

fn require_bool(dtype: DType, context: &str) -> EngineResult<()> {
    if dtype.unoptionalize() == DType::Bool {
        Ok(())
    } else {
        Err(type_mismatch(context, DType::Bool, dtype))
    }
}

fn arith_op_name(op: ArithOp) -> &'static str {
    match op {
        ArithOp::Add => "add",
        ArithOp::Sub => "sub",
        ArithOp::Mul => "mul",
        ArithOp::Div => "div",
        ArithOp::FloorDiv => "floordiv",
        ArithOp::Mod => "mod",
        ArithOp::Pow => "pow",
    }
}

fn compare_op_name(op: CompareOp) -> &'static str {
    match op {
        CompareOp::Eq => "eq",
        CompareOp::Ne => "ne",
        CompareOp::Lt => "lt",
        CompareOp::Le => "le",
        CompareOp::Gt => "gt",
        CompareOp::Ge => "ge",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct FakeLookup(HashMap<ColumnId, DType>);

    impl ColumnTypeLookup for FakeLookup {
        fn dtype_of(&self, column: ColumnId) -> EngineResult<DType> {
            self.0
                .get(&column)
                .cloned()
                .ok_or_else(|| EngineError::unknown_column(format!("{column}")))
        }
    }

    fn col_ref(table: ColumnId, column: ColumnId) -> Expression {
        Expression::ColumnReference {
            table,
            column,
            name: "x".into(),
        }
    }

    #[test]
    fn arithmetic_widens_int_and_float() {
        let lookup = FakeLookup(HashMap::from([
            (ColumnId(1), DType::Int),
            (ColumnId(2), DType::Float),
        ]));
        let expr = Expression::Arith {
            op: ArithOp::Add,
            left: Box::new(col_ref(ColumnId(0), ColumnId(1))),
            right: Box::new(col_ref(ColumnId(0), ColumnId(2))),
        };
        assert_eq!(expr.infer_dtype(&lookup, false).unwrap(), DType::Float);
    }

    #[test]
    fn pointer_comparison_requires_both_sides_pointer() {
        let lookup = FakeLookup(HashMap::from([
            (ColumnId(1), DType::Pointer),
            (ColumnId(2), DType::String),
        ]));
        let expr = Expression::Compare {
            op: CompareOp::Eq,
            left: Box::new(col_ref(ColumnId(0), ColumnId(1))),
            right: Box::new(col_ref(ColumnId(0), ColumnId(2))),
        };
        assert!(expr.infer_dtype(&lookup, false).is_err());
    }

    #[test]
    fn reducer_requires_grouped_context() {
        let lookup = FakeLookup(HashMap::from([(ColumnId(1), DType::Int)]));
        let expr = Expression::Reducer {
            kind: ReducerKind::Sum,
            arg: Box::new(col_ref(ColumnId(0), ColumnId(1))),
        };
        assert!(expr.infer_dtype(&lookup, false).is_err());
        assert_eq!(expr.infer_dtype(&lookup, true).unwrap(), DType::Int);
    }

    #[test]
    fn is_not_none_pattern_is_recognized() {
        let inner = col_ref(ColumnId(0), ColumnId(1));
        let expr = Expression::Not(Box::new(Expression::IsNone(Box::new(inner))));
        assert_eq!(expr.get_column_filtered_by_is_none(), Some(ColumnId(1)));

        let not_a_match = Expression::Not(Box::new(col_ref(ColumnId(0), ColumnId(1))));
        assert_eq!(not_a_match.get_column_filtered_by_is_none(), None);
    }

    #[test]
    fn collect_tables_walks_whole_subtree() {
        let expr = Expression::Arith {
            op: ArithOp::Add,
            left: Box::new(col_ref(ColumnId(0), ColumnId(1))),
            right: Box::new(Expression::PointerExpression {
                table: ColumnId(9),
                args: vec![col_ref(ColumnId(9), ColumnId(2))],
                optional: false,
            }),
        };
        let tables = expr.collect_tables();
        assert_eq!(tables, HashSet::from([ColumnId(0), ColumnId(9)]));
    }
}
