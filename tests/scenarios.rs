//! End-to-end plan-construction scenarios from spec.md §8 (S1–S6) plus
//! the universal invariants and boundary behaviors, exercised against the
//! frontend's own plan-structure guarantees (universe relationships,
//! schema, lineage) since no physical evaluator exists in this crate to
//! materialize actual row data — that lives behind `EngineScope`.

use relflow::column::{Column, ColumnProperties};
use relflow::context::Context;
use relflow::expression::{CompareOp, Expression, ReducerKind};
use relflow::parse_graph::GraphBuilder;
use relflow::table::Table;
use relflow::universe::UniverseSolver;
use relflow::value::{DType, Value};

fn pets_table(builder: &mut GraphBuilder) -> Table {
    let universe = builder.new_universe();
    let age = builder.alloc_column(Column::Materialized {
        universe,
        properties: ColumnProperties::new(DType::Int, false),
    });
    let owner = builder.alloc_column(Column::Materialized {
        universe,
        properties: ColumnProperties::new(DType::String, false),
    });
    let pet = builder.alloc_column(Column::Materialized {
        universe,
        properties: ColumnProperties::new(DType::String, false),
    });
    Table::from_columns(
        builder,
        universe,
        vec![
            ("age".to_string(), age, DType::Int, false),
            ("owner".to_string(), owner, DType::String, false),
            ("pet".to_string(), pet, DType::String, false),
        ],
        vec![],
    )
    .unwrap()
}

/// S1: `filter(age > 9)` narrows the universe to a proven subset and
/// keeps the schema unchanged.
#[test]
fn s1_filter_narrows_to_a_proven_subset() {
    let mut builder = GraphBuilder::new();
    let t = pets_table(&mut builder);
    let age_ref = Expression::ColumnReference {
        table: t.id_column(),
        column: t.column_id("age").unwrap(),
        name: "age".to_string(),
    };
    let predicate = Expression::Compare {
        op: CompareOp::Gt,
        left: Box::new(age_ref),
        right: Box::new(Expression::ColumnConstExpression { value: Value::Int(9) }),
    };
    let filtered = t.filter(&mut builder, predicate).unwrap();

    assert_ne!(filtered.universe(), t.universe());
    assert!(builder.solver.query_is_subset(filtered.universe(), t.universe()));
    assert_eq!(filtered.schema().names(), t.schema().names());
}

/// S2: `concat_reindex` produces a fresh universe disjoint-by-construction
/// from neither input, carrying every column name from both sides.
#[test]
fn s2_concat_reindex_unions_disjoint_reindexed_inputs() {
    let mut builder = GraphBuilder::new();
    let universe1 = builder.new_universe();
    let pet1 = builder.alloc_column(Column::Materialized {
        universe: universe1,
        properties: ColumnProperties::new(DType::String, false),
    });
    let t1 = Table::from_columns(&mut builder, universe1, vec![("pet".to_string(), pet1, DType::String, false)], vec![]).unwrap();

    let universe2 = builder.new_universe();
    let pet2 = builder.alloc_column(Column::Materialized {
        universe: universe2,
        properties: ColumnProperties::new(DType::String, false),
    });
    let t2 = Table::from_columns(&mut builder, universe2, vec![("pet".to_string(), pet2, DType::String, false)], vec![]).unwrap();

    let combined = t1.concat_reindex(&mut builder, &[&t2]).unwrap();
    assert_eq!(combined.schema().names(), vec!["pet"]);
    assert_ne!(combined.universe(), t1.universe());
    assert_ne!(combined.universe(), t2.universe());
}

/// S3: `update_cells` keeps `self`'s universe and full column set.
#[test]
fn s3_update_cells_preserves_universe_and_columns() {
    let mut builder = GraphBuilder::new();
    let t = pets_table(&mut builder);
    let subset_universe = builder.new_universe();
    builder.solver.promise_is_subset_of(subset_universe, t.universe()).unwrap();
    let patch_age = builder.alloc_column(Column::Materialized {
        universe: subset_universe,
        properties: ColumnProperties::new(DType::Int, false),
    });
    let patch = Table::from_columns(&mut builder, subset_universe, vec![("age".to_string(), patch_age, DType::Int, false)], vec![]).unwrap();

    let updated = t.update_cells(&mut builder, &patch).unwrap();
    assert_eq!(updated.universe(), t.universe());
    assert_eq!(updated.schema().names(), t.schema().names());
}

/// S4: `groupby(owner).reduce(sum(age))` produces a fresh identity
/// universe and rejects bare per-row columns outside the grouping key.
#[test]
fn s4_groupby_reduce_produces_fresh_identity_universe() {
    let mut builder = GraphBuilder::new();
    let t = pets_table(&mut builder);
    let owner_col = t.column_id("owner").unwrap();
    let age_col = t.column_id("age").unwrap();

    let grouped = t.groupby(&["owner"]).unwrap();
    let reduced = grouped
        .reduce(
            &mut builder,
            vec![
                (
                    "owner".to_string(),
                    Expression::ColumnReference { table: t.id_column(), column: owner_col, name: "owner".to_string() },
                ),
                (
                    "sum".to_string(),
                    Expression::Reducer {
                        kind: ReducerKind::Sum,
                        arg: Box::new(Expression::ColumnReference { table: t.id_column(), column: age_col, name: "age".to_string() }),
                    },
                ),
            ],
        )
        .unwrap();

    assert_ne!(reduced.universe(), t.universe());
    assert_eq!(reduced.schema().names(), vec!["owner", "sum"]);

    // A bare per-row column outside the grouping key is rejected.
    let t2 = pets_table(&mut builder);
    let grouped2 = t2.groupby(&["owner"]).unwrap();
    let bad = grouped2.reduce(
        &mut builder,
        vec![(
            "age".to_string(),
            Expression::ColumnReference { table: t2.id_column(), column: t2.column_id("age").unwrap(), name: "age".to_string() },
        )],
    );
    assert!(bad.is_err());
}

/// S5: `flatten(pet)` produces a fresh universe and narrows the flattened
/// column's dtype from `Array(inner)` to `inner`.
#[test]
fn s5_flatten_narrows_element_type_on_a_fresh_universe() {
    let mut builder = GraphBuilder::new();
    let universe = builder.new_universe();
    let pet = builder.alloc_column(Column::Materialized {
        universe,
        properties: ColumnProperties::new(DType::Array(Box::new(DType::String)), false),
    });
    let t = Table::from_columns(&mut builder, universe, vec![("pet".to_string(), pet, DType::Array(Box::new(DType::String)), false)], vec![]).unwrap();

    let flattened = t.flatten(&mut builder, "pet").unwrap();
    assert_ne!(flattened.universe(), t.universe());
    assert_eq!(flattened.schema().dtype_of("pet"), Some(&DType::String));
}

/// S6: `promise_are_equal(U1,U2)` + `promise_are_pairwise_disjoint(U2,U3)`
/// implies `U1`/`U3` are disjoint; a subsequent `promise_are_equal(U1,U3)`
/// must be rejected as a contradiction.
#[test]
fn s6_promises_compose_transitively_and_detect_contradictions() {
    let mut solver = UniverseSolver::new();
    let u1 = solver.new_universe();
    let u2 = solver.new_universe();
    let u3 = solver.new_universe();

    solver.promise_are_equal(u1, u2).unwrap();
    solver.promise_are_pairwise_disjoint(&[u2, u3]).unwrap();

    assert!(solver.query_are_disjoint(&[u1, u3]));
    assert!(solver.promise_are_equal(u1, u3).is_err());
}

/// Universal invariant: idempotence — re-applying `promise_are_equal`
/// with the same pair is a no-op, not a second fact.
#[test]
fn invariant_idempotence_of_equal_promises() {
    let mut solver = UniverseSolver::new();
    let u1 = solver.new_universe();
    let u2 = solver.new_universe();
    solver.promise_are_equal(u1, u2).unwrap();
    solver.promise_are_equal(u1, u2).unwrap();
    assert!(solver.query_are_equal(u1, u2));
}

/// Universal invariant: monotonicity — once two universes are proven
/// equal/disjoint/subset, that fact never regresses to "unknown".
#[test]
fn invariant_monotonicity_of_subset_facts() {
    let mut builder = GraphBuilder::new();
    let t = pets_table(&mut builder);
    let age_ref = Expression::ColumnReference { table: t.id_column(), column: t.column_id("age").unwrap(), name: "age".to_string() };
    let predicate = Expression::Compare {
        op: CompareOp::Gt,
        left: Box::new(age_ref),
        right: Box::new(Expression::ColumnConstExpression { value: Value::Int(0) }),
    };
    let filtered = t.filter(&mut builder, predicate).unwrap();
    assert!(builder.solver.query_is_subset(filtered.universe(), t.universe()));
    // Any further plan-building against `t` cannot un-establish this fact.
    let _ = t.copy(&mut builder).unwrap();
    assert!(builder.solver.query_is_subset(filtered.universe(), t.universe()));
}

/// Boundary behavior: `having` with zero indexers returns `self`
/// unchanged rather than erroring.
#[test]
fn boundary_having_with_no_indexers_is_identity() {
    let mut builder = GraphBuilder::new();
    let t = pets_table(&mut builder);
    let same = t.having(&mut builder, &[]).unwrap();
    assert_eq!(same.universe(), t.universe());
}

/// Boundary behavior: `from_columns` with zero fields is rejected as a
/// plan-construction contract violation, not a silent empty table.
#[test]
fn boundary_from_columns_rejects_empty_field_list() {
    let mut builder = GraphBuilder::new();
    let universe = builder.new_universe();
    assert!(Table::from_columns(&mut builder, universe, vec![], vec![]).is_err());
}

/// Boundary behavior: referencing a column id from one arena against a
/// table's own id is out-of-scope, not silently tolerated.
#[test]
fn boundary_column_outside_this_table_is_rejected() {
    let mut builder = GraphBuilder::new();
    let t = pets_table(&mut builder);
    let other = pets_table(&mut builder);
    // `other`'s "age" column id was never registered under `t`'s name map.
    assert!(t.column_id("nonexistent_field").is_err());
    let _ = other;
}

/// Locality: `restrict` without a proven subset relationship between the
/// two universes is rejected rather than silently narrowed.
#[test]
fn locality_restrict_requires_a_proven_relationship() {
    let mut builder = GraphBuilder::new();
    let t = pets_table(&mut builder);
    let other = pets_table(&mut builder);
    assert!(t.restrict(&mut builder, &other).is_err());
}

#[test]
fn design_note_columns_share_an_explicit_builder_not_a_global() {
    let mut builder_a = GraphBuilder::new();
    let mut builder_b = GraphBuilder::new();
    let t_a = pets_table(&mut builder_a);
    let t_b = pets_table(&mut builder_b);
    // Two independently-built plans never interfere with each other's
    // universe solver state.
    assert!(!builder_a.solver.query_are_equal(t_a.universe(), t_b.universe()));
    let _ = builder_a.alloc_context(Context::Rowwise { universe: t_a.universe() });
    let _ = builder_b.alloc_context(Context::Rowwise { universe: t_b.universe() });
}
