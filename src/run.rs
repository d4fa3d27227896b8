//! # Run entry points — spec §6
//!
//! Ties together the logical plan ([`GraphBuilder`]), the lowering pass
//! ([`ScopeState`]/[`EngineScope`]) and execution controls ([`RunOptions`],
//! spec 4.K) into the frontend's user-visible surface: `promise_*`
//! convenience wrappers over `table.py`'s universe promises, `subscribe`,
//! and `run`/`run_all`.
//!
//! Materializing a table is the caller's choice of [`Storage`] layout —
//! deciding *how* columns are grouped into physical tables is query
//! optimization (explicit Non-goal); `run`/`run_all` only drive that
//! materialization in dependency order, under the monitoring/timeout/limit
//! controls spec §6 names.

use crate::engine::EngineScope;
use crate::errors::EngineResult;
use crate::execution::{QueryTimeout, RunOptions};
use crate::parse_graph::GraphBuilder;
use crate::scope::{ScopeState, Storage};
use crate::table::Table;
use crate::universe::Universe;

/// `promise_are_equal(a, b)` — spec §6 "`promise_*` functions on
/// universes", exposed at table granularity since that's what callers
/// hold a handle to.
pub fn promise_are_equal(builder: &mut GraphBuilder, a: &Table, b: &Table) -> EngineResult<()> {
    builder.solver.promise_are_equal(a.universe(), b.universe())?;
    Ok(())
}

/// `promise_is_subset_of(sub, sup)`.
pub fn promise_is_subset_of(builder: &mut GraphBuilder, sub: &Table, sup: &Table) -> EngineResult<()> {
    builder.solver.promise_is_subset_of(sub.universe(), sup.universe())?;
    Ok(())
}

/// `promise_are_pairwise_disjoint(tables…)`.
pub fn promise_are_pairwise_disjoint(builder: &mut GraphBuilder, tables: &[&Table]) -> EngineResult<()> {
    let universes: Vec<Universe> = tables.iter().map(|t| t.universe()).collect();
    builder.solver.promise_are_pairwise_disjoint(&universes)?;
    Ok(())
}

/// A table the caller wants physically materialized, plus the column
/// layout to materialize it with.
pub struct Target<'t> {
    pub table: &'t Table,
    pub storage: Storage,
}

impl<'t> Target<'t> {
    pub fn new(table: &'t Table, storage: Storage) -> Self {
        Target { table, storage }
    }
}

fn log_monitoring(options: &RunOptions, table: &Table) {
    use crate::config::MonitoringLevel;
    match options.monitoring_level {
        MonitoringLevel::None => {}
        MonitoringLevel::InOut => {
            tracing::info!(arity = table.arity(), "materializing table");
        }
        MonitoringLevel::All => {
            tracing::info!(arity = table.arity(), columns = ?table.column_names(), "materializing table");
        }
    }
}

/// `run_all()` — materializes every given target into `state`, in the
/// order given, under a single shared timeout and resource-limit budget.
/// Callers order `targets` so each table's dependencies precede it (e.g.
/// a prior [`crate::scope::ScopeState::materialize_connector`] call for
/// its root universe) — the frontend does not infer that order itself
/// (spec Non-goal: query optimization).
pub fn run_all<S: EngineScope>(
    state: &mut ScopeState<'_, S>,
    builder: &GraphBuilder,
    targets: Vec<Target<'_>>,
    options: &RunOptions,
) -> EngineResult<()> {
    let timeout = QueryTimeout::new(options.timeout);
    for target in targets {
        timeout.check()?;
        options.limits.check_row_width(target.table.arity())?;
        log_monitoring(options, target.table);
        state.create_table(builder, target.table.universe(), target.storage)?;
    }
    Ok(())
}

/// `run()` — materializes a single table into `state`. When
/// `options.debug` is set, every column name in the table's schema is
/// resolved against the builder first, surfacing a dangling reference
/// before any engine call is made.
pub fn run<S: EngineScope>(
    state: &mut ScopeState<'_, S>,
    builder: &GraphBuilder,
    target: Target<'_>,
    options: &RunOptions,
) -> EngineResult<()> {
    if options.debug {
        for name in target.table.column_names() {
            target.table.column_id(name)?;
        }
    }
    run_all(state, builder, vec![target], options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnProperties};
    use crate::engine::{ChangeSink, ColumnPath, ConnectorProperties, DataFormat, DataStorage, EngineColumn, EngineTable, EngineUniverse, SourceMode};
    use crate::value::{DType, Pointer, Value};

    struct CountingEngine {
        next: u64,
        tables_built: usize,
    }

    impl CountingEngine {
        fn new() -> Self {
            CountingEngine { next: 0, tables_built: 0 }
        }

        fn fresh(&mut self) -> u64 {
            let id = self.next;
            self.next += 1;
            id
        }
    }

    impl EngineScope for CountingEngine {
        fn table_universe(&mut self, _table: EngineTable) -> EngineUniverse {
            EngineUniverse(self.fresh())
        }

        fn table_column(&mut self, universe: EngineUniverse, _table: EngineTable, _path: &ColumnPath) -> EngineColumn {
            EngineColumn { id: self.fresh(), universe }
        }

        fn columns_to_table(&mut self, _universe: EngineUniverse, _columns: &[(EngineColumn, ColumnPath)]) -> EngineTable {
            self.tables_built += 1;
            EngineTable(self.fresh())
        }

        fn connector_table(
            &mut self,
            _storage: &DataStorage,
            _format: &DataFormat,
            _properties: &ConnectorProperties,
        ) -> (EngineUniverse, EngineTable) {
            (EngineUniverse(self.fresh()), EngineTable(self.fresh()))
        }

        fn subscribe(&mut self, _table: EngineTable, mut sink: Box<dyn ChangeSink>) {
            sink.on_change(Pointer(0), vec![Value::Int(1)], 0, 1);
            sink.on_end();
        }
    }

    fn sample_table(builder: &mut GraphBuilder) -> Table {
        let universe = builder.new_universe();
        let age = builder.alloc_column(Column::Materialized {
            universe,
            properties: ColumnProperties::new(DType::Int, false),
        });
        Table::from_columns(builder, universe, vec![("age".to_string(), age, DType::Int, false)], vec![]).unwrap()
    }

    #[test]
    fn promise_are_equal_unions_universes() {
        let mut builder = GraphBuilder::new();
        let t1 = sample_table(&mut builder);
        let t2 = sample_table(&mut builder);
        promise_are_equal(&mut builder, &t1, &t2).unwrap();
        assert!(builder.solver.query_are_equal(t1.universe(), t2.universe()));
    }

    #[test]
    fn run_materializes_a_connector_backed_table() {
        let mut builder = GraphBuilder::new();
        let table = sample_table(&mut builder);
        let age = table.column_id("age").unwrap();

        let mut engine = CountingEngine::new();
        let mut state = ScopeState::new(&mut engine);
        state
            .materialize_connector(
                table.universe(),
                vec![(age, ColumnPath(vec![0]))],
                DataStorage("users.csv".to_string()),
                DataFormat("csv".to_string()),
                ConnectorProperties::new(SourceMode::Bounded),
            )
            .unwrap();

        let storage = Storage::new(table.universe(), vec![(age, ColumnPath(vec![0]))]);
        let options = RunOptions::default();
        let result = run(&mut state, &builder, Target::new(&table, storage), &options);
        assert!(result.is_ok());
        assert_eq!(engine.tables_built, 2); // one from materialize_connector, one from run
    }

    #[test]
    fn debug_mode_validates_schema_before_materializing() {
        let mut builder = GraphBuilder::new();
        let table = sample_table(&mut builder);
        let age = table.column_id("age").unwrap();
        let mut engine = CountingEngine::new();
        let mut state = ScopeState::new(&mut engine);
        state
            .materialize_connector(
                table.universe(),
                vec![(age, ColumnPath(vec![0]))],
                DataStorage("users.csv".to_string()),
                DataFormat("csv".to_string()),
                ConnectorProperties::new(SourceMode::Bounded),
            )
            .unwrap();
        let storage = Storage::new(table.universe(), vec![(age, ColumnPath(vec![0]))]);
        let options = RunOptions::default().debug();
        let outcome = run(&mut state, &builder, Target::new(&table, storage), &options);
        assert!(outcome.is_ok());
    }

    #[test]
    fn subscribe_forwards_to_the_engine_sink() {
        struct ProbingSink(std::sync::Arc<std::sync::Mutex<Vec<Value>>>);
        impl ChangeSink for ProbingSink {
            fn on_change(&mut self, _key: Pointer, row_values: Vec<Value>, _time: i64, _diff: i64) {
                self.0.lock().unwrap().extend(row_values);
            }
            fn on_end(&mut self) {}
        }

        let mut builder = GraphBuilder::new();
        let table = sample_table(&mut builder);
        let age = table.column_id("age").unwrap();
        let mut engine = CountingEngine::new();
        let mut state = ScopeState::new(&mut engine);
        state
            .materialize_connector(
                table.universe(),
                vec![(age, ColumnPath(vec![0]))],
                DataStorage("users.csv".to_string()),
                DataFormat("csv".to_string()),
                ConnectorProperties::new(SourceMode::Bounded),
            )
            .unwrap();

        let probe = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        state.subscribe(&builder, &table, Box::new(ProbingSink(probe.clone()))).unwrap();
        assert_eq!(*probe.lock().unwrap(), vec![Value::Int(1)]);
    }
}
