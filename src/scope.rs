//! # Scope lowering state — "the hardest subsystem" (spec 4.H)
//!
//! Turns the logical plan into engine calls, exactly once per logical
//! entity, respecting dependency order. Grounded directly on
//! `graph_runner/state.py`'s `ScopeState`/`OutOfScopeError` — the method
//! names and resolve-on-miss protocol below mirror it one for one,
//! translated into `Result`-returning Rust instead of raise/except.

use crate::engine::{
    ChangeSink, ColumnPath, ConnectorProperties, DataFormat, DataStorage, EngineColumn, EngineScope, EngineTable,
    EngineUniverse,
};
use crate::errors::{EngineError, EngineResult};
use crate::ids::{ColumnId, ContextId};
use crate::parse_graph::GraphBuilder;
use crate::table::Table;
use crate::universe::Universe;
use std::any::Any;
use std::collections::HashMap;

/// A per-universe layout declaring which columns are co-located in one
/// physical table and their column paths.
#[derive(Debug, Clone)]
pub struct Storage {
    universe: Universe,
    columns: Vec<(ColumnId, ColumnPath)>,
}

impl Storage {
    pub fn new(universe: Universe, columns: Vec<(ColumnId, ColumnPath)>) -> Self {
        Storage { universe, columns }
    }

    pub fn universe(&self) -> Universe {
        self.universe
    }

    pub fn has_column(&self, column: ColumnId) -> bool {
        self.columns.iter().any(|(c, _)| *c == column)
    }

    pub fn get_path(&self, column: ColumnId) -> Option<&ColumnPath> {
        self.columns.iter().find(|(c, _)| *c == column).map(|(_, p)| p)
    }

    pub fn columns(&self) -> &[(ColumnId, ColumnPath)] {
        &self.columns
    }
}

/// Whole-table resolution cache entry: a universe handle plus the engine
/// columns for the table's id column and its other columns, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyTable {
    pub universe: EngineUniverse,
    pub id_column: EngineColumn,
}

type ComputerLogic = Box<dyn Fn(&[crate::value::Value]) -> crate::value::Value>;

/// Owns every cache the lowering pass accumulates for a single engine
/// scope. Never shared across scopes; dropped when the scope is done.
pub struct ScopeState<'s, S: EngineScope> {
    scope: &'s mut S,
    universes: HashMap<Universe, EngineUniverse>,
    columns: HashMap<ColumnId, EngineColumn>,
    legacy_tables: HashMap<ColumnId, LegacyTable>,
    tables: HashMap<Universe, EngineTable>,
    storages: HashMap<Universe, Storage>,
    evaluators: HashMap<ContextId, Box<dyn Any>>,
    computers: Vec<ComputerLogic>,
}

impl<'s, S: EngineScope> ScopeState<'s, S> {
    pub fn new(scope: &'s mut S) -> Self {
        ScopeState {
            scope,
            universes: HashMap::new(),
            columns: HashMap::new(),
            legacy_tables: HashMap::new(),
            tables: HashMap::new(),
            storages: HashMap::new(),
            evaluators: HashMap::new(),
            computers: Vec::new(),
        }
    }

    pub fn get_storage(&self, universe: Universe) -> EngineResult<&Storage> {
        self.storages.get(&universe).ok_or(EngineError::OutOfScope)
    }

    pub fn set_table(&mut self, storage: Storage, table: EngineTable) {
        self.tables.insert(storage.universe, table);
        self.storages.insert(storage.universe, storage);
    }

    pub fn get_table(&self, storage: &Storage) -> EngineResult<EngineTable> {
        self.tables.get(&storage.universe).copied().ok_or(EngineError::OutOfScope)
    }

    /// Monotone: only adds. Overwriting with a *different* handle is a
    /// fatal assertion — mirrors the Python `assert ... == ..., "overriding
    /// already computed universe"`.
    pub fn set_universe(&mut self, key: Universe, value: EngineUniverse) -> EngineResult<()> {
        match self.universes.get(&key) {
            Some(existing) if *existing == value => Ok(()),
            Some(_) => Err(EngineError::InvariantViolation(
                "overriding already computed universe".to_string(),
            )),
            None => {
                self.universes.insert(key, value);
                Ok(())
            }
        }
    }

    pub fn has_universe(&self, key: Universe) -> bool {
        self.universes.contains_key(&key)
    }

    pub fn get_universe(&mut self, key: Universe) -> EngineResult<EngineUniverse> {
        if let Some(u) = self.universes.get(&key) {
            return Ok(*u);
        }
        self.extract_universe(key)
    }

    fn extract_universe(&mut self, universe: Universe) -> EngineResult<EngineUniverse> {
        let storage = self.get_storage(universe)?.clone();
        let engine_table = self.get_table(&storage)?;
        let engine_universe = self.scope.table_universe(engine_table);
        self.set_universe(universe, engine_universe)?;
        Ok(engine_universe)
    }

    pub fn set_column(&mut self, key: ColumnId, value: EngineColumn) {
        self.columns.insert(key, value);
    }

    pub fn get_column(&mut self, builder: &GraphBuilder, key: ColumnId) -> EngineResult<EngineColumn> {
        if let Some(c) = self.columns.get(&key) {
            return Ok(*c);
        }
        self.extract_column(builder, key)
    }

    pub fn has_column(&mut self, builder: &GraphBuilder, key: ColumnId) -> bool {
        self.columns.contains_key(&key) || self.extract_column(builder, key).is_ok()
    }

    pub fn get_columns(&mut self, builder: &GraphBuilder, keys: &[ColumnId]) -> EngineResult<Vec<EngineColumn>> {
        keys.iter().map(|k| self.get_column(builder, *k)).collect()
    }

    fn extract_column(&mut self, builder: &GraphBuilder, column: ColumnId) -> EngineResult<EngineColumn> {
        let universe = builder.column(column).universe();
        let storage = self.get_storage(universe)?.clone();
        if !storage.has_column(column) {
            return Err(EngineError::OutOfScope);
        }
        let engine_universe = self.get_universe(universe)?;
        let engine_table = self.get_table(&storage)?;
        let path = storage.get_path(column).cloned().unwrap_or_default();
        let engine_column = self.scope.table_column(engine_universe, engine_table, &path);
        self.columns.insert(column, engine_column);
        Ok(engine_column)
    }

    /// Collects every non-`ExternalMaterialized` column in `storage` with
    /// its path and asks the engine to build a physical table from them.
    pub fn create_table(&mut self, builder: &GraphBuilder, universe: Universe, storage: Storage) -> EngineResult<()> {
        let engine_universe = self.get_universe(universe)?;
        let mut columns_with_paths = Vec::new();
        for (column_id, path) in storage.columns() {
            if matches!(builder.column(*column_id), crate::column::Column::ExternalMaterialized { .. }) {
                continue;
            }
            let engine_column = self.get_column(builder, *column_id)?;
            columns_with_paths.push((engine_column, path.clone()));
        }
        let engine_table = self.scope.columns_to_table(engine_universe, &columns_with_paths);
        self.set_table(storage, engine_table);
        Ok(())
    }

    /// Bootstraps a connector-backed universe: the only way a universe
    /// can enter scope with no frontend-side ancestor, since
    /// [`Self::extract_universe`] otherwise requires an already-registered
    /// table at that universe. See [`crate::engine::EngineScope::connector_table`].
    pub fn materialize_connector(
        &mut self,
        universe: Universe,
        columns: Vec<(ColumnId, ColumnPath)>,
        storage: DataStorage,
        format: DataFormat,
        properties: ConnectorProperties,
    ) -> EngineResult<EngineTable> {
        let (engine_universe, engine_table) = self.scope.connector_table(&storage, &format, &properties);
        self.set_universe(universe, engine_universe)?;
        self.set_table(Storage::new(universe, columns), engine_table);
        Ok(engine_table)
    }

    /// `subscribe(table, on_change, on_end)` — spec §6. `table` must
    /// already be materialized in this scope.
    pub fn subscribe(&mut self, builder: &GraphBuilder, table: &Table, sink: Box<dyn ChangeSink>) -> EngineResult<()> {
        let storage = self.get_storage(table.universe())?.clone();
        let engine_table = self.get_table(&storage)?;
        let _ = builder;
        self.scope.subscribe(engine_table, sink);
        Ok(())
    }

    pub fn set_legacy_table(&mut self, builder: &mut GraphBuilder, table: &Table, value: LegacyTable) -> EngineResult<()> {
        self.legacy_tables.insert(table.id_column(), value);
        self.set_column(table.id_column(), value.id_column);
        let _ = builder;
        Ok(())
    }

    pub fn get_legacy_table(&mut self, builder: &GraphBuilder, table: &Table) -> EngineResult<LegacyTable> {
        if let Some(t) = self.legacy_tables.get(&table.id_column()) {
            return Ok(*t);
        }
        let universe = self.get_universe(table.universe())?;
        let id_column = self.get_column(builder, table.id_column())?;
        let legacy = LegacyTable { universe, id_column };
        self.legacy_tables.insert(table.id_column(), legacy);
        Ok(legacy)
    }

    pub fn has_legacy_table(&mut self, builder: &GraphBuilder, table: &Table) -> bool {
        self.get_legacy_table(builder, table).is_ok()
    }

    /// Opaque callbacks (UDFs/reducers) addressed by dense integer ids;
    /// ids are never reused.
    pub fn add_computer_logic(&mut self, logic: ComputerLogic) -> usize {
        let id = self.computers.len();
        self.computers.push(logic);
        id
    }

    pub fn get_computer_logic(&self, id: usize) -> Option<&ComputerLogic> {
        self.computers.get(id)
    }

    /// One evaluator per context; `factory` is only invoked on a cache
    /// miss. `E` must match the type previously cached for `context` or
    /// the downcast panics — callers own a single evaluator type per
    /// context kind by construction.
    pub fn get_or_create_evaluator<E: 'static>(&mut self, context: ContextId, factory: impl FnOnce() -> E) -> &E {
        self.evaluators
            .entry(context)
            .or_insert_with(|| Box::new(factory()))
            .downcast_ref::<E>()
            .expect("evaluator type mismatch for context")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{Column, ColumnProperties};
    use crate::value::DType;

    struct FakeEngine {
        next: u64,
    }

    impl FakeEngine {
        fn new() -> Self {
            FakeEngine { next: 0 }
        }

        fn fresh(&mut self) -> u64 {
            let id = self.next;
            self.next += 1;
            id
        }
    }

    impl EngineScope for FakeEngine {
        fn table_universe(&mut self, _table: EngineTable) -> EngineUniverse {
            EngineUniverse(self.fresh())
        }

        fn table_column(&mut self, universe: EngineUniverse, _table: EngineTable, _path: &ColumnPath) -> EngineColumn {
            EngineColumn {
                id: self.fresh(),
                universe,
            }
        }

        fn columns_to_table(&mut self, _universe: EngineUniverse, _columns: &[(EngineColumn, ColumnPath)]) -> EngineTable {
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

        fn subscribe(&mut self, _table: EngineTable, _sink: Box<dyn ChangeSink>) {}
    }

    #[test]
    fn resolving_an_unmaterialized_column_is_out_of_scope() {
        let mut builder = GraphBuilder::new();
        let universe = builder.new_universe();
        let col = builder.alloc_column(Column::Materialized {
            universe,
            properties: ColumnProperties::new(DType::Int, false),
        });
        let mut engine = FakeEngine::new();
        let mut state = ScopeState::new(&mut engine);
        assert!(matches!(state.get_column(&builder, col), Err(EngineError::OutOfScope)));
        assert!(!state.has_column(&builder, col));
    }

    #[test]
    fn set_universe_is_idempotent_but_rejects_conflicting_overwrite() {
        let mut builder = GraphBuilder::new();
        let universe = builder.new_universe();
        let mut engine = FakeEngine::new();
        let mut state = ScopeState::new(&mut engine);
        state.set_universe(universe, EngineUniverse(1)).unwrap();
        state.set_universe(universe, EngineUniverse(1)).unwrap();
        let err = state.set_universe(universe, EngineUniverse(2)).unwrap_err();
        assert!(matches!(err, EngineError::InvariantViolation(_)));
    }

    #[test]
    fn materializing_a_table_caches_the_resolution() {
        let mut builder = GraphBuilder::new();
        let universe = builder.new_universe();
        let col = builder.alloc_column(Column::Materialized {
            universe,
            properties: ColumnProperties::new(DType::Int, false),
        });
        let storage = Storage::new(universe, vec![(col, ColumnPath(vec![0]))]);
        let mut engine = FakeEngine::new();
        let mut state = ScopeState::new(&mut engine);
        state.set_table(storage.clone(), EngineTable(0));
        let first = state.get_column(&builder, col).unwrap();
        let second = state.get_column(&builder, col).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn materialize_connector_bootstraps_universe_and_table() {
        let mut builder = GraphBuilder::new();
        let universe = builder.new_universe();
        let col = builder.alloc_column(Column::Materialized {
            universe,
            properties: ColumnProperties::new(DType::Int, false),
        });
        let mut engine = FakeEngine::new();
        let mut state = ScopeState::new(&mut engine);
        state
            .materialize_connector(
                universe,
                vec![(col, ColumnPath(vec![0]))],
                DataStorage("test.csv".to_string()),
                DataFormat("csv".to_string()),
                crate::engine::ConnectorProperties::new(crate::engine::SourceMode::Bounded),
            )
            .unwrap();
        assert!(state.has_column(&builder, col));
        assert!(state.has_universe(universe));
    }

    #[test]
    fn computer_ids_are_dense_and_never_reused() {
        let mut engine = FakeEngine::new();
        let mut state = ScopeState::new(&mut engine);
        let a = state.add_computer_logic(Box::new(|_| crate::value::Value::Int(1)));
        let b = state.add_computer_logic(Box::new(|_| crate::value::Value::Int(2)));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
    }
}
