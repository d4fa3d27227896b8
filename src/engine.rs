//! # External engine interfaces — [EXPANSION, ambient]
//!
//! The interfaces the frontend consumes from (and exposes to) the
//! external collaborators named in spec §6: the physical engine scope,
//! connectors, callback sinks, and the debug loader. These are
//! *interfaces only* — no I/O or execution logic, per the Non-goals.

use crate::schema::Schema;
use crate::value::{DType, Value};

/// Opaque engine-side universe handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineUniverse(pub u64);

/// Opaque engine-side column handle, carrying the universe it belongs to
/// so [`crate::scope::ScopeState::set_column`] can propagate that fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineColumn {
    pub id: u64,
    pub universe: EngineUniverse,
}

/// Opaque engine-side physical table handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineTable(pub u64);

/// Position of a column within a physical table's row layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ColumnPath(pub Vec<usize>);

/// `table_universe`, `table_column`, `columns_to_table` — spec §6.
/// Implemented by whatever drives the actual dataflow (differential/timely
/// in the teacher's stack); the frontend only calls through this trait.
pub trait EngineScope {
    fn table_universe(&mut self, table: EngineTable) -> EngineUniverse;
    fn table_column(&mut self, universe: EngineUniverse, table: EngineTable, path: &ColumnPath) -> EngineColumn;
    fn columns_to_table(&mut self, universe: EngineUniverse, columns: &[(EngineColumn, ColumnPath)]) -> EngineTable;

    /// Bootstraps a universe together with its originating table from an
    /// external source, breaking the otherwise-circular dependency between
    /// `table_universe` (needs a table) and `columns_to_table` (needs a
    /// universe) for tables with no frontend-side ancestor. Used by
    /// [`crate::scope::ScopeState::materialize_connector`].
    fn connector_table(
        &mut self,
        storage: &DataStorage,
        format: &DataFormat,
        properties: &ConnectorProperties,
    ) -> (EngineUniverse, EngineTable);

    /// `subscribe(table, on_change, on_end)` — spec §6. Registers `sink`
    /// against `table`'s stream of row changes.
    fn subscribe(&mut self, table: EngineTable, sink: Box<dyn ChangeSink>);
}

/// Opaque handle to a configured data source/sink, e.g. a CSV path or a
/// Kafka topic descriptor. The frontend never inspects its contents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataStorage(pub String);

/// Opaque wire/encoding format token (e.g. "csv", "json").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DataFormat(pub String);

/// Whether a source terminates after its initial contents or keeps
/// emitting updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceMode {
    Bounded,
    Unbounded,
}

/// Descriptor accompanying a connector, per spec §6.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorProperties {
    pub commit_duration_ms: Option<u64>,
    pub unsafe_trusted_ids: bool,
    pub columns: Vec<(String, DType, bool)>,
    pub mode: SourceMode,
}

impl ConnectorProperties {
    pub fn new(mode: SourceMode) -> Self {
        ConnectorProperties {
            commit_duration_ms: None,
            unsafe_trusted_ids: false,
            columns: Vec::new(),
            mode,
        }
    }

    pub fn with_column(mut self, name: impl Into<String>, dtype: DType, append_only: bool) -> Self {
        self.columns.push((name.into(), dtype, append_only));
        self
    }
}

/// `subscribe(table, on_change, on_end)` callback sink — spec §6.
pub trait ChangeSink {
    fn on_change(&mut self, key: crate::value::Pointer, row_values: Vec<Value>, time: i64, diff: i64);
    fn on_end(&mut self);
}

/// A bounded, pandas-like tabular value the frontend can derive a schema
/// from — the debug source. Per design note: "the core only needs
/// `(schema, row-iterator)`".
pub trait DebugLoader {
    fn schema(&self) -> Schema;
    fn rows(&self) -> Box<dyn Iterator<Item = Vec<Value>> + '_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecDebugLoader {
        schema: Schema,
        rows: Vec<Vec<Value>>,
    }

    impl DebugLoader for VecDebugLoader {
        fn schema(&self) -> Schema {
            self.schema.clone()
        }

        fn rows(&self) -> Box<dyn Iterator<Item = Vec<Value>> + '_> {
            Box::new(self.rows.iter().cloned())
        }
    }

    #[test]
    fn debug_loader_exposes_schema_and_rows() {
        let loader = VecDebugLoader {
            schema: Schema::empty(),
            rows: vec![vec![Value::Int(1)], vec![Value::Int(2)]],
        };
        assert_eq!(loader.rows().count(), 2);
    }

    #[test]
    fn connector_properties_builder_accumulates_columns() {
        let props = ConnectorProperties::new(SourceMode::Unbounded)
            .with_column("age", DType::Int, false)
            .with_column("owner", DType::String, true);
        assert_eq!(props.columns.len(), 2);
        assert_eq!(props.mode, SourceMode::Unbounded);
    }
}
