//! # relflow
//!
//! A frontend for building and lowering incremental relational dataflow
//! plans: a table algebra (filter/select/join-free restructuring/groupby)
//! over a union-find universe algebra, producing a parse graph that an
//! external differential/timely engine executes.
//!
//! ## Pipeline
//! ```text
//! Table algebra (src/table)
//!     builds ->  Column / Context / Expression   (src/column, context, expression)
//!     recorded in -> GraphBuilder's parse graph   (src/parse_graph)
//!     lowered via -> ScopeState + EngineScope     (src/scope, engine)
//! ```
//!
//! ## Usage
//! ```rust
//! use relflow::parse_graph::GraphBuilder;
//! use relflow::column::{Column, ColumnProperties};
//! use relflow::value::DType;
//!
//! let mut builder = GraphBuilder::new();
//! let universe = builder.new_universe();
//! let age = builder.alloc_column(Column::Materialized {
//!     universe,
//!     properties: ColumnProperties::new(DType::Int, false),
//! });
//! assert_eq!(builder.column(age).dtype(), DType::Int);
//! ```
//!
//! ## Module organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `ids` | Arena-id newtypes (`ColumnId`/`ContextId`/`NodeId`) |
//! | `value` | `DType` lattice, `Value`, `Pointer` |
//! | `universe` | Union-find universe algebra |
//! | `errors` | `EngineError` taxonomy |
//! | `schema` | Ordered table schema |
//! | `column` | `Column` — materialized/computed/identity values |
//! | `context` | `Context` — the contract each operator's columns are evaluated under |
//! | `expression` | Pure expression tree + type inference |
//! | `parse_graph` | `GraphBuilder` — arenas + operator DAG |
//! | `table` | The table algebra and `groupby`/`reduce` |
//! | `scope` | Lowering state that turns the plan into engine calls |
//! | `engine` | External engine interfaces (scope, connectors, sinks) |
//! | `config` | Figment-layered `Config` |
//! | `execution` | `RunOptions`, cooperative timeout/limits |
//! | `run` | `run`/`run_all`/`promise_*`/`subscribe` — the user-visible surface |

pub mod ids;
pub mod value;
pub mod universe;
pub mod errors;
pub mod schema;
pub mod column;
pub mod context;
pub mod expression;
pub mod parse_graph;
pub mod table;
pub mod scope;
pub mod engine;
pub mod config;
pub mod execution;
pub mod run;

pub use column::{Column, ColumnProperties, Lineage};
pub use context::{Context, TemporalLifecycleKind};
pub use errors::{EngineError, EngineResult};
pub use expression::{ArithOp, CompareOp, Expression, LogicalOp, ReducerKind};
pub use ids::{ColumnId, ContextId, NodeId};
pub use parse_graph::{GraphBuilder, OperatorNode};
pub use run::{promise_are_equal, promise_are_pairwise_disjoint, promise_is_subset_of, run, run_all, Target};
pub use schema::{FieldSchema, Schema};
pub use scope::{LegacyTable, ScopeState, Storage};
pub use table::groupby::GroupedTable;
pub use table::{pointer_from, Table};
pub use universe::{Universe, UniverseContradiction, UniverseSolver};
pub use value::{types_lca, DType, Pointer, TypeError, Value};
