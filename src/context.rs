//! # Contexts
//!
//! A [`Context`] is tagged metadata identifying an operator kind and its
//! column-level arguments (spec 4.C). One enum variant per row of the
//! spec's context table; every variant exposes its column dependencies
//! through [`Context::dependencies`] so the scope state (4.H) and the
//! expression type interpreter (4.D) can walk them without matching on
//! the enum themselves.

use crate::ids::ColumnId;
use crate::universe::Universe;

/// One of the temporal lifecycle controls — grouped into a single variant
/// since they share the same `(threshold, time)` column shape and differ
/// only in policy, matched elsewhere by `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalLifecycleKind {
    Forget,
    Freeze,
    Buffer,
    FilterOutForgetting,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Context {
    /// Plain projection; no column renaming of its own.
    Rowwise { universe: Universe },
    /// Subsetting by a boolean column.
    Filter {
        filter_column: ColumnId,
        original_universe: Universe,
    },
    /// Subsetting by a universe already proven to be a subset.
    Restrict {
        target_universe: Universe,
        original_universe: Universe,
    },
    /// Left universe minus right universe.
    Difference { left: Universe, right: Universe },
    /// Universe = intersection of N universes.
    Intersect { universes: Vec<Universe> },
    /// New keys derived from a pointer column.
    Reindex { key_column: ColumnId },
    /// Disjoint union with per-source column lists (one list per input
    /// table, in input order).
    ConcatUnsafe {
        universes: Vec<Universe>,
        source_columns: Vec<Vec<ColumnId>>,
    },
    /// Subset-overwrite on the same universe.
    UpdateCells {
        union_universe: Universe,
        overwrites: Vec<ColumnId>,
    },
    /// Superset-overwrite merging rows from two universes.
    UpdateRows {
        union_universe: Universe,
        overwrites: Vec<ColumnId>,
    },
    /// Row-wise expansion of an iterable column.
    Flatten {
        flatten_column: ColumnId,
        result_column: ColumnId,
        original_universe: Universe,
    },
    /// Forget / Freeze / Buffer / FilterOutForgetting.
    TemporalLifecycle {
        kind: TemporalLifecycleKind,
        threshold_column: ColumnId,
        time_column: ColumnId,
    },
    /// Pointer-indexed lookup.
    Ix {
        key_column: ColumnId,
        optional: bool,
    },
    /// Keep rows whose key exists in one or more indexer columns.
    Having { indexer_columns: Vec<ColumnId> },
    /// Assert-only universe equality, checked by the engine at run time.
    PromiseSameUniverse { claimed_universe: Universe },
    /// Per-instance ordering.
    Sorting {
        key_column: ColumnId,
        instance_column: ColumnId,
    },
}

impl Context {
    /// Enumerate the columns this context reads, independent of whatever
    /// expression is layered on top of it. This is the "dependency
    /// enumeration" service named in spec 4.C.
    pub fn dependencies(&self) -> Vec<ColumnId> {
        match self {
            Context::Rowwise { .. }
            | Context::Restrict { .. }
            | Context::Difference { .. }
            | Context::Intersect { .. }
            | Context::PromiseSameUniverse { .. } => Vec::new(),
            Context::Filter { filter_column, .. } => vec![*filter_column],
            Context::Reindex { key_column } => vec![*key_column],
            Context::ConcatUnsafe { source_columns, .. } => {
                source_columns.iter().flatten().copied().collect()
            }
            Context::UpdateCells { overwrites, .. } | Context::UpdateRows { overwrites, .. } => {
                overwrites.clone()
            }
            Context::Flatten {
                flatten_column,
                result_column,
                ..
            } => vec![*flatten_column, *result_column],
            Context::TemporalLifecycle {
                threshold_column,
                time_column,
                ..
            } => vec![*threshold_column, *time_column],
            Context::Ix { key_column, .. } => vec![*key_column],
            Context::Having { indexer_columns } => indexer_columns.clone(),
            Context::Sorting {
                key_column,
                instance_column,
            } => vec![*key_column, *instance_column],
        }
    }

    /// Universes this context fully determines without consulting the
    /// solver again. Used by operator constructors to avoid re-deriving
    /// the result universe from scratch.
    pub fn owning_universe(&self) -> Option<Universe> {
        match self {
            Context::Rowwise { universe } => Some(*universe),
            Context::Filter {
                original_universe, ..
            } => Some(*original_universe),
            Context::Restrict { target_universe, .. } => Some(*target_universe),
            Context::UpdateCells { union_universe, .. }
            | Context::UpdateRows { union_universe, .. } => Some(*union_universe),
            _ => None,
        }
    }
}
