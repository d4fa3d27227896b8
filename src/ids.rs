//! # Arena identifiers
//!
//! Per design note §9 ("cyclic references: use an arena + integer ids"),
//! columns and contexts never hold back-pointers to each other directly —
//! they hold these small `Copy` ids and look each other up through the
//! [`crate::parse_graph::GraphBuilder`] that owns both arenas.

use std::fmt;

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}#{}", stringify!($name), self.0)
            }
        }
    };
}

arena_id!(ColumnId);
arena_id!(ContextId);
arena_id!(NodeId);
