//! # Table schema
//!
//! An ordered, named mapping from column name to `(dtype, append_only)`,
//! grounded on the teacher's `RelationSchema`/`ColumnSchema` pair
//! (`src/schema/mod.rs`): same by-name/by-index lookup surface and
//! `Display` pretty-printer, generalized from Datalog relation columns to
//! dataflow table columns.

use crate::value::DType;
use std::fmt;

/// One column's declared type and whether it may only ever be appended to
/// (never updated in place once emitted).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSchema {
    pub name: String,
    pub dtype: DType,
    pub append_only: bool,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, dtype: DType, append_only: bool) -> Self {
        FieldSchema {
            name: name.into(),
            dtype,
            append_only,
        }
    }
}

impl fmt::Display for FieldSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.dtype)?;
        if self.append_only {
            write!(f, " [append_only]")?;
        }
        Ok(())
    }
}

/// Ordered schema of a [`crate::table::Table`]. The ordering is
/// significant: `schema.names() == table.columns.keys()` is invariant 8.1.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Schema {
    fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSchema>) -> Self {
        Schema { fields }
    }

    pub fn empty() -> Self {
        Schema { fields: Vec::new() }
    }

    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn fields(&self) -> &[FieldSchema] {
        &self.fields
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    pub fn dtype_of(&self, name: &str) -> Option<&DType> {
        self.field_by_name(name).map(|f| &f.dtype)
    }

    pub fn push(&mut self, field: FieldSchema) {
        self.fields.push(field);
    }

    /// Set difference of field names, used to render `SchemaMismatch`
    /// errors with the offending columns.
    pub fn symmetric_difference(&self, other: &Schema) -> Vec<String> {
        let mine: std::collections::HashSet<&str> = self.names().into_iter().collect();
        let theirs: std::collections::HashSet<&str> = other.names().into_iter().collect();
        mine.symmetric_difference(&theirs).map(|s| s.to_string()).collect()
    }

    pub fn same_keys(&self, other: &Schema) -> bool {
        self.names() == other.names()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "schema(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                writeln!(f, ",")?;
            }
            write!(f, "  {}", field)?;
        }
        write!(f, "\n)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Schema {
        Schema::new(vec![
            FieldSchema::new("age", DType::Int, false),
            FieldSchema::new("owner", DType::String, false),
        ])
    }

    #[test]
    fn lookup_by_name_and_index_agree() {
        let s = sample();
        assert_eq!(s.index_of("owner"), Some(1));
        assert_eq!(s.dtype_of("age"), Some(&DType::Int));
        assert_eq!(s.names(), vec!["age", "owner"]);
    }

    #[test]
    fn same_keys_ignores_types() {
        let a = sample();
        let b = Schema::new(vec![
            FieldSchema::new("age", DType::Float, false),
            FieldSchema::new("owner", DType::String, true),
        ]);
        assert!(a.same_keys(&b));
    }

    #[test]
    fn symmetric_difference_reports_offending_columns() {
        let a = sample();
        let b = Schema::new(vec![FieldSchema::new("age", DType::Int, false)]);
        let mut diff = a.symmetric_difference(&b);
        diff.sort();
        assert_eq!(diff, vec!["owner".to_string()]);
    }

    #[test]
    fn display_matches_teacher_style() {
        let s = Schema::new(vec![FieldSchema::new("id", DType::Pointer, true)]);
        let text = format!("{}", s);
        assert!(text.contains("id: pointer [append_only]"));
    }
}
