//! # Relational value & type system
//!
//! Core [`DType`] lattice and [`Value`] representation shared by every
//! other module: columns, expressions, schemas and the scope lowering
//! state all refer to these types rather than to engine-native values.
//!
//! ## Usage
//!
//! ```rust
//! use relflow::value::{DType, Value, types_lca};
//!
//! let lca = types_lca(&DType::Int, &DType::Float).unwrap();
//! assert_eq!(lca, DType::Float);
//!
//! let v = Value::String("alice".into());
//! assert_eq!(v.dtype(), DType::String);
//! ```

use std::fmt;
use thiserror::Error;

/// Opaque row-identity / foreign-index hash.
///
/// Pointers are produced by [`crate::table::pointer_from`] and are the only
/// type that may be used to index into a table via `ix`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer(pub u64);

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "^{:016x}", self.0)
    }
}

/// The relational type lattice.
///
/// `Optional` wraps exactly one level of optionality; `Optional(Optional(_))`
/// is never constructed (operators normalize it away).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DType {
    Int,
    Float,
    Bool,
    String,
    Timestamp,
    Pointer,
    Array(Box<DType>),
    Tuple(Vec<DType>),
    Optional(Box<DType>),
    /// The bottom/indeterminate type; LCA with anything else is the other
    /// type. Used for columns inferred from empty input.
    Any,
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::Int => write!(f, "int"),
            DType::Float => write!(f, "float"),
            DType::Bool => write!(f, "bool"),
            DType::String => write!(f, "string"),
            DType::Timestamp => write!(f, "timestamp"),
            DType::Pointer => write!(f, "pointer"),
            DType::Array(inner) => write!(f, "array<{}>", inner),
            DType::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            DType::Optional(inner) => write!(f, "optional<{}>", inner),
            DType::Any => write!(f, "any"),
        }
    }
}

impl DType {
    /// Strip one level of optionality. A no-op on non-optional types.
    pub fn unoptionalize(&self) -> DType {
        match self {
            DType::Optional(inner) => (**inner).clone(),
            other => other.clone(),
        }
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, DType::Optional(_))
    }

    pub fn optional(self) -> DType {
        match self {
            DType::Optional(_) => self,
            other => DType::Optional(Box::new(other)),
        }
    }

    /// True when only `Pointer` or `Optional(Pointer)`.
    pub fn is_pointer_like(&self) -> bool {
        matches!(self, DType::Pointer) || matches!(self, DType::Optional(inner) if **inner == DType::Pointer)
    }

    /// `dtype_issubclass(a, Optional(b))` is true when `a ∈ {b, Optional(b)}`.
    pub fn is_subclass(&self, other: &DType) -> bool {
        if self == other {
            return true;
        }
        if let DType::Optional(inner) = other {
            return self == inner.as_ref() || self == other;
        }
        false
    }
}

/// Error raised when [`types_lca`] has no supertype for its arguments.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no common supertype for `{left}` and `{right}`")]
pub struct TypeError {
    pub left: DType,
    pub right: DType,
}

/// Least common supertype of two types.
///
/// Commutative, associative, idempotent; `types_lca(t, t) == t`. Numeric
/// widening (`Int` → `Float`) is the only implicit coercion. Optionality is
/// absorbed: `types_lca(T, Optional(T)) == Optional(T)`. `Any` is the
/// identity element. Fails when no common supertype exists (e.g. `String`
/// vs `Pointer`).
pub fn types_lca(a: &DType, b: &DType) -> Result<DType, TypeError> {
    if a == b {
        return Ok(a.clone());
    }
    match (a, b) {
        (DType::Any, other) | (other, DType::Any) => Ok(other.clone()),
        (DType::Int, DType::Float) | (DType::Float, DType::Int) => Ok(DType::Float),
        (DType::Optional(x), DType::Optional(y)) => {
            Ok(DType::Optional(Box::new(types_lca(x, y)?)))
        }
        (DType::Optional(x), y) | (y, DType::Optional(x)) => {
            let inner = types_lca(x, y)?;
            Ok(DType::Optional(Box::new(inner)))
        }
        (DType::Array(x), DType::Array(y)) => Ok(DType::Array(Box::new(types_lca(x, y)?))),
        (DType::Tuple(xs), DType::Tuple(ys)) if xs.len() == ys.len() => {
            let merged = xs
                .iter()
                .zip(ys.iter())
                .map(|(x, y)| types_lca(x, y))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DType::Tuple(merged))
        }
        _ => Err(TypeError {
            left: a.clone(),
            right: b.clone(),
        }),
    }
}

/// A single relational value, tagged by the [`DType`] it carries.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    String(String),
    Timestamp(i64),
    Pointer(Pointer),
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    None,
}

impl Value {
    /// Infer the [`DType`] that classifies this value. `None` carries no
    /// type information on its own — callers combine it with a column's
    /// declared dtype via [`types_lca`].
    pub fn dtype(&self) -> DType {
        match self {
            Value::Int(_) => DType::Int,
            Value::Float(_) => DType::Float,
            Value::Bool(_) => DType::Bool,
            Value::String(_) => DType::String,
            Value::Timestamp(_) => DType::Timestamp,
            Value::Pointer(_) => DType::Pointer,
            Value::Array(elems) => {
                let inner = elems
                    .first()
                    .map(|v| v.dtype())
                    .unwrap_or(DType::Any);
                DType::Array(Box::new(inner))
            }
            Value::Tuple(elems) => DType::Tuple(elems.iter().map(Value::dtype).collect()),
            Value::None => DType::Optional(Box::new(DType::Any)),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_pointer(&self) -> Option<Pointer> {
        match self {
            Value::Pointer(p) => Some(*p),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(t) => write!(f, "{}", t),
            Value::Pointer(p) => write!(f, "{}", p),
            Value::Array(elems) => {
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            Value::Tuple(elems) => {
                write!(f, "(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            Value::None => write!(f, "None"),
        }
    }
}

/// Deterministic hash used to manufacture a [`Pointer`] from a sequence of
/// key values (`pointer_from` / `with_id_from`). Two calls with equal
/// `values` and `salt` always produce the same pointer; different inputs
/// are, with overwhelming probability, distinct — this is the "pure
/// pseudo-random hash" the spec requires for row-wise uniqueness.
pub fn pointer_from_values(values: &[Value], salt: &str) -> Pointer {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    for v in values {
        hasher.update([0u8]); // field separator
        hasher.update(format!("{:?}", v).as_bytes());
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    Pointer(u64::from_le_bytes(bytes))
}
