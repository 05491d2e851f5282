//! Typed values stored in a vault.

use std::collections::BTreeSet;
use std::fmt;

/// The kinds of value a vault can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    String,
    Int,
    Long,
    Float,
    Bool,
    StringSet,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::String => "string",
            ValueKind::Int => "32-bit integer",
            ValueKind::Long => "64-bit integer",
            ValueKind::Float => "float",
            ValueKind::Bool => "boolean",
            ValueKind::StringSet => "string set",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single value with exactly one active kind.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Int(i32),
    Long(i64),
    Float(f32),
    Bool(bool),
    StringSet(BTreeSet<String>),
}

impl TypedValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            TypedValue::String(_) => ValueKind::String,
            TypedValue::Int(_) => ValueKind::Int,
            TypedValue::Long(_) => ValueKind::Long,
            TypedValue::Float(_) => ValueKind::Float,
            TypedValue::Bool(_) => ValueKind::Bool,
            TypedValue::StringSet(_) => ValueKind::StringSet,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            TypedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            TypedValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Widening accessor: ints are returned as longs too.
    pub fn as_long(&self) -> Option<i64> {
        match self {
            TypedValue::Int(v) => Some(i64::from(*v)),
            TypedValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            TypedValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            TypedValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string_set(&self) -> Option<&BTreeSet<String>> {
        match self {
            TypedValue::StringSet(set) => Some(set),
            _ => None,
        }
    }
}

impl From<String> for TypedValue {
    fn from(value: String) -> Self {
        TypedValue::String(value)
    }
}

impl From<&str> for TypedValue {
    fn from(value: &str) -> Self {
        TypedValue::String(value.to_string())
    }
}

impl From<i32> for TypedValue {
    fn from(value: i32) -> Self {
        TypedValue::Int(value)
    }
}

impl From<i64> for TypedValue {
    fn from(value: i64) -> Self {
        TypedValue::Long(value)
    }
}

impl From<f32> for TypedValue {
    fn from(value: f32) -> Self {
        TypedValue::Float(value)
    }
}

impl From<bool> for TypedValue {
    fn from(value: bool) -> Self {
        TypedValue::Bool(value)
    }
}

impl From<BTreeSet<String>> for TypedValue {
    fn from(value: BTreeSet<String>) -> Self {
        TypedValue::StringSet(value)
    }
}
