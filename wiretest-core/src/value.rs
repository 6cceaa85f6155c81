//! The engine's single value type.
//!
//! Everything flowing through variable substitution, `_CALL` arguments, and
//! return bindings is fundamentally a string (spec §3 "Value"). `List` and
//! `Function` are typed escape hatches used by `_FOR` and `_CALL` so those
//! commands don't have to re-tokenize a string on every access.

use std::fmt;

/// A reference to a compiled block plus the module namespace it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionRef {
    pub module: String,
    pub name: String,
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Str(String),
    /// Space-separated tokens, produced by `_FOR` and consumed by list-aware commands.
    List(Vec<String>),
    /// A closure over a named block, as produced by referencing a `BLOCK` by name.
    Function(FunctionRef),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn list<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(tokens.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Value::Str(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Function(_) => false,
        }
    }

    pub fn as_list(&self) -> Vec<String> {
        match self {
            Value::List(items) => items.clone(),
            Value::Str(s) => s.split_whitespace().map(str::to_string).collect(),
            Value::Function(f) => vec![f.to_string()],
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s}"),
            Value::List(items) => write!(f, "{}", items.join(" ")),
            Value::Function(fr) => write!(f, "{fr}"),
        }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}
