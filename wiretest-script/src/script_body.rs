//! The immutable, assembly-produced half of a worker (spec §3 "Worker").
//! Clones share this via `Arc`; each clone then gets its own variable store
//! and socket table (built in `wiretest-runtime`).

use wiretest_core::{Line, Origin};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerKind {
    Client,
    Server,
    Daemon,
    Block,
    File,
}

#[derive(Debug, Clone)]
pub struct ScriptBody {
    pub name: String,
    pub kind: WorkerKind,
    pub lines: Vec<Line>,
    /// Input parameter names, from a `BLOCK name p1 p2 : r1 r2` signature.
    pub params: Vec<String>,
    /// Output (return) variable names, from the same signature.
    pub retvars: Vec<String>,
    pub origin: Origin,
}

impl ScriptBody {
    pub fn new(name: impl Into<String>, kind: WorkerKind, origin: Origin) -> Self {
        Self {
            name: name.into(),
            kind,
            lines: Vec::new(),
            params: Vec::new(),
            retvars: Vec::new(),
            origin,
        }
    }
}

/// Parses a `BLOCK` header's tail: `Name arg1 arg2 : ret1 ret2`, already
/// split off the leading `BLOCK` token and `Name`. Both sides of `:` are
/// optional (spec §4.1 "Signatures").
pub fn parse_signature(tail: &str) -> (Vec<String>, Vec<String>) {
    match tail.split_once(':') {
        Some((params, rets)) => (split_tokens(params), split_tokens(rets)),
        None => (split_tokens(tail), Vec::new()),
    }
}

fn split_tokens(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_with_both_sides() {
        let (params, rets) = parse_signature("a b : x y");
        assert_eq!(params, vec!["a", "b"]);
        assert_eq!(rets, vec!["x", "y"]);
    }

    #[test]
    fn signature_with_only_params() {
        let (params, rets) = parse_signature("a b");
        assert_eq!(params, vec!["a", "b"]);
        assert!(rets.is_empty());
    }

    #[test]
    fn signature_with_only_rets() {
        let (params, rets) = parse_signature(": x");
        assert!(params.is_empty());
        assert_eq!(rets, vec!["x"]);
    }

    #[test]
    fn empty_signature() {
        let (params, rets) = parse_signature("");
        assert!(params.is_empty());
        assert!(rets.is_empty());
    }
}
