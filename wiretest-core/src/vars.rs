//! Variable scope chain: global → worker → block-local (spec §3 "Variable store").
//!
//! Lookup walks local (innermost first) → worker → global → process
//! environment, returning the first hit. `Scope` preserves insertion order
//! (`IndexMap`) so `_DUMP`-style diagnostics list variables in the order a
//! script set them, matching the reference tool's behavior.

use crate::value::Value;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex};

/// Characters allowed in a variable name (spec §3: `[A-Za-z0-9_.-]`).
pub fn is_valid_varname(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

#[derive(Debug, Default, Clone)]
pub struct Scope {
    entries: IndexMap<String, Value>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(name.into(), value.into());
    }

    pub fn unset(&mut self, name: &str) -> bool {
        self.entries.shift_remove(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The global scope, shared by every worker thread and mutex-protected
/// (spec §5: "the global variable store ... is mutex-protected by the global mutex").
#[derive(Debug, Clone)]
pub struct GlobalVars(Arc<Mutex<Scope>>);

impl Default for GlobalVars {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalVars {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Scope::new())))
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.0.lock().expect("global var lock poisoned").get(name).cloned()
    }

    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.lock().expect("global var lock poisoned").set(name, value);
    }

    pub fn unset(&self, name: &str) -> bool {
        self.0.lock().expect("global var lock poisoned").unset(name)
    }

    pub fn snapshot(&self) -> Scope {
        self.0.lock().expect("global var lock poisoned").clone()
    }
}

/// Per-worker variable context: a stack of block-local scopes on top of one
/// worker scope, on top of the shared global scope.
#[derive(Debug)]
pub struct VarContext {
    locals: Vec<Scope>,
    worker: Scope,
    global: GlobalVars,
}

impl VarContext {
    pub fn new(global: GlobalVars) -> Self {
        Self {
            locals: Vec::new(),
            worker: Scope::new(),
            global,
        }
    }

    /// local (innermost first) → worker → global → environment.
    pub fn lookup(&self, name: &str) -> Option<Value> {
        for local in self.locals.iter().rev() {
            if let Some(v) = local.get(name) {
                return Some(v.clone());
            }
        }
        if let Some(v) = self.worker.get(name) {
            return Some(v.clone());
        }
        if let Some(v) = self.global.get(name) {
            return Some(v);
        }
        std::env::var(name).ok().map(Value::Str)
    }

    pub fn worker_scope(&self) -> &Scope {
        &self.worker
    }

    pub fn global(&self) -> &GlobalVars {
        &self.global
    }

    /// `_SET` / `_UNSET` / return bindings / internal counters target the worker scope.
    pub fn set_worker(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.worker.set(name, value);
    }

    /// `_LOCAL` targets the innermost block-local scope if one is open,
    /// otherwise falls back to the worker scope (top-level script code has
    /// no enclosing block to shadow).
    pub fn set_local(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        if let Some(top) = self.locals.last_mut() {
            top.set(name, value);
        } else {
            self.worker.set(name, value);
        }
    }

    pub fn unset(&mut self, name: &str) -> bool {
        for local in self.locals.iter_mut().rev() {
            if local.unset(name) {
                return true;
            }
        }
        self.worker.unset(name)
    }

    /// Opened when a block body starts executing (`_CALL`); closed on return.
    pub fn push_local(&mut self) {
        self.locals.push(Scope::new());
    }

    pub fn pop_local(&mut self) {
        self.locals.pop();
    }

    pub fn local_depth(&self) -> usize {
        self.locals.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_prefers_local_over_worker_over_global() {
        let global = GlobalVars::new();
        global.set("X", "global");
        let mut ctx = VarContext::new(global);
        ctx.set_worker("X", "worker");
        assert_eq!(ctx.lookup("X").unwrap().to_string(), "worker");
        ctx.push_local();
        ctx.set_local("X", "local");
        assert_eq!(ctx.lookup("X").unwrap().to_string(), "local");
        ctx.pop_local();
        assert_eq!(ctx.lookup("X").unwrap().to_string(), "worker");
    }

    #[test]
    fn unset_then_lookup_is_not_found() {
        let mut ctx = VarContext::new(GlobalVars::new());
        ctx.set_worker("KEY", "");
        assert!(ctx.lookup("KEY").is_some());
        assert!(ctx.unset("KEY"));
        assert!(ctx.lookup("KEY").is_none());
    }

    #[test]
    fn set_key_equals_empty_sets_empty_string() {
        let mut ctx = VarContext::new(GlobalVars::new());
        ctx.set_worker("KEY", "");
        assert_eq!(ctx.lookup("KEY").unwrap().to_string(), "");
    }

    #[test]
    fn falls_back_to_environment() {
        std::env::set_var("WIRETEST_VARS_TEST_ENV", "from-env");
        let ctx = VarContext::new(GlobalVars::new());
        assert_eq!(
            ctx.lookup("WIRETEST_VARS_TEST_ENV").unwrap().to_string(),
            "from-env"
        );
        std::env::remove_var("WIRETEST_VARS_TEST_ENV");
    }

    #[test]
    fn varname_validation() {
        assert!(is_valid_varname("A.b-c_1"));
        assert!(!is_valid_varname(""));
        assert!(!is_valid_varname("bad name"));
        assert!(!is_valid_varname("bad:name"));
    }
}
