//! Module namespace for script-defined blocks (spec §3 "Block", §4.1
//! "Module scoping").

use crate::script_body::ScriptBody;
use indexmap::IndexMap;
use std::sync::Arc;

pub const DEFAULT_MODULE: &str = "DEFAULT";

#[derive(Debug, Default, Clone)]
pub struct ModuleTable {
    modules: IndexMap<String, IndexMap<String, Arc<ScriptBody>>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        let mut modules = IndexMap::new();
        modules.insert(DEFAULT_MODULE.to_string(), IndexMap::new());
        Self { modules }
    }

    /// `MODULE <name>` — fatal to redeclare `DEFAULT` (spec §4.1 "Errors").
    pub fn declare_module(&mut self, name: &str) -> Result<(), String> {
        if name == DEFAULT_MODULE {
            return Err("DEFAULT is reserved and may not be declared".to_string());
        }
        self.modules.entry(name.to_string()).or_default();
        Ok(())
    }

    pub fn insert_block(&mut self, module: &str, block: Arc<ScriptBody>) {
        self.modules
            .entry(module.to_string())
            .or_default()
            .insert(block.name.clone(), block);
    }

    /// Qualified lookup: `Module:NAME`.
    pub fn get_qualified(&self, module: &str, name: &str) -> Option<Arc<ScriptBody>> {
        self.modules.get(module)?.get(name).cloned()
    }

    /// Unqualified lookup: current `_USE`d module, then `DEFAULT` (spec §3 "Block").
    pub fn resolve(&self, used_module: &str, name: &str) -> Option<Arc<ScriptBody>> {
        if used_module != DEFAULT_MODULE {
            if let Some(block) = self.get_qualified(used_module, name) {
                return Some(block);
            }
        }
        self.get_qualified(DEFAULT_MODULE, name)
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script_body::WorkerKind;
    use wiretest_core::Origin;

    fn block(name: &str) -> Arc<ScriptBody> {
        Arc::new(ScriptBody::new(name, WorkerKind::Block, Origin::new("t", 1)))
    }

    #[test]
    fn default_cannot_be_redeclared() {
        let mut table = ModuleTable::new();
        assert!(table.declare_module("DEFAULT").is_err());
        assert!(table.declare_module("M").is_ok());
    }

    #[test]
    fn unqualified_falls_back_to_default() {
        let mut table = ModuleTable::new();
        table.declare_module("M").unwrap();
        table.insert_block(DEFAULT_MODULE, block("_GREET"));
        assert!(table.resolve("M", "_GREET").is_some());
        assert!(table.resolve(DEFAULT_MODULE, "_GREET").is_some());
    }

    #[test]
    fn unqualified_call_from_other_file_does_not_see_other_module() {
        let mut table = ModuleTable::new();
        table.declare_module("M").unwrap();
        table.insert_block("M", block("_GREET"));
        // a file still on DEFAULT cannot see M's blocks unqualified.
        assert!(table.resolve(DEFAULT_MODULE, "_GREET").is_none());
        assert!(table.get_qualified("M", "_GREET").is_some());
    }
}
