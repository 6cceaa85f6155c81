//! Native command table (spec §4.3 "Command registry and hooks").
//!
//! An append-only vector resolved by longest-prefix match against the
//! dispatched token, so a more specific command (`_LOG_LEVEL_SET`) wins over
//! a shorter one that is a textual prefix of it (`_LOG_LEVEL`).

use crate::worker::WorkerCtx;
use std::sync::Arc;
use wiretest_core::ScriptResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFlag {
    None,
    /// Body-opening command; handled structurally by the interpreter, never
    /// dispatched through [`CommandRegistry::resolve`].
    Body,
    /// Emits a deprecation warning before running the handler.
    Depreciated,
    /// `syntax` holds the canonical command name to rewrite to and retry.
    Link,
}

pub type HandlerFn = Arc<dyn Fn(&mut WorkerCtx, &str) -> ScriptResult<()> + Send + Sync>;

#[derive(Clone)]
pub struct CommandEntry {
    pub module: &'static str,
    pub name: String,
    pub syntax: String,
    pub help: &'static str,
    pub flag: CommandFlag,
    pub handler: Option<HandlerFn>,
}

#[derive(Default, Clone)]
pub struct CommandRegistry {
    entries: Vec<CommandEntry>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mirrors the teacher corpus's `module_command_new`: a module
    /// registers each command it contributes once, during initialization.
    pub fn register(
        &mut self,
        module: &'static str,
        name: impl Into<String>,
        syntax: impl Into<String>,
        help: &'static str,
        flag: CommandFlag,
        handler: Option<HandlerFn>,
    ) {
        self.entries.push(CommandEntry {
            module,
            name: name.into(),
            syntax: syntax.into(),
            help,
            flag,
            handler,
        });
    }

    /// Longest registered name that is a textual prefix of `token`.
    pub fn resolve(&self, token: &str) -> Option<&CommandEntry> {
        self.entries
            .iter()
            .filter(|e| token.starts_with(e.name.as_str()))
            .max_by_key(|e| e.name.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &CommandEntry> {
        self.entries.iter()
    }

    pub fn help_for(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &mut WorkerCtx, _: &str) -> ScriptResult<()> {
        Ok(())
    }

    #[test]
    fn longest_prefix_wins() {
        let mut reg = CommandRegistry::new();
        reg.register("log", "_LOG_LEVEL", "", "set level", CommandFlag::None, Some(Arc::new(noop)));
        reg.register(
            "log",
            "_LOG_LEVEL_SET",
            "",
            "set level (alt)",
            CommandFlag::None,
            Some(Arc::new(noop)),
        );
        let resolved = reg.resolve("_LOG_LEVEL_SET").unwrap();
        assert_eq!(resolved.name, "_LOG_LEVEL_SET");
    }

    #[test]
    fn shorter_registered_name_still_matches_on_its_own() {
        let mut reg = CommandRegistry::new();
        reg.register("log", "_LOG_LEVEL", "", "", CommandFlag::None, Some(Arc::new(noop)));
        assert!(reg.resolve("_LOG_LEVEL").is_some());
        assert!(reg.resolve("_UNRELATED").is_none());
    }

    #[test]
    fn link_flag_carries_target_in_syntax() {
        let mut reg = CommandRegistry::new();
        reg.register("math", "_OP", "_MATH:OP", "alias", CommandFlag::Link, None);
        let entry = reg.resolve("_OP").unwrap();
        assert_eq!(entry.flag, CommandFlag::Link);
        assert_eq!(entry.syntax, "_MATH:OP");
    }
}
