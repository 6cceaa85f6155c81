#![allow(dead_code)]

use std::io::Write as _;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use wiretest_core::GlobalVars;
use wiretest_registry::{HookDispatcher, HookId, RunMode};
use wiretest_runtime::{register_builtins, CommandRegistry, Interpreter};
use wiretest_script::{Assembler, AssemblyOutcome, ProcessResume};

pub struct RunResult {
    pub success: bool,
    pub globals: GlobalVars,
}

/// Writes `src` to a scratch file inside `dir` and runs it end to end
/// exactly the way `wiretest`'s CLI does for a non-forking script: assemble,
/// build the native registry, run `GO`.
pub fn run_in(dir: &std::path::Path, name: &str, src: &str, hooks: Arc<HookDispatcher>) -> RunResult {
    let script_path = dir.join(name);
    std::fs::File::create(&script_path).unwrap().write_all(src.as_bytes()).unwrap();

    let current_exe = std::env::current_exe().unwrap();
    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry, hooks.clone());

    let outcome = Assembler::new(current_exe.clone(), script_path.clone(), hooks.clone(), ProcessResume::default())
        .with_default_timeout(Duration::from_millis(2_000))
        .assemble()
        .expect("assembly should succeed for a well-formed test script");

    match outcome {
        AssemblyOutcome::ForkedParent { success } => RunResult { success, globals: GlobalVars::new() },
        AssemblyOutcome::Script(assembled) => {
            let globals = assembled.global_vars.clone();
            let interp = Arc::new(Interpreter::new(registry, assembled.modules.clone(), hooks));
            let outcome = wiretest_runtime::go(*assembled, interp, current_exe, script_path);
            RunResult { success: outcome.success, globals }
        }
    }
}

/// `run_in` with a freshly built, immediately-frozen dispatcher: the right
/// default for scripts that don't need a module to observe hook events.
pub fn run(src: &str) -> RunResult {
    let dir = tempfile::tempdir().unwrap();
    let mut hooks = HookDispatcher::new();
    hooks.freeze();
    run_in(dir.path(), "script.htt", src, Arc::new(hooks))
}

/// A dispatcher whose `id` chain increments a shared counter on every run,
/// frozen and ready to hand to [`run_in`].
pub fn counting_hooks(id: HookId) -> (Arc<HookDispatcher>, Arc<AtomicUsize>) {
    let counter = Arc::new(AtomicUsize::new(0));
    let mut hooks = HookDispatcher::new();
    let counted = counter.clone();
    hooks.register(id, RunMode::All, 0, Arc::new(move |_| {
        counted.fetch_add(1, Ordering::SeqCst);
        None
    }));
    hooks.freeze();
    (Arc::new(hooks), counter)
}
