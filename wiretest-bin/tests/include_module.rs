mod common;

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;
use wiretest_core::Origin;
use wiretest_registry::HookDispatcher;
use wiretest_runtime::{call_block, register_builtins, CommandRegistry, Interpreter, WorkerCtx};
use wiretest_script::{Assembler, AssemblyOutcome, ProcessResume};

// Scenario 4 (spec §8): a.htt includes b.htt, which declares MODULE M with
// BLOCK _GREET : x. a.htt calls it qualified (M:_GREET) and unqualified.
fn write(dir: &std::path::Path, name: &str, content: &str) {
    std::fs::File::create(dir.join(name)).unwrap().write_all(content.as_bytes()).unwrap();
}

fn hooks() -> Arc<HookDispatcher> {
    let mut h = HookDispatcher::new();
    h.freeze();
    Arc::new(h)
}

#[test]
fn qualified_call_reaches_the_included_module_block() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "b.htt",
        "MODULE M\nBLOCK _GREET : x\n_SET x=hi\nEND\n",
    );
    let a = "\
INCLUDE b.htt
CLIENT
_CALL M:_GREET RESULT
END
GO
";
    let result = common::run_in(dir.path(), "a.htt", a, hooks());
    assert!(result.success);
}

// `_CALL`'s return bindings land in the calling worker's own `Scope`
// (`VarContext::set_worker`), not the shared `GlobalVars` a `RunResult`
// exposes, so this observes the binding directly through `call_block`
// rather than through `result.globals`.
#[test]
fn call_binds_the_return_value_into_the_calling_workers_own_scope() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "b.htt",
        "MODULE M\nBLOCK _GREET : x\n_SET x=hi\nEND\n",
    );
    let a = "\
INCLUDE b.htt
CLIENT
_CALL M:_GREET RESULT
END
GO
";
    let script_path = dir.path().join("a.htt");
    write(dir.path(), "a.htt", a);

    let current_exe = std::env::current_exe().unwrap();
    let dispatcher = hooks();
    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry, dispatcher.clone());

    let outcome = Assembler::new(current_exe.clone(), script_path.clone(), dispatcher.clone(), ProcessResume::default())
        .with_default_timeout(Duration::from_millis(2_000))
        .assemble()
        .expect("assembly should succeed for a well-formed test script");
    let assembled = match outcome {
        AssemblyOutcome::Script(assembled) => assembled,
        AssemblyOutcome::ForkedParent { .. } => panic!("script has no PROCESS block, should not fork"),
    };

    let block = assembled
        .modules
        .get_qualified("M", "_GREET")
        .expect("M:_GREET should resolve after INCLUDE");
    let interp = Interpreter::new(registry, assembled.modules.clone(), dispatcher);
    let mut ctx = WorkerCtx::new("test", assembled.global_vars.clone(), Duration::from_millis(2_000), script_path, current_exe);
    call_block(&interp, &mut ctx, &Origin::new("a.htt", 3), &block, "RESULT").unwrap();
    assert_eq!(ctx.vars.lookup("RESULT").unwrap().to_string(), "hi");
}

#[test]
fn unqualified_call_from_default_module_cannot_see_it() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "b.htt",
        "MODULE M\nBLOCK _GREET : x\n_SET x=hi\nEND\n",
    );
    let a = "\
INCLUDE b.htt
CLIENT
_CALL _GREET RESULT
END
GO
";
    let result = common::run_in(dir.path(), "a.htt", a, hooks());
    assert!(!result.success, "a.htt stays in DEFAULT; an unqualified _CALL must not see M's block");
}
