mod common;

use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;
use wiretest_registry::HookDispatcher;
use wiretest_script::{Assembler, AssemblyOutcome, ProcessResume};

// Scenario 5 (spec §8): `PROCESS N VAR` re-execs N children of the real
// `wiretest` binary, each bound to its own index. Under the subprocess
// redesign (SPEC_FULL.md §9 "Fork replaced by subprocess") a child's
// variables never become visible to the parent process; the only thing the
// parent can observe is whether every child exited 0.
fn assemble(dir: &std::path::Path, src: &str) -> AssemblyOutcome {
    let script_path = dir.join("fork.htt");
    std::fs::File::create(&script_path).unwrap().write_all(src.as_bytes()).unwrap();
    let wiretest_exe = std::path::PathBuf::from(env!("CARGO_BIN_EXE_wiretest"));
    let mut hooks = HookDispatcher::new();
    hooks.freeze();
    Assembler::new(wiretest_exe, script_path, Arc::new(hooks), ProcessResume::default())
        .with_default_timeout(Duration::from_millis(2_000))
        .assemble()
        .expect("the parent's own assembly pass must not fail")
}

#[test]
fn four_succeeding_children_keep_the_latch_true() {
    let dir = tempfile::tempdir().unwrap();
    let script = "\
PROCESS 4 IDX
CLIENT
_SET OUT_$IDX=done
END
GO
";
    match assemble(dir.path(), script) {
        AssemblyOutcome::ForkedParent { success } => assert!(success, "all 4 children should exit 0"),
        AssemblyOutcome::Script(_) => panic!("top-level PROCESS should have forked, not assembled a plain script"),
    }
}

#[test]
fn a_failing_child_clears_the_parents_latch() {
    let dir = tempfile::tempdir().unwrap();
    let script = "\
PROCESS 4 IDX
CLIENT
_EXIT FAILED
END
GO
";
    match assemble(dir.path(), script) {
        AssemblyOutcome::ForkedParent { success } => assert!(!success, "one failing child should fail the whole PROCESS"),
        AssemblyOutcome::Script(_) => panic!("top-level PROCESS should have forked, not assembled a plain script"),
    }
}
