mod common;

use std::sync::atomic::Ordering;
use wiretest_registry::HookId;

// Scenario 3 (spec §8): a _RPS-wrapped loop of fresh connections, counted
// through the WAIT_end hook. 10 rps over a 2s window should complete
// between 18 and 22 _WAIT calls on a quiet loopback.
#[test]
fn rps_loop_completes_the_expected_number_of_waits() {
    let (hooks, counter) = common::counting_hooks(HookId::WaitEnd);
    let dir = tempfile::tempdir().unwrap();
    let script = "\
SERVER 0 32
_RES
__ pong
END
CLIENT
_RPS 10 2
_REQ localhost:$SERVER_PORT
_WAIT
_CLOSE
_END
END
GO
";
    let result = common::run_in(dir.path(), "rps.htt", script, hooks);
    assert!(result.success, "rate-limited echo loop should complete without error");
    let completions = counter.load(Ordering::SeqCst);
    assert!(
        (18..=22).contains(&completions),
        "expected 18-22 WAIT completions for 10 rps over 2s, got {completions}"
    );
}
