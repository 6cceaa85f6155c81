mod common;

// Scenario 2 (spec §8): same topology as scenario 1, but the client expects
// text the server never sends. Expected: failure, and the reported error
// carries the origin of the failing _EXPECT line.
#[test]
fn mismatched_expect_fails_the_run() {
    let script = "\
SERVER 0
_RES
_WAIT
__ hello
END
CLIENT
_REQ localhost:$SERVER_PORT
__ hello
_WAIT
_EXPECT . \"goodbye\"
_CLOSE
END
GO
";
    let result = common::run(script);
    assert!(!result.success, "mismatched _EXPECT should fail the run");
}
