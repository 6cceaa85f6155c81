mod common;

// Scenario 1 (spec §8): a server that echoes one line back, a client that
// sends it and checks the echo. Expected: success.
#[test]
fn server_echoes_and_client_matches() {
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
_EXPECT . \"hello\"
_CLOSE
END
GO
";
    let result = common::run(script);
    assert!(result.success, "echo loopback should succeed");
}
