//! `_PROCESS name { ... }` and `_PROC:LOCK`/`_PROC:UNLOCK` (spec §4.5).
//!
//! `_PROCESS` forks a child that runs only the body, by writing it out as a
//! standalone `DAEMON { ... } GO` script and re-executing the current binary
//! against it — the same redesign `PROCESS` (global) uses, applied at
//! worker scope instead of script scope.

use crate::worker::WorkerCtx;
use std::io::Write as _;
use std::time::Duration;
use wiretest_core::{Line, ScriptError, ScriptResult};

pub fn fork_worker_process(ctx: &mut WorkerCtx, line: &Line, rest: &str, body: &[Line]) -> ScriptResult<()> {
    let name = rest.trim().to_string();
    if name.is_empty() {
        return Err(ScriptError::Argument(line.origin.clone(), "_PROCESS requires a name".into()));
    }
    let mut script = String::from("DAEMON\n");
    for l in body {
        script.push_str(&l.text);
        script.push('\n');
    }
    script.push_str("END\nGO\n");

    let mut tmp = tempfile::Builder::new()
        .prefix("wiretest-proc-")
        .suffix(".htt")
        .tempfile()
        .map_err(|e| ScriptError::Io(line.origin.clone(), e.to_string()))?;
    tmp.write_all(script.as_bytes())
        .map_err(|e| ScriptError::Io(line.origin.clone(), e.to_string()))?;
    let (_, path) = tmp.keep().map_err(|e| ScriptError::Io(line.origin.clone(), e.to_string()))?;

    let child = std::process::Command::new(&ctx.current_exe)
        .arg(&path)
        .spawn()
        .map_err(|e| ScriptError::Child(format!("{}: spawning _PROCESS {name}: {e}", line.origin)))?;
    ctx.processes.insert(name, child);
    Ok(())
}

fn lock_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("wiretest-lock-{name}"))
}

/// A `NamedMutex`-style advisory lock realized as an exclusively-created
/// file (spec §4.5: "mutual exclusion across children" without shared
/// memory, since children are now OS processes, not `fork()`ed copies).
pub fn acquire_named_lock(name: &str) -> std::io::Result<()> {
    let path = lock_path(name);
    loop {
        match std::fs::OpenOptions::new().create_new(true).write(true).open(&path) {
            Ok(_) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                std::thread::sleep(Duration::from_millis(5));
            }
            Err(e) => return Err(e),
        }
    }
}

pub fn release_named_lock(name: &str) {
    let _ = std::fs::remove_file(lock_path(name));
}
