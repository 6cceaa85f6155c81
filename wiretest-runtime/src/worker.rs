//! The runtime half of a worker: everything a [`ScriptBody`] needs to
//! actually run (spec §3 "Worker", "Global context").
//!
//! A [`ScriptBody`] is immutable and `Arc`-shared across clones (spec §5
//! "Clone semantics"); `WorkerCtx` is the per-instance state each clone owns
//! exclusively — its own variable scope chain, socket table, and counters.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Child;
use std::time::Duration;
use wiretest_core::{GlobalVars, VarContext};
use wiretest_net::SocketTable;
use wiretest_script::{ModuleTable, DEFAULT_MODULE};

pub struct WorkerCtx {
    pub name: String,
    pub vars: VarContext,
    pub sockets: SocketTable,
    pub default_timeout: Duration,
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub requests: u64,
    /// The module a bare (unqualified) `_CALL` searches first (spec §3 "Block").
    pub used_module: String,
    /// Children spawned by `_PROCESS name { ... }`, awaited by `_PROC_WAIT`.
    pub processes: HashMap<String, Child>,
    pub script_path: PathBuf,
    pub current_exe: PathBuf,
    /// Bound by the fabric before a TCP/TLS server thread runs; `_RES` accepts on it.
    pub listener: Option<std::net::TcpListener>,
    /// Bound by the fabric before a UDP server thread runs; `_RES` waits for
    /// the first datagram on it instead of accepting.
    pub udp_socket: Option<std::net::UdpSocket>,
    /// Set when this server's `SERVER` spec used `tls:`/`ssl:`; `_RES` wraps
    /// the accepted stream in a TLS server handshake instead of returning it
    /// plain (spec §6 `SERVER [<proto>:]addr_port`).
    pub tls_server: bool,
    /// The fabric's shared success latch, doubled as a cancellation signal:
    /// once another worker clears it, every other worker's blocking loops
    /// (rate limiters, `_WAIT`) check [`WorkerCtx::should_abort`] and unwind
    /// instead of running to their own natural completion or timeout (spec
    /// §4.4 "exits the whole process immediately").
    pub cancel: crate::fabric::SuccessLatch,
}

impl WorkerCtx {
    pub fn new(
        name: impl Into<String>,
        global_vars: GlobalVars,
        default_timeout: Duration,
        script_path: PathBuf,
        current_exe: PathBuf,
    ) -> Self {
        Self {
            name: name.into(),
            vars: VarContext::new(global_vars),
            sockets: SocketTable::new(),
            default_timeout,
            bytes_sent: 0,
            bytes_recv: 0,
            requests: 0,
            used_module: DEFAULT_MODULE.to_string(),
            processes: HashMap::new(),
            script_path,
            current_exe,
            listener: None,
            udp_socket: None,
            tls_server: false,
            cancel: crate::fabric::SuccessLatch::new(),
        }
    }

    /// `true` once some other worker has cleared the shared success latch;
    /// blocking loops poll this between attempts to abandon promptly rather
    /// than running to their own completion or timeout.
    pub fn should_abort(&self) -> bool {
        !self.cancel.get()
    }

    pub fn resolve_block(
        &self,
        modules: &ModuleTable,
        name: &str,
    ) -> Option<std::sync::Arc<wiretest_script::ScriptBody>> {
        if let Some((module, rest)) = name.split_once(':') {
            modules.get_qualified(module, rest)
        } else {
            modules.resolve(&self.used_module, name)
        }
    }

    /// Records `__ERROR`/`__STATUS`/`__THREAD` in the worker scope at thread
    /// exit (spec §4.4 "Worker finalization").
    pub fn record_exit(&mut self, error_text: &str, status: &str, thread_id: impl Into<String>) {
        self.vars.set_worker("__ERROR", error_text);
        self.vars.set_worker("__STATUS", status);
        self.vars.set_worker("__THREAD", thread_id.into());
    }
}
