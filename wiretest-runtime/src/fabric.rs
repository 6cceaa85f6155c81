//! Thread lifecycle, the client/server rendezvous, and the global success
//! latch (spec §4.4 "Concurrency fabric", §5).

use crate::interpreter::Interpreter;
use crate::worker::WorkerCtx;
use std::net::TcpListener;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use wiretest_core::{GlobalVars, ScriptError};
use wiretest_script::{AssembledScript, Proto, DEFAULT_MODULE};

/// Monotonic process-wide success flag: any thread may clear it, none may
/// re-set it (spec §5 "Shared resources").
#[derive(Clone)]
pub struct SuccessLatch(Arc<Mutex<bool>>);

impl Default for SuccessLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl SuccessLatch {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(true)))
    }

    pub fn clear(&self) {
        *self.0.lock().expect("success latch poisoned") = false;
    }

    pub fn get(&self) -> bool {
        *self.0.lock().expect("success latch poisoned")
    }
}

#[derive(Clone)]
pub struct RunningCount(Arc<(Mutex<usize>, Condvar)>);

impl Default for RunningCount {
    fn default() -> Self {
        Self::new()
    }
}

impl RunningCount {
    pub fn new() -> Self {
        Self(Arc::new((Mutex::new(0), Condvar::new())))
    }

    pub fn increment(&self) {
        *self.0 .0.lock().expect("running count poisoned") += 1;
    }

    /// Returns the count remaining after the decrement.
    pub fn decrement(&self) -> usize {
        let (lock, cv) = &*self.0;
        let mut n = lock.lock().expect("running count poisoned");
        *n = n.saturating_sub(1);
        let remaining = *n;
        if remaining == 0 {
            cv.notify_all();
        }
        remaining
    }
}

/// The lock clients acquire once to ensure servers are bound (spec §4.4,
/// GLOSSARY "Rendezvous"). Initialized with the number of distinct `SERVER`
/// specs (not instances); each spec's orchestrator call to
/// [`Rendezvous::server_ready`] happens once its listener is bound, before
/// any per-instance accept threads are spawned.
pub struct Rendezvous {
    pending: Mutex<usize>,
    cv: Condvar,
}

impl Rendezvous {
    pub fn new(pending_servers: usize) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(pending_servers),
            cv: Condvar::new(),
        })
    }

    pub fn server_ready(&self) {
        let mut pending = self.pending.lock().expect("rendezvous poisoned");
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.cv.notify_all();
        }
    }

    pub fn wait_ready(&self) {
        let mut pending = self.pending.lock().expect("rendezvous poisoned");
        while *pending > 0 {
            pending = self.cv.wait(pending).expect("rendezvous poisoned");
        }
    }
}

pub struct RunOutcome {
    pub success: bool,
}

/// `GO`: spawns daemon threads, then server threads (bound before spawning,
/// with the rendezvous released once every spec is bound), then client
/// threads (each waiting on the rendezvous before its first line), then
/// joins everything (spec §2 "Control flow", §4.4).
pub fn go(assembled: AssembledScript, interp: Arc<Interpreter>, current_exe: PathBuf, script_path: PathBuf) -> RunOutcome {
    let success = SuccessLatch::new();
    let running = RunningCount::new();
    let rendezvous = Rendezvous::new(assembled.servers.len());
    if assembled.servers.is_empty() {
        rendezvous.server_ready(); // nothing to wait for; keep the mutex consistent
    }
    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    for body in &assembled.daemons {
        handles.push(spawn_worker(
            WorkerKindRole::Daemon,
            format!("daemon:{}", body.name),
            body.clone(),
            interp.clone(),
            assembled.global_vars.clone(),
            assembled.default_timeout,
            script_path.clone(),
            current_exe.clone(),
            running.clone(),
            success.clone(),
            None,
            None,
            false,
            None,
        ));
    }

    const MAX_SERVER_INSTANCES: usize = 64;
    for spec in &assembled.servers {
        let host = spec.address.host.clone().unwrap_or_else(|| "0.0.0.0".to_string());
        match spec.address.proto {
            Proto::Udp => {
                let socket = match std::net::UdpSocket::bind((host.as_str(), spec.address.port)) {
                    Ok(s) => s,
                    Err(e) => {
                        tracing::error!(target: "system", %host, port = spec.address.port, "SERVER bind failed: {e}");
                        success.clear();
                        rendezvous.server_ready();
                        continue;
                    }
                };
                let bound_port = socket.local_addr().map(|a| a.port()).unwrap_or(spec.address.port);
                assembled.global_vars.set("SERVER_PORT", bound_port.to_string());
                rendezvous.server_ready();

                // UDP has no accept loop: every instance would race on the
                // same bound socket, so only one worker thread serves it.
                if spec.count > 1 {
                    tracing::warn!(target: "system", requested = spec.count, "SERVER udp: instance count ignored, running 1");
                }
                handles.push(spawn_worker(
                    WorkerKindRole::Server,
                    format!("server:{}:0", spec.body.name),
                    spec.body.clone(),
                    interp.clone(),
                    assembled.global_vars.clone(),
                    assembled.default_timeout,
                    script_path.clone(),
                    current_exe.clone(),
                    running.clone(),
                    success.clone(),
                    None,
                    None,
                    false,
                    Some(socket),
                ));
            }
            Proto::Tcp | Proto::Tls => {
                let listener = match TcpListener::bind((host.as_str(), spec.address.port)) {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::error!(target: "system", %host, port = spec.address.port, "SERVER bind failed: {e}");
                        success.clear();
                        rendezvous.server_ready();
                        continue;
                    }
                };
                let bound_port = listener.local_addr().map(|a| a.port()).unwrap_or(spec.address.port);
                assembled.global_vars.set("SERVER_PORT", bound_port.to_string());
                rendezvous.server_ready();

                let is_tls = spec.address.proto == Proto::Tls;
                let instances = spec.count.min(MAX_SERVER_INSTANCES).max(1);
                for i in 0..instances {
                    let cloned = match listener.try_clone() {
                        Ok(l) => l,
                        Err(e) => {
                            tracing::error!(target: "system", "failed to clone server listener: {e}");
                            success.clear();
                            continue;
                        }
                    };
                    handles.push(spawn_worker(
                        WorkerKindRole::Server,
                        format!("server:{}:{i}", spec.body.name),
                        spec.body.clone(),
                        interp.clone(),
                        assembled.global_vars.clone(),
                        assembled.default_timeout,
                        script_path.clone(),
                        current_exe.clone(),
                        running.clone(),
                        success.clone(),
                        Some(cloned),
                        None,
                        is_tls,
                        None,
                    ));
                }
            }
        }
    }

    for spec in &assembled.clients {
        for i in 0..spec.count.max(1) {
            handles.push(spawn_worker(
                WorkerKindRole::Client,
                format!("client:{}:{i}", spec.body.name),
                spec.body.clone(),
                interp.clone(),
                assembled.global_vars.clone(),
                assembled.default_timeout,
                script_path.clone(),
                current_exe.clone(),
                running.clone(),
                success.clone(),
                None,
                Some(rendezvous.clone()),
                false,
                None,
            ));
        }
    }

    for handle in handles {
        let _ = handle.join();
    }

    RunOutcome { success: success.get() }
}

enum WorkerKindRole {
    Client,
    Server,
    Daemon,
}

#[allow(clippy::too_many_arguments)]
fn spawn_worker(
    role: WorkerKindRole,
    name: String,
    body: Arc<wiretest_script::ScriptBody>,
    interp: Arc<Interpreter>,
    global_vars: GlobalVars,
    default_timeout: Duration,
    script_path: PathBuf,
    current_exe: PathBuf,
    running: RunningCount,
    success: SuccessLatch,
    listener: Option<TcpListener>,
    rendezvous: Option<Arc<Rendezvous>>,
    tls_server: bool,
    udp_listener: Option<std::net::UdpSocket>,
) -> JoinHandle<()> {
    running.increment();
    std::thread::spawn(move || {
        if matches!(role, WorkerKindRole::Client) {
            if let Some(r) = &rendezvous {
                r.wait_ready();
            }
        }
        let mut ctx = WorkerCtx::new(name.clone(), global_vars, default_timeout, script_path, current_exe);
        ctx.listener = listener;
        ctx.udp_socket = udp_listener;
        ctx.tls_server = tls_server;
        ctx.cancel = success.clone();

        let result = interp.execute_lines(&mut ctx, &body.lines);
        let (status, error_text, failed) = match &result {
            Ok(()) => ("OK", String::new(), false),
            Err(ScriptError::Exit(true)) => ("OK", String::new(), false),
            Err(e) => ("FAILED", e.to_string(), e.is_failure()),
        };
        ctx.sockets.close_all();
        let thread_id = format!("{:?}", std::thread::current().id());
        ctx.record_exit(&error_text, status, thread_id);

        if failed {
            tracing::error!(target: "script", worker = %name, "{error_text}");
            // ON_ERROR runs as a notification hook; it never un-fails the worker that
            // triggered it, so the latch still clears even when the block is defined.
            success.clear();
            if let Some(on_error) = interp.modules.resolve(DEFAULT_MODULE, "ON_ERROR") {
                if let Err(e) = interp.execute_lines(&mut ctx, &on_error.lines) {
                    tracing::error!(target: "script", worker = %name, "ON_ERROR failed: {e}");
                }
            }
        }

        if running.decrement() == 0 {
            if let Some(finally) = interp.modules.resolve(DEFAULT_MODULE, "FINALLY") {
                let _ = interp.execute_lines(&mut ctx, &finally.lines);
            }
        }
    })
}
