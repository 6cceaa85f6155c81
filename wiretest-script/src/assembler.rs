//! Turns script text into an [`AssembledScript`] (spec §4.1 "Assembler").
//!
//! Reads top to bottom. At the outer nesting level a line is one of the
//! global commands; inside a `CLIENT`/`SERVER`/`DAEMON`/`BLOCK`/`FILE` body
//! every line is collected verbatim until a literal `END` token, with no
//! nesting counter at all — nesting only matters for the `_IF`/`_LOOP`/...
//! family inside a body, and that is [`crate::nesting::validate_balanced`]'s
//! job, run once the body is fully collected.

use crate::module_table::{DEFAULT_MODULE, ModuleTable};
use crate::nesting::validate_balanced;
use crate::proto::{Address, Proto, parse_address};
use crate::script_body::{ScriptBody, WorkerKind, parse_signature};
use std::fs::File;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wiretest_core::{GlobalVars, Line, Origin, ScriptError, ScriptResult};
use wiretest_registry::{HookDispatcher, HookId, HookPayload};

pub const MAX_INCLUDE_DEPTH: usize = 8;

#[derive(Debug, Clone)]
pub struct ParticipantSpec {
    pub count: usize,
    pub body: Arc<ScriptBody>,
}

#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub address: Address,
    pub count: usize,
    pub body: Arc<ScriptBody>,
}

#[derive(Debug, Clone)]
pub struct FileSpec {
    pub var_name: String,
    pub path: PathBuf,
}

/// Removes the backing temp file when dropped. Spec §3 says temp files from
/// `FILE` blocks are "removed at atexit"; RAII is the idiomatic stand-in.
pub struct TempFileGuard(pub PathBuf);

impl Drop for TempFileGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// What assembling a top-level script produced. `ForkedParent` is returned
/// when a global `PROCESS` command has already spawned and awaited its
/// children by the time assembly reaches EOF — the caller should exit with
/// `success` rather than run `GO` (see [`Assembler::process_skip_origin`]).
pub enum AssemblyOutcome {
    Script(Box<AssembledScript>),
    ForkedParent { success: bool },
}

pub struct AssembledScript {
    pub clients: Vec<ParticipantSpec>,
    pub servers: Vec<ServerSpec>,
    pub daemons: Vec<Arc<ScriptBody>>,
    pub files: Vec<FileSpec>,
    pub modules: ModuleTable,
    pub global_vars: GlobalVars,
    pub default_timeout: Duration,
    pub auto_close: bool,
    pub temp_file_guards: Vec<TempFileGuard>,
}

/// `--process-var NAME=VALUE` / `--process-skip FILE:LINE`, set by a parent
/// process when it re-execs itself as a `PROCESS` child (spec §4.5).
#[derive(Debug, Clone, Default)]
pub struct ProcessResume {
    pub var: Option<(String, String)>,
    pub skip_origin: Option<String>,
}

pub struct Assembler {
    current_exe: PathBuf,
    script_path: PathBuf,
    hooks: Arc<HookDispatcher>,
    resume: ProcessResume,

    modules: ModuleTable,
    clients: Vec<ParticipantSpec>,
    servers: Vec<ServerSpec>,
    daemons: Vec<Arc<ScriptBody>>,
    files: Vec<FileSpec>,
    temp_guards: Vec<TempFileGuard>,
    global_vars: GlobalVars,
    default_timeout: Duration,
    auto_close: bool,
    forked_parent: Option<bool>,
}

impl Assembler {
    pub fn new(
        current_exe: PathBuf,
        script_path: PathBuf,
        hooks: Arc<HookDispatcher>,
        resume: ProcessResume,
    ) -> Self {
        let global_vars = GlobalVars::new();
        if let Some((name, value)) = &resume.var {
            global_vars.set(name.clone(), value.clone());
        }
        Self {
            current_exe,
            script_path,
            hooks,
            resume,
            modules: ModuleTable::new(),
            clients: Vec::new(),
            servers: Vec::new(),
            daemons: Vec::new(),
            files: Vec::new(),
            temp_guards: Vec::new(),
            global_vars,
            default_timeout: Duration::from_secs(10),
            auto_close: true,
            forked_parent: None,
        }
    }

    /// Overrides the compiled-in default socket timeout (10s) before assembly
    /// starts; a script's own `TIMEOUT ms` line still overrides this.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn assemble(mut self) -> ScriptResult<AssemblyOutcome> {
        let path = self.script_path.clone();
        self.read_file(&path, 0)?;
        if let Some(success) = self.forked_parent {
            return Ok(AssemblyOutcome::ForkedParent { success });
        }
        Ok(AssemblyOutcome::Script(Box::new(AssembledScript {
            clients: self.clients,
            servers: self.servers,
            daemons: self.daemons,
            files: self.files,
            modules: self.modules,
            global_vars: self.global_vars,
            default_timeout: self.default_timeout,
            auto_close: self.auto_close,
            temp_file_guards: self.temp_guards,
        })))
    }

    fn read_file(&mut self, path: &Path, depth: usize) -> ScriptResult<()> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(ScriptError::Fatal(format!(
                "INCLUDE nesting exceeded {MAX_INCLUDE_DEPTH} at {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| ScriptError::Fatal(format!("cannot open {}: {e}", path.display())))?;
        let file: Arc<str> = path.display().to_string().into();
        let mut current_module = DEFAULT_MODULE.to_string();

        let raw_lines: Vec<&str> = content.lines().collect();
        let mut idx = 0usize;
        while idx < raw_lines.len() {
            let line_no = idx + 1;
            idx += 1;
            let origin = Origin::new(file.clone(), line_no);
            let mut text = raw_lines[line_no - 1].trim_end_matches('\r').to_string();
            if let Some(HookPayload::Text(rewritten)) = self.hooks.run(
                HookId::ReadLine,
                &HookPayload::Line {
                    origin: origin.clone(),
                    text: text.clone(),
                },
            ) {
                text = rewritten;
            }
            let trimmed = text.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let cmd = trimmed.split_whitespace().next().unwrap_or("");
            let rest = trimmed[cmd.len()..].trim_start();

            match cmd {
                "GO" => continue,
                "END" => {
                    return Err(ScriptError::Fatal(format!(
                        "{origin}: unexpected END outside a body"
                    )));
                }
                "CLIENT" | "SERVER" | "DAEMON" | "FILE" | "BLOCK" => {
                    if current_module != DEFAULT_MODULE && cmd != "BLOCK" {
                        return Err(ScriptError::Fatal(format!(
                            "{origin}: {cmd} is illegal inside MODULE {current_module}"
                        )));
                    }
                    let (kind, name, count, address) = match cmd {
                        "CLIENT" => (WorkerKind::Client, format!("client@{line_no}"), parse_count(rest, 1)?, None),
                        "DAEMON" => (WorkerKind::Daemon, format!("daemon@{line_no}"), 1, None),
                        "FILE" => {
                            let var_name = rest.split_whitespace().next().unwrap_or("").to_string();
                            if var_name.is_empty() {
                                return Err(ScriptError::Argument(origin, "FILE requires a variable name".into()));
                            }
                            (WorkerKind::File, var_name, 1, None)
                        }
                        "SERVER" => {
                            let mut parts = rest.split_whitespace();
                            let addr_spec = parts.next().ok_or_else(|| {
                                ScriptError::Argument(origin.clone(), "SERVER requires an address".into())
                            })?;
                            let address = parse_address(addr_spec)
                                .map_err(|e| ScriptError::Argument(origin.clone(), e))?;
                            let count = parts
                                .next()
                                .map(|n| n.parse::<i64>())
                                .transpose()
                                .map_err(|_| ScriptError::Argument(origin.clone(), "bad SERVER count".into()))?
                                .unwrap_or(1);
                            let count = if count < 0 { usize::MAX } else { count as usize };
                            (WorkerKind::Server, format!("server@{line_no}"), count, Some(address))
                        }
                        "BLOCK" => {
                            let mut parts = rest.splitn(2, char::is_whitespace);
                            let name = parts.next().unwrap_or("").to_string();
                            if name.is_empty() {
                                return Err(ScriptError::Argument(origin, "BLOCK requires a name".into()));
                            }
                            (WorkerKind::Block, name, 1, None)
                        }
                        _ => unreachable!(),
                    };

                    let sig_tail = if kind == WorkerKind::Block {
                        rest.splitn(2, char::is_whitespace).nth(1).unwrap_or("")
                    } else {
                        ""
                    };
                    let (params, retvars) = parse_signature(sig_tail);

                    let body_lines = self.collect_body(&raw_lines, &mut idx, &file)?;
                    validate_balanced(&body_lines).map_err(ScriptError::Fatal)?;

                    let mut body = ScriptBody::new(name.clone(), kind, origin.clone());
                    body.lines = body_lines;
                    body.params = params;
                    body.retvars = retvars;
                    let body = Arc::new(body);

                    match kind {
                        WorkerKind::Client => self.clients.push(ParticipantSpec { count, body }),
                        WorkerKind::Daemon => self.daemons.push(body),
                        WorkerKind::Server => self.servers.push(ServerSpec {
                            address: address.expect("SERVER always carries an address"),
                            count,
                            body,
                        }),
                        WorkerKind::File => {
                            let path = self.write_temp_file(&body)?;
                            self.global_vars.set(name.clone(), path.display().to_string());
                            self.files.push(FileSpec { var_name: name, path });
                        }
                        WorkerKind::Block => self.modules.insert_block(&current_module, body),
                    }
                }
                "MODULE" => {
                    let name = rest.trim();
                    if name.is_empty() {
                        return Err(ScriptError::Argument(origin, "MODULE requires a name".into()));
                    }
                    self.modules
                        .declare_module(name)
                        .map_err(|e| ScriptError::Fatal(format!("{origin}: {e}")))?;
                    current_module = name.to_string();
                }
                "INCLUDE" => {
                    let included = self.resolve_include(path, rest.trim())?;
                    self.read_file(&included, depth + 1)?;
                    if self.forked_parent.is_some() {
                        return Ok(());
                    }
                    current_module = DEFAULT_MODULE.to_string();
                }
                "EXEC" => {
                    let status = std::process::Command::new("/bin/sh")
                        .arg("-c")
                        .arg(rest)
                        .status()
                        .map_err(|e| ScriptError::Io(origin.clone(), e.to_string()))?;
                    if !status.success() {
                        tracing::warn!(target: "system", %origin, "EXEC command exited non-zero");
                    }
                }
                "SET" => {
                    let (key, value) = rest.split_once('=').ok_or_else(|| {
                        ScriptError::Argument(origin.clone(), "SET requires KEY=value".into())
                    })?;
                    if !wiretest_core::is_valid_varname(key) {
                        return Err(ScriptError::Argument(origin, format!("invalid variable name {key:?}")));
                    }
                    self.global_vars.set(key.to_string(), value.to_string());
                }
                "TIMEOUT" => {
                    let ms: u64 = rest
                        .trim()
                        .parse()
                        .map_err(|_| ScriptError::Argument(origin.clone(), "TIMEOUT wants milliseconds".into()))?;
                    self.default_timeout = Duration::from_millis(ms);
                }
                "AUTO_CLOSE" => {
                    self.auto_close = match rest.trim() {
                        "0" | "off" | "OFF" => false,
                        _ => true,
                    };
                }
                "PROCESS" => {
                    self.handle_process(&origin, rest)?;
                    if self.forked_parent.is_some() {
                        return Ok(());
                    }
                }
                other => {
                    return Err(ScriptError::Dispatch(origin, other.to_string()));
                }
            }
        }
        Ok(())
    }

    /// Collects every line up to (and consuming) a literal `END` token, with
    /// no nesting counter — only `END` closes a top-level body (spec §4.1).
    fn collect_body(
        &mut self,
        raw_lines: &[&str],
        idx: &mut usize,
        file: &Arc<str>,
    ) -> ScriptResult<Vec<Line>> {
        let mut out = Vec::new();
        loop {
            if *idx >= raw_lines.len() {
                return Err(ScriptError::Fatal(format!(
                    "{file}: unterminated body, reached end of file before END"
                )));
            }
            let line_no = *idx + 1;
            let origin = Origin::new(file.clone(), line_no);
            let text = raw_lines[*idx].trim_end_matches('\r').to_string();
            *idx += 1;
            let trimmed = text.trim();
            if trimmed == "END" {
                return Ok(out);
            }
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            out.push(Line::new(origin, trimmed.to_string()));
        }
    }

    fn write_temp_file(&mut self, body: &ScriptBody) -> ScriptResult<PathBuf> {
        let mut tmp = tempfile::Builder::new()
            .prefix("wiretest-")
            .suffix(".tmp")
            .tempfile()
            .map_err(|e| ScriptError::Io(body.origin.clone(), e.to_string()))?;
        for line in &body.lines {
            writeln!(tmp, "{}", line.text).map_err(|e| ScriptError::Io(body.origin.clone(), e.to_string()))?;
        }
        let (_, path) = tmp
            .keep()
            .map_err(|e| ScriptError::Io(body.origin.clone(), e.to_string()))?;
        self.temp_guards.push(TempFileGuard(path.clone()));
        Ok(path)
    }

    fn resolve_include(&self, from: &Path, arg: &str) -> ScriptResult<PathBuf> {
        let name = arg.trim_matches('"');
        if name.is_empty() {
            return Err(ScriptError::Fatal("INCLUDE requires a file name".into()));
        }
        let candidate = PathBuf::from(name);
        if candidate.is_absolute() && candidate.exists() {
            return Ok(candidate);
        }
        if let Some(parent) = from.parent() {
            let joined = parent.join(name);
            if joined.exists() {
                return Ok(joined);
            }
        }
        if candidate.exists() {
            return Ok(candidate);
        }
        Err(ScriptError::Fatal(format!("INCLUDE: cannot find {name:?}")))
    }

    /// `PROCESS <n> [VAR]` forks `n` children of the current binary, each
    /// re-running assembly from the top with `VAR` pre-bound to its index
    /// (spec §4.5, redesigned in SPEC_FULL.md §4.5 to re-exec instead of
    /// `fork()`). A child invoked with `--process-skip` matching this exact
    /// line treats it as a no-op and continues assembling normally.
    fn handle_process(&mut self, origin: &Origin, rest: &str) -> ScriptResult<()> {
        let origin_key = origin.to_string();
        if self.resume.skip_origin.as_deref() == Some(origin_key.as_str()) {
            return Ok(());
        }
        let mut parts = rest.split_whitespace();
        let n: usize = parts
            .next()
            .ok_or_else(|| ScriptError::Argument(origin.clone(), "PROCESS requires a count".into()))?
            .parse()
            .map_err(|_| ScriptError::Argument(origin.clone(), "PROCESS count must be an integer".into()))?;
        let var = parts.next().map(str::to_string);

        let mut children = Vec::with_capacity(n);
        for i in 0..n {
            let mut cmd = std::process::Command::new(&self.current_exe);
            cmd.arg(&self.script_path);
            cmd.arg("--process-skip").arg(&origin_key);
            if let Some(v) = &var {
                cmd.arg("--process-var").arg(format!("{v}={i}"));
            }
            let child = cmd
                .spawn()
                .map_err(|e| ScriptError::Child(format!("{origin}: spawning PROCESS child {i}: {e}")))?;
            children.push(child);
        }
        let mut all_ok = true;
        for mut child in children {
            let status = child
                .wait()
                .map_err(|e| ScriptError::Child(format!("{origin}: waiting for PROCESS child: {e}")))?;
            all_ok &= status.success();
        }
        self.forked_parent = Some(all_ok);
        Ok(())
    }
}

fn parse_count(rest: &str, default: usize) -> ScriptResult<usize> {
    let token = rest.trim();
    if token.is_empty() {
        return Ok(default);
    }
    token
        .split_whitespace()
        .next()
        .unwrap()
        .parse()
        .map_err(|_| ScriptError::Argument(Origin::new("", 0), "expected an integer count".into()))
}

#[allow(dead_code)]
fn ssl_proto_name(p: Proto) -> &'static str {
    match p {
        Proto::Tcp => "tcp",
        Proto::Udp => "udp",
        Proto::Tls => "tls",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn write_script(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".htt").tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn assemble(content: &str) -> AssembledScript {
        let f = write_script(content);
        let hooks = Arc::new(HookDispatcher::new());
        let asm = Assembler::new(
            PathBuf::from("wiretest-bin"),
            f.path().to_path_buf(),
            hooks,
            ProcessResume::default(),
        );
        match asm.assemble().unwrap() {
            AssemblyOutcome::Script(s) => *s,
            AssemblyOutcome::ForkedParent { .. } => panic!("did not expect a fork"),
        }
    }

    #[test]
    fn simple_client_and_server_assemble() {
        let script = assemble(
            "SERVER 0\n_REQ GET /\nEND\nCLIENT\n_REQ tcp:localhost:8080\nEND\nGO\n",
        );
        assert_eq!(script.servers.len(), 1);
        assert_eq!(script.clients.len(), 1);
        assert_eq!(script.servers[0].address.port, 0);
    }

    #[test]
    fn block_goes_into_default_module() {
        let script = assemble("BLOCK _GREET a : r\n_SET r=$a\nEND\nCLIENT\nEND\nGO\n");
        assert!(script.modules.resolve(DEFAULT_MODULE, "_GREET").is_some());
    }

    #[test]
    fn module_scoped_block_is_not_visible_unqualified_elsewhere() {
        let script = assemble("MODULE M\nBLOCK _HELPER\nEND\nGO\n");
        assert!(script.modules.get_qualified("M", "_HELPER").is_some());
        assert!(script.modules.resolve(DEFAULT_MODULE, "_HELPER").is_none());
    }

    #[test]
    fn set_populates_global_vars() {
        let script = assemble("SET GREETING=hello\nCLIENT\nEND\nGO\n");
        assert_eq!(script.global_vars.get("GREETING").unwrap().to_string(), "hello");
    }

    #[test]
    fn unterminated_body_is_fatal() {
        let f = write_script("CLIENT\n_SET X=1\n");
        let hooks = Arc::new(HookDispatcher::new());
        let asm = Assembler::new(
            PathBuf::from("wiretest-bin"),
            f.path().to_path_buf(),
            hooks,
            ProcessResume::default(),
        );
        assert!(asm.assemble().is_err());
    }

    #[test]
    fn client_inside_module_is_rejected() {
        let f = write_script("MODULE M\nCLIENT\nEND\n");
        let hooks = Arc::new(HookDispatcher::new());
        let asm = Assembler::new(
            PathBuf::from("wiretest-bin"),
            f.path().to_path_buf(),
            hooks,
            ProcessResume::default(),
        );
        assert!(asm.assemble().is_err());
    }
}
