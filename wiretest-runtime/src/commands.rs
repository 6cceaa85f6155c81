//! Built-in module commands (spec §6 "Global command set", §3 "Block").
//!
//! Registered through [`CommandRegistry::register`] exactly the way an
//! external module would register its own commands — the core ships no
//! commands the extension mechanism couldn't express.

use crate::condition::tokenize_quoted;
use crate::interpreter::Interpreter;
use crate::registry::{CommandFlag, CommandRegistry};
use crate::substitute::substitute;
use crate::worker::WorkerCtx;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;
use wiretest_core::{is_valid_varname, Origin, ScriptError, ScriptResult, Value};
use wiretest_net::{socket_key, Transport, TcpTransport, UdpTransport};
use wiretest_registry::{HookDispatcher, HookId, HookPayload};
use wiretest_script::{parse_address, Proto, ScriptBody};

pub fn register_builtins(registry: &mut CommandRegistry, hooks: Arc<HookDispatcher>) {
    registry.register("core", "_SET", "_SET KEY=value", "set a worker variable", CommandFlag::None, Some(Arc::new(cmd_set)));
    registry.register("core", "_UNSET", "_UNSET KEY", "remove a worker variable", CommandFlag::None, Some(Arc::new(cmd_unset)));
    registry.register("core", "_LOCAL", "_LOCAL KEY=value", "set a block-local variable", CommandFlag::None, Some(Arc::new(cmd_local)));
    registry.register("core", "_USE", "_USE module", "select the module searched by unqualified _CALL", CommandFlag::None, Some(Arc::new(cmd_use)));
    // _CALL itself is handled structurally in Interpreter::dispatch_command
    // (it needs the Interpreter to run the block body), so it is not a
    // registry entry here.

    registry.register("net", "_REQ", "_REQ [<proto>:]host:port", "connect to a peer", CommandFlag::None, Some(Arc::new(cmd_req)));
    registry.register("net", "_RES", "_RES", "accept a connection", CommandFlag::None, Some(Arc::new(cmd_res)));
    registry.register("net", "_CLOSE", "_CLOSE", "close the current socket", CommandFlag::None, Some(Arc::new(cmd_close)));
    registry.register("net", "_TIMEOUT", "_TIMEOUT ms", "set the current socket's timeout", CommandFlag::None, Some(Arc::new(cmd_timeout)));
    {
        let hooks = hooks.clone();
        registry.register("net", "_WAIT", "_WAIT", "read a line from the current socket", CommandFlag::None, Some(Arc::new(move |ctx, rest| cmd_wait(ctx, rest, &hooks))));
    }
    {
        let hooks = hooks.clone();
        registry.register("net", "__", "__ text", "send text + CRLF on the current socket", CommandFlag::None, Some(Arc::new(move |ctx, rest| cmd_send(ctx, rest, true, &hooks))));
    }
    {
        let hooks = hooks.clone();
        registry.register("net", "_-", "_- text", "send text without CRLF", CommandFlag::None, Some(Arc::new(move |ctx, rest| cmd_send(ctx, rest, false, &hooks))));
    }

    registry.register("assert", "_EXPECT", "_EXPECT . \"pattern\"", "assert the last read matches", CommandFlag::None, Some(Arc::new(cmd_expect)));
    registry.register("assert", "_MATCH", "_MATCH \"pattern\" \"text\"", "assert text matches a regex", CommandFlag::None, Some(Arc::new(cmd_match)));

    registry.register("control", "_BREAK", "_BREAK", "end the innermost loop successfully", CommandFlag::None, Some(Arc::new(cmd_break)));
    registry.register("control", "_EXIT", "_EXIT [OK|FAILED]", "terminate the worker immediately", CommandFlag::None, Some(Arc::new(cmd_exit)));

    registry.register("log", "_DEBUG", "_DEBUG text", "emit a debug-script log line", CommandFlag::None, Some(Arc::new(cmd_debug)));
    registry.register("log", "_LOG_LEVEL", "_LOG_LEVEL level", "log the requested level (informational)", CommandFlag::None, Some(Arc::new(cmd_log_level)));
    registry.register("log", "_LOG_LEVEL_SET", "_LOG_LEVEL_SET level", "log the requested level (alt spelling)", CommandFlag::None, Some(Arc::new(cmd_log_level_set)));

    registry.register("proc", "_PROC:LOCK", "_PROC:LOCK name", "acquire an advisory cross-process lock", CommandFlag::None, Some(Arc::new(cmd_proc_lock)));
    registry.register("proc", "_PROC:UNLOCK", "_PROC:UNLOCK name", "release an advisory cross-process lock", CommandFlag::None, Some(Arc::new(cmd_proc_unlock)));
    registry.register("proc", "_PROC_WAIT", "_PROC_WAIT name", "wait for a _PROCESS child", CommandFlag::None, Some(Arc::new(cmd_proc_wait)));

    registry.register("math", "_MATH:OP", "_MATH:OP dest a OP b", "arithmetic assignment", CommandFlag::None, Some(Arc::new(cmd_math_op)));
    registry.register("math", "_OP", "_MATH:OP", "alias for _MATH:OP", CommandFlag::Link, None);
}

fn cmd_set(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let substituted = substitute(rest, &ctx.vars);
    let (key, value) = substituted
        .split_once('=')
        .ok_or_else(|| ScriptError::Argument(Origin::new("", 0), "_SET requires KEY=value".into()))?;
    if !is_valid_varname(key) {
        return Err(ScriptError::Argument(Origin::new("", 0), format!("invalid variable name {key:?}")));
    }
    ctx.vars.set_worker(key.to_string(), value.to_string());
    Ok(())
}

fn cmd_unset(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let key = substitute(rest, &ctx.vars).trim().to_string();
    ctx.vars.unset(&key);
    Ok(())
}

fn cmd_local(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let substituted = substitute(rest, &ctx.vars);
    let (key, value) = substituted
        .split_once('=')
        .ok_or_else(|| ScriptError::Argument(Origin::new("", 0), "_LOCAL requires KEY=value".into()))?;
    ctx.vars.set_local(key.to_string(), value.to_string());
    Ok(())
}

fn cmd_use(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    ctx.used_module = substitute(rest, &ctx.vars).trim().to_string();
    Ok(())
}

/// Shared by the bare-block-name dispatch path and an explicit `_CALL name
/// arg... ret...` line (spec §4.2 step 3, §3 "Block").
pub fn call_block(
    interp: &Interpreter,
    ctx: &mut WorkerCtx,
    origin: &Origin,
    block: &Arc<ScriptBody>,
    rest: &str,
) -> ScriptResult<()> {
    let substituted = substitute(rest, &ctx.vars);
    let tokens: Vec<&str> = substituted.split_whitespace().collect();
    if tokens.len() < block.params.len() {
        return Err(ScriptError::Argument(
            origin.clone(),
            format!("{}: expected {} argument(s), got {}", block.name, block.params.len(), tokens.len()),
        ));
    }
    ctx.vars.push_local();
    for (param, value) in block.params.iter().zip(tokens.iter()) {
        ctx.vars.set_local(param.clone(), value.to_string());
    }
    let outcome = interp.execute_lines(ctx, &block.lines);
    if outcome.is_ok() {
        let outputs = &tokens[block.params.len()..];
        let bindings: Vec<(String, Value)> = block
            .retvars
            .iter()
            .zip(outputs.iter())
            .map(|(retvar, out_name)| (out_name.to_string(), ctx.vars.lookup(retvar).unwrap_or(Value::str(""))))
            .collect();
        ctx.vars.pop_local();
        for (out_name, value) in bindings {
            ctx.vars.set_worker(out_name, value);
        }
    } else {
        ctx.vars.pop_local();
    }
    outcome
}

fn current_socket_key(ctx: &WorkerCtx) -> ScriptResult<String> {
    ctx.sockets
        .current_key()
        .map(str::to_string)
        .ok_or_else(|| ScriptError::Fatal("no current socket (missing _REQ/_RES/_SOCKET)".into()))
}

fn cmd_req(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let substituted = substitute(rest, &ctx.vars);
    let addr_spec = substituted.trim();
    let address = parse_address(addr_spec).map_err(|e| ScriptError::Argument(Origin::new("", 0), e))?;
    let host = address.host.clone().unwrap_or_else(|| "localhost".to_string());
    let key = socket_key(&host, address.port, None);

    let transport: Box<dyn Transport> = match address.proto {
        Proto::Udp => {
            let socket = std::net::UdpSocket::bind("0.0.0.0:0")
                .map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?;
            let peer = format!("{host}:{}", address.port)
                .parse()
                .map_err(|e: std::net::AddrParseError| ScriptError::Argument(Origin::new("", 0), e.to_string()))?;
            Box::new(UdpTransport::connected(socket, peer).map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?)
        }
        Proto::Tcp => {
            let stream = TcpStream::connect((host.as_str(), address.port))
                .map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?;
            Box::new(TcpTransport::new(stream).map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?)
        }
        Proto::Tls => {
            let stream = TcpStream::connect((host.as_str(), address.port))
                .map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?;
            Box::new(wiretest_net::tls::connect_client(&host, stream).map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?)
        }
    };
    let entry = ctx.sockets.entry(&key, ctx.default_timeout);
    entry.attach(transport);
    ctx.sockets.set_current(key);
    ctx.requests += 1;
    Ok(())
}

fn cmd_res(ctx: &mut WorkerCtx, _rest: &str) -> ScriptResult<()> {
    if let Some(socket) = ctx.udp_socket.as_ref() {
        let mut peek_buf = [0u8; 1];
        let (_, peer) = socket
            .peek_from(&mut peek_buf)
            .map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?;
        let cloned = socket.try_clone().map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?;
        let key = socket_key(&peer.ip().to_string(), peer.port(), None);
        let transport = UdpTransport::connected(cloned, peer).map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?;
        let entry = ctx.sockets.entry(&key, ctx.default_timeout);
        entry.attach(Box::new(transport));
        ctx.sockets.set_current(key);
        return Ok(());
    }

    let listener = ctx
        .listener
        .as_ref()
        .ok_or_else(|| ScriptError::Fatal("_RES: worker has no bound listener".into()))?;
    let (stream, peer) = listener
        .accept()
        .map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?;
    let key = socket_key(&peer.ip().to_string(), peer.port(), None);
    let transport: Box<dyn Transport> = if ctx.tls_server {
        let cert = std::path::Path::new("server.cert.pem");
        let key_path = std::path::Path::new("server.key.pem");
        Box::new(wiretest_net::tls::accept_server(cert, key_path, stream).map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?)
    } else {
        Box::new(TcpTransport::new(stream).map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?)
    };
    let entry = ctx.sockets.entry(&key, ctx.default_timeout);
    entry.attach(transport);
    ctx.sockets.set_current(key);
    Ok(())
}

fn cmd_close(ctx: &mut WorkerCtx, _rest: &str) -> ScriptResult<()> {
    if let Some(entry) = ctx.sockets.current_mut() {
        entry.close();
    }
    Ok(())
}

fn cmd_timeout(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let ms: u64 = substitute(rest, &ctx.vars)
        .trim()
        .parse()
        .map_err(|_| ScriptError::Argument(Origin::new("", 0), "_TIMEOUT wants milliseconds".into()))?;
    if let Some(entry) = ctx.sockets.current_mut() {
        entry.set_timeout(Duration::from_millis(ms));
    }
    Ok(())
}

/// How often a blocked `_WAIT` wakes up to check [`WorkerCtx::should_abort`]
/// (spec §4.4 "exits the whole process immediately" on unhandled failure).
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(200);

fn cmd_wait(ctx: &mut WorkerCtx, _rest: &str, hooks: &HookDispatcher) -> ScriptResult<()> {
    hooks.run(HookId::WaitBegin, &HookPayload::None);
    let key = current_socket_key(ctx)?;
    let overall_timeout = ctx.sockets.get(&key).map(|e| e.timeout).unwrap_or(ctx.default_timeout);
    let deadline = std::time::Instant::now() + overall_timeout;

    let line = loop {
        if ctx.should_abort() {
            return Err(ScriptError::Fatal("aborted: another worker failed".into()));
        }
        let remaining = deadline.saturating_duration_since(std::time::Instant::now());
        if remaining.is_zero() {
            return Err(ScriptError::Timeout(Origin::new("", 0), overall_timeout));
        }
        let step = remaining.min(WAIT_POLL_INTERVAL);
        let entry = ctx.sockets.get_mut(&key).ok_or_else(|| ScriptError::Fatal("socket vanished".into()))?;
        let transport = entry
            .transport_mut()
            .ok_or_else(|| ScriptError::Io(Origin::new("", 0), "socket not connected".into()))?;
        transport.set_timeout(Some(step)).map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?;
        match transport.read_line() {
            Ok(line) => {
                let _ = transport.set_timeout(Some(overall_timeout));
                break line;
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => continue,
            Err(e) => return Err(ScriptError::Io(Origin::new("", 0), e.to_string())),
        }
    };
    ctx.bytes_recv += line.len() as u64 + 2;
    ctx.vars.set_worker("_LAST_LINE", line);
    hooks.run(HookId::WaitEnd, &HookPayload::None);
    Ok(())
}

fn cmd_send(ctx: &mut WorkerCtx, rest: &str, crlf: bool, hooks: &HookDispatcher) -> ScriptResult<()> {
    let text = substitute(rest, &ctx.vars);
    let key = current_socket_key(ctx)?;
    let mut payload = text.clone().into_bytes();
    if crlf {
        payload.extend_from_slice(b"\r\n");
    }
    {
        let entry = ctx.sockets.get_mut(&key).ok_or_else(|| ScriptError::Fatal("socket vanished".into()))?;
        let transport = entry
            .transport_mut()
            .ok_or_else(|| ScriptError::Io(Origin::new("", 0), "socket not connected".into()))?;
        transport
            .write_all(&payload)
            .map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))?;
    }
    ctx.bytes_sent += payload.len() as u64;
    hooks.run(HookId::LineSent, &HookPayload::Text(text));
    Ok(())
}

fn cmd_expect(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let substituted = substitute(rest, &ctx.vars);
    let tokens = tokenize_quoted(&substituted);
    let (_selector, pattern) = match tokens.as_slice() {
        [selector, pattern] => (selector.as_str(), pattern.clone()),
        _ => {
            return Err(ScriptError::Argument(
                Origin::new("", 0),
                "_EXPECT requires a selector and a pattern".into(),
            ))
        }
    };
    let subject = ctx.vars.lookup("_LAST_LINE").map(|v| v.to_string()).unwrap_or_default();
    let regex = regex::Regex::new(&pattern).map_err(|e| ScriptError::Argument(Origin::new("", 0), e.to_string()))?;
    if regex.is_match(&subject) {
        Ok(())
    } else {
        Err(ScriptError::Expectation(
            Origin::new("", 0),
            format!("_EXPECT {pattern:?} did not match {subject:?}"),
        ))
    }
}

fn cmd_match(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let substituted = substitute(rest, &ctx.vars);
    let tokens = tokenize_quoted(&substituted);
    let (pattern, text) = match tokens.as_slice() {
        [pattern, text] => (pattern.clone(), text.clone()),
        _ => return Err(ScriptError::Argument(Origin::new("", 0), "_MATCH requires a pattern and text".into())),
    };
    let regex = regex::Regex::new(&pattern).map_err(|e| ScriptError::Argument(Origin::new("", 0), e.to_string()))?;
    if regex.is_match(&text) {
        Ok(())
    } else {
        Err(ScriptError::Expectation(Origin::new("", 0), format!("_MATCH {pattern:?} did not match {text:?}")))
    }
}

fn cmd_break(_ctx: &mut WorkerCtx, _rest: &str) -> ScriptResult<()> {
    Err(ScriptError::Break)
}

fn cmd_exit(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let arg = substitute(rest, &ctx.vars).trim().to_ascii_uppercase();
    Err(ScriptError::Exit(arg != "FAILED"))
}

fn cmd_debug(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let text = substitute(rest, &ctx.vars);
    tracing::debug!(target: "script", worker = %ctx.name, "{text}");
    Ok(())
}

fn cmd_log_level(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    tracing::info!(target: "script", worker = %ctx.name, level = %rest.trim(), "_LOG_LEVEL");
    Ok(())
}

fn cmd_log_level_set(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    tracing::info!(target: "script", worker = %ctx.name, level = %rest.trim(), "_LOG_LEVEL_SET");
    Ok(())
}

fn cmd_proc_lock(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let name = substitute(rest, &ctx.vars).trim().to_string();
    crate::process::acquire_named_lock(&name).map_err(|e| ScriptError::Io(Origin::new("", 0), e.to_string()))
}

fn cmd_proc_unlock(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let name = substitute(rest, &ctx.vars).trim().to_string();
    crate::process::release_named_lock(&name);
    Ok(())
}

fn cmd_proc_wait(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let name = substitute(rest, &ctx.vars).trim().to_string();
    let mut child = ctx
        .processes
        .remove(&name)
        .ok_or_else(|| ScriptError::Argument(Origin::new("", 0), format!("_PROC_WAIT: no such process {name:?}")))?;
    let status = child.wait().map_err(|e| ScriptError::Child(e.to_string()))?;
    if status.success() {
        Ok(())
    } else {
        Err(ScriptError::Child(format!("process {name} exited with {status}")))
    }
}

fn cmd_math_op(ctx: &mut WorkerCtx, rest: &str) -> ScriptResult<()> {
    let substituted = substitute(rest, &ctx.vars);
    let tokens: Vec<&str> = substituted.split_whitespace().collect();
    let [dest, a, op, b] = tokens.as_slice() else {
        return Err(ScriptError::Argument(Origin::new("", 0), "_MATH:OP wants 'dest a OP b'".into()));
    };
    let a: f64 = a.parse().map_err(|_| ScriptError::Argument(Origin::new("", 0), format!("not a number: {a}")))?;
    let b: f64 = b.parse().map_err(|_| ScriptError::Argument(Origin::new("", 0), format!("not a number: {b}")))?;
    let result = match *op {
        "+" => a + b,
        "-" => a - b,
        "*" => a * b,
        "/" => a / b,
        "%" => a % b,
        other => return Err(ScriptError::Argument(Origin::new("", 0), format!("unknown operator {other}"))),
    };
    let rendered = if result.fract() == 0.0 { format!("{result:.0}") } else { result.to_string() };
    ctx.vars.set_worker(dest.to_string(), rendered);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiretest_core::GlobalVars;

    fn ctx() -> WorkerCtx {
        WorkerCtx::new(
            "t",
            GlobalVars::new(),
            Duration::from_secs(1),
            std::path::PathBuf::from("t.htt"),
            std::path::PathBuf::from("wiretest"),
        )
    }

    #[test]
    fn set_and_unset_round_trip() {
        let mut ctx = ctx();
        cmd_set(&mut ctx, "KEY=value").unwrap();
        assert_eq!(ctx.vars.lookup("KEY").unwrap().to_string(), "value");
        cmd_unset(&mut ctx, "KEY").unwrap();
        assert!(ctx.vars.lookup("KEY").is_none());
    }

    #[test]
    fn math_op_adds() {
        let mut ctx = ctx();
        cmd_math_op(&mut ctx, "RESULT 1 + 2").unwrap();
        assert_eq!(ctx.vars.lookup("RESULT").unwrap().to_string(), "3");
    }

    #[test]
    fn exit_ok_vs_failed() {
        let mut ctx = ctx();
        match cmd_exit(&mut ctx, "FAILED") {
            Err(ScriptError::Exit(false)) => {}
            other => panic!("unexpected {other:?}"),
        }
        match cmd_exit(&mut ctx, "OK") {
            Err(ScriptError::Exit(true)) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn break_is_distinct_from_exit() {
        let mut ctx = ctx();
        let err = cmd_break(&mut ctx, "").unwrap_err();
        assert!(err.is_break());
    }
}
