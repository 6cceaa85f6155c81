//! Executes a worker's lines (spec §4.2 "Interpreter").

use crate::condition::eval_if;
use crate::registry::{CommandFlag, CommandRegistry};
use crate::substitute::substitute;
use crate::worker::WorkerCtx;
use std::time::{Duration, Instant};
use wiretest_core::{Line, ScriptError, ScriptResult};
use wiretest_registry::HookDispatcher;
use wiretest_script::{find_else, find_matching_end, is_body_opener, ModuleTable};

pub struct Interpreter {
    pub registry: CommandRegistry,
    pub modules: ModuleTable,
    pub hooks: std::sync::Arc<HookDispatcher>,
}

impl Interpreter {
    pub fn new(registry: CommandRegistry, modules: ModuleTable, hooks: std::sync::Arc<HookDispatcher>) -> Self {
        Self { registry, modules, hooks }
    }

    /// Runs `lines` top to bottom. Returns the first non-success status
    /// (spec §7 "the interpreter stops executing a worker at the first
    /// non-success status"), with `_BREAK`/`_EXIT` carried as distinct
    /// `ScriptError` variants rather than overloaded failures.
    pub fn execute_lines(&self, ctx: &mut WorkerCtx, lines: &[Line]) -> ScriptResult<()> {
        let mut i = 0;
        while i < lines.len() {
            let line = &lines[i];
            let cmd = line.command();
            let rest = line.rest();

            if is_body_opener(cmd) {
                let end = find_matching_end(&lines[i + 1..]).ok_or_else(|| {
                    ScriptError::Fatal(format!("{}: no matching _END for {cmd}", line.origin))
                })?;
                let body = &lines[i + 1..i + 1 + end];
                self.run_body_opener(ctx, line, cmd, rest, body)?;
                i += 1 + end + 1; // skip opener, body, and the _END line
                continue;
            }
            if cmd == "_END" || cmd == "_ELSE" {
                return Err(ScriptError::Fatal(format!(
                    "{}: stray {cmd} reached outside a body (assembler should have rejected this)",
                    line.origin
                )));
            }
            self.dispatch_command(ctx, line, cmd, rest)?;
            i += 1;
        }
        Ok(())
    }

    fn run_body_opener(
        &self,
        ctx: &mut WorkerCtx,
        line: &Line,
        cmd: &str,
        rest: &str,
        body: &[Line],
    ) -> ScriptResult<()> {
        match cmd {
            "_IF" => {
                let taken = eval_if(&line.origin, rest, &ctx.vars)?;
                let (then_body, else_body) = match find_else(body, body.len()) {
                    Some(else_at) => (&body[..else_at], Some(&body[else_at + 1..])),
                    None => (body, None),
                };
                if taken {
                    self.execute_lines(ctx, then_body)
                } else if let Some(else_body) = else_body {
                    self.execute_lines(ctx, else_body)
                } else {
                    Ok(())
                }
            }
            "_LOOP" => {
                let spec = substitute(rest, &ctx.vars);
                let spec = spec.trim();
                let forever = spec.eq_ignore_ascii_case("FOREVER");
                let count: u64 = if forever {
                    0
                } else {
                    spec.parse().map_err(|_| {
                        ScriptError::Argument(line.origin.clone(), format!("_LOOP: bad count {spec:?}"))
                    })?
                };
                let mut iterations = 0u64;
                loop {
                    if !forever && iterations >= count {
                        break;
                    }
                    match self.execute_lines(ctx, body) {
                        Ok(()) => {}
                        Err(e) if e.is_break() => break,
                        Err(e) => return Err(e),
                    }
                    iterations += 1;
                }
                Ok(())
            }
            "_FOR" => {
                let (var_name, list_text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
                let list_text = list_text.trim().trim_matches('"');
                let substituted = substitute(list_text, &ctx.vars);
                for token in substituted.split_whitespace() {
                    ctx.vars.set_worker(var_name, token);
                    match self.execute_lines(ctx, body) {
                        Ok(()) => {}
                        Err(e) if e.is_break() => break,
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            }
            "_BPS" | "_RPS" => self.run_rate_limited(ctx, line, cmd, rest, body),
            "_SOCKET" => {
                let key = substitute(rest, &ctx.vars).trim().to_string();
                let previous = ctx.sockets.current_key().map(str::to_string);
                ctx.sockets.entry(&key, ctx.default_timeout);
                ctx.sockets.set_current(key);
                let result = self.execute_lines(ctx, body);
                if let Some(previous) = previous {
                    ctx.sockets.set_current(previous);
                }
                result
            }
            "_ERROR" => {
                let pattern = substitute(rest, &ctx.vars);
                let pattern = pattern.trim().trim_matches('"');
                let regex = regex::Regex::new(pattern)
                    .map_err(|e| ScriptError::Argument(line.origin.clone(), format!("bad _ERROR regex: {e}")))?;
                match self.execute_lines(ctx, body) {
                    Ok(()) => Ok(()),
                    Err(e) if e.is_break() => Err(e),
                    Err(ScriptError::Exit(ok)) => Err(ScriptError::Exit(ok)),
                    Err(e) => {
                        if regex.is_match(&e.to_string()) {
                            Ok(())
                        } else {
                            Err(e)
                        }
                    }
                }
            }
            "_PROCESS" => crate::process::fork_worker_process(ctx, line, rest, body),
            other => Err(ScriptError::Fatal(format!(
                "{}: {other} is registered as a body opener but has no interpreter case",
                line.origin
            ))),
        }
    }

    fn run_rate_limited(
        &self,
        ctx: &mut WorkerCtx,
        line: &Line,
        cmd: &str,
        rest: &str,
        body: &[Line],
    ) -> ScriptResult<()> {
        let substituted = substitute(rest, &ctx.vars);
        let mut parts = substituted.split_whitespace();
        let rate: f64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ScriptError::Argument(line.origin.clone(), format!("{cmd}: missing rate")))?;
        let duration_secs: f64 = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| ScriptError::Argument(line.origin.clone(), format!("{cmd}: missing duration")))?;
        let tick = Duration::from_secs_f64(1.0 / rate.max(f64::MIN_POSITIVE));
        let start = Instant::now();
        let mut completions: u32 = 0;
        loop {
            if ctx.should_abort() {
                return Err(ScriptError::Fatal("aborted: another worker failed".into()));
            }
            let elapsed = start.elapsed().as_secs_f64();
            if elapsed >= duration_secs {
                break;
            }
            let before = if cmd == "_BPS" { ctx.bytes_sent } else { ctx.requests };
            match self.execute_lines(ctx, body) {
                Ok(()) => {}
                Err(e) if e.is_break() => break,
                Err(e) => return Err(e),
            }
            let after = if cmd == "_BPS" { ctx.bytes_sent } else { ctx.requests };
            if after > before {
                completions += 1;
            }
            // Scheduled off a fixed per-completion tick derived from `rate`,
            // not off the cumulative average: the next body only runs once
            // the slot it was allotted arrives, so the achieved count
            // converges on rate * duration instead of merely being bounded.
            let slot = start + tick * completions;
            let now = Instant::now();
            let remaining = Duration::from_secs_f64((duration_secs - start.elapsed().as_secs_f64()).max(0.0));
            if slot > now {
                std::thread::sleep((slot - now).min(remaining));
            }
        }
        Ok(())
    }

    fn dispatch_command(&self, ctx: &mut WorkerCtx, line: &Line, cmd: &str, rest: &str) -> ScriptResult<()> {
        if cmd == "_CALL" {
            let (name, args) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
            let block = ctx.resolve_block(&self.modules, name).ok_or_else(|| {
                ScriptError::Dispatch(line.origin.clone(), format!("_CALL: no such block {name:?}"))
            })?;
            return crate::commands::call_block(self, ctx, &line.origin, &block, args);
        }
        if let Some(block) = ctx.resolve_block(&self.modules, cmd) {
            return crate::commands::call_block(self, ctx, &line.origin, &block, rest);
        }
        self.dispatch_registry(ctx, line, cmd, rest, 0)
    }

    fn dispatch_registry(
        &self,
        ctx: &mut WorkerCtx,
        line: &Line,
        cmd: &str,
        rest: &str,
        link_hops: u8,
    ) -> ScriptResult<()> {
        if link_hops > 8 {
            return Err(ScriptError::Fatal(format!("{}: LINK chain too deep for {cmd}", line.origin)));
        }
        match self.registry.resolve(cmd) {
            Some(entry) => match entry.flag {
                CommandFlag::Link => {
                    let target = entry.syntax.clone();
                    self.dispatch_registry(ctx, line, &target, rest, link_hops + 1)
                }
                CommandFlag::Depreciated => {
                    tracing::warn!(target: "script", origin = %line.origin, "{cmd} is deprecated");
                    let handler = entry
                        .handler
                        .clone()
                        .ok_or_else(|| ScriptError::Dispatch(line.origin.clone(), cmd.to_string()))?;
                    handler(ctx, rest)
                }
                CommandFlag::None | CommandFlag::Body => {
                    let handler = entry
                        .handler
                        .clone()
                        .ok_or_else(|| ScriptError::Dispatch(line.origin.clone(), cmd.to_string()))?;
                    handler(ctx, rest)
                }
            },
            None => {
                if let Some(block) = ctx.resolve_block(&self.modules, cmd) {
                    return crate::commands::call_block(self, ctx, &line.origin, &block, rest);
                }
                Err(ScriptError::Dispatch(line.origin.clone(), cmd.to_string()))
            }
        }
    }
}
