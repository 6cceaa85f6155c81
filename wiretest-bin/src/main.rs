//! `wiretest` entrypoint (spec §6 "External interfaces").

mod config;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use logging::LogLevel;
use std::io::{Read as _, Write as _};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use wiretest_core::ScriptError;
use wiretest_registry::HookDispatcher;
use wiretest_runtime::{register_builtins, CommandRegistry, Interpreter};
use wiretest_script::{Assembler, AssemblyOutcome, ProcessResume};

/// Scripted network protocol test driver.
#[derive(Parser, Debug)]
#[command(name = "wiretest", version, about = "Scripted network protocol test driver")]
struct Args {
    /// Script files to run. "-" reads one script from standard input.
    scripts: Vec<PathBuf>,

    /// Suppress the `run <file> OK|FAILED` summary line.
    #[arg(short = 'n')]
    quiet_result: bool,

    /// Silence all logging.
    #[arg(short = 's')]
    silent: bool,

    #[arg(short = 'e', help = "log level: error")]
    level_error: bool,
    #[arg(short = 'w', help = "log level: warn")]
    level_warn: bool,
    #[arg(short = 'i', help = "log level: info")]
    level_info: bool,
    #[arg(short = 'd', help = "log level: debug-script")]
    level_debug_script: bool,
    #[arg(short = 'p', help = "log level: debug-system")]
    level_debug_system: bool,

    /// List every registered command and exit.
    #[arg(short = 'L')]
    list_commands: bool,

    /// Print help for one command and exit.
    #[arg(short = 'C', value_name = "NAME")]
    command_help: Option<String>,

    /// Prepend an RFC 2822 timestamp to each run summary line.
    #[arg(short = 'T')]
    timestamp: bool,

    /// Read the script from standard input (same as passing "-").
    #[arg(short = 'S')]
    shell_mode: bool,

    /// Explicit wiretest.toml path, overriding discovery next to the script.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Internal: set a global var before assembly (used by PROCESS children).
    #[arg(long = "process-var", value_name = "NAME=VALUE")]
    process_var: Option<String>,

    /// Internal: origin of the PROCESS line to treat as already-forked.
    #[arg(long = "process-skip", value_name = "FILE:LINE")]
    process_skip: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.list_commands {
        print_command_list();
        return Ok(());
    }
    if let Some(name) = &args.command_help {
        return print_command_help(name);
    }

    let mut scripts = args.scripts.clone();
    if args.shell_mode && scripts.is_empty() {
        scripts.push(PathBuf::from("-"));
    }
    if scripts.is_empty() {
        bail!("no script given; pass a path or \"-\" to read standard input");
    }

    // wiretest.toml's log_level only matters as a fallback when no -e|-w|-i|-d|-p
    // flag is given, so load it (next to the first script) before the level is
    // resolved; run_script loads its own per-script Config again for the rest
    // of the layered settings.
    let config_level = config::load(&scripts[0], args.config.as_deref())
        .ok()
        .and_then(|c| LogLevel::parse(&c.log_level));
    let level = resolve_level(&args, config_level);
    let _log_guard = logging::init(level, args.silent);

    let resume = ProcessResume {
        var: args.process_var.as_deref().and_then(parse_process_var),
        skip_origin: args.process_skip.clone(),
    };

    let mut any_failure = false;
    for script in &scripts {
        let (display, real_path, _stdin_guard) = materialize(script)?;
        let success = run_script(&real_path, &args, resume.clone())?;
        if !success {
            any_failure = true;
        }
        if !args.quiet_result {
            print_run_line(&display, success, args.timestamp);
        }
    }

    if any_failure {
        std::process::exit(1);
    }
    Ok(())
}

fn resolve_level(args: &Args, config_fallback: Option<LogLevel>) -> LogLevel {
    if args.level_debug_system {
        LogLevel::DebugSystem
    } else if args.level_debug_script {
        LogLevel::DebugScript
    } else if args.level_info {
        LogLevel::Info
    } else if args.level_error {
        LogLevel::Error
    } else if args.level_warn {
        LogLevel::Warn
    } else {
        config_fallback.unwrap_or(LogLevel::Warn)
    }
}

fn parse_process_var(spec: &str) -> Option<(String, String)> {
    spec.split_once('=').map(|(k, v)| (k.to_string(), v.to_string()))
}

/// `-`/`-S` scripts are copied to a temp file so the assembler (which only
/// reads real paths) can open them. Returns the name to report in the run
/// summary, the real path to assemble, and a guard keeping any temp file
/// alive for the duration of the run.
fn materialize(script: &Path) -> Result<(String, PathBuf, Option<tempfile::TempPath>)> {
    if script == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading script from standard input")?;
        let mut tmp = tempfile::Builder::new().prefix("wiretest-stdin-").suffix(".htt").tempfile()?;
        tmp.write_all(buf.as_bytes())?;
        let path = tmp.into_temp_path();
        Ok(("-".to_string(), path.to_path_buf(), Some(path)))
    } else {
        Ok((script.display().to_string(), script.to_path_buf(), None))
    }
}

fn run_script(script_path: &Path, args: &Args, resume: ProcessResume) -> Result<bool> {
    let current_exe = std::env::current_exe().context("locating current executable")?;
    let config = config::load(script_path, args.config.as_deref())?;

    // No module registers hook handlers today, so freezing immediately after
    // construction (before any Arc clone exists) satisfies "freeze before GO"
    // without needing mutable access through a shared Arc later.
    let mut hooks = HookDispatcher::new();
    hooks.freeze();
    let hooks = Arc::new(hooks);

    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry, hooks.clone());

    let outcome = Assembler::new(current_exe.clone(), script_path.to_path_buf(), hooks.clone(), resume)
        .with_default_timeout(Duration::from_millis(config.default_timeout_ms))
        .assemble();

    let outcome = match outcome {
        Ok(o) => o,
        Err(e) => {
            report_script_error(&e);
            return Ok(false);
        }
    };

    match outcome {
        AssemblyOutcome::ForkedParent { success } => Ok(success),
        AssemblyOutcome::Script(assembled) => {
            let interp = Arc::new(Interpreter::new(registry, assembled.modules.clone(), hooks));
            let result = wiretest_runtime::go(*assembled, interp, current_exe, script_path.to_path_buf());
            Ok(result.success)
        }
    }
}

fn report_script_error(err: &ScriptError) {
    match err.origin() {
        Some(origin) => tracing::error!(target: "system", "{origin}: {err}"),
        None => tracing::error!(target: "system", "{err}"),
    }
}

fn print_run_line(display: &str, success: bool, timestamp: bool) {
    let prefix = if timestamp {
        let now = time::OffsetDateTime::now_utc();
        match now.format(&time::format_description::well_known::Rfc2822) {
            Ok(stamp) => format!("{stamp} "),
            Err(_) => String::new(),
        }
    } else {
        String::new()
    };
    let status = if success { "OK" } else { "FAILED" };
    println!("{prefix}run {display} \t{status}");
}

fn print_command_list() {
    let hooks = Arc::new(HookDispatcher::new());
    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry, hooks);
    let mut entries: Vec<_> = registry.iter().collect();
    entries.sort_by(|a, b| (a.module, &a.name).cmp(&(b.module, &b.name)));
    for entry in entries {
        println!("{:<8} {:<20} {}", entry.module, entry.name, entry.syntax);
    }
}

fn print_command_help(name: &str) -> Result<()> {
    let hooks = Arc::new(HookDispatcher::new());
    let mut registry = CommandRegistry::new();
    register_builtins(&mut registry, hooks);
    match registry.help_for(name) {
        Some(entry) => {
            println!("{}", entry.syntax);
            println!("{}", entry.help);
            Ok(())
        }
        None => bail!("no such command: {name}"),
    }
}
