//! Tracing setup (spec SPEC_FULL.md §4.6 "Logging").
//!
//! `-e|-w|-i|-d|-p` select a base level and, for the two debug flags, which
//! `target` gets it: `debug-script` only raises `target="script"`,
//! `debug-system` only raises `target="system"`, so a user can ask for one
//! without the other.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    DebugScript,
    DebugSystem,
}

impl LogLevel {
    /// Parses `wiretest.toml`'s `log_level` string, used as a fallback when
    /// no `-e|-w|-i|-d|-p` flag is given on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warn" | "warning" => Some(LogLevel::Warn),
            "info" => Some(LogLevel::Info),
            "debug-script" => Some(LogLevel::DebugScript),
            "debug-system" | "debug" => Some(LogLevel::DebugSystem),
            _ => None,
        }
    }

    fn base(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::DebugScript | LogLevel::DebugSystem => "warn",
        }
    }

    fn filter_directive(self) -> String {
        match self {
            LogLevel::DebugScript => format!("{},script=debug", self.base()),
            LogLevel::DebugSystem => format!("{},system=debug", self.base()),
            _ => self.base().to_string(),
        }
    }
}

/// Builds the subscriber. `silent` suppresses everything regardless of
/// `level`. Returns the non-blocking appender guard, which must be held for
/// the process lifetime or log lines are dropped on exit.
pub fn init(level: LogLevel, silent: bool) -> Option<WorkerGuard> {
    let directive = if silent { "off".to_string() } else { level.filter_directive() };
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("warn"));

    let (writer, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true)
        .try_init();
    Some(guard)
}
