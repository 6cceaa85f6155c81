//! Error kinds (spec §7 "Error handling design").
//!
//! Every command handler returns `ScriptResult<Status>`. `Break` is not a
//! real error: it is a pseudo-status recognized only by loop constructs
//! (`_LOOP`, `_FOR`) and must never surface as a process failure.

use crate::line::Origin;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("{0}: {1}")]
    Parse(Origin, String),

    #[error("{0}: unknown command {1:?}")]
    Dispatch(Origin, String),

    #[error("{0}: {1}")]
    Argument(Origin, String),

    #[error("{0}: {1}")]
    Io(Origin, String),

    #[error("{0}: timed out after {1:?}")]
    Timeout(Origin, Duration),

    #[error("{0}: {1}")]
    Expectation(Origin, String),

    #[error("child process failed: {0}")]
    Child(String),

    #[error("fatal: {0}")]
    Fatal(String),

    /// `_BREAK`: terminates the innermost loop successfully. See spec §9
    /// Open Questions — must be carried as a distinct variant, not an
    /// overloaded generic error, or a `_BREAK` inside nested bodies would
    /// read as a failure to an outer `_ERROR` scope.
    #[error("break")]
    Break,

    /// `_EXIT [OK|FAILED]`: terminates the whole worker immediately. Kept
    /// distinct from `Break` (loop-only) and from the other error kinds
    /// (an `_EXIT OK` must not be treated as a worker failure).
    #[error("exit({0})")]
    Exit(bool),
}

impl ScriptError {
    pub fn origin(&self) -> Option<&Origin> {
        match self {
            ScriptError::Parse(o, _)
            | ScriptError::Dispatch(o, _)
            | ScriptError::Argument(o, _)
            | ScriptError::Io(o, _)
            | ScriptError::Timeout(o, _)
            | ScriptError::Expectation(o, _) => Some(o),
            ScriptError::Child(_) | ScriptError::Fatal(_) | ScriptError::Break | ScriptError::Exit(_) => None,
        }
    }

    /// Whether this status counts as loop-terminating success rather than failure.
    pub fn is_break(&self) -> bool {
        matches!(self, ScriptError::Break)
    }

    /// Whether this status is a worker-level failure (used by `FINALLY`/
    /// `ON_ERROR` dispatch and the success latch).
    pub fn is_failure(&self) -> bool {
        match self {
            ScriptError::Break => false,
            ScriptError::Exit(ok) => !ok,
            _ => true,
        }
    }
}

pub type ScriptResult<T> = Result<T, ScriptError>;
