//! Interpreter, built-in command modules, and the concurrency fabric that
//! turn an assembled script into a running, judged test (spec §4.2, §4.3,
//! §4.4, §4.5).

pub mod commands;
pub mod condition;
pub mod fabric;
pub mod interpreter;
pub mod process;
pub mod registry;
pub mod substitute;
pub mod worker;

pub use commands::{call_block, register_builtins};
pub use fabric::{go, Rendezvous, RunOutcome, RunningCount, SuccessLatch};
pub use interpreter::Interpreter;
pub use registry::{CommandEntry, CommandFlag, CommandRegistry, HandlerFn};
pub use worker::WorkerCtx;
