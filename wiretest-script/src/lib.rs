//! Assembles script text into workers, blocks, and modules (spec §4.1).
//!
//! This crate only performs assembly — it has no notion of sockets, threads,
//! or running a worker. That lives in `wiretest-runtime`, which consumes an
//! [`AssembledScript`] produced here.

pub mod assembler;
pub mod module_table;
pub mod nesting;
pub mod proto;
pub mod script_body;

pub use assembler::{
    AssembledScript, Assembler, AssemblyOutcome, FileSpec, ParticipantSpec, ProcessResume,
    ServerSpec, TempFileGuard, MAX_INCLUDE_DEPTH,
};
pub use module_table::{ModuleTable, DEFAULT_MODULE};
pub use nesting::{find_else, find_matching_end, is_body_opener, validate_balanced, BODY_OPENERS};
pub use proto::{parse_address, Address, Proto};
pub use script_body::{parse_signature, ScriptBody, WorkerKind};
