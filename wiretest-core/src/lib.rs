//! Foundational types shared by every other wiretest crate: the [`Value`]
//! carried through variable substitution, the scope-chained variable store,
//! script [`Line`]/[`Origin`] records, and the [`ScriptError`] taxonomy.

pub mod error;
pub mod line;
pub mod value;
pub mod vars;

pub use error::{ScriptError, ScriptResult};
pub use line::{Line, Origin};
pub use value::{FunctionRef, Value};
pub use vars::{GlobalVars, Scope, VarContext, is_valid_varname};
