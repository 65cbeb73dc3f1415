//! Script execution for the macro host.
//!
//! Scripts run in a sandboxed Lua 5.4 VM on a worker thread. The VM sees the
//! enabled registry namespaces (`host`, `ui`, `data`, `doc`, `math`, `fs`) as
//! userdata objects whose member access is checked against the API registry.

pub mod bindings;
pub mod engine;
pub mod error;
pub mod runtime;
pub mod services;
pub mod source;

pub use engine::{RunStatus, ScriptEngine, ScriptExecutionResult, ScriptRunHandle};
pub use error::ScriptRuntimeError;
pub use runtime::{CancelToken, LuaEvalResult, LuaRuntime, RuntimeLimits};
pub use source::ScriptSource;
