//! Sandboxed Lua runtime.
//!
//! # Architecture Notes
//!
//! The runtime knows nothing about documents or tables. Host objects are
//! installed as globals by [`crate::bindings`] before a chunk runs, and all
//! of their effects go through the host services they wrap.
//!
//! print() output is captured (up to the configured line cap) and returned
//! with the evaluation result.

use mlua::{HookTriggers, Lua, MultiValue, Result as LuaResult, Value, VmState};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default maximum number of Lua instructions per script execution.
pub const INSTRUCTION_LIMIT: i64 = 100_000_000;

/// How often to check the instruction budget (every N instructions).
pub const INSTRUCTION_HOOK_INTERVAL: u32 = 10_000;

/// Default wall-clock timeout for script execution.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum lines of print output per script execution.
pub const MAX_OUTPUT_LINES: usize = 5_000;

/// Cancel token for script execution.
/// Set to true to signal the script should stop.
pub type CancelToken = Arc<AtomicBool>;

/// Per-run resource limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeLimits {
    pub instruction_limit: i64,
    pub timeout: Duration,
    pub max_output_lines: usize,
}

impl Default for RuntimeLimits {
    fn default() -> Self {
        Self {
            instruction_limit: INSTRUCTION_LIMIT,
            timeout: DEFAULT_TIMEOUT,
            max_output_lines: MAX_OUTPUT_LINES,
        }
    }
}

impl RuntimeLimits {
    pub fn from_settings(settings: &macrohost_config::Settings) -> Self {
        Self {
            instruction_limit: settings.instruction_limit.max(INSTRUCTION_HOOK_INTERVAL as i64),
            timeout: Duration::from_secs(settings.script_timeout_secs.max(1)),
            max_output_lines: settings.max_output_lines,
        }
    }
}

/// Result of evaluating a Lua chunk
#[derive(Debug, Clone, Default)]
pub struct LuaEvalResult {
    /// Lines printed via print()
    pub output: Vec<String>,
    /// String representation of returned value (if any)
    pub returned: Option<String>,
    /// Error message (if evaluation failed)
    pub error: Option<String>,
    pub output_truncated: bool,
    pub instruction_limit_exceeded: bool,
    pub cancelled: bool,
    pub timed_out: bool,
}

impl LuaEvalResult {
    fn success(output: Vec<String>, returned: Option<String>, truncated: bool) -> Self {
        Self { output, returned, output_truncated: truncated, ..Default::default() }
    }

    fn error(output: Vec<String>, error: String, truncated: bool) -> Self {
        Self { output, error: Some(error), output_truncated: truncated, ..Default::default() }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Output buffer state (shared between print() and eval)
struct OutputState {
    lines: Vec<String>,
    truncated: bool,
    cap: usize,
}

impl OutputState {
    fn new(cap: usize) -> Self {
        Self { lines: Vec::new(), truncated: false, cap }
    }

    fn clear(&mut self) {
        self.lines.clear();
        self.truncated = false;
    }

    fn push(&mut self, line: String) {
        if self.lines.len() < self.cap {
            self.lines.push(line);
        } else {
            self.truncated = true;
        }
    }
}

/// Owns one `mlua::Lua` instance and evaluates chunks with output capture.
///
/// Not `Send`: create it on the thread that runs the script.
pub struct LuaRuntime {
    lua: Lua,
    output_state: Rc<RefCell<OutputState>>,
    limits: RuntimeLimits,
}

impl LuaRuntime {
    /// Create a new Lua runtime with sandboxed globals.
    pub fn new(limits: RuntimeLimits) -> LuaResult<Self> {
        let lua = Lua::new();
        let output_state = Rc::new(RefCell::new(OutputState::new(limits.max_output_lines)));

        // Override print() to capture output (with cap)
        {
            let state = output_state.clone();
            let print_fn = lua.create_function(move |_, args: MultiValue| {
                let parts: Vec<String> = args.iter().map(lua_value_to_string).collect();
                state.borrow_mut().push(parts.join("\t"));
                Ok(())
            })?;
            lua.globals().set("print", print_fn)?;
        }

        // Sandbox: keep basic, string, table, math, utf8
        let globals = lua.globals();
        for name in ["os", "io", "debug", "package", "require", "loadfile", "dofile", "load"] {
            globals.set(name, Value::Nil)?;
        }

        Ok(Self { lua, output_state, limits })
    }

    /// Access for installing host bindings.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Execute a script body as a chunk named `chunk_name`.
    pub fn exec(&self, source: &str, chunk_name: &str, cancel: Option<CancelToken>) -> LuaEvalResult {
        self.run_chunk(source, &format!("={}", chunk_name), cancel)
    }

    fn run_chunk(&self, code: &str, chunk_name: &str, cancel: Option<CancelToken>) -> LuaEvalResult {
        self.output_state.borrow_mut().clear();

        if code.trim().is_empty() {
            return LuaEvalResult::success(vec![], None, false);
        }

        // Instruction limit hook (also checks cancel flag and timeout)
        let limits = self.limits;
        let start_time = Instant::now();
        let budget = Arc::new(AtomicI64::new(limits.instruction_limit));
        let budget_clone = budget.clone();
        let was_cancelled = Arc::new(AtomicBool::new(false));
        let was_cancelled_clone = was_cancelled.clone();
        let was_timed_out = Arc::new(AtomicBool::new(false));
        let was_timed_out_clone = was_timed_out.clone();

        self.lua.set_hook(
            HookTriggers::new().every_nth_instruction(INSTRUCTION_HOOK_INTERVAL),
            move |_lua, _debug| {
                if let Some(ref cancel) = cancel {
                    if cancel.load(Ordering::Relaxed) {
                        was_cancelled_clone.store(true, Ordering::Relaxed);
                        return Err(mlua::Error::RuntimeError("execution cancelled".to_string()));
                    }
                }

                if start_time.elapsed() > limits.timeout {
                    was_timed_out_clone.store(true, Ordering::Relaxed);
                    return Err(mlua::Error::RuntimeError(format!(
                        "execution timeout ({}s limit)",
                        limits.timeout.as_secs()
                    )));
                }

                let remaining = budget_clone.fetch_sub(INSTRUCTION_HOOK_INTERVAL as i64, Ordering::Relaxed);
                if remaining <= 0 {
                    Err(mlua::Error::RuntimeError(format!(
                        "instruction limit exceeded ({} instructions)",
                        limits.instruction_limit
                    )))
                } else {
                    Ok(VmState::Continue)
                }
            },
        );

        let result = self.lua.load(code).set_name(chunk_name).eval::<MultiValue>();

        self.lua.remove_hook();

        let state = self.output_state.borrow();
        let mut output = state.lines.clone();
        let truncated = state.truncated;
        drop(state);

        if truncated {
            output.push(format!("... output truncated ({} line limit)", limits.max_output_lines));
        }

        match result {
            Ok(values) => {
                let returned = if values.iter().all(|v| matches!(v, Value::Nil)) {
                    None
                } else {
                    let parts: Vec<String> = values.iter().map(lua_value_to_string).collect();
                    Some(parts.join(", "))
                };
                LuaEvalResult::success(output, returned, truncated)
            }
            Err(e) => {
                let mut result = LuaEvalResult::error(output, format_lua_error(&e), truncated);
                if was_cancelled.load(Ordering::Relaxed) {
                    result.cancelled = true;
                    result.error = Some("execution cancelled".to_string());
                } else if was_timed_out.load(Ordering::Relaxed) {
                    result.timed_out = true;
                } else if budget.load(Ordering::Relaxed) <= 0 {
                    result.instruction_limit_exceeded = true;
                }
                result
            }
        }
    }

}

/// Convert a Lua value to a display string.
pub fn lua_value_to_string(value: &Value) -> String {
    match value {
        Value::Nil => "nil".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{:.0}", n)
            } else {
                format!("{}", n)
            }
        }
        Value::String(s) => s.to_str().map(|s| s.to_string()).unwrap_or_else(|_| "<invalid utf8>".to_string()),
        Value::Table(_) => "table".to_string(),
        Value::Function(_) => "function".to_string(),
        Value::Thread(_) => "thread".to_string(),
        Value::UserData(_) => "userdata".to_string(),
        Value::LightUserData(_) => "lightuserdata".to_string(),
        Value::Error(e) => format!("error: {}", e),
        _ => "<unknown>".to_string(),
    }
}

/// Format a Lua error for display.
pub fn format_lua_error(error: &mlua::Error) -> String {
    match error {
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::RuntimeError(msg) => msg.clone(),
        mlua::Error::CallbackError { cause, .. } => format_lua_error(cause),
        mlua::Error::ExternalError(e) => e.to_string(),
        _ => error.to_string(),
    }
}
