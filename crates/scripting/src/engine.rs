//! Script execution engine.
//!
//! # Architecture
//!
//! - `spawn()` creates a result channel and a named worker thread
//!   (`script-run-<n>`)
//! - The worker creates its own `Lua` VM, installs the host bindings and runs
//!   the script. The VM never leaves that thread.
//! - Runs are serialized per document: the worker holds the document's run
//!   gate for the whole run. A second run waits or is rejected, per
//!   [`BusyPolicy`].
//! - `run()` is `spawn()` + `wait()` + [`ScriptEngine::report`], which logs an
//!   escaped failure, updates the status bar and returns the error.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use serde::Serialize;

use macrohost_config::{BusyPolicy, Settings};
use macrohost_core::policy::log_and_propagate;
use macrohost_core::{ApiRegistry, DocumentProxy, HostLog, UiNotifier};

use crate::bindings::{self, HostContext};
use crate::error::ScriptRuntimeError;
use crate::runtime::{CancelToken, LuaRuntime, RuntimeLimits};
use crate::source::ScriptSource;

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

pub type RunOutcome = Result<ScriptExecutionResult, ScriptRuntimeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptExecutionResult {
    pub run_id: u64,
    pub script_name: String,
    /// `"sha256:<64 hex>"` of the script body.
    pub script_hash: String,
    pub status: RunStatus,
    /// Captured print() lines, in order.
    pub output: Vec<String>,
    pub returned: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub output_truncated: bool,
    pub cancelled: bool,
    pub timed_out: bool,
    pub instruction_limit_exceeded: bool,
}

impl ScriptExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }
}

/// Handle to a script running on a worker thread.
pub struct ScriptRunHandle {
    run_id: u64,
    script: String,
    cancel: CancelToken,
    rx: Option<Receiver<RunOutcome>>,
    thread: Option<JoinHandle<()>>,
    pending: Option<RunOutcome>,
}

impl ScriptRunHandle {
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Ask the script to stop at its next instruction-hook check.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Non-blocking check. Returns the outcome once the worker has reported.
    pub fn try_wait(&mut self) -> Option<&RunOutcome> {
        if self.pending.is_none() {
            if let Some(rx) = &self.rx {
                match rx.try_recv() {
                    Ok(outcome) => self.pending = Some(outcome),
                    Err(TryRecvError::Empty) => {}
                    Err(TryRecvError::Disconnected) => {
                        self.pending = Some(Err(ScriptRuntimeError::WorkerLost { script: self.script.clone() }))
                    }
                }
            }
        }
        self.pending.as_ref()
    }

    pub fn is_finished(&mut self) -> bool {
        self.try_wait().is_some()
    }

    /// Block until the worker reports.
    pub fn wait(mut self) -> RunOutcome {
        let outcome = match self.pending.take() {
            Some(outcome) => outcome,
            None => match &self.rx {
                Some(rx) => rx
                    .recv()
                    .unwrap_or_else(|_| Err(ScriptRuntimeError::WorkerLost { script: self.script.clone() })),
                None => Err(ScriptRuntimeError::WorkerLost { script: self.script.clone() }),
            },
        };
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("script worker for '{}' panicked", self.script);
            }
        }
        outcome
    }
}

pub struct ScriptEngine {
    ctx: HostContext,
    limits: RuntimeLimits,
    busy_policy: BusyPolicy,
}

impl ScriptEngine {
    pub fn new(registry: Arc<ApiRegistry>, documents: DocumentProxy, log: HostLog, ui: UiNotifier) -> Self {
        Self {
            ctx: HostContext { registry, documents, log, ui },
            limits: RuntimeLimits::default(),
            busy_policy: BusyPolicy::default(),
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.limits = RuntimeLimits::from_settings(settings);
        self.busy_policy = settings.busy_policy;
        self
    }

    pub fn with_limits(mut self, limits: RuntimeLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_busy_policy(mut self, policy: BusyPolicy) -> Self {
        self.busy_policy = policy;
        self
    }

    pub fn registry(&self) -> &Arc<ApiRegistry> {
        &self.ctx.registry
    }

    pub fn documents(&self) -> &DocumentProxy {
        &self.ctx.documents
    }

    pub fn log(&self) -> &HostLog {
        &self.ctx.log
    }

    /// Find a script by name in the registry's search directories.
    pub fn resolve(&self, name: &str) -> Result<ScriptSource, ScriptRuntimeError> {
        ScriptSource::resolve(name, &self.ctx.registry.config().script_dirs)
    }

    /// Start a run on a worker thread and return immediately.
    pub fn spawn(&self, source: ScriptSource) -> ScriptRunHandle {
        let run_id = NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed);
        let cancel: CancelToken = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<RunOutcome>();

        let script = source.name.clone();
        let ctx = self.ctx.clone();
        let limits = self.limits;
        let policy = self.busy_policy;
        let worker_cancel = cancel.clone();

        let spawned = std::thread::Builder::new()
            .name(format!("script-run-{}", run_id))
            .spawn(move || {
                let outcome = run_on_worker(run_id, source, &ctx, limits, policy, worker_cancel);
                // Receiver gone means the caller stopped waiting.
                let _ = tx.send(outcome);
            });

        match spawned {
            Ok(thread) => ScriptRunHandle { run_id, script, cancel, rx: Some(rx), thread: Some(thread), pending: None },
            Err(e) => ScriptRunHandle {
                run_id,
                script,
                cancel,
                rx: None,
                thread: None,
                pending: Some(Err(ScriptRuntimeError::Setup(format!("cannot start worker thread: {}", e)))),
            },
        }
    }

    /// Run to completion. A failure that escaped the script is logged, shown
    /// on the status bar and returned.
    pub fn run(&self, source: ScriptSource) -> RunOutcome {
        let outcome = self.spawn(source).wait();
        self.report(outcome)
    }

    /// Apply the entry-boundary policy to an outcome from [`ScriptRunHandle::wait`].
    pub fn report(&self, outcome: RunOutcome) -> RunOutcome {
        let err = match outcome {
            Ok(result) if result.succeeded() => {
                self.ctx.ui.status(format!("Script '{}' completed", result.script_name));
                return Ok(result);
            }
            Ok(result) => ScriptRuntimeError::Failed {
                script: result.script_name.clone(),
                message: result.error.clone().unwrap_or_else(|| "unknown error".to_string()),
                result: Box::new(result),
            },
            Err(err) => err,
        };

        let status = format!("Script failed: {}", err);
        let result = log_and_propagate(&self.ctx.log, "script execution", Err(err));
        self.ctx.ui.status(status);
        result
    }
}

fn run_on_worker(
    run_id: u64,
    source: ScriptSource,
    ctx: &HostContext,
    limits: RuntimeLimits,
    policy: BusyPolicy,
    cancel: CancelToken,
) -> RunOutcome {
    let document = ctx.documents.current();
    let _gate = match &document {
        Some(doc) => match policy {
            BusyPolicy::Queue => Some(doc.lock_run()),
            BusyPolicy::Reject => match doc.try_lock_run() {
                Some(guard) => Some(guard),
                None => return Err(ScriptRuntimeError::Busy { script: source.name }),
            },
        },
        None => None,
    };

    let started_at = Local::now();
    let runtime = LuaRuntime::new(limits).map_err(|e| ScriptRuntimeError::Setup(e.to_string()))?;
    bindings::install(runtime.lua(), ctx).map_err(|e| ScriptRuntimeError::Setup(e.to_string()))?;

    let script_hash = source.hash();
    log::info!("run {}: script '{}' ({})", run_id, source.name, script_hash);

    let eval = runtime.exec(&source.body, &source.name, Some(cancel));
    let status = if eval.is_ok() { RunStatus::Succeeded } else { RunStatus::Failed };

    Ok(ScriptExecutionResult {
        run_id,
        script_name: source.name,
        script_hash,
        status,
        output: eval.output,
        returned: eval.returned,
        error: eval.error,
        started_at,
        finished_at: Local::now(),
        output_truncated: eval.output_truncated,
        cancelled: eval.cancelled,
        timed_out: eval.timed_out,
        instruction_limit_exceeded: eval.instruction_limit_exceeded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use macrohost_core::{ui_channel, Document, DocumentCell, LogLevel, RegistryConfig, UiEvent};
    use std::fs;
    use std::sync::mpsc::Receiver;
    use std::time::Duration;
    use tempfile::tempdir;

    fn engine_with(config: RegistryConfig) -> (ScriptEngine, Receiver<UiEvent>) {
        let (ui, ui_rx) = ui_channel();
        let registry = Arc::new(ApiRegistry::standard(config).unwrap());
        (ScriptEngine::new(registry, DocumentProxy::new(), HostLog::new(), ui), ui_rx)
    }

    fn engine() -> (ScriptEngine, Receiver<UiEvent>) {
        engine_with(RegistryConfig::default())
    }

    fn statuses(rx: &Receiver<UiEvent>) -> Vec<String> {
        rx.try_iter()
            .filter_map(|e| match e {
                UiEvent::Status(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_run_success() {
        let (engine, ui_rx) = engine();
        let result = engine
            .run(ScriptSource::inline("hello", "print('one')\nprint('two')\nreturn 3"))
            .unwrap();
        assert!(result.succeeded());
        assert_eq!(result.output, vec!["one", "two"]);
        assert_eq!(result.returned, Some("3".to_string()));
        assert!(result.finished_at >= result.started_at);
        assert_eq!(statuses(&ui_rx), vec!["Script 'hello' completed"]);
    }

    #[test]
    fn test_top_level_error_is_logged_reported_and_propagated() {
        let (engine, ui_rx) = engine();
        let err = engine
            .run(ScriptSource::inline("broken", "print('partial')\nerror('kaboom')"))
            .unwrap_err();

        match &err {
            ScriptRuntimeError::Failed { message, result, .. } => {
                assert!(message.contains("kaboom"));
                assert_eq!(result.output, vec!["partial"]);
                assert_eq!(result.status, RunStatus::Failed);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(engine.log().contains(LogLevel::Error, "kaboom"));
        let status = statuses(&ui_rx);
        assert_eq!(status.len(), 1);
        assert!(status[0].starts_with("Script failed:"));
        assert!(status[0].contains("kaboom"));
    }

    #[test]
    fn test_error_caught_inside_script_is_not_reported() {
        let (engine, _ui_rx) = engine();
        let result = engine
            .run(ScriptSource::inline("guarded", "local ok = pcall(error, 'x')\nprint(ok)"))
            .unwrap();
        assert_eq!(result.output, vec!["false"]);
        assert!(!engine.log().contains(LogLevel::Error, "x"));
    }

    #[test]
    fn test_missing_csv_does_not_stop_script() {
        let (engine, _ui_rx) = engine();
        let result = engine
            .run(ScriptSource::inline(
                "import",
                "local t = data.load_csv('nope/missing.csv')\nprint(t.row_count)\nprint('continued')",
            ))
            .unwrap();
        assert_eq!(result.output, vec!["0", "continued"]);
        assert!(engine.log().contains(LogLevel::Error, "data.load_csv"));
    }

    #[test]
    fn test_runs_on_named_worker_thread() {
        let (engine, _ui_rx) = engine();
        let handle = engine.spawn(ScriptSource::inline("t", "return 1"));
        assert!(handle.run_id() > 0);
        let result = handle.wait().unwrap();
        assert_eq!(result.returned, Some("1".to_string()));
    }

    #[test]
    fn test_cancel_running_script() {
        let (engine, _ui_rx) = engine();
        let mut handle = engine.spawn(ScriptSource::inline("spin", "while true do end"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        handle.cancel();
        let result = handle.wait().unwrap();
        assert!(result.cancelled);
        assert_eq!(result.status, RunStatus::Failed);
    }

    #[test]
    fn test_script_writes_reach_editor_document() {
        let (engine, _ui_rx) = engine();
        let cell = DocumentCell::new(Document::with_content("draft", None));
        engine.documents().activate(&cell);

        engine
            .run(ScriptSource::inline("edit", "doc.content = doc.content .. ' + macro'"))
            .unwrap();
        let snapshot = cell.snapshot();
        assert_eq!(snapshot.content(), "draft + macro");
        assert!(snapshot.is_dirty());
    }

    #[test]
    fn test_busy_reject_policy() {
        let (engine, ui_rx) = engine();
        let engine = engine.with_busy_policy(BusyPolicy::Reject);
        let cell = DocumentCell::new(Document::new());
        engine.documents().activate(&cell);

        let _held = cell.lock_run();
        let err = engine.run(ScriptSource::inline("second", "print(1)")).unwrap_err();
        assert!(matches!(err, ScriptRuntimeError::Busy { .. }));
        assert!(engine.log().contains(LogLevel::Error, "rejected"));
        assert_eq!(statuses(&ui_rx).len(), 1);
    }

    #[test]
    fn test_busy_queue_policy_waits() {
        let (engine, _ui_rx) = engine();
        let cell = DocumentCell::new(Document::new());
        engine.documents().activate(&cell);

        let held = cell.lock_run();
        let mut handle = engine.spawn(ScriptSource::inline("queued", "doc.content = 'ran'"));
        std::thread::sleep(Duration::from_millis(50));
        assert!(!handle.is_finished());
        assert_eq!(cell.snapshot().content(), "");

        drop(held);
        let result = handle.wait().unwrap();
        assert!(result.succeeded());
        assert_eq!(cell.snapshot().content(), "ran");
    }

    #[test]
    fn test_resolve_from_search_dirs() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("greet.lua"), "print('hi from file')").unwrap();
        let config = RegistryConfig { script_dirs: vec![dir.path().to_path_buf()], ..Default::default() };
        let (engine, _ui_rx) = engine_with(config);

        let source = engine.resolve("greet").unwrap();
        let result = engine.run(source).unwrap();
        assert_eq!(result.script_name, "greet.lua");
        assert_eq!(result.output, vec!["hi from file"]);
    }

    #[test]
    fn test_timeout_from_limits() {
        let (engine, _ui_rx) = engine();
        let limits = RuntimeLimits { timeout: Duration::from_millis(50), ..Default::default() };
        let engine = engine.with_limits(limits);
        let err = engine.run(ScriptSource::inline("slow", "while true do end")).unwrap_err();
        assert!(err.result().unwrap().timed_out);
    }
}
