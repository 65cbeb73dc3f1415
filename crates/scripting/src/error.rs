use std::fmt;

use crate::engine::ScriptExecutionResult;

/// Failure of a script run as seen by the caller of [`crate::ScriptEngine::run`].
#[derive(Debug, Clone)]
pub enum ScriptRuntimeError {
    /// The script body raised an error that nothing inside the script caught.
    Failed { script: String, message: String, result: Box<ScriptExecutionResult> },
    /// Another run holds the document and the busy policy is `reject`.
    Busy { script: String },
    /// A script name did not resolve to a file in any search directory.
    NotFound { script: String, searched: Vec<String> },
    /// The VM, the host bindings or the worker thread could not be set up.
    Setup(String),
    /// The worker thread exited without reporting a result.
    WorkerLost { script: String },
}

impl ScriptRuntimeError {
    /// Partial result of a failed run (output printed before the failure).
    pub fn result(&self) -> Option<&ScriptExecutionResult> {
        match self {
            Self::Failed { result, .. } => Some(result),
            _ => None,
        }
    }
}

impl fmt::Display for ScriptRuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed { script, message, .. } => write!(f, "script '{script}' failed: runtime error: {message}"),
            Self::Busy { script } => {
                write!(f, "script '{script}' rejected: another script is running on this document")
            }
            Self::NotFound { script, searched } => {
                write!(f, "script '{script}' not found (searched: {})", searched.join(", "))
            }
            Self::Setup(msg) => write!(f, "script setup failed: {msg}"),
            Self::WorkerLost { script } => write!(f, "script '{script}' worker exited without a result"),
        }
    }
}

impl std::error::Error for ScriptRuntimeError {}
