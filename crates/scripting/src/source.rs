// Script bodies and where they come from

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::ScriptRuntimeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSource {
    /// Used as the chunk name in error messages and in the log.
    pub name: String,
    pub body: String,
    pub path: Option<PathBuf>,
}

impl ScriptSource {
    pub fn inline(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self { name: name.into(), body: body.into(), path: None }
    }

    pub fn from_file(path: &Path) -> Result<Self, ScriptRuntimeError> {
        let body = fs::read_to_string(path)
            .map_err(|e| ScriptRuntimeError::Setup(format!("{}: {}", path.display(), e)))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, body, path: Some(path.to_path_buf()) })
    }

    /// Find `name` in `dirs` (first match wins). `.lua` is appended when the
    /// name has no extension.
    pub fn resolve(name: &str, dirs: &[PathBuf]) -> Result<Self, ScriptRuntimeError> {
        let file_name = if Path::new(name).extension().is_some() {
            name.to_string()
        } else {
            format!("{}.lua", name)
        };
        for dir in dirs {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                log::debug!("resolved script '{}' to {}", name, candidate.display());
                return Self::from_file(&candidate);
            }
        }
        Err(ScriptRuntimeError::NotFound {
            script: name.to_string(),
            searched: dirs.iter().map(|d| d.display().to_string()).collect(),
        })
    }

    /// SHA-256 of the body with normalized newlines: `"sha256:<64 hex>"`.
    pub fn hash(&self) -> String {
        let canonical = self.body.replace("\r\n", "\n").replace('\r', "\n");
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("sha256:{:x}", hasher.finalize())
    }
}
