// Application settings
// Loaded from ~/.config/macrohost/settings.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Suggestion backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AIProvider {
    /// AI features disabled (default)
    #[default]
    None,
    /// Offline canned suggestions, no network
    Template,
    /// Local OpenAI-compatible server (Ollama, llama.cpp, ...)
    Local,
    /// OpenAI API
    #[serde(rename = "openai")]
    OpenAI,
}

impl AIProvider {
    /// Returns true if AI features are enabled
    pub fn is_enabled(&self) -> bool {
        !matches!(self, AIProvider::None)
    }

    pub fn needs_api_key(&self) -> bool {
        matches!(self, AIProvider::OpenAI)
    }

    /// Returns the default model for this provider
    pub fn default_model(&self) -> &'static str {
        match self {
            AIProvider::None => "",
            AIProvider::Template => "template",
            AIProvider::Local => "llama3:8b",
            AIProvider::OpenAI => "gpt-4o",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AIProvider::None => "none",
            AIProvider::Template => "template",
            AIProvider::Local => "local",
            AIProvider::OpenAI => "openai",
        }
    }
}

/// AI-specific settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AISettings {
    /// Selected AI provider
    pub provider: AIProvider,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Privacy mode: send only the selection, never the surrounding context
    pub privacy_mode: bool,

    /// Custom endpoint for Local provider
    pub endpoint: Option<String>,

    /// Seconds before an outstanding suggestion request is failed
    pub request_timeout_secs: u64,
}

impl Default for AISettings {
    fn default() -> Self {
        Self {
            provider: AIProvider::None,
            model: String::new(), // Empty = use provider default
            privacy_mode: true,
            endpoint: None,
            request_timeout_secs: 30,
        }
    }
}

impl AISettings {
    /// Get the effective model (user-specified or provider default)
    pub fn effective_model(&self) -> &str {
        if self.model.is_empty() {
            self.provider.default_model()
        } else {
            &self.model
        }
    }

    /// Get the effective endpoint for Local provider
    pub fn effective_endpoint(&self) -> &str {
        self.endpoint.as_deref().unwrap_or("http://localhost:11434/v1")
    }
}

/// What a second script run on the same document does while one is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusyPolicy {
    /// Wait for the running script to finish
    #[default]
    Queue,
    /// Fail immediately with a busy error
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Script execution
    #[serde(rename = "scripting.timeoutSecs")]
    pub script_timeout_secs: u64,
    #[serde(rename = "scripting.instructionLimit")]
    pub instruction_limit: i64,
    #[serde(rename = "scripting.maxOutputLines")]
    pub max_output_lines: usize,
    #[serde(rename = "scripting.busyPolicy")]
    pub busy_policy: BusyPolicy,
    /// Searched in order when a script is run by name. Empty = defaults.
    #[serde(rename = "scripting.searchPaths")]
    pub script_dirs: Vec<PathBuf>,
    /// Optional namespaces (`math`, `fs`) hidden from scripts and completion.
    #[serde(rename = "scripting.disabledNamespaces")]
    pub disabled_namespaces: Vec<String>,

    // Host log
    #[serde(rename = "log.toFile")]
    pub log_to_file: bool,
    #[serde(rename = "log.dir")]
    pub log_dir: Option<PathBuf>,
    #[serde(rename = "log.retentionDays")]
    pub log_retention_days: u32,

    #[serde(rename = "ai", default)]
    pub ai: AISettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            script_timeout_secs: 30,
            instruction_limit: 100_000_000,
            max_output_lines: 5_000,
            busy_policy: BusyPolicy::Queue,
            script_dirs: Vec::new(),
            disabled_namespaces: Vec::new(),
            log_to_file: false,
            log_dir: None,
            log_retention_days: 30,
            ai: AISettings::default(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("macrohost");
        config_dir.join("settings.json")
    }

    /// Load settings from disk, falling back to defaults
    pub fn load() -> Self {
        let path = Self::config_path();

        if !path.exists() {
            let settings = Self::default();
            settings.create_default_file(&path);
            return settings;
        }

        Self::load_from(&path)
    }

    /// Load from an explicit path. Missing or malformed files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(&contents).unwrap_or_else(|e| {
                log::warn!("Error parsing {}: {}; using default settings", path.display(), e);
                Self::default()
            }),
            Err(e) => {
                log::warn!("Error reading {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse settings JSON. Lines starting with `//` are comments.
    pub fn parse(contents: &str) -> Result<Self, String> {
        let cleaned: String = contents
            .lines()
            .filter(|line| !line.trim().starts_with("//"))
            .collect::<Vec<_>>()
            .join("\n");

        serde_json::from_str(&cleaned).map_err(|e| e.to_string())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let json = serde_json::to_string_pretty(self).map_err(|e| e.to_string())?;

        fs::write(path, json).map_err(|e| e.to_string())
    }

    /// Script search directories, falling back to `./scripts` and the user's
    /// macro folder when none are configured.
    pub fn effective_script_dirs(&self) -> Vec<PathBuf> {
        if !self.script_dirs.is_empty() {
            return self.script_dirs.clone();
        }
        let mut dirs = vec![PathBuf::from("scripts")];
        if let Some(docs) = dirs::document_dir() {
            dirs.push(docs.join("macrohost").join("macros"));
        }
        dirs
    }

    /// Directory for daily host log files
    pub fn effective_log_dir(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("macrohost")
                .join("logs")
        })
    }

    /// Create default settings file with comments
    fn create_default_file(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::warn!("Error creating config directory: {}", e);
                return;
            }
        }

        let default_config = r#"{
    // Script execution limits
    "scripting.timeoutSecs": 30,
    "scripting.instructionLimit": 100000000,
    "scripting.maxOutputLines": 5000,

    // "queue" waits for a running script on the same document, "reject" fails fast
    "scripting.busyPolicy": "queue",
    "scripting.searchPaths": [],

    // Optional API namespaces to hide, e.g. ["fs"]
    "scripting.disabledNamespaces": [],

    // Host log mirroring (daily files, oldest removed after retentionDays)
    "log.toFile": false,
    "log.retentionDays": 30,

    // AI suggestions (disabled by default)
    // Provider options: "none", "template", "local", "openai"
    // API keys are read from MACROHOST_<PROVIDER>_KEY, not from this file
    "ai": {
        "provider": "none",
        "model": "",
        "privacy_mode": true,
        "request_timeout_secs": 30
    }
}
"#;

        if let Err(e) = fs::write(path, default_config) {
            log::warn!("Error writing default settings.json: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_parse_with_comments_and_dotted_keys() {
        let json = r#"{
            // comment line
            "scripting.timeoutSecs": 5,
            "scripting.busyPolicy": "reject",
            "scripting.disabledNamespaces": ["fs"],
            "ai": { "provider": "template" }
        }"#;
        let settings = Settings::parse(json).unwrap();
        assert_eq!(settings.script_timeout_secs, 5);
        assert_eq!(settings.busy_policy, BusyPolicy::Reject);
        assert_eq!(settings.ai.provider, AIProvider::Template);
        assert_eq!(settings.disabled_namespaces, vec!["fs".to_string()]);
        // Unspecified keys keep defaults
        assert_eq!(settings.max_output_lines, 5_000);
        assert_eq!(settings.ai.request_timeout_secs, 30);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut settings = Settings::default();
        settings.ai.provider = AIProvider::OpenAI;
        settings.script_dirs = vec![PathBuf::from("/opt/macros")];
        settings.save_to(&path).unwrap();

        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_malformed_file_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_default_file_template_parses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");
        Settings::default().create_default_file(&path);
        assert_eq!(Settings::load_from(&path), Settings::default());
    }

    #[test]
    fn test_effective_model() {
        let mut ai = AISettings { provider: AIProvider::OpenAI, ..Default::default() };
        assert_eq!(ai.effective_model(), "gpt-4o");
        ai.model = "gpt-4o-mini".into();
        assert_eq!(ai.effective_model(), "gpt-4o-mini");
    }

    #[test]
    fn test_configured_script_dirs_win() {
        let settings = Settings { script_dirs: vec![PathBuf::from("a")], ..Default::default() };
        assert_eq!(settings.effective_script_dirs(), vec![PathBuf::from("a")]);
        assert_eq!(Settings::default().effective_script_dirs()[0], PathBuf::from("scripts"));
    }
}
