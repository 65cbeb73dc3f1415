// AI configuration and secrets management
//
// API keys are looked up in:
// 1. System keychain (with the `keychain` feature)
// 2. Environment variables (MACROHOST_OPENAI_KEY, ...)
//
// Keys are NEVER stored in settings.json

use std::env;
use std::time::Duration;

use crate::settings::{AIProvider, AISettings};

/// Service name for keychain storage
#[cfg(feature = "keychain")]
const KEYCHAIN_SERVICE: &str = "macrohost";

/// Source of an API key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Keychain,
    Environment,
    None,
}

impl KeySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeySource::Keychain => "keychain",
            KeySource::Environment => "environment",
            KeySource::None => "none",
        }
    }
}

/// Result of key lookup
#[derive(Debug, Clone)]
pub struct KeyLookup {
    pub key: Option<String>,
    pub source: KeySource,
}

/// Get the environment variable name for a provider
pub fn env_var_name(provider: &str) -> String {
    format!("MACROHOST_{}_KEY", provider.to_uppercase())
}

#[cfg(feature = "keychain")]
fn keychain_account(provider: &str) -> String {
    format!("ai/{}", provider.to_lowercase())
}

/// Get an API key for the specified provider
pub fn get_api_key(provider: &str) -> KeyLookup {
    #[cfg(feature = "keychain")]
    {
        if let Ok(entry) = keyring::Entry::new(KEYCHAIN_SERVICE, &keychain_account(provider)) {
            if let Ok(key) = entry.get_password() {
                return KeyLookup { key: Some(key), source: KeySource::Keychain };
            }
        }
    }

    let env_name = env_var_name(provider);
    if let Ok(key) = env::var(&env_name) {
        if !key.is_empty() {
            return KeyLookup { key: Some(key), source: KeySource::Environment };
        }
    }

    KeyLookup { key: None, source: KeySource::None }
}

// ============================================================================
// Resolved AI Configuration (single source of truth)
// ============================================================================

/// Status of the AI configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AIConfigStatus {
    /// AI is disabled (provider = None)
    Disabled,
    Ready,
    /// Provider is configured but API key is missing
    MissingKey,
}

impl AIConfigStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Ready => "ready",
            Self::MissingKey => "missing_key",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }
}

/// The effective AI configuration, fully resolved from settings and key stores.
#[derive(Debug, Clone)]
pub struct ResolvedAIConfig {
    pub provider: AIProvider,
    /// Effective model (resolved from settings or provider default)
    pub model: String,
    /// Base URL for the chat-completions call (Local and OpenAI)
    pub endpoint: Option<String>,
    pub privacy_mode: bool,
    pub request_timeout: Duration,
    pub api_key: Option<String>,
    pub key_source: KeySource,
    pub status: AIConfigStatus,
    /// Human-readable reason if not ready
    pub blocking_reason: Option<String>,
}

pub const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

impl ResolvedAIConfig {
    pub fn from_settings(settings: &AISettings) -> Self {
        Self::resolve(settings, get_api_key)
    }

    /// Resolution with an injectable key lookup.
    fn resolve(settings: &AISettings, lookup_key: impl Fn(&str) -> KeyLookup) -> Self {
        let provider = settings.provider;
        let request_timeout = Duration::from_secs(settings.request_timeout_secs.max(1));

        if !provider.is_enabled() {
            return Self {
                provider,
                model: String::new(),
                endpoint: None,
                privacy_mode: settings.privacy_mode,
                request_timeout,
                api_key: None,
                key_source: KeySource::None,
                status: AIConfigStatus::Disabled,
                blocking_reason: Some("AI is disabled (ai.provider = \"none\")".to_string()),
            };
        }

        let endpoint = match provider {
            AIProvider::Local => Some(settings.effective_endpoint().to_string()),
            AIProvider::OpenAI => Some(
                settings
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| OPENAI_ENDPOINT.to_string()),
            ),
            AIProvider::Template | AIProvider::None => None,
        };

        let (api_key, key_source, status, blocking_reason) = if provider.needs_api_key() {
            let lookup = lookup_key(provider.name());
            match lookup.key {
                Some(key) => (Some(key), lookup.source, AIConfigStatus::Ready, None),
                None => (
                    None,
                    KeySource::None,
                    AIConfigStatus::MissingKey,
                    Some(format!(
                        "No API key found. Set via keychain or {}",
                        env_var_name(provider.name())
                    )),
                ),
            }
        } else {
            (None, KeySource::None, AIConfigStatus::Ready, None)
        };

        Self {
            provider,
            model: settings.effective_model().to_string(),
            endpoint,
            privacy_mode: settings.privacy_mode,
            request_timeout,
            api_key,
            key_source,
            status,
            blocking_reason,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }
}

impl std::fmt::Display for ResolvedAIConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "AI Configuration")?;
        writeln!(f, "──────────────────────────────")?;
        writeln!(f, "Provider:          {}", self.provider.name())?;
        writeln!(f, "Status:            {}", self.status.as_str())?;
        writeln!(f, "Model:             {}", self.model)?;
        writeln!(f, "Key source:        {}", self.key_source.as_str())?;
        if let Some(endpoint) = &self.endpoint {
            writeln!(f, "Endpoint:          {}", endpoint)?;
        }
        writeln!(f, "Privacy mode:      {}", if self.privacy_mode { "on" } else { "off" })?;
        writeln!(f, "Request timeout:   {}s", self.request_timeout.as_secs())?;
        if let Some(reason) = &self.blocking_reason {
            writeln!(f, "Reason:            {}", reason)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_key(_: &str) -> KeyLookup {
        KeyLookup { key: None, source: KeySource::None }
    }

    fn env_key(_: &str) -> KeyLookup {
        KeyLookup { key: Some("sk-test".into()), source: KeySource::Environment }
    }

    #[test]
    fn test_env_var_name() {
        assert_eq!(env_var_name("openai"), "MACROHOST_OPENAI_KEY");
        assert_eq!(env_var_name("OpenAI"), "MACROHOST_OPENAI_KEY");
    }

    #[test]
    fn test_key_lookup_from_env() {
        env::set_var("MACROHOST_TESTPROVIDER_KEY", "test-key-123");

        let lookup = get_api_key("testprovider");
        assert_eq!(lookup.source, KeySource::Environment);
        assert_eq!(lookup.key, Some("test-key-123".to_string()));

        env::remove_var("MACROHOST_TESTPROVIDER_KEY");
    }

    #[test]
    fn test_key_lookup_missing() {
        let lookup = get_api_key("nonexistent_provider_xyz");
        assert_eq!(lookup.source, KeySource::None);
        assert!(lookup.key.is_none());
    }

    #[test]
    fn test_disabled_provider() {
        let config = ResolvedAIConfig::resolve(&AISettings::default(), env_key);
        assert_eq!(config.status, AIConfigStatus::Disabled);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_openai_without_key() {
        let settings = AISettings { provider: AIProvider::OpenAI, ..Default::default() };
        let config = ResolvedAIConfig::resolve(&settings, no_key);
        assert_eq!(config.status, AIConfigStatus::MissingKey);
        assert!(config.blocking_reason.unwrap().contains("MACROHOST_OPENAI_KEY"));
    }

    #[test]
    fn test_openai_with_key() {
        let settings = AISettings { provider: AIProvider::OpenAI, ..Default::default() };
        let config = ResolvedAIConfig::resolve(&settings, env_key);
        assert!(config.status.is_ready());
        assert_eq!(config.endpoint.as_deref(), Some(OPENAI_ENDPOINT));
        assert_eq!(config.model, "gpt-4o");
    }

    #[test]
    fn test_template_needs_no_key() {
        let settings = AISettings { provider: AIProvider::Template, ..Default::default() };
        let config = ResolvedAIConfig::resolve(&settings, no_key);
        assert!(config.status.is_ready());
        assert!(config.endpoint.is_none());
    }

    #[test]
    fn test_local_endpoint_default() {
        let settings = AISettings { provider: AIProvider::Local, ..Default::default() };
        let config = ResolvedAIConfig::resolve(&settings, no_key);
        assert_eq!(config.endpoint.as_deref(), Some("http://localhost:11434/v1"));
    }
}
