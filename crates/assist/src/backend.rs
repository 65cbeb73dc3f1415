// Suggestion backends
//
// `OpenAiBackend` talks to any OpenAI-compatible chat-completions endpoint
// (api.openai.com or a local server). `TemplateBackend` answers offline with
// deterministic edits. Both are blocking: call them from a worker thread.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use macrohost_config::ai::{env_var_name, ResolvedAIConfig};
use macrohost_config::{AIConfigStatus, AIProvider};
use macrohost_core::ApiRegistry;

use crate::completion::{prefix_at, CompletionProvider};
use crate::error::SuggestionRequestError;
use crate::lexer::{tokenize_lua, LuaTokenType};
use crate::suggestion::{SuggestionAction, SuggestionRequest};

pub trait SuggestionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Produce the suggested text for `request`. Blocking.
    fn suggest(&self, request: &SuggestionRequest) -> Result<String, SuggestionRequestError>;
}

/// Pick the backend the configuration asks for.
pub fn backend_from_config(
    config: &ResolvedAIConfig,
    registry: Arc<ApiRegistry>,
) -> Result<Arc<dyn SuggestionBackend>, SuggestionRequestError> {
    match config.status {
        AIConfigStatus::Disabled => {
            return Err(SuggestionRequestError::NotConfigured(
                config.blocking_reason.clone().unwrap_or_else(|| "AI is disabled".to_string()),
            ));
        }
        AIConfigStatus::MissingKey => {
            return Err(SuggestionRequestError::MissingKey(env_var_name(config.provider_name())));
        }
        AIConfigStatus::Ready => {}
    }

    match config.provider {
        AIProvider::Template => Ok(Arc::new(TemplateBackend::new(registry))),
        AIProvider::OpenAI | AIProvider::Local => Ok(Arc::new(OpenAiBackend::new(config, &registry)?)),
        AIProvider::None => Err(SuggestionRequestError::NotConfigured("AI is disabled".to_string())),
    }
}

// ============================================================================
// OpenAI-compatible API types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiBackend
// ============================================================================

pub struct OpenAiBackend {
    client: reqwest::blocking::Client,
    provider: &'static str,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    privacy_mode: bool,
    timeout_secs: u64,
    system_prompt: String,
}

impl OpenAiBackend {
    pub fn new(config: &ResolvedAIConfig, registry: &ApiRegistry) -> Result<Self, SuggestionRequestError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| SuggestionRequestError::NotConfigured("no endpoint for provider".to_string()))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SuggestionRequestError::Network(e.to_string()))?;

        Ok(Self {
            client,
            provider: config.provider_name(),
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            privacy_mode: config.privacy_mode,
            timeout_secs: config.request_timeout.as_secs(),
            system_prompt: build_system_prompt(registry),
        })
    }
}

impl SuggestionBackend for OpenAiBackend {
    fn name(&self) -> &str {
        self.provider
    }

    fn suggest(&self, request: &SuggestionRequest) -> Result<String, SuggestionRequestError> {
        let body = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage { role: "system".to_string(), content: self.system_prompt.clone() },
                ChatMessage { role: "user".to_string(), content: build_user_prompt(request, self.privacy_mode) },
            ],
            temperature: 0.2,
            max_tokens: 512,
        };

        let mut http = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(key) = &self.api_key {
            http = http.header("Authorization", format!("Bearer {}", key));
        }

        let response = http.send().map_err(|e| {
            if e.is_timeout() {
                SuggestionRequestError::TimedOut { after_secs: self.timeout_secs }
            } else {
                SuggestionRequestError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(SuggestionRequestError::Api { status: status.as_u16(), message });
        }

        let parsed: ChatResponse =
            response.json().map_err(|e| SuggestionRequestError::InvalidResponse(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| SuggestionRequestError::InvalidResponse("No choices in response".to_string()))?;

        clean_suggestion(&content)
    }
}

fn build_system_prompt(registry: &ApiRegistry) -> String {
    let mut prompt = String::from(
        "You are a coding assistant inside a Lua 5.4 macro editor.\n\
         Scripts can use these host objects:\n",
    );
    for ns in registry.enabled_namespaces() {
        for member in &ns.members {
            prompt.push_str(&format!("- {}: {}\n", member.signature, member.description));
        }
    }
    prompt.push_str(
        "\nRULES:\n\
         1. For code requests return ONLY Lua code, no markdown fences, no commentary\n\
         2. For explain requests return a few short plain-text sentences\n\
         3. The os, io and require libraries are not available\n",
    );
    prompt
}

fn build_user_prompt(request: &SuggestionRequest, privacy_mode: bool) -> String {
    let mut prompt = String::new();
    match &request.action {
        SuggestionAction::Suggest => {
            prompt.push_str("Continue the code at the cursor. Return only the text to insert.\n\n");
            prompt.push_str("CODE BEFORE CURSOR:\n");
            let context = if privacy_mode {
                request.context.rsplit('\n').next().unwrap_or("")
            } else {
                request.context.as_str()
            };
            prompt.push_str(context);
            return prompt;
        }
        SuggestionAction::Optimize => {
            prompt.push_str("Rewrite this code to be clearer and faster without changing what it does. Return only the replacement code.\n");
        }
        SuggestionAction::Explain => {
            prompt.push_str("Explain what this code does. Plain text, no code.\n");
        }
        SuggestionAction::Fix { error } => {
            prompt.push_str("This code fails. Return only a corrected replacement.\n");
            if let Some(error) = error {
                prompt.push_str("\nERROR:\n");
                prompt.push_str(error);
                prompt.push('\n');
            }
        }
    }
    if !privacy_mode && !request.context.is_empty() {
        prompt.push_str("\nPRECEDING CODE:\n");
        prompt.push_str(&request.context);
        prompt.push('\n');
    }
    prompt.push_str("\nCODE:\n");
    prompt.push_str(&request.selection);
    prompt
}

/// Strip markdown fences and surrounding chatter from a model reply.
fn clean_suggestion(content: &str) -> Result<String, SuggestionRequestError> {
    let body = match content.find("```") {
        Some(open) => {
            let after = &content[open + 3..];
            // Skip the info string (```lua)
            let code_start = after.find('\n').map(|i| i + 1).unwrap_or(after.len());
            let code = &after[code_start..];
            match code.find("```") {
                Some(close) => &code[..close],
                None => code,
            }
        }
        None => content,
    };
    let body = body.trim_matches('\n').trim_end();
    if body.trim().is_empty() {
        return Err(SuggestionRequestError::InvalidResponse(format!("no code in reply: {}", content)));
    }
    Ok(body.to_string())
}

// ============================================================================
// TemplateBackend
// ============================================================================

const STARTER_SNIPPET: &str = "local t = data.load_csv(\"input.csv\")\nhost.log(\"rows: \" .. t.row_count)";

/// Offline backend with deterministic answers.
pub struct TemplateBackend {
    registry: Arc<ApiRegistry>,
    completion: CompletionProvider,
}

impl TemplateBackend {
    pub fn new(registry: Arc<ApiRegistry>) -> Self {
        Self { completion: CompletionProvider::new(registry.clone()), registry }
    }

    /// Complete the identifier before the cursor, or offer a starter snippet.
    fn suggest_at_cursor(&self, context: &str) -> String {
        if let Some(prefix) = prefix_at(context, context.len()).filter(|p| !p.is_empty()) {
            let partial_len = prefix.rsplit(['.', ':']).next().map(str::len).unwrap_or(prefix.len());
            if let Some(item) = self.completion.complete_items(prefix).into_iter().next() {
                let mut rest = item.label[partial_len..].to_string();
                if item.kind == crate::completion::CompletionKind::Method {
                    rest.push_str("()");
                }
                if !rest.is_empty() {
                    return rest;
                }
            }
        }
        STARTER_SNIPPET.to_string()
    }

    fn explain(&self, code: &str) -> String {
        let lines = code.lines().filter(|l| !l.trim().is_empty()).count();
        let mut out = format!("{} line{} of Lua.", lines, if lines == 1 { "" } else { "s" });

        let tokens = tokenize_lua(code);
        let mut seen = Vec::new();
        for window in tokens.windows(3) {
            let [(ns, LuaTokenType::Name), (sep, LuaTokenType::Symbol), (member, LuaTokenType::Name)] = window else {
                continue;
            };
            if !matches!(&code[sep.clone()], "." | ":") {
                continue;
            }
            if let Some(api) = self.registry.resolve(&code[ns.clone()], &code[member.clone()]) {
                let name = api.qualified_name();
                if !seen.contains(&name) {
                    out.push_str(&format!("\n{}: {}", name, api.description));
                    seen.push(name);
                }
            }
        }
        out
    }
}

impl SuggestionBackend for TemplateBackend {
    fn name(&self) -> &str {
        "template"
    }

    fn suggest(&self, request: &SuggestionRequest) -> Result<String, SuggestionRequestError> {
        if request.action != SuggestionAction::Suggest && request.selection.trim().is_empty() {
            return Err(SuggestionRequestError::InvalidResponse("nothing selected".to_string()));
        }
        let text = match &request.action {
            SuggestionAction::Suggest => self.suggest_at_cursor(&request.context),
            SuggestionAction::Optimize => tidy(&request.selection),
            SuggestionAction::Explain => self.explain(&request.selection),
            SuggestionAction::Fix { error } => guard_with_pcall(&request.selection, error.as_deref()),
        };
        Ok(text)
    }
}

/// Trim trailing whitespace and collapse runs of blank lines.
fn tidy(code: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    for line in code.lines().map(str::trim_end) {
        if line.is_empty() && out.last().is_some_and(|l| l.is_empty()) {
            continue;
        }
        out.push(line);
    }
    out.join("\n")
}

fn guard_with_pcall(code: &str, error: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(error) = error {
        out.push_str(&format!("-- fix: {}\n", error.lines().next().unwrap_or("").trim()));
    }
    out.push_str("local ok, err = pcall(function()\n");
    for line in code.trim_end().lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str("  ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str("end)\nif not ok then\n  host.log(\"error: \" .. tostring(err))\nend");
    out
}
