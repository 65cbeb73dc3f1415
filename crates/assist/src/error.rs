use std::fmt;

/// Failure of a suggestion request. The buffer is never touched on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionRequestError {
    /// Provider disabled or misconfigured
    NotConfigured(String),
    /// Provider needs an API key; holds the env var that would supply it
    MissingKey(String),
    Network(String),
    /// Non-success HTTP status from the backend
    Api { status: u16, message: String },
    /// Backend answered with something that is not a usable edit
    InvalidResponse(String),
    TimedOut { after_secs: u64 },
    /// The request worker could not be started or went away
    Dispatch(String),
}

impl fmt::Display for SuggestionRequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConfigured(msg) => write!(f, "AI not configured: {}", msg),
            Self::MissingKey(var) => write!(f, "API key not configured (set {})", var),
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            Self::TimedOut { after_secs } => write!(f, "Request timed out after {}s", after_secs),
            Self::Dispatch(msg) => write!(f, "Request dispatch failed: {}", msg),
        }
    }
}

impl std::error::Error for SuggestionRequestError {}
