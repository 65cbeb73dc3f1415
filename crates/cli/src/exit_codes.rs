//! CLI Exit Code Registry
//!
//! Single source of truth for `mhost` exit codes. Scripts calling `mhost`
//! rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain     | Description                               |
//! |---------|------------|-------------------------------------------|
//! | 0       | Universal  | Success                                   |
//! | 1       | Universal  | General error (unspecified)               |
//! | 2       | Universal  | Usage error (bad args, conflicting flags) |
//! | 3       | Universal  | I/O error (unreadable or unwritable file) |
//! | 10-19   | ai         | Suggestion backend codes                  |
//! | 20-29   | script     | Script run codes                          |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use macrohost_assist::SuggestionRequestError;
use macrohost_scripting::ScriptRuntimeError;

// =============================================================================
// Universal (0-3)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, conflicting options.
pub const EXIT_USAGE: u8 = 2;

/// I/O error - input missing or unreadable, output unwritable.
pub const EXIT_IO: u8 = 3;

// =============================================================================
// AI (10-19)
// =============================================================================

/// AI disabled (provider=none).
pub const EXIT_AI_DISABLED: u8 = 10;

/// AI provider configured but API key missing.
pub const EXIT_AI_MISSING_KEY: u8 = 11;

/// Backend reachable but the request failed (network, HTTP status, bad reply).
pub const EXIT_AI_REQUEST: u8 = 12;

/// No reply within the configured request timeout.
pub const EXIT_AI_TIMEOUT: u8 = 13;

// =============================================================================
// Script (20-29)
// =============================================================================

/// The script raised an error nothing inside it caught.
pub const EXIT_SCRIPT_FAILED: u8 = 20;

/// Script name did not resolve in any search directory.
pub const EXIT_SCRIPT_NOT_FOUND: u8 = 21;

/// Another run holds the document and the busy policy is `reject`.
pub const EXIT_SCRIPT_BUSY: u8 = 22;

/// Run stopped by the timeout, the instruction limit, or cancellation.
pub const EXIT_SCRIPT_LIMIT: u8 = 23;

/// Lua VM or host bindings could not be set up.
pub const EXIT_SCRIPT_SETUP: u8 = 24;

// =============================================================================
// Mapping helpers
// =============================================================================

pub fn script_exit_code(err: &ScriptRuntimeError) -> u8 {
    match err {
        ScriptRuntimeError::Failed { result, .. }
            if result.timed_out || result.instruction_limit_exceeded || result.cancelled =>
        {
            EXIT_SCRIPT_LIMIT
        }
        ScriptRuntimeError::Failed { .. } => EXIT_SCRIPT_FAILED,
        ScriptRuntimeError::NotFound { .. } => EXIT_SCRIPT_NOT_FOUND,
        ScriptRuntimeError::Busy { .. } => EXIT_SCRIPT_BUSY,
        ScriptRuntimeError::Setup(_) => EXIT_SCRIPT_SETUP,
        ScriptRuntimeError::WorkerLost { .. } => EXIT_ERROR,
    }
}

pub fn suggestion_exit_code(err: &SuggestionRequestError) -> u8 {
    match err {
        SuggestionRequestError::NotConfigured(_) => EXIT_AI_DISABLED,
        SuggestionRequestError::MissingKey(_) => EXIT_AI_MISSING_KEY,
        SuggestionRequestError::TimedOut { .. } => EXIT_AI_TIMEOUT,
        SuggestionRequestError::Network(_)
        | SuggestionRequestError::Api { .. }
        | SuggestionRequestError::InvalidResponse(_) => EXIT_AI_REQUEST,
        SuggestionRequestError::Dispatch(_) => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges() {
        for code in [EXIT_AI_DISABLED, EXIT_AI_MISSING_KEY, EXIT_AI_REQUEST, EXIT_AI_TIMEOUT] {
            assert!((10..20).contains(&code));
        }
        for code in [EXIT_SCRIPT_FAILED, EXIT_SCRIPT_NOT_FOUND, EXIT_SCRIPT_BUSY, EXIT_SCRIPT_LIMIT, EXIT_SCRIPT_SETUP] {
            assert!((20..30).contains(&code));
        }
    }

    #[test]
    fn test_suggestion_mapping() {
        assert_eq!(suggestion_exit_code(&SuggestionRequestError::MissingKey("X".into())), EXIT_AI_MISSING_KEY);
        assert_eq!(suggestion_exit_code(&SuggestionRequestError::TimedOut { after_secs: 1 }), EXIT_AI_TIMEOUT);
    }

    #[test]
    fn test_script_mapping() {
        let busy = ScriptRuntimeError::Busy { script: "a".into() };
        assert_eq!(script_exit_code(&busy), EXIT_SCRIPT_BUSY);
        assert_eq!(script_exit_code(&ScriptRuntimeError::Setup("x".into())), EXIT_SCRIPT_SETUP);
    }
}
