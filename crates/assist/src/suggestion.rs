//! Inline AI suggestions ("ghost text").
//!
//! One [`SuggestionEngine`] per editor buffer. Every request gets a new
//! generation id; a response is applied only when its generation is the one
//! currently requested, so cancelled or superseded requests can never touch
//! the buffer.
//!
//! ```text
//! Idle ──trigger──▶ Requesting ──response──▶ Presented ──accept──▶ Accepted
//!                     │    │                    │
//!                     │    └──error/timeout──▶ Failed
//!                     └──cancel/edit──▶ Cancelled ◀──cancel/edit──┘
//! ```
//!
//! Accepted, Cancelled and Failed are terminal: the engine settles back to
//! Idle straight away and keeps the terminal state as `last_outcome()`.

use std::ops::Range;
use std::time::{Duration, Instant};

use macrohost_core::HostLog;

use crate::buffer::{BufferId, EditorBuffer};
use crate::error::SuggestionRequestError;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Context handed to the backend: at most this many bytes before the target.
const MAX_CONTEXT_BYTES: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionAction {
    /// Continue the code at the cursor
    Suggest,
    /// Rewrite the selection
    Optimize,
    /// Comment explaining the selection, inserted above it
    Explain,
    /// Rewrite the selection so it no longer fails
    Fix { error: Option<String> },
}

impl SuggestionAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Suggest => "suggest",
            Self::Optimize => "optimize",
            Self::Explain => "explain",
            Self::Fix { .. } => "fix",
        }
    }

    /// Parse a context-menu action name.
    pub fn from_name(name: &str, error: Option<String>) -> Option<Self> {
        match name {
            "suggest" => Some(Self::Suggest),
            "optimize" => Some(Self::Optimize),
            "explain" => Some(Self::Explain),
            "fix" => Some(Self::Fix { error }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionRequest {
    pub buffer: BufferId,
    pub generation: u64,
    pub action: SuggestionAction,
    /// Selected text (or the current line when nothing is selected)
    pub selection: String,
    /// Text preceding the target, trimmed to a bounded length
    pub context: String,
    /// Byte offset of the cursor in the buffer when the request was made
    pub cursor: usize,
}

#[derive(Debug, Clone)]
pub struct SuggestionResponse {
    pub buffer: BufferId,
    pub generation: u64,
    pub result: Result<String, SuggestionRequestError>,
}

/// Provisional edit shown at the cursor. Not part of the buffer until accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhostEdit {
    pub range: Range<usize>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionState {
    Idle,
    Requesting { generation: u64, action: SuggestionAction, target: Range<usize> },
    Presented { generation: u64, ghost: GhostEdit },
    Accepted { generation: u64 },
    Cancelled { generation: u64 },
    Failed { generation: u64, error: SuggestionRequestError },
}

impl SuggestionState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Requesting { .. } => "requesting",
            Self::Presented { .. } => "presented",
            Self::Accepted { .. } => "accepted",
            Self::Cancelled { .. } => "cancelled",
            Self::Failed { .. } => "failed",
        }
    }

    fn generation(&self) -> Option<u64> {
        match self {
            Self::Idle => None,
            Self::Requesting { generation, .. }
            | Self::Presented { generation, .. }
            | Self::Accepted { generation }
            | Self::Cancelled { generation }
            | Self::Failed { generation, .. } => Some(*generation),
        }
    }
}

/// What happened to a response fed into [`SuggestionEngine::on_response`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseDisposition {
    Presented,
    Failed,
    /// Stale generation, wrong buffer, or nothing outstanding
    Discarded,
}

#[derive(Debug)]
pub struct SuggestionEngine {
    buffer: BufferId,
    state: SuggestionState,
    last_outcome: Option<SuggestionState>,
    next_generation: u64,
    requested_at: Option<Instant>,
    /// Buffer revision when the outstanding request was made
    revision: u64,
    timeout: Duration,
    log: HostLog,
}

impl SuggestionEngine {
    pub fn new(buffer: BufferId, log: HostLog) -> Self {
        Self {
            buffer,
            state: SuggestionState::Idle,
            last_outcome: None,
            next_generation: 1,
            requested_at: None,
            revision: 0,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            log,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn state(&self) -> &SuggestionState {
        &self.state
    }

    /// Terminal state reached by the most recent request.
    pub fn last_outcome(&self) -> Option<&SuggestionState> {
        self.last_outcome.as_ref()
    }

    /// Generation of the outstanding (requesting or presented) suggestion.
    pub fn current_generation(&self) -> Option<u64> {
        self.state.generation()
    }

    pub fn ghost(&self) -> Option<&GhostEdit> {
        match &self.state {
            SuggestionState::Presented { ghost, .. } => Some(ghost),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SuggestionState::Requesting { .. } | SuggestionState::Presented { .. })
    }

    /// Start a request. An outstanding suggestion is cancelled first.
    pub fn trigger(&mut self, buffer: &EditorBuffer, action: SuggestionAction, now: Instant) -> SuggestionRequest {
        debug_assert_eq!(buffer.id(), self.buffer, "suggestion engine used with another buffer");
        if self.is_active() {
            self.cancel();
        }

        let anchor = match action {
            SuggestionAction::Suggest => buffer.cursor()..buffer.cursor(),
            _ => buffer.selection().unwrap_or_else(|| buffer.line_range_at(buffer.cursor())),
        };
        let target = match action {
            SuggestionAction::Suggest | SuggestionAction::Optimize | SuggestionAction::Fix { .. } => anchor.clone(),
            SuggestionAction::Explain => {
                let line_start = buffer.line_range_at(anchor.start).start;
                line_start..line_start
            }
        };

        let generation = self.next_generation;
        self.next_generation += 1;

        let text = buffer.text();
        let request = SuggestionRequest {
            buffer: self.buffer,
            generation,
            action: action.clone(),
            selection: text[anchor.clone()].to_string(),
            context: context_before(text, target.start),
            cursor: buffer.cursor(),
        };

        log::debug!("{}: {} request, generation {}", self.buffer, action.name(), generation);
        self.state = SuggestionState::Requesting { generation, action, target };
        self.requested_at = Some(now);
        self.revision = buffer.revision();
        request
    }

    /// Feed a backend response. Only the current generation is applied.
    pub fn on_response(&mut self, response: SuggestionResponse) -> ResponseDisposition {
        let (generation, action, target) = match &self.state {
            SuggestionState::Requesting { generation, action, target }
                if response.buffer == self.buffer && response.generation == *generation =>
            {
                (*generation, action.clone(), target.clone())
            }
            _ => {
                log::debug!(
                    "{}: discarding response for generation {} (state {})",
                    self.buffer,
                    response.generation,
                    self.state.name()
                );
                return ResponseDisposition::Discarded;
            }
        };

        let text = match response.result {
            Ok(text) => text,
            Err(error) => {
                self.fail(generation, error);
                return ResponseDisposition::Failed;
            }
        };

        let text = match action {
            SuggestionAction::Explain => as_lua_comment(&text),
            _ => text,
        };
        if text.trim().is_empty() {
            self.fail(generation, SuggestionRequestError::InvalidResponse("empty suggestion".to_string()));
            return ResponseDisposition::Failed;
        }

        self.state = SuggestionState::Presented { generation, ghost: GhostEdit { range: target, text } };
        self.requested_at = None;
        ResponseDisposition::Presented
    }

    /// Merge the presented ghost text into `buffer`. No-op unless presented.
    pub fn accept(&mut self, buffer: &mut EditorBuffer) -> Option<SuggestionState> {
        let (generation, ghost) = match std::mem::replace(&mut self.state, SuggestionState::Idle) {
            SuggestionState::Presented { generation, ghost } => (generation, ghost),
            other => {
                self.state = other;
                return None;
            }
        };

        if buffer.id() != self.buffer || buffer.revision() != self.revision {
            log::warn!("{}: buffer changed under suggestion {}, not applying", self.buffer, generation);
            return Some(self.settle(SuggestionState::Cancelled { generation }));
        }

        buffer.replace_range(ghost.range, &ghost.text);
        Some(self.settle(SuggestionState::Accepted { generation }))
    }

    /// Drop the outstanding request or ghost text. The buffer is untouched.
    pub fn cancel(&mut self) -> Option<SuggestionState> {
        let generation = match &self.state {
            SuggestionState::Requesting { generation, .. } | SuggestionState::Presented { generation, .. } => {
                *generation
            }
            _ => return None,
        };
        log::debug!("{}: generation {} cancelled", self.buffer, generation);
        Some(self.settle(SuggestionState::Cancelled { generation }))
    }

    /// Call after the user edits the buffer. Typing dismisses the suggestion.
    pub fn on_buffer_edit(&mut self, buffer: &EditorBuffer) -> Option<SuggestionState> {
        if self.is_active() && buffer.revision() != self.revision {
            return self.cancel();
        }
        None
    }

    /// Fail a request that has been outstanding longer than the timeout.
    pub fn check_timeout(&mut self, now: Instant) -> Option<SuggestionState> {
        let SuggestionState::Requesting { generation, .. } = self.state else {
            return None;
        };
        let started = self.requested_at?;
        if now.saturating_duration_since(started) < self.timeout {
            return None;
        }
        let error = SuggestionRequestError::TimedOut { after_secs: self.timeout.as_secs() };
        Some(self.fail(generation, error))
    }

    fn fail(&mut self, generation: u64, error: SuggestionRequestError) -> SuggestionState {
        self.log.error(format!("suggestion {} failed: {}", generation, error));
        self.settle(SuggestionState::Failed { generation, error })
    }

    fn settle(&mut self, terminal: SuggestionState) -> SuggestionState {
        self.last_outcome = Some(terminal.clone());
        self.state = SuggestionState::Idle;
        self.requested_at = None;
        terminal
    }
}

fn context_before(text: &str, end: usize) -> String {
    let mut start = end.saturating_sub(MAX_CONTEXT_BYTES);
    while !text.is_char_boundary(start) {
        start += 1;
    }
    text[start..end].to_string()
}

/// Prefix every line with `-- ` unless it already is a comment.
fn as_lua_comment(text: &str) -> String {
    let mut out = String::new();
    for line in text.trim().lines() {
        let line = line.trim_end();
        if line.trim_start().starts_with("--") {
            out.push_str(line);
        } else if line.is_empty() {
            out.push_str("--");
        } else {
            out.push_str("-- ");
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use macrohost_core::LogLevel;

    fn setup(text: &str) -> (EditorBuffer, SuggestionEngine) {
        let buffer = EditorBuffer::with_text(text);
        let engine = SuggestionEngine::new(buffer.id(), HostLog::new());
        (buffer, engine)
    }

    fn reply(req: &SuggestionRequest, text: &str) -> SuggestionResponse {
        SuggestionResponse { buffer: req.buffer, generation: req.generation, result: Ok(text.to_string()) }
    }

    #[test]
    fn test_request_present_accept() {
        let (mut buffer, mut engine) = setup("local t = ");
        let req = engine.trigger(&buffer, SuggestionAction::Suggest, Instant::now());
        assert_eq!(req.generation, 1);
        assert_eq!(req.context, "local t = ");
        assert_eq!(req.cursor, "local t = ".len());
        assert_eq!(engine.state().name(), "requesting");

        assert_eq!(engine.on_response(reply(&req, "data.load_csv(\"a.csv\")")), ResponseDisposition::Presented);
        assert_eq!(engine.ghost().map(|g| g.text.as_str()), Some("data.load_csv(\"a.csv\")"));
        // ghost text is not in the buffer
        assert_eq!(buffer.text(), "local t = ");

        let outcome = engine.accept(&mut buffer);
        assert_eq!(outcome, Some(SuggestionState::Accepted { generation: 1 }));
        assert_eq!(buffer.text(), "local t = data.load_csv(\"a.csv\")");
        assert_eq!(engine.state(), &SuggestionState::Idle);
        assert_eq!(engine.last_outcome(), Some(&SuggestionState::Accepted { generation: 1 }));
    }

    #[test]
    fn test_request_records_cursor_mid_buffer() {
        let (mut buffer, mut engine) = setup("a = 1\nb = 2\n");
        buffer.set_cursor(7);
        let req = engine.trigger(&buffer, SuggestionAction::Explain, Instant::now());
        assert_eq!(req.cursor, 7);
        assert_eq!(req.selection, "b = 2");
    }

    #[test]
    fn test_accept_applies_exactly_once() {
        let (mut buffer, mut engine) = setup("x = ");
        let req = engine.trigger(&buffer, SuggestionAction::Suggest, Instant::now());
        engine.on_response(reply(&req, "1"));
        engine.accept(&mut buffer);
        assert_eq!(engine.accept(&mut buffer), None);
        assert_eq!(buffer.text(), "x = 1");
    }

    #[test]
    fn test_fix_cancelled_before_reply_discards_late_reply() {
        let (mut buffer, mut engine) = setup("local n = tonumber(x) + 1");
        let fix = || SuggestionAction::Fix { error: Some("attempt to perform arithmetic on a nil value".into()) };

        let mut req = engine.trigger(&buffer, fix(), Instant::now());
        while req.generation < 5 {
            req = engine.trigger(&buffer, fix(), Instant::now());
        }
        assert_eq!(req.generation, 5);
        let before = buffer.text().to_string();

        assert_eq!(engine.cancel(), Some(SuggestionState::Cancelled { generation: 5 }));
        assert_eq!(engine.on_response(reply(&req, "local n = (tonumber(x) or 0) + 1")), ResponseDisposition::Discarded);

        assert_eq!(engine.state(), &SuggestionState::Idle);
        assert_eq!(buffer.text(), before);
        assert_eq!(engine.accept(&mut buffer), None);
        assert_eq!(buffer.text(), before);
    }

    #[test]
    fn test_new_request_supersedes_prior_generation() {
        let (buffer, mut engine) = setup("print(1)");
        let first = engine.trigger(&buffer, SuggestionAction::Optimize, Instant::now());
        let second = engine.trigger(&buffer, SuggestionAction::Optimize, Instant::now());
        assert_eq!(engine.last_outcome(), Some(&SuggestionState::Cancelled { generation: first.generation }));

        assert_eq!(engine.on_response(reply(&first, "stale")), ResponseDisposition::Discarded);
        assert_eq!(engine.on_response(reply(&second, "print(2)")), ResponseDisposition::Presented);
        assert_eq!(engine.current_generation(), Some(second.generation));
    }

    #[test]
    fn test_cancel_presented_leaves_buffer() {
        let (mut buffer, mut engine) = setup("a = 1");
        let req = engine.trigger(&buffer, SuggestionAction::Optimize, Instant::now());
        engine.on_response(reply(&req, "local a = 1"));
        assert_eq!(engine.cancel(), Some(SuggestionState::Cancelled { generation: req.generation }));
        assert_eq!(engine.accept(&mut buffer), None);
        assert_eq!(buffer.text(), "a = 1");
    }

    #[test]
    fn test_backend_error_fails_and_logs() {
        let (buffer, mut engine) = setup("x");
        let log = engine.log.clone();
        let req = engine.trigger(&buffer, SuggestionAction::Explain, Instant::now());
        let response = SuggestionResponse {
            buffer: req.buffer,
            generation: req.generation,
            result: Err(SuggestionRequestError::Network("connection refused".into())),
        };
        assert_eq!(engine.on_response(response), ResponseDisposition::Failed);
        assert_eq!(engine.state(), &SuggestionState::Idle);
        assert!(matches!(engine.last_outcome(), Some(SuggestionState::Failed { .. })));
        assert!(log.contains(LogLevel::Error, "connection refused"));
        assert_eq!(buffer.text(), "x");
    }

    #[test]
    fn test_timeout() {
        let (buffer, engine) = setup("x");
        let mut engine = engine.with_timeout(Duration::from_secs(5));
        let t0 = Instant::now();
        let req = engine.trigger(&buffer, SuggestionAction::Suggest, t0);
        assert_eq!(engine.check_timeout(t0 + Duration::from_secs(1)), None);
        let outcome = engine.check_timeout(t0 + Duration::from_secs(6));
        assert_eq!(
            outcome,
            Some(SuggestionState::Failed {
                generation: req.generation,
                error: SuggestionRequestError::TimedOut { after_secs: 5 }
            })
        );
        assert_eq!(engine.on_response(reply(&req, "late")), ResponseDisposition::Discarded);
    }

    #[test]
    fn test_edit_while_presented_cancels() {
        let (mut buffer, mut engine) = setup("host.");
        let req = engine.trigger(&buffer, SuggestionAction::Suggest, Instant::now());
        engine.on_response(reply(&req, "log(\"hi\")"));

        assert_eq!(engine.on_buffer_edit(&buffer), None);
        buffer.insert("l");
        assert_eq!(engine.on_buffer_edit(&buffer), Some(SuggestionState::Cancelled { generation: req.generation }));
        assert_eq!(buffer.text(), "host.l");
    }

    #[test]
    fn test_stale_revision_is_not_applied() {
        let (mut buffer, mut engine) = setup("abc");
        let req = engine.trigger(&buffer, SuggestionAction::Suggest, Instant::now());
        engine.on_response(reply(&req, "def"));
        buffer.insert("!");
        assert_eq!(engine.accept(&mut buffer), Some(SuggestionState::Cancelled { generation: req.generation }));
        assert_eq!(buffer.text(), "abc!");
    }

    #[test]
    fn test_optimize_replaces_selection() {
        let (mut buffer, mut engine) = setup("local a = 1\nprint( a )\n");
        buffer.select(12..22);
        let req = engine.trigger(&buffer, SuggestionAction::Optimize, Instant::now());
        assert_eq!(req.selection, "print( a )");
        engine.on_response(reply(&req, "print(a)"));
        engine.accept(&mut buffer);
        assert_eq!(buffer.text(), "local a = 1\nprint(a)\n");
    }

    #[test]
    fn test_explain_inserts_comment_above_line() {
        let (mut buffer, mut engine) = setup("x = 1\ny = x * 2");
        buffer.set_cursor(9);
        let req = engine.trigger(&buffer, SuggestionAction::Explain, Instant::now());
        assert_eq!(req.selection, "y = x * 2");
        engine.on_response(reply(&req, "Doubles x.\n\nStores it in y."));
        engine.accept(&mut buffer);
        assert_eq!(buffer.text(), "x = 1\n-- Doubles x.\n--\n-- Stores it in y.\ny = x * 2");
    }

    #[test]
    fn test_empty_reply_fails() {
        let (buffer, mut engine) = setup("x");
        let req = engine.trigger(&buffer, SuggestionAction::Suggest, Instant::now());
        assert_eq!(engine.on_response(reply(&req, "  \n")), ResponseDisposition::Failed);
        assert_eq!(buffer.text(), "x");
    }

    #[test]
    fn test_action_names() {
        assert_eq!(SuggestionAction::from_name("fix", None), Some(SuggestionAction::Fix { error: None }));
        assert_eq!(SuggestionAction::from_name("optimize", None).map(|a| a.name()), Some("optimize"));
        assert_eq!(SuggestionAction::from_name("rewrite", None), None);
    }
}
