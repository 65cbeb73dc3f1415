//! Editor intelligence for the script editor.
//!
//! - [`completion`]: API-aware completion candidates
//! - [`suggestion`]: generation-tagged inline AI suggestion state machine
//! - [`backend`]: AI backends behind the [`SuggestionBackend`] trait
//! - [`dispatcher`]: runs backend calls on worker threads

pub mod backend;
pub mod buffer;
pub mod completion;
pub mod dispatcher;
pub mod error;
pub mod lexer;
pub mod suggestion;

pub use backend::{backend_from_config, OpenAiBackend, SuggestionBackend, TemplateBackend};
pub use buffer::{BufferId, EditorBuffer};
pub use completion::{prefix_at, CompletionGroup, CompletionItem, CompletionKind, CompletionProvider};
pub use dispatcher::SuggestionDispatcher;
pub use error::SuggestionRequestError;
pub use suggestion::{
    GhostEdit, ResponseDisposition, SuggestionAction, SuggestionEngine, SuggestionRequest, SuggestionResponse,
    SuggestionState,
};
