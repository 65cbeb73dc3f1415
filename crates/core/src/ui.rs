// UI notifications raised from worker threads.
//
// Workers never touch UI state; they post events that the interactive
// context drains on its own schedule.

use std::sync::mpsc::{self, Receiver, Sender};

/// Title used by `ui.show_message` when the script passes none.
pub const DEFAULT_MESSAGE_TITLE: &str = "Message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Modal notification.
    Message { text: String, title: String },
    /// Non-modal status bar update.
    Status(String),
}

/// Sending half handed to workers. Cheap to clone.
#[derive(Debug, Clone)]
pub struct UiNotifier {
    tx: Sender<UiEvent>,
}

impl UiNotifier {
    pub fn show_message(&self, text: impl Into<String>, title: Option<String>) {
        self.send(UiEvent::Message {
            text: text.into(),
            title: title.unwrap_or_else(|| DEFAULT_MESSAGE_TITLE.to_string()),
        });
    }

    pub fn status(&self, text: impl Into<String>) {
        self.send(UiEvent::Status(text.into()));
    }

    fn send(&self, event: UiEvent) {
        // A closed receiver means the editor is shutting down.
        if self.tx.send(event).is_err() {
            log::debug!("ui event dropped: receiver closed");
        }
    }
}

pub fn ui_channel() -> (UiNotifier, Receiver<UiEvent>) {
    let (tx, rx) = mpsc::channel();
    (UiNotifier { tx }, rx)
}
