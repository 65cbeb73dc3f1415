//! Runs suggestion requests off the interactive thread.
//!
//! Each request gets its own named worker (`suggest-<buffer>-<generation>`).
//! Results come back as [`SuggestionResponse`]s on a channel. The interactive
//! side drains them with [`SuggestionDispatcher::pump`], which hands each one
//! to the engine. Stale generations are discarded there, so a worker is never
//! interrupted.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::SuggestionBackend;
use crate::error::SuggestionRequestError;
use crate::suggestion::{ResponseDisposition, SuggestionEngine, SuggestionRequest, SuggestionResponse};

pub struct SuggestionDispatcher {
    backend: Arc<dyn SuggestionBackend>,
    tx: Sender<SuggestionResponse>,
    rx: Receiver<SuggestionResponse>,
}

impl SuggestionDispatcher {
    pub fn new(backend: Arc<dyn SuggestionBackend>) -> Self {
        let (tx, rx) = mpsc::channel();
        Self { backend, tx, rx }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Start the backend call on a worker thread.
    pub fn dispatch(&self, request: SuggestionRequest) -> Result<(), SuggestionRequestError> {
        let backend = self.backend.clone();
        let tx = self.tx.clone();
        let name = format!("suggest-{}-{}", request.buffer.0, request.generation);

        std::thread::Builder::new()
            .name(name)
            .spawn(move || {
                let result = backend.suggest(&request);
                if let Err(e) = &result {
                    log::warn!("{} backend: generation {} failed: {}", backend.name(), request.generation, e);
                }
                // Receiver gone means the editor shut down
                let _ = tx.send(SuggestionResponse { buffer: request.buffer, generation: request.generation, result });
            })
            .map(|_| ())
            .map_err(|e| SuggestionRequestError::Dispatch(e.to_string()))
    }

    pub fn try_recv(&self) -> Option<SuggestionResponse> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<SuggestionResponse> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// Feed every response that has arrived into `engine`.
    pub fn pump(&self, engine: &mut SuggestionEngine) -> Vec<ResponseDisposition> {
        let mut dispositions = Vec::new();
        while let Some(response) = self.try_recv() {
            dispositions.push(engine.on_response(response));
        }
        dispositions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::EditorBuffer;
    use crate::suggestion::{SuggestionAction, SuggestionState};
    use macrohost_core::HostLog;
    use std::time::Instant;

    struct SlowEcho {
        delay: Duration,
    }

    impl SuggestionBackend for SlowEcho {
        fn name(&self) -> &str {
            "echo"
        }

        fn suggest(&self, request: &SuggestionRequest) -> Result<String, SuggestionRequestError> {
            std::thread::sleep(self.delay);
            Ok(format!("-- generation {}", request.generation))
        }
    }

    fn dispatcher(delay_ms: u64) -> SuggestionDispatcher {
        SuggestionDispatcher::new(Arc::new(SlowEcho { delay: Duration::from_millis(delay_ms) }))
    }

    #[test]
    fn test_response_is_presented() {
        let d = dispatcher(0);
        let mut buffer = EditorBuffer::with_text("x = 1\n");
        let mut engine = SuggestionEngine::new(buffer.id(), HostLog::new());

        let req = engine.trigger(&buffer, SuggestionAction::Suggest, Instant::now());
        d.dispatch(req).unwrap();
        let response = d.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(engine.on_response(response), ResponseDisposition::Presented);

        engine.accept(&mut buffer);
        assert_eq!(buffer.text(), "x = 1\n-- generation 1");
    }

    #[test]
    fn test_late_reply_after_cancel_is_discarded() {
        let d = dispatcher(50);
        let buffer = EditorBuffer::with_text("print(1)");
        let mut engine = SuggestionEngine::new(buffer.id(), HostLog::new());

        let req = engine.trigger(&buffer, SuggestionAction::Optimize, Instant::now());
        d.dispatch(req).unwrap();
        engine.cancel();

        let response = d.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(engine.on_response(response), ResponseDisposition::Discarded);
        assert_eq!(engine.state(), &SuggestionState::Idle);
        assert_eq!(buffer.text(), "print(1)");
    }

    #[test]
    fn test_pump_only_presents_latest_generation() {
        let d = dispatcher(10);
        let buffer = EditorBuffer::with_text("a");
        let mut engine = SuggestionEngine::new(buffer.id(), HostLog::new());

        let first = engine.trigger(&buffer, SuggestionAction::Suggest, Instant::now());
        d.dispatch(first).unwrap();
        let second = engine.trigger(&buffer, SuggestionAction::Suggest, Instant::now());
        let latest = second.generation;
        d.dispatch(second).unwrap();

        let mut dispositions = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(5);
        while dispositions.len() < 2 && Instant::now() < deadline {
            dispositions.extend(d.pump(&mut engine));
            std::thread::sleep(Duration::from_millis(5));
        }
        dispositions.sort_by_key(|disp| *disp != ResponseDisposition::Presented);
        assert_eq!(dispositions, vec![ResponseDisposition::Presented, ResponseDisposition::Discarded]);
        assert_eq!(engine.current_generation(), Some(latest));
    }
}
