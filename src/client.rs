//! Async drivers binding one reducer to one transport.
//!
//! The client owns the reducer and the active binding, and applies events
//! one at a time from a single task. That is what keeps ingestion ordered:
//! there is no second path into the reducer.

use crate::model::{AppError, SessionId, SourceCli};
use crate::parser::LineEvent;
use crate::reducer::quick::QuickChatReducer;
use crate::reducer::{ChatReducer, StreamSession};
use crate::transport::quick::{QuickBinding, QuickChatTransport, QuickEvent};
use crate::transport::{Binding, ChatTransport, StreamEvent};
use std::sync::Arc;
use tracing::{debug, warn};

const CLOSED_TEXT: &str = "Transport closed unexpectedly";

// ===== Update =====

/// What one transport event did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A stdout line, parsed and applied.
    Line(LineEvent),
    /// A stderr line.
    Stderr {
        /// The line as the CLI printed it.
        line: String,
        /// Whether it became `last_error`.
        surfaced: bool,
    },
    /// The CLI exited.
    Completed {
        /// Whether it exited cleanly.
        success: bool,
    },
    /// The connection carrying the run was lost.
    Disconnected(String),
}

// ===== ChatClient =====

/// Drives one [`ChatReducer`] over a [`ChatTransport`].
pub struct ChatClient {
    transport: Arc<dyn ChatTransport>,
    reducer: ChatReducer,
    active: Option<Binding>,
}

impl ChatClient {
    /// Client with a fresh session.
    pub fn new(transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            transport,
            reducer: ChatReducer::new(),
            active: None,
        }
    }

    /// Current session snapshot.
    pub fn session(&self) -> &StreamSession {
        self.reducer.session()
    }

    /// The reducer, for operations that need no transport (such as `attach`).
    pub fn reducer_mut(&mut self) -> &mut ChatReducer {
        &mut self.reducer
    }

    /// Whether a run is bound and may still deliver events.
    pub fn is_bound(&self) -> bool {
        self.active.is_some()
    }

    /// Start a new session and bind its run.
    ///
    /// A launch failure is also recorded as the session's `last_error`.
    pub async fn start(
        &mut self,
        source: SourceCli,
        working_directory: impl Into<String>,
        prompt: &str,
        model: impl Into<String>,
        skip_permissions: bool,
    ) -> Result<(), AppError> {
        let request = self
            .reducer
            .start(source, working_directory, prompt, model, skip_permissions)?;
        let result = self.transport.send_start(request).await;
        self.bind(result)
    }

    /// Send a follow-up turn to the active session and bind its run.
    pub async fn continue_session(
        &mut self,
        session_id: &SessionId,
        prompt: &str,
        model: Option<String>,
    ) -> Result<(), AppError> {
        let request = self.reducer.continue_session(session_id, prompt, model)?;
        let result = self.transport.send_continue(request).await;
        self.bind(result)
    }

    fn bind(
        &mut self,
        result: Result<Binding, crate::model::TransportError>,
    ) -> Result<(), AppError> {
        match result {
            Ok(binding) => {
                debug!(route = %binding.route, "Client bound to route");
                self.active = Some(binding);
                Ok(())
            }
            Err(err) => {
                self.reducer.fail(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Stop the running reply. Later events of the route are discarded.
    pub async fn cancel(&mut self) -> bool {
        if !self.reducer.cancel() {
            return false;
        }
        if let Some(binding) = self.active.take() {
            if let Err(err) = self.transport.send_cancel(&binding.route).await {
                warn!(route = %binding.route, error = %err, "Cancel could not be delivered");
            }
        }
        true
    }

    /// Reset to idle, cancelling a running reply first.
    pub async fn clear(&mut self) {
        if self.reducer.session().is_streaming() {
            self.cancel().await;
        }
        self.active = None;
        self.reducer.clear();
    }

    /// Apply the next event of the bound route. `None` once nothing is bound.
    pub async fn next_update(&mut self) -> Option<Update> {
        let binding = self.active.as_mut()?;
        let event = binding.recv().await;

        match event {
            Some(StreamEvent::Output(line)) => Some(Update::Line(self.reducer.ingest(&line))),
            Some(StreamEvent::Error(line)) => {
                let surfaced = self.reducer.ingest_stderr(&line);
                Some(Update::Stderr { line, surfaced })
            }
            Some(StreamEvent::Complete { success }) => {
                self.active = None;
                self.reducer.complete(success);
                Some(Update::Completed { success })
            }
            Some(StreamEvent::Disconnected(reason)) => {
                self.active = None;
                if self.reducer.session().is_streaming() {
                    self.reducer.fail(format!("Connection lost: {}", reason));
                }
                Some(Update::Disconnected(reason))
            }
            None => {
                self.active = None;
                if self.reducer.session().is_streaming() {
                    self.reducer.fail(CLOSED_TEXT);
                }
                None
            }
        }
    }

    /// Drain the bound route to its end.
    pub async fn wait_until_finished(&mut self) -> &StreamSession {
        while self.next_update().await.is_some() {}
        self.reducer.session()
    }
}

// ===== QuickChatClient =====

/// Drives one [`QuickChatReducer`] over a [`QuickChatTransport`].
pub struct QuickChatClient {
    transport: Arc<dyn QuickChatTransport>,
    reducer: QuickChatReducer,
    active: Option<QuickBinding>,
}

impl QuickChatClient {
    /// Client over `transport`, starting from `reducer`.
    pub fn new(transport: Arc<dyn QuickChatTransport>, reducer: QuickChatReducer) -> Self {
        Self {
            transport,
            reducer,
            active: None,
        }
    }

    /// Conversation state.
    pub fn reducer(&self) -> &QuickChatReducer {
        &self.reducer
    }

    /// Conversation state, for model and source changes.
    pub fn reducer_mut(&mut self) -> &mut QuickChatReducer {
        &mut self.reducer
    }

    /// Append `prompt` and start streaming the reply.
    pub async fn send(&mut self, prompt: &str) -> Result<(), AppError> {
        let request = self.reducer.send(prompt)?;
        match self.transport.send(request).await {
            Ok(binding) => {
                self.active = Some(binding);
                Ok(())
            }
            Err(err) => {
                self.reducer.fail(err.to_string());
                Err(err.into())
            }
        }
    }

    /// Apply the next reply event. `None` once the reply has ended.
    pub async fn next_update(&mut self) -> Option<QuickEvent> {
        let binding = self.active.as_mut()?;
        let event = binding.recv().await;

        match &event {
            Some(QuickEvent::Chunk(text)) => self.reducer.ingest_chunk(text),
            Some(QuickEvent::Error(error)) => self.reducer.fail(error.clone()),
            Some(QuickEvent::Done { success }) => {
                self.active = None;
                if *success {
                    self.reducer.finish();
                } else if self.reducer.is_streaming() {
                    self.reducer.fail(CLOSED_TEXT);
                }
            }
            None => {
                self.active = None;
                if self.reducer.is_streaming() {
                    self.reducer.fail(CLOSED_TEXT);
                }
            }
        }
        event
    }

    /// Apply events until the reply ends.
    pub async fn wait_until_finished(&mut self) -> &QuickChatReducer {
        while self.next_update().await.is_some() {}
        &self.reducer
    }

    /// Stop the reply in flight, keeping what arrived. `false` when nothing
    /// was streaming.
    pub fn cancel(&mut self) -> bool {
        if !self.reducer.cancel() {
            return false;
        }
        if let Some(binding) = self.active.take() {
            binding.cancel();
        }
        true
    }

    /// Drop the conversation, cancelling any reply in flight.
    pub fn clear(&mut self) {
        if self.reducer.clear() {
            if let Some(binding) = self.active.take() {
                binding.cancel();
            }
        }
        self.active = None;
    }
}

// ===== Tests =====
