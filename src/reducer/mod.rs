//! Stream session reducer.
//!
//! [`ChatReducer`] owns the growing message list of one live chat session.
//! It is driven from a single task: every operation takes `&mut self`, so
//! two `ingest` calls can never interleave. The reducer performs no I/O;
//! `start` and `continue_session` return a [`LaunchRequest`] that the
//! caller hands to a transport.
//!
//! # State machine
//!
//! ```text
//! Idle ──start──▶ Starting ──init/turn──▶ Streaming ──terminal──▶ Completed | Errored
//!   ▲                 │                      │
//!   │                 └──────cancel──────────┴──▶ Cancelled
//!   └────────────────────────── clear ◀─────────────────────────────┘
//! ```
//!
//! `continue_session` re-enters `Streaming` from any finished state once a
//! session id has been latched.

/// Quick-chat reducer.
pub mod quick;

use crate::model::{Message, Role, SessionError, SessionId, SourceCli};
use crate::parser::{self, LineEvent};
use crate::transport::stderr::{self, StderrLine};
use crate::transport::LaunchRequest;
use tracing::{debug, info, warn};

/// Error text used when the transport reports failure without detail.
const DEFAULT_FAILURE_TEXT: &str = "Process exited with an error";

// ===== SessionState =====

/// Lifecycle state of a [`StreamSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Nothing launched yet.
    #[default]
    Idle,
    /// Launch requested; the CLI has not produced output yet.
    Starting,
    /// Output is arriving.
    Streaming,
    /// The CLI exited successfully.
    Completed,
    /// The run failed; see `last_error`.
    Errored,
    /// Stopped by the user.
    Cancelled,
}

impl SessionState {
    /// Lowercase name for logs and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Streaming => "streaming",
            SessionState::Completed => "completed",
            SessionState::Errored => "errored",
            SessionState::Cancelled => "cancelled",
        }
    }

    /// `Starting` counts as streaming: re-entrant sends must be blocked
    /// from the moment the optimistic user message is shown.
    pub fn is_streaming(&self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Streaming)
    }

    /// True once the run has ended, whatever the outcome.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Errored | SessionState::Cancelled
        )
    }
}

// ===== StreamSession =====

/// Snapshot of one live chat session.
#[derive(Debug, Clone, Default)]
pub struct StreamSession {
    session_id: Option<SessionId>,
    source: SourceCli,
    working_directory: String,
    selected_model: String,
    skip_permissions: bool,
    messages: Vec<Message>,
    state: SessionState,
    last_error: Option<String>,
    raw_output: Vec<String>,
}

impl StreamSession {
    /// Id reported by the CLI, once known.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// CLI driving the session.
    pub fn source(&self) -> SourceCli {
        self.source
    }

    /// Directory the CLI runs in.
    pub fn working_directory(&self) -> &str {
        &self.working_directory
    }

    /// Model requested at launch. Empty means the CLI default.
    pub fn selected_model(&self) -> &str {
        &self.selected_model
    }

    /// Whether permission prompts are skipped.
    pub fn skip_permissions(&self) -> bool {
        self.skip_permissions
    }

    /// Transcript so far, including the in-flight reply.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// See [`SessionState::is_streaming`].
    pub fn is_streaming(&self) -> bool {
        self.state.is_streaming()
    }

    /// Last error shown to the user.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Every stdout line ingested since the last send, verbatim.
    pub fn raw_output(&self) -> &[String] {
        &self.raw_output
    }
}

// ===== ChatReducer =====

/// Stateful accumulator for one chat surface.
#[derive(Debug, Default)]
pub struct ChatReducer {
    session: StreamSession,
}

impl ChatReducer {
    /// A reducer in `Idle`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current snapshot.
    pub fn session(&self) -> &StreamSession {
        &self.session
    }

    /// Launch a new session: `Idle → Starting`.
    ///
    /// Appends the User message before anything is sent and clears the
    /// previous error. The session id stays unset until the CLI's init
    /// line is ingested.
    pub fn start(
        &mut self,
        source: SourceCli,
        working_directory: impl Into<String>,
        prompt: &str,
        model: impl Into<String>,
        skip_permissions: bool,
    ) -> Result<LaunchRequest, SessionError> {
        if self.session.state != SessionState::Idle {
            return Err(SessionError::NotIdle {
                state: self.session.state.as_str(),
            });
        }
        let prompt = validate_prompt(prompt)?;

        self.session.source = source;
        self.session.working_directory = working_directory.into();
        self.session.selected_model = model.into();
        self.session.skip_permissions = skip_permissions;
        self.begin_turn(&prompt, SessionState::Starting);

        info!(
            source = %source,
            cwd = %self.session.working_directory,
            model = %self.session.selected_model,
            "Starting chat session"
        );
        Ok(self.launch_request(prompt, None))
    }

    /// Seed an idle reducer with a session persisted earlier, so that
    /// `continue_session` is valid without a fresh init line.
    pub fn attach(
        &mut self,
        source: SourceCli,
        working_directory: impl Into<String>,
        session_id: SessionId,
        model: impl Into<String>,
        skip_permissions: bool,
    ) -> Result<(), SessionError> {
        if self.session.state != SessionState::Idle {
            return Err(SessionError::NotIdle {
                state: self.session.state.as_str(),
            });
        }
        info!(source = %source, session_id = %session_id, "Attaching to existing session");
        self.session.source = source;
        self.session.working_directory = working_directory.into();
        self.session.selected_model = model.into();
        self.session.skip_permissions = skip_permissions;
        self.session.session_id = Some(session_id);
        self.session.state = SessionState::Completed;
        Ok(())
    }

    /// Send a follow-up prompt on the latched session.
    ///
    /// Rejected while a reply is streaming, before any session id is known,
    /// or when `session_id` is not the active one.
    pub fn continue_session(
        &mut self,
        session_id: &SessionId,
        prompt: &str,
        model: Option<String>,
    ) -> Result<LaunchRequest, SessionError> {
        let active = self
            .session
            .session_id
            .clone()
            .ok_or(SessionError::NoSession)?;
        if &active != session_id {
            return Err(SessionError::SessionMismatch {
                active: active.to_string(),
                requested: session_id.to_string(),
            });
        }
        if self.session.state.is_streaming() {
            return Err(SessionError::AlreadyStreaming);
        }
        let prompt = validate_prompt(prompt)?;

        if let Some(model) = model {
            self.session.selected_model = model;
        }
        self.begin_turn(&prompt, SessionState::Streaming);

        info!(session_id = %active, "Continuing chat session");
        Ok(self.launch_request(prompt, Some(active)))
    }

    /// Apply one stdout line, in arrival order.
    ///
    /// Returns the event the line produced so callers can react (print the
    /// new message, stop waiting on a terminal line).
    pub fn ingest(&mut self, raw: &str) -> LineEvent {
        self.session.raw_output.push(raw.to_string());
        let event = parser::parse_line(raw, self.session.source);

        match &event {
            LineEvent::Noise => {}
            LineEvent::SuppressedTurn => {
                debug!("Suppressed assistant turn with zero output tokens");
            }
            LineEvent::SessionInit(id) => {
                if self.session.session_id.as_ref() != Some(id) {
                    info!(session_id = %id, "Session id latched");
                }
                self.session.session_id = Some(id.clone());
                self.mark_streaming();
            }
            LineEvent::Turn(turn) => {
                self.session.messages.push(turn.clone().into_message());
                self.mark_streaming();
            }
            LineEvent::Terminal(summary) => {
                self.session.messages.push(summary.to_message());
                if let Some(error) = &summary.error {
                    warn!(error = %error, "Session ended with error");
                    self.session.last_error = Some(error.clone());
                }
                if self.session.state.is_streaming() {
                    self.session.state = if summary.is_error() {
                        SessionState::Errored
                    } else {
                        SessionState::Completed
                    };
                    info!(state = self.session.state.as_str(), "Session turn finished");
                }
            }
        }
        event
    }

    /// Apply one stderr line. Lines that survive the noise filter become
    /// `last_error` without ending the stream.
    pub fn ingest_stderr(&mut self, raw: &str) -> bool {
        match stderr::classify(raw) {
            StderrLine::Noise => false,
            StderrLine::Error(text) => {
                warn!(stderr = %text, "CLI reported an error");
                self.session.last_error = Some(text);
                true
            }
        }
    }

    /// Transport reported that the process ended.
    ///
    /// Only affects a session that is still streaming: a terminal line or a
    /// cancel already decided the final state.
    pub fn complete(&mut self, success: bool) {
        if !self.session.state.is_streaming() {
            debug!(
                state = self.session.state.as_str(),
                success, "Ignoring completion for finished session"
            );
            return;
        }
        if success {
            self.session.state = SessionState::Completed;
        } else {
            self.session.state = SessionState::Errored;
            if self.session.last_error.is_none() {
                self.session.last_error = Some(DEFAULT_FAILURE_TEXT.to_string());
            }
        }
        info!(state = self.session.state.as_str(), "Transport completed");
    }

    /// Record a transport-level failure (launch error, socket loss).
    ///
    /// Sets `last_error` and stops streaming. Never retried automatically.
    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        warn!(error = %error, "Transport failure");
        self.session.last_error = Some(error);
        if self.session.state != SessionState::Cancelled {
            self.session.state = SessionState::Errored;
        }
    }

    /// Mark the session cancelled. Returns `false` when nothing was
    /// streaming; already-ingested messages are kept either way.
    pub fn cancel(&mut self) -> bool {
        if !self.session.state.is_streaming() {
            return false;
        }
        info!(session_id = ?self.session.session_id, "Cancelling session");
        self.session.state = SessionState::Cancelled;
        true
    }

    /// Reset to `Idle`, dropping messages, session id and error. The
    /// source, working directory and model selection survive.
    pub fn clear(&mut self) {
        let previous = std::mem::take(&mut self.session);
        debug!(
            messages = previous.messages.len(),
            "Clearing chat session"
        );
        self.session.source = previous.source;
        self.session.working_directory = previous.working_directory;
        self.session.selected_model = previous.selected_model;
        self.session.skip_permissions = previous.skip_permissions;
    }

    // ===== helpers =====

    fn begin_turn(&mut self, prompt: &str, state: SessionState) {
        self.session
            .messages
            .push(Message::from_text(Role::User, prompt));
        self.session.last_error = None;
        self.session.raw_output.clear();
        self.session.state = state;
    }

    fn mark_streaming(&mut self) {
        if self.session.state == SessionState::Starting {
            self.session.state = SessionState::Streaming;
        }
    }

    fn launch_request(&self, prompt: String, resume: Option<SessionId>) -> LaunchRequest {
        LaunchRequest {
            source: self.session.source,
            working_directory: self.session.working_directory.clone(),
            prompt,
            model: self.session.selected_model.clone(),
            skip_permissions: self.session.skip_permissions,
            resume,
        }
    }
}

fn validate_prompt(prompt: &str) -> Result<String, SessionError> {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return Err(SessionError::EmptyPrompt);
    }
    Ok(trimmed.to_string())
}

// ===== Tests =====
