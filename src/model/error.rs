//! Error types for asv.
//!
//! This module defines a hierarchical error taxonomy using `thiserror` for structured error
//! handling. Errors compose via `?` and `From` conversions.
//!
//! # Error Hierarchy
//!
//! - [`AppError`] - Top-level application error wrapping all domain-specific failures
//!   - [`SessionError`] - Reducer rejected an operation in its current state
//!   - [`TransportError`] - Process launch, socket or HTTP failures
//!   - [`LoadError`] - Transcript file could not be read
//!   - [`crate::config::ConfigError`] - Config file unreadable or malformed
//!   - [`crate::logging::LoggingError`] - Log file could not be set up
//!
//! # Recovery Strategy
//!
//! Line-level problems are never errors at all: the parser classifies a line it cannot
//! interpret as noise and moves on. Transport errors are caught at the client boundary
//! and recorded as the session's `last_error`; they reach `main` only when the binary
//! cannot even construct a transport.

use crate::model::SourceCli;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level application error encompassing all failure modes.
#[derive(Debug, Error)]
pub enum AppError {
    /// Config file unreadable or malformed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Log file could not be set up.
    #[error("Logging error: {0}")]
    Logging(#[from] crate::logging::LoggingError),

    /// Transport could not be constructed or launched.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Rejected reducer operation.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Transcript or session store could not be read.
    #[error("Failed to load transcript: {0}")]
    Load(#[from] LoadError),

    /// Terminal or output failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reducer operation not valid in the current session state.
///
/// These are caller mistakes (a send while a reply is still streaming, a
/// continuation before the CLI reported its session id) and leave the
/// session untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `start`/`attach` require a fresh session; call `clear` first.
    #[error("Session already started (state: {state})")]
    NotIdle {
        /// Name of the state the session is in.
        state: &'static str,
    },

    /// No session id has been latched yet.
    #[error("No session id yet; wait for the CLI to report one")]
    NoSession,

    /// A send arrived while the previous reply is still streaming.
    #[error("A reply is still streaming")]
    AlreadyStreaming,

    /// Continuation addressed to a different session than the active one.
    #[error("Session mismatch: active {active}, requested {requested}")]
    SessionMismatch {
        /// Session id latched by the reducer.
        active: String,
        /// Session id the caller asked to continue.
        requested: String,
    },

    /// Prompt was empty or whitespace.
    #[error("Prompt cannot be empty")]
    EmptyPrompt,

    /// Quick chat needs an explicit model.
    #[error("No model selected")]
    NoModel,
}

/// Failure inside a transport binding.
///
/// Never thrown across the transport boundary into the reducer; the client
/// maps every variant into `last_error`.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The source CLI executable could not be located.
    #[error("{source_cli} CLI not found. Install it or set [cli] {source_cli}_path in the config")]
    CliNotFound {
        /// CLI that was looked up.
        source_cli: SourceCli,
    },

    /// The child process could not be started.
    #[error("Failed to spawn {}: {reason}", program.display())]
    Spawn {
        /// Executable that failed to start.
        program: PathBuf,
        /// OS error text.
        reason: String,
    },

    /// Source name on the wire is neither `claude` nor `codex`.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// The chat server could not be reached.
    #[error("Failed to connect to {url}: {reason}")]
    Connect {
        /// Server address.
        url: String,
        /// Connection error text.
        reason: String,
    },

    /// The shared socket failed mid-session.
    #[error("Socket error: {0}")]
    Socket(String),

    /// The connection is down (reconnect pending) or the route is gone.
    #[error("Connection closed")]
    Closed,

    /// Peer sent something that does not fit the frame protocol.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// HTTP client or request failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// No API key was found for the provider.
    #[error("Missing credentials: {0} is not set")]
    MissingCredentials(&'static str),

    /// Provider answered with a non-success status.
    #[error("API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body as returned.
        body: String,
    },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        TransportError::Socket(err.to_string())
    }
}

/// Transcript or session store failure.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The transcript does not exist.
    #[error("File not found: {}", path.display())]
    FileNotFound {
        /// Path that was looked up.
        path: PathBuf,
    },

    /// Source name is neither `claude` nor `codex`.
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// No project with this id exists for the source.
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    /// Refused to delete a file that is not a `.jsonl` transcript.
    #[error("Not a session transcript: {}", path.display())]
    NotATranscript {
        /// Path that was rejected.
        path: PathBuf,
    },

    /// A store file exists but could not be parsed.
    #[error("Failed to parse {}: {reason}", path.display())]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser error text.
        reason: String,
    },

    /// Reading, listing or deleting failed.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: std::io::Error,
    },
}
