//! Quick-chat reducer: plain-text Q&A without tools.
//!
//! Unlike [`super::ChatReducer`] there is no line protocol here. The
//! transport delivers bare text chunks that all belong to one growing
//! assistant reply. That reply lives in a [`ReplyBuffer`] until the stream
//! ends, then it is committed to the history as an ordinary, immutable
//! [`QuickMessage`].

use crate::model::{SessionError, SourceCli};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// ===== QuickMessage =====

/// Speaker of a quick-chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuickRole {
    /// The person asking.
    User,
    /// The model.
    Assistant,
}

/// One committed quick-chat turn. Also the wire shape sent as history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickMessage {
    /// Who spoke.
    pub role: QuickRole,
    /// What was said.
    pub content: String,
}

impl QuickMessage {
    /// A user turn.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: QuickRole::User,
            content: content.into(),
        }
    }

    /// An assistant turn.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: QuickRole::Assistant,
            content: content.into(),
        }
    }
}

// ===== ReplyBuffer =====

/// The assistant reply being typed out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyBuffer {
    text: String,
    chunks: usize,
}

impl ReplyBuffer {
    /// Append one streamed chunk.
    pub fn push(&mut self, chunk: &str) {
        self.text.push_str(chunk);
        self.chunks += 1;
    }

    /// Text received so far.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of chunks pushed.
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    /// True before the first non-empty chunk.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn into_message(self) -> QuickMessage {
        QuickMessage::assistant(self.text)
    }
}

// ===== QuickRequest =====

/// Everything a quick-chat transport needs for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuickRequest {
    /// Provider family the request is routed to.
    pub source: SourceCli,
    /// Full history, ending with the new user prompt.
    pub messages: Vec<QuickMessage>,
    /// Model id; empty picks the provider default.
    pub model: String,
}

// ===== QuickChatReducer =====

/// State of the quick-chat panel: committed history plus the reply being streamed.
#[derive(Debug, Default)]
pub struct QuickChatReducer {
    source: SourceCli,
    model: String,
    history: Vec<QuickMessage>,
    reply: Option<ReplyBuffer>,
    last_error: Option<String>,
}

impl QuickChatReducer {
    /// Empty history for `source` and `model`.
    pub fn new(source: SourceCli, model: impl Into<String>) -> Self {
        Self {
            source,
            model: model.into(),
            ..Self::default()
        }
    }

    /// Selected provider family.
    pub fn source(&self) -> SourceCli {
        self.source
    }

    /// Selected model id.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Switch provider; history is kept.
    pub fn set_source(&mut self, source: SourceCli) {
        self.source = source;
    }

    /// Switch model; history is kept.
    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    /// Committed turns only.
    pub fn history(&self) -> &[QuickMessage] {
        &self.history
    }

    /// The reply in progress, if streaming.
    pub fn reply(&self) -> Option<&ReplyBuffer> {
        self.reply.as_ref()
    }

    /// True while a reply is in flight.
    pub fn is_streaming(&self) -> bool {
        self.reply.is_some()
    }

    /// Error of the last failed request, cleared by the next send.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// History plus the in-progress reply as a trailing assistant message,
    /// which is what a UI renders.
    pub fn transcript(&self) -> Vec<QuickMessage> {
        let mut messages = self.history.clone();
        if let Some(reply) = &self.reply {
            messages.push(QuickMessage::assistant(reply.as_str()));
        }
        messages
    }

    /// Append the user prompt and open an empty reply.
    pub fn send(&mut self, prompt: &str) -> Result<QuickRequest, SessionError> {
        if self.is_streaming() {
            return Err(SessionError::AlreadyStreaming);
        }
        if self.model.trim().is_empty() {
            self.last_error = Some(SessionError::NoModel.to_string());
            return Err(SessionError::NoModel);
        }
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(SessionError::EmptyPrompt);
        }

        self.history.push(QuickMessage::user(prompt));
        self.reply = Some(ReplyBuffer::default());
        self.last_error = None;
        info!(source = %self.source, model = %self.model, turns = self.history.len(), "Quick chat send");

        Ok(QuickRequest {
            source: self.source,
            messages: self.history.clone(),
            model: self.model.clone(),
        })
    }

    /// Append one text chunk to the reply. Chunks arriving after the reply
    /// was closed are dropped.
    pub fn ingest_chunk(&mut self, chunk: &str) {
        match &mut self.reply {
            Some(reply) => reply.push(chunk),
            None => debug!(len = chunk.len(), "Dropping quick-chat chunk after reply closed"),
        }
    }

    /// Stream ended normally.
    pub fn finish(&mut self) {
        if let Some(reply) = self.reply.take() {
            debug!(chunks = reply.chunk_count(), "Quick chat reply finished");
            self.history.push(reply.into_message());
        }
    }

    /// Stream failed. Any partial reply is kept.
    pub fn fail(&mut self, error: impl Into<String>) {
        let error = error.into();
        warn!(error = %error, "Quick chat failed");
        self.commit_partial();
        self.last_error = Some(error);
    }

    /// Stop streaming, keeping whatever arrived. Returns `false` when
    /// nothing was streaming.
    pub fn cancel(&mut self) -> bool {
        if !self.is_streaming() {
            return false;
        }
        info!("Quick chat cancelled");
        self.commit_partial();
        true
    }

    /// Drop the conversation. Returns `true` when a reply was still
    /// streaming, so the caller knows to cancel its transport.
    pub fn clear(&mut self) -> bool {
        let was_streaming = self.is_streaming();
        self.history.clear();
        self.reply = None;
        self.last_error = None;
        was_streaming
    }

    fn commit_partial(&mut self) {
        if let Some(reply) = self.reply.take() {
            if !reply.is_empty() {
                self.history.push(reply.into_message());
            }
        }
    }
}

// ===== Tests =====
