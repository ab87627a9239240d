//! Line event parser for live CLI output.
//!
//! Converts one raw stdout line from a source CLI into a [`LineEvent`].
//! Every function here is pure: the same `(line, source)` always produces
//! the same event, with no I/O and no shared state. Identity and arrival
//! time are assigned later, when a [`Turn`] is turned into a [`Message`].
//!
//! Lines that are blank, not JSON, or JSON of an unrecognized shape are
//! [`LineEvent::Noise`]; the parser never fails.

/// Claude Code `stream-json` lines.
pub mod claude;
/// Codex `exec --json` lines.
pub mod codex;
pub(crate) mod content;

use crate::model::{ContentBlock, Message, Role, SessionId, SourceCli, TokenUsage};
use chrono::{DateTime, Utc};

// ===== LineEvent =====

/// What one raw line means to a live session.
#[derive(Debug, Clone, PartialEq)]
pub enum LineEvent {
    /// Blank, non-JSON, or unrecognized line. Ignored.
    Noise,
    /// Init-type line reporting the CLI's session id. No visible message.
    SessionInit(SessionId),
    /// An assistant or user turn with at least one content block.
    Turn(Turn),
    /// An assistant turn reporting zero output tokens: an API-level error
    /// notice rather than content, so it is never shown.
    SuppressedTurn,
    /// End of one request/response cycle.
    Terminal(TerminalSummary),
}

impl LineEvent {
    /// Whether the line ended a request/response cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, LineEvent::Terminal(_))
    }
}

// ===== Turn =====

/// Normalized turn content, before it receives an id.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    /// Author of the turn.
    pub role: Role,
    /// Blocks in stream order.
    pub content: Vec<ContentBlock>,
    /// Model that produced the turn, when reported.
    pub model: Option<String>,
    /// Usage reported with the turn.
    pub usage: Option<TokenUsage>,
    /// Source-provided timestamp, when the line carried a valid one.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Turn {
    /// Turn with no model, usage or timestamp.
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            role,
            content,
            model: None,
            usage: None,
            timestamp: None,
        }
    }

    /// Stamp a fresh id; falls back to the current time when the line had
    /// no timestamp.
    pub fn into_message(self) -> Message {
        let created_at = self.timestamp.unwrap_or_else(Utc::now);
        Message::new(self.role, self.content)
            .with_model(self.model)
            .with_usage(self.usage)
            .with_created_at(created_at)
    }
}

// ===== TerminalSummary =====

/// Outcome of a terminal line.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalSummary {
    /// Display text, already annotated with duration/cost/tokens.
    pub text: String,
    /// Set when the line carried an error flag.
    pub error: Option<String>,
    /// Usage for the whole cycle.
    pub usage: Option<TokenUsage>,
}

impl TerminalSummary {
    /// Whether the CLI flagged the cycle as failed.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// The synthesized System-role summary message.
    pub fn to_message(&self) -> Message {
        Message::from_text(Role::System, self.text.clone()).with_usage(self.usage)
    }
}

// ===== Entry points =====

/// Parse one raw line from `source`.
pub fn parse_line(raw: &str, source: SourceCli) -> LineEvent {
    let trimmed = raw.trim();
    if trimmed.is_empty() || !trimmed.starts_with('{') {
        return LineEvent::Noise;
    }
    match source {
        SourceCli::Claude => claude::parse_line(trimmed),
        SourceCli::Codex => codex::parse_line(trimmed),
    }
}

/// Parse one line straight to the message it contributes, if any.
///
/// Turns become their message, terminal lines become the System summary,
/// everything else yields `None`. Unlike [`parse_line`] the result carries
/// a freshly generated id.
pub fn parse_message(raw: &str, source: SourceCli) -> Option<Message> {
    match parse_line(raw, source) {
        LineEvent::Turn(turn) => Some(turn.into_message()),
        LineEvent::Terminal(summary) => Some(summary.to_message()),
        LineEvent::Noise | LineEvent::SessionInit(_) | LineEvent::SuppressedTurn => None,
    }
}

// ===== Tests =====
