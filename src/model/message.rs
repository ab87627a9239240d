//! Message types for live chat sessions.
//!
//! Types represent the normalized structure every source CLI is reduced to.
//! Messages are immutable once built: fields are private and the only
//! "mutators" are consuming builder methods used during construction.

use crate::model::{MessageId, TokenUsage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ===== Role =====

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Synthesized by this crate (terminal summaries)
    System,
    /// Prompt text or tool-result echoes
    User,
    /// Model output
    Assistant,
}

impl Role {
    /// Lowercase role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

// ===== ContentBlock =====

/// Unit of displayable content.
///
/// The vocabulary is closed: anything a source CLI emits that does not map
/// onto one of these variants is dropped by the parser rather than carried
/// through as an opaque value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Visible answer text (markdown)
    Text {
        /// Markdown text.
        text: String,
    },
    /// Internal deliberation, hidden by default
    Reasoning {
        /// Reasoning text.
        text: String,
    },
    /// Tool invocation by the assistant
    ToolInvocation(ToolCall),
    /// Output of a tool execution
    ToolResult {
        /// Best-effort link to the originating [`ToolCall::id`]. May be empty
        /// or reference an invocation that was never seen.
        invocation_id: String,
        /// Output text.
        content: String,
        /// Whether the tool reported failure.
        is_error: bool,
    },
}

impl ContentBlock {
    /// Text block.
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// Reasoning block.
    pub fn reasoning(text: impl Into<String>) -> Self {
        ContentBlock::Reasoning { text: text.into() }
    }

    /// Tool result block.
    pub fn tool_result(
        invocation_id: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        ContentBlock::ToolResult {
            invocation_id: invocation_id.into(),
            content: content.into(),
            is_error,
        }
    }
}

// ===== ToolCall =====

/// Tool invocation with its input already serialized for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    id: String,
    name: String,
    input_serialized: String,
}

impl ToolCall {
    /// Invocation with its input already serialized.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        input_serialized: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input_serialized: input_serialized.into(),
        }
    }

    /// Identifier referenced by a later [`ContentBlock::ToolResult`]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Tool name (Read, Bash, shell, ...)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Input parameters as display text (usually pretty-printed JSON)
    pub fn input_serialized(&self) -> &str {
        &self.input_serialized
    }
}

// ===== Message =====

/// One displayable turn in a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    id: MessageId,
    role: Role,
    content: Vec<ContentBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<TokenUsage>,
}

impl Message {
    /// New message stamped with a fresh id and the current time.
    pub fn new(role: Role, content: Vec<ContentBlock>) -> Self {
        Self {
            id: MessageId::generate(),
            role,
            content,
            model: None,
            created_at: Utc::now(),
            usage: None,
        }
    }

    /// Single-Text-block message, used for prompts and summaries.
    pub fn from_text(role: Role, text: impl Into<String>) -> Self {
        Self::new(role, vec![ContentBlock::text(text)])
    }

    /// Set the producing model.
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    /// Set the reported usage.
    pub fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }

    /// Override the arrival time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Stable id.
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Author.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Blocks in stream order.
    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    /// Producing model, when reported.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Source timestamp or arrival time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Usage reported with the turn.
    pub fn usage(&self) -> Option<TokenUsage> {
        self.usage
    }

    /// All tool invocations in this message, in block order.
    pub fn tool_calls(&self) -> Vec<&ToolCall> {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolInvocation(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    /// Concatenated visible text (Text blocks only, newline separated).
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ===== Tests =====
