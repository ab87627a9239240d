//! Display types for persisted transcripts.
//!
//! The historical loader produces the same block vocabulary as the live
//! parser, extended with two variants that only exist in Codex's on-disk
//! format (function calls and their outputs are stored as separate rows
//! rather than as blocks inside a turn).

use crate::model::ContentBlock;
use serde::{Deserialize, Serialize};

/// Author of a persisted message.
///
/// Wider than [`crate::model::Role`]: Codex stores function-call outputs
/// under their own `tool` role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayRole {
    /// Prompt typed by the user.
    User,
    /// Reply from the model.
    Assistant,
    /// Codex function call output.
    Tool,
}

/// Persisted-only block variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PersistedBlock {
    /// Codex function call row.
    FunctionCall {
        /// Function name.
        name: String,
        /// Arguments, pretty-printed when they are JSON.
        arguments: String,
        /// Links the call to its output.
        call_id: String,
    },
    /// Codex function call output row.
    FunctionCallOutput {
        /// Call this output answers.
        call_id: String,
        /// Output text, truncated.
        output: String,
    },
}

/// One block of a persisted message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DisplayBlock {
    /// A block shared with live sessions.
    Content(ContentBlock),
    /// A Codex-only block.
    Persisted(PersistedBlock),
}

impl From<ContentBlock> for DisplayBlock {
    fn from(block: ContentBlock) -> Self {
        DisplayBlock::Content(block)
    }
}

impl From<PersistedBlock> for DisplayBlock {
    fn from(block: PersistedBlock) -> Self {
        DisplayBlock::Persisted(block)
    }
}

/// A message read back from a transcript file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMessage {
    /// Record id when the format stores one
    pub uuid: Option<String>,
    /// Author.
    pub role: DisplayRole,
    /// Timestamp text exactly as persisted
    pub timestamp: Option<String>,
    /// Model that produced the message, when recorded.
    pub model: Option<String>,
    /// Blocks in persisted order.
    pub content: Vec<DisplayBlock>,
}

/// One page of a transcript.
///
/// `has_more` is direction-relative: with `from_end` it means older
/// messages exist before this page, otherwise newer ones exist after it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedMessages {
    /// Messages of this page, oldest first.
    pub messages: Vec<DisplayMessage>,
    /// Messages in the whole transcript.
    pub total: usize,
    /// Zero-based page index.
    pub page: usize,
    /// Requested page size.
    pub page_size: usize,
    /// Whether another page exists in the paging direction.
    pub has_more: bool,
}
