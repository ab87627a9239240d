//! Codex rollout transcripts (`~/.codex/sessions/**/rollout-*.jsonl`).
//!
//! Only `response_item` rows are messages. Large payloads are truncated so a
//! single huge tool output cannot dominate a page.

use crate::model::{ContentBlock, DisplayBlock, DisplayMessage, DisplayRole, PersistedBlock};
use crate::parser::codex::{function_arguments, message_blocks, reasoning_text, CodexItem};
use crate::loader::claude::FIRST_PROMPT_CHARS;
use crate::parser::content::{display_json, non_empty, truncate};
use serde::Deserialize;
use serde_json::Value;

/// Limit for message and reasoning text.
pub const MAX_TEXT_CHARS: usize = 20_000;
/// Limit for function call output.
pub const MAX_OUTPUT_CHARS: usize = 30_000;
/// Limit for function call arguments.
pub const MAX_ARGUMENT_CHARS: usize = 10_000;

/// `session_meta` is one of the first rows.
const METADATA_LINES: usize = 5;

const UNKNOWN_FUNCTION: &str = "unknown";

#[derive(Debug, Deserialize)]
struct Row {
    #[serde(rename = "type")]
    row_type: String,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

/// Convert one rollout line. `None` for rows that are not displayable.
pub fn row(line: &str) -> Option<DisplayMessage> {
    let row: Row = serde_json::from_str(line.trim()).ok()?;
    if row.row_type != "response_item" {
        return None;
    }
    let item: CodexItem = serde_json::from_value(row.payload?).ok()?;

    let (role, content) = match item {
        CodexItem::Message { role, content } => {
            let role = match role.as_deref() {
                Some("user") => DisplayRole::User,
                Some("assistant") => DisplayRole::Assistant,
                // developer / system prompts are not part of the conversation
                _ => return None,
            };
            let blocks: Vec<DisplayBlock> = message_blocks(&content)
                .into_iter()
                .map(truncate_block)
                .map(Into::into)
                .collect();
            (role, blocks)
        }
        CodexItem::FunctionCall {
            name,
            arguments,
            call_id,
        } => {
            let block = PersistedBlock::FunctionCall {
                name: non_empty(name).unwrap_or_else(|| UNKNOWN_FUNCTION.to_string()),
                arguments: truncate(&function_arguments(&arguments), MAX_ARGUMENT_CHARS),
                call_id: call_id.unwrap_or_default(),
            };
            (DisplayRole::Assistant, vec![block.into()])
        }
        CodexItem::FunctionCallOutput { call_id, output } => {
            let output = match &output {
                Value::Null => String::new(),
                other => display_json(other),
            };
            let block = PersistedBlock::FunctionCallOutput {
                call_id: call_id.unwrap_or_default(),
                output: truncate(&output, MAX_OUTPUT_CHARS),
            };
            (DisplayRole::Tool, vec![block.into()])
        }
        CodexItem::Reasoning { text, summary } => {
            let text = reasoning_text(text.as_ref(), summary.as_ref());
            if text.is_empty() {
                return None;
            }
            (
                DisplayRole::Assistant,
                vec![ContentBlock::reasoning(text).into()],
            )
        }
        _ => return None,
    };

    if content.is_empty() {
        return None;
    }
    Some(DisplayMessage {
        uuid: None,
        role,
        timestamp: row.timestamp,
        model: None,
        content,
    })
}

fn truncate_block(block: ContentBlock) -> ContentBlock {
    match block {
        ContentBlock::Text { text } => ContentBlock::text(truncate(&text, MAX_TEXT_CHARS)),
        ContentBlock::Reasoning { text } => ContentBlock::reasoning(truncate(&text, MAX_TEXT_CHARS)),
        other => other,
    }
}

// ===== Summary =====

#[derive(Debug, Default, Deserialize)]
struct SessionMeta {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    cli_version: Option<String>,
    #[serde(default)]
    model_provider: Option<String>,
    #[serde(default)]
    git: Option<GitMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct GitMeta {
    #[serde(default)]
    branch: Option<String>,
}

/// Cumulative usage from a `token_count` event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct TotalUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// What a listing shows about one rollout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub session_id: Option<String>,
    pub cwd: Option<String>,
    pub cli_version: Option<String>,
    pub model_provider: Option<String>,
    pub git_branch: Option<String>,
    pub first_prompt: Option<String>,
    pub message_count: u32,
    /// Last cumulative usage reported in the rollout.
    pub usage: Option<TotalUsage>,
}

/// Summarize the lines of one rollout.
pub(crate) fn summarize(lines: &[String]) -> Summary {
    let mut summary = Summary::default();
    for (index, line) in lines.iter().enumerate() {
        let Ok(row) = serde_json::from_str::<Row>(line.trim()) else {
            continue;
        };
        let Some(payload) = row.payload else {
            continue;
        };
        match row.row_type.as_str() {
            "session_meta" if index < METADATA_LINES && summary.session_id.is_none() => {
                let meta: SessionMeta = serde_json::from_value(payload).unwrap_or_default();
                summary.session_id = meta.id;
                summary.cwd = meta.cwd;
                summary.cli_version = meta.cli_version;
                summary.model_provider = meta.model_provider;
                summary.git_branch = meta.git.and_then(|git| git.branch);
            }
            "response_item" => {
                if let Ok(CodexItem::Message { role, content }) = serde_json::from_value(payload) {
                    match role.as_deref() {
                        Some("developer" | "system") => {}
                        role => {
                            summary.message_count += 1;
                            if role == Some("user") && summary.first_prompt.is_none() {
                                summary.first_prompt = first_text(&content)
                                    .map(|text| truncate(&text, FIRST_PROMPT_CHARS));
                            }
                        }
                    }
                }
            }
            "event_msg" if payload.get("type").and_then(Value::as_str) == Some("token_count") => {
                let usage = payload
                    .get("info")
                    .and_then(|info| info.get("total_token_usage"))
                    .cloned()
                    .and_then(|usage| serde_json::from_value(usage).ok());
                if usage.is_some() {
                    summary.usage = usage;
                }
            }
            _ => {}
        }
    }
    summary
}

fn first_text(content: &Value) -> Option<String> {
    message_blocks(content).into_iter().find_map(|block| match block {
        ContentBlock::Text { text } if !text.trim().is_empty() => Some(text.trim().to_string()),
        _ => None,
    })
}
