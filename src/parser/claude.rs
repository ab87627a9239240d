//! Claude Code `stream-json` lines.
//!
//! One JSON object per line, discriminated by `type`:
//! - `system` (subtype `init`) carries `session_id`
//! - `assistant` / `user` carry a `message` whose `content` is a string or a
//!   block array (`text`, `thinking`, `tool_use`, `tool_result`)
//! - `result` closes the turn with `result` / `error` / `is_error` /
//!   `total_cost_usd` / `duration_ms`

use super::content::{
    display_json, error_text, non_empty, parse_timestamp, tool_result_text,
};
use super::{LineEvent, TerminalSummary, Turn};
use crate::model::{ContentBlock, Role, SessionId, TokenUsage, ToolCall};
use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

const SUBTYPE_INIT: &str = "init";

// ===== Raw line schema =====

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeLine {
    System {
        #[serde(default)]
        subtype: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    Assistant {
        #[serde(default)]
        message: Option<RawMessage>,
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        usage: Option<RawUsage>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    User {
        #[serde(default)]
        message: Option<RawMessage>,
        #[serde(default)]
        timestamp: Option<String>,
    },
    Result {
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        error: Option<Value>,
        #[serde(default)]
        is_error: Option<bool>,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        duration_ms: Option<f64>,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    content: Value,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(crate) struct RawUsage {
    #[serde(default)]
    input_tokens: Option<u64>,
    #[serde(default)]
    output_tokens: Option<u64>,
}

impl From<RawUsage> for TokenUsage {
    fn from(raw: RawUsage) -> Self {
        TokenUsage::new(
            raw.input_tokens.unwrap_or(0),
            raw.output_tokens.unwrap_or(0),
        )
    }
}

/// One content block. Decoded individually so an unrecognized or malformed
/// block only drops itself, never its siblings.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RawBlock {
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    Thinking {
        #[serde(default)]
        thinking: Option<String>,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        input: Value,
    },
    ToolResult {
        #[serde(default)]
        tool_use_id: Option<String>,
        #[serde(default)]
        content: Value,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

impl RawBlock {
    fn into_block(self) -> Option<ContentBlock> {
        match self {
            RawBlock::Text { text } => non_empty(text).map(ContentBlock::text),
            RawBlock::Thinking { thinking } => non_empty(thinking).map(ContentBlock::reasoning),
            RawBlock::ToolUse { id, name, input } => {
                let name = non_empty(name)?;
                Some(ContentBlock::ToolInvocation(ToolCall::new(
                    id.unwrap_or_default(),
                    name,
                    display_json(&input),
                )))
            }
            RawBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some(ContentBlock::tool_result(
                tool_use_id.unwrap_or_default(),
                tool_result_text(Some(&content)),
                is_error.unwrap_or(false),
            )),
            RawBlock::Unknown => None,
        }
    }
}

// ===== Content normalization =====

/// Normalize a `message.content` value into blocks.
///
/// A bare string is a single Text block (none when blank). An array is
/// mapped block by block, skipping anything unrecognized. Any other shape
/// yields no blocks.
pub(crate) fn content_blocks(content: Value) -> Vec<ContentBlock> {
    match content {
        Value::String(text) if text.trim().is_empty() => Vec::new(),
        Value::String(text) => vec![ContentBlock::Text { text }],
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value::<RawBlock>(item).ok())
            .filter_map(RawBlock::into_block)
            .collect(),
        _ => Vec::new(),
    }
}

// ===== Line parsing =====

pub(super) fn parse_line(line: &str) -> LineEvent {
    let decoded: ClaudeLine = match serde_json::from_str(line) {
        Ok(decoded) => decoded,
        Err(err) => {
            trace!(error = %err, "Claude line did not match any known shape");
            return LineEvent::Noise;
        }
    };

    match decoded {
        ClaudeLine::System {
            subtype,
            session_id,
        } => {
            if subtype.as_deref() != Some(SUBTYPE_INIT) {
                return LineEvent::Noise;
            }
            session_id
                .and_then(|id| SessionId::new(id).ok())
                .map(LineEvent::SessionInit)
                .unwrap_or(LineEvent::Noise)
        }
        ClaudeLine::Assistant {
            message,
            model,
            usage,
            timestamp,
        } => {
            let Some(message) = message else {
                return LineEvent::Noise;
            };
            let usage: Option<TokenUsage> = message.usage.or(usage).map(Into::into);
            if usage.is_some_and(|u| u.is_empty_output()) {
                return LineEvent::SuppressedTurn;
            }
            let content = content_blocks(message.content);
            if content.is_empty() {
                return LineEvent::Noise;
            }
            LineEvent::Turn(Turn {
                role: Role::Assistant,
                content,
                model: non_empty(message.model).or_else(|| non_empty(model)),
                usage,
                timestamp: parse_timestamp(timestamp.as_deref()),
            })
        }
        ClaudeLine::User { message, timestamp } => {
            let Some(message) = message else {
                return LineEvent::Noise;
            };
            let content = content_blocks(message.content);
            if content.is_empty() {
                return LineEvent::Noise;
            }
            let mut turn = Turn::new(Role::User, content);
            turn.timestamp = parse_timestamp(timestamp.as_deref());
            LineEvent::Turn(turn)
        }
        ClaudeLine::Result {
            result,
            error,
            is_error,
            total_cost_usd,
            duration_ms,
        } => LineEvent::Terminal(summarize_result(
            non_empty(result),
            error.as_ref().and_then(error_text),
            is_error.unwrap_or(false),
            total_cost_usd,
            duration_ms,
        )),
        ClaudeLine::Unknown => LineEvent::Noise,
    }
}

/// Build the summary for a `result` line.
///
/// Text is the result, else the error, else `Error`/`Done`; annotated with
/// ` (N.Ns)` and ` (cost: $X.XXXX)` when those are present and non-zero.
fn summarize_result(
    result: Option<String>,
    error: Option<String>,
    is_error: bool,
    total_cost_usd: Option<f64>,
    duration_ms: Option<f64>,
) -> TerminalSummary {
    let base = result
        .clone()
        .or_else(|| error.clone())
        .unwrap_or_else(|| if is_error { "Error" } else { "Done" }.to_string());

    let mut text = base;
    if let Some(ms) = duration_ms.filter(|ms| *ms != 0.0) {
        text.push_str(&format!(" ({:.1}s)", ms / 1000.0));
    }
    if let Some(cost) = total_cost_usd.filter(|c| *c != 0.0) {
        text.push_str(&format!(" (cost: ${:.4})", cost));
    }

    let error = if is_error || error.is_some() {
        Some(
            error
                .or(result)
                .unwrap_or_else(|| "Unknown error".to_string()),
        )
    } else {
        None
    };

    TerminalSummary {
        text,
        error,
        usage: None,
    }
}

// ===== Tests =====
