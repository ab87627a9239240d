//! Claude project transcripts (`~/.claude/projects/<project>/<session>.jsonl`).

use crate::model::{ContentBlock, DisplayBlock, DisplayMessage, DisplayRole};
use crate::parser::claude::content_blocks;
use crate::parser::content::truncate;
use serde::Deserialize;
use serde_json::Value;

/// Record types that are never messages and can be large.
const SKIP_TYPES: &[&str] = &["file-history-snapshot", "progress"];

/// Session metadata is written on one of the first records.
const METADATA_LINES: usize = 10;

/// Length of the opening prompt shown in listings.
pub(crate) const FIRST_PROMPT_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(rename = "type")]
    record_type: String,
    #[serde(default)]
    uuid: Option<String>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    message: Option<RecordMessage>,
}

#[derive(Debug, Deserialize)]
struct RecordMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Value,
    #[serde(default)]
    model: Option<String>,
}

/// Convert one transcript line. `None` for anything that is not a
/// user or assistant message with visible content.
pub fn record(line: &str) -> Option<DisplayMessage> {
    let trimmed = line.trim();
    // Cheap pre-filter before parsing snapshot records.
    if SKIP_TYPES
        .iter()
        .any(|kind| trimmed.contains(&format!("\"type\":\"{}\"", kind)))
    {
        return None;
    }

    let record: Record = serde_json::from_str(trimmed).ok()?;
    let role = match record.record_type.as_str() {
        "user" => DisplayRole::User,
        "assistant" => DisplayRole::Assistant,
        _ => return None,
    };
    let message = record.message?;
    let role = match message.role.as_deref() {
        Some("assistant") => DisplayRole::Assistant,
        Some("user") => DisplayRole::User,
        _ => role,
    };

    let content: Vec<_> = content_blocks(message.content)
        .into_iter()
        .map(Into::into)
        .collect();
    if content.is_empty() {
        return None;
    }

    Some(DisplayMessage {
        uuid: record.uuid,
        role,
        timestamp: record.timestamp,
        model: message.model,
        content,
    })
}

// ===== Summary =====

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MetaRecord {
    #[serde(rename = "type", default)]
    record_type: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default)]
    git_branch: Option<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    is_sidechain: Option<bool>,
}

/// What a listing shows about one transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Summary {
    pub session_id: Option<String>,
    pub git_branch: Option<String>,
    pub cwd: Option<String>,
    pub is_sidechain: Option<bool>,
    pub first_prompt: Option<String>,
    pub message_count: u32,
}

/// Summarize the lines of one transcript.
pub(crate) fn summarize(lines: &[String]) -> Summary {
    let mut summary = Summary::default();
    for (index, line) in lines.iter().enumerate() {
        let Ok(meta) = serde_json::from_str::<MetaRecord>(line.trim()) else {
            continue;
        };
        if index < METADATA_LINES && summary.session_id.is_none() && meta.session_id.is_some() {
            summary.session_id = meta.session_id;
            summary.git_branch = meta.git_branch.filter(|b| !b.is_empty());
            summary.cwd = meta.cwd;
            summary.is_sidechain = meta.is_sidechain;
        }
        if matches!(meta.record_type.as_deref(), Some("user" | "assistant")) {
            summary.message_count += 1;
            if summary.first_prompt.is_none() {
                summary.first_prompt = record(line)
                    .filter(|msg| msg.role == DisplayRole::User)
                    .and_then(|msg| first_text(&msg))
                    .map(|text| truncate(&text, FIRST_PROMPT_CHARS));
            }
        }
    }
    summary
}

/// First visible text block of `message`.
pub(crate) fn first_text(message: &DisplayMessage) -> Option<String> {
    message.content.iter().find_map(|block| match block {
        DisplayBlock::Content(ContentBlock::Text { text }) if !text.trim().is_empty() => {
            Some(text.trim().to_string())
        }
        _ => None,
    })
}
