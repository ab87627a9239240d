//! Browsing types: projects, session listings, search hits and usage stats.
//!
//! All serialize in camelCase, matching [`crate::model::PaginatedMessages`].

use crate::model::SourceCli;
use serde::Serialize;
use std::collections::BTreeMap;

/// A directory the CLI was run in, with at least one transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectEntry {
    /// CLI that wrote the transcripts.
    pub source: SourceCli,
    /// Key for listing the project's sessions: the encoded directory name
    /// for Claude, the working directory for Codex.
    pub id: String,
    /// Full working directory path.
    pub display_path: String,
    /// Last path segment of `display_path`.
    pub short_name: String,
    /// Number of transcripts.
    pub session_count: usize,
    /// Most recent modification (RFC 3339).
    pub last_modified: Option<String>,
    /// Codex model provider of the project's sessions.
    pub model_provider: Option<String>,
}

/// One transcript in a project listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionEntry {
    /// CLI that wrote the transcript.
    pub source: SourceCli,
    /// The CLI's session id (usable with `chat --resume`).
    pub session_id: String,
    /// Transcript path.
    pub file_path: String,
    /// Opening user prompt, truncated.
    pub first_prompt: Option<String>,
    /// User and assistant messages in the transcript.
    pub message_count: u32,
    /// File creation time (RFC 3339), where the filesystem reports it.
    pub created: Option<String>,
    /// File modification time (RFC 3339).
    pub modified: Option<String>,
    /// Git branch recorded with the session.
    pub git_branch: Option<String>,
    /// Working directory recorded with the session.
    pub project_path: Option<String>,
    /// Claude: whether the transcript belongs to a sub-agent.
    pub is_sidechain: Option<bool>,
    /// Codex: model provider.
    pub model_provider: Option<String>,
    /// Codex: version of the CLI that wrote the transcript.
    pub cli_version: Option<String>,
}

/// One search match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// CLI that wrote the transcript.
    pub source: SourceCli,
    /// Project key, as in [`ProjectEntry::id`].
    pub project_id: String,
    /// Project short name.
    pub project_name: String,
    /// Session id of the transcript.
    pub session_id: String,
    /// Opening user prompt of the transcript, truncated.
    pub first_prompt: Option<String>,
    /// The match with surrounding context.
    pub matched_text: String,
    /// Role of the matching message (`user`, `assistant`, `tool`).
    pub role: String,
    /// Timestamp of the matching message as persisted.
    pub timestamp: Option<String>,
    /// Transcript path.
    pub file_path: String,
}

/// Token totals for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTokens {
    /// `YYYY-MM-DD`.
    pub date: String,
    /// Input tokens (including cache reads and writes).
    pub input_tokens: u64,
    /// Output tokens.
    pub output_tokens: u64,
    /// Sum reported for the day.
    pub total_tokens: u64,
}

/// Token usage across every session of a CLI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// Input tokens (including cache reads and writes).
    pub total_input_tokens: u64,
    /// Output tokens.
    pub total_output_tokens: u64,
    /// All tokens.
    pub total_tokens: u64,
    /// Totals per model (Claude) or model provider (Codex).
    pub tokens_by_model: BTreeMap<String, u64>,
    /// Per-day totals, oldest first.
    pub daily_tokens: Vec<DailyTokens>,
    /// Sessions counted.
    pub session_count: u64,
    /// Messages counted.
    pub message_count: u64,
}
