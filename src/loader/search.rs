//! Case-insensitive text search across every transcript of a source.

use super::index::all_transcripts;
use super::store::{self, DataRoots};
use super::{claude, codex, load_all, read_lines};
use crate::model::{
    ContentBlock, DisplayBlock, DisplayMessage, DisplayRole, PersistedBlock, SearchHit, SourceCli,
};
use crate::parser::content::truncate;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Characters of context kept on each side of a match.
const CONTEXT_CHARS: usize = 50;
/// Length of the opening prompt attached to each hit.
const PROMPT_CHARS: usize = 100;
/// Hits taken from any one transcript.
const MAX_HITS_PER_FILE: usize = 5;

/// Up to `max_results` messages containing `query`, newest transcripts
/// first. A blank query matches nothing.
pub fn global_search(
    roots: &DataRoots,
    source: SourceCli,
    query: &str,
    max_results: usize,
) -> Vec<SearchHit> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || max_results == 0 {
        return Vec::new();
    }

    let mut files = all_transcripts(roots, source);
    files.sort_by_cached_key(|(_, _, path)| std::cmp::Reverse(store::file_times(path).1));

    let mut hits = Vec::new();
    for (project_id, project_name, path) in files {
        // Cheap whole-file check before parsing.
        let Ok(raw) = fs::read_to_string(&path) else {
            continue;
        };
        if !raw.to_lowercase().contains(&needle) {
            continue;
        }
        let Ok(messages) = load_all(source, &path) else {
            continue;
        };
        let file = FileInfo::read(source, &path, project_id, project_name, &messages);
        hits.extend(search_file(&file, &messages, &needle).take(max_results - hits.len()));
        if hits.len() >= max_results {
            break;
        }
    }
    debug!(source = %source, query, count = hits.len(), "Search finished");
    hits
}

struct FileInfo {
    source: SourceCli,
    project_id: String,
    project_name: String,
    session_id: String,
    first_prompt: Option<String>,
    file_path: String,
}

impl FileInfo {
    fn read(
        source: SourceCli,
        path: &Path,
        project_id: String,
        project_name: String,
        messages: &[DisplayMessage],
    ) -> Self {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (project_id, project_name, session_id) = match source {
            SourceCli::Claude => (project_id, project_name, stem),
            SourceCli::Codex => {
                let summary = read_lines(path)
                    .map(|lines| codex::summarize(&lines))
                    .unwrap_or_default();
                let cwd = summary.cwd.unwrap_or_default();
                (
                    cwd.clone(),
                    store::short_name(&cwd),
                    summary.session_id.unwrap_or(stem),
                )
            }
        };
        let first_prompt = messages
            .iter()
            .filter(|m| m.role == DisplayRole::User)
            .find_map(claude::first_text)
            .map(|text| truncate(&text, PROMPT_CHARS));
        Self {
            source,
            project_id,
            project_name,
            session_id,
            first_prompt,
            file_path: path.to_string_lossy().into_owned(),
        }
    }
}

fn search_file<'a>(
    file: &'a FileInfo,
    messages: &'a [DisplayMessage],
    needle: &'a str,
) -> impl Iterator<Item = SearchHit> + 'a {
    messages
        .iter()
        .flat_map(move |message| {
            message
                .content
                .iter()
                .filter_map(block_text)
                .filter(move |text| text.to_lowercase().contains(needle))
                .map(move |text| SearchHit {
                    source: file.source,
                    project_id: file.project_id.clone(),
                    project_name: file.project_name.clone(),
                    session_id: file.session_id.clone(),
                    first_prompt: file.first_prompt.clone(),
                    matched_text: context(text, needle, CONTEXT_CHARS),
                    role: role_name(message.role).to_string(),
                    timestamp: message.timestamp.clone(),
                    file_path: file.file_path.clone(),
                })
        })
        .take(MAX_HITS_PER_FILE)
}

/// Searchable text of a block.
fn block_text(block: &DisplayBlock) -> Option<&str> {
    match block {
        DisplayBlock::Content(ContentBlock::Text { text })
        | DisplayBlock::Content(ContentBlock::Reasoning { text }) => Some(text),
        DisplayBlock::Content(ContentBlock::ToolResult { content, .. }) => Some(content),
        DisplayBlock::Content(ContentBlock::ToolInvocation(call)) => Some(call.input_serialized()),
        DisplayBlock::Persisted(PersistedBlock::FunctionCall { arguments, .. }) => Some(arguments),
        DisplayBlock::Persisted(PersistedBlock::FunctionCallOutput { output, .. }) => Some(output),
    }
}

fn role_name(role: DisplayRole) -> &'static str {
    match role {
        DisplayRole::User => "user",
        DisplayRole::Assistant => "assistant",
        DisplayRole::Tool => "tool",
    }
}

/// `radius` characters either side of the first match of `needle` (already
/// lowercase) in `text`.
fn context(text: &str, needle: &str, radius: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let lower: Vec<char> = text.to_lowercase().chars().collect();
    let needle: Vec<char> = needle.chars().collect();

    // Lowercasing can change the length of some scripts; positions only
    // line up when it did not.
    let found = if lower.len() == chars.len() && !needle.is_empty() {
        lower.windows(needle.len()).position(|w| w == needle.as_slice())
    } else {
        None
    };
    match found {
        Some(pos) => {
            let start = pos.saturating_sub(radius);
            let end = (pos + needle.len() + radius).min(chars.len());
            chars[start..end].iter().collect()
        }
        None => truncate(text, radius * 2),
    }
}
