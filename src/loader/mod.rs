//! Historical transcript loader.
//!
//! Reads a persisted session file (Claude project JSONL or Codex rollout
//! JSONL), converts every record into a [`DisplayMessage`] and returns one
//! page. Unreadable or irrelevant lines are skipped; only a missing or
//! unreadable file is an error.
//!
//! The browsing side ([`index`], [`search`], [`stats`]) walks each CLI's
//! whole session store, located by [`DataRoots`].

/// Claude project transcripts.
pub mod claude;
/// Codex rollout transcripts.
pub mod codex;
/// Project and session listings.
pub mod index;
/// Global text search.
pub mod search;
/// Token usage totals.
pub mod stats;
/// Session store locations.
pub mod store;

pub use index::{decode_project_path, delete_session, list_projects, list_sessions};
pub use search::global_search;
pub use stats::usage_stats;
pub use store::DataRoots;

use crate::model::{DisplayMessage, LoadError, PaginatedMessages, SourceCli};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, trace};

/// Load page `page` of `path`.
///
/// With `from_end`, page 0 holds the newest `page_size` messages and
/// `has_more` reports older ones; otherwise page 0 is the oldest and
/// `has_more` reports newer ones.
pub fn load_page(
    source: SourceCli,
    path: &Path,
    page: usize,
    page_size: usize,
    from_end: bool,
) -> Result<PaginatedMessages, LoadError> {
    let messages = load_all(source, path)?;
    debug!(
        path = %path.display(),
        source = %source,
        total = messages.len(),
        page,
        from_end,
        "Loaded transcript"
    );
    Ok(paginate(messages, page, page_size, from_end))
}

/// Every message of `path`, oldest first.
pub fn load_all(source: SourceCli, path: &Path) -> Result<Vec<DisplayMessage>, LoadError> {
    let lines = read_lines(path)?;
    let messages = match source {
        SourceCli::Claude => lines.iter().filter_map(|line| claude::record(line)).collect(),
        SourceCli::Codex => lines.iter().filter_map(|line| codex::row(line)).collect(),
    };
    Ok(messages)
}

/// Slice one page out of `messages`.
pub fn paginate(
    messages: Vec<DisplayMessage>,
    page: usize,
    page_size: usize,
    from_end: bool,
) -> PaginatedMessages {
    let total = messages.len();
    let skipped = page.saturating_mul(page_size);

    let (start, end, has_more) = if from_end {
        let end = total.saturating_sub(skipped);
        let start = end.saturating_sub(page_size);
        (start, end, start > 0)
    } else {
        let start = skipped.min(total);
        let end = start.saturating_add(page_size).min(total);
        (start, end, end < total)
    };

    let messages = messages
        .into_iter()
        .skip(start)
        .take(end - start)
        .collect();

    PaginatedMessages {
        messages,
        total,
        page,
        page_size,
        has_more,
    }
}

/// Non-blank lines of `path`. Lines that are not valid UTF-8 are skipped.
pub(crate) fn read_lines(path: &Path) -> Result<Vec<String>, LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut lines = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        match line {
            Ok(line) if !line.trim().is_empty() => lines.push(line),
            Ok(_) => {}
            Err(err) => trace!(line = index + 1, error = %err, "Skipping unreadable line"),
        }
    }
    Ok(lines)
}
