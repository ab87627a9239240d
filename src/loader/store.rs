//! Where each CLI keeps its transcripts, and filesystem helpers for
//! walking them.

use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::trace;

/// Roots of the on-disk session stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRoots {
    /// `~/.claude`
    pub claude_home: PathBuf,
    /// `~/.codex`
    pub codex_home: PathBuf,
}

impl DataRoots {
    /// Stores under `home`.
    pub fn under(home: &Path) -> Self {
        Self {
            claude_home: home.join(".claude"),
            codex_home: home.join(".codex"),
        }
    }

    /// Stores under the user's home directory, or the working directory
    /// when there is none.
    pub fn discover() -> Self {
        Self::under(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// One directory per project, holding `<session>.jsonl` files.
    pub fn claude_projects(&self) -> PathBuf {
        self.claude_home.join("projects")
    }

    /// Aggregated usage written by the Claude CLI.
    pub fn claude_stats_cache(&self) -> PathBuf {
        self.claude_home.join("stats-cache.json")
    }

    /// `YYYY/MM/DD/rollout-*.jsonl` tree.
    pub fn codex_sessions(&self) -> PathBuf {
        self.codex_home.join("sessions")
    }
}

/// `.jsonl` files directly inside `dir`, sorted by path.
pub(crate) fn jsonl_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = read_dir(dir)
        .into_iter()
        .filter(|path| path.is_file() && is_jsonl(path))
        .collect();
    files.sort();
    files
}

/// `.jsonl` files anywhere below `dir`, sorted by path.
pub(crate) fn jsonl_files_recursive(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for path in read_dir(&dir) {
            if path.is_dir() {
                pending.push(path);
            } else if is_jsonl(&path) {
                files.push(path);
            }
        }
    }
    files.sort();
    files
}

/// Subdirectories of `dir`, sorted by path.
pub(crate) fn subdirectories(dir: &Path) -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = read_dir(dir).into_iter().filter(|p| p.is_dir()).collect();
    dirs.sort();
    dirs
}

pub(crate) fn is_jsonl(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "jsonl")
}

/// Entries of `dir`; an unreadable or missing directory has none.
fn read_dir(dir: &Path) -> Vec<PathBuf> {
    match fs::read_dir(dir) {
        Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
        Err(err) => {
            trace!(dir = %dir.display(), error = %err, "Directory not readable");
            Vec::new()
        }
    }
}

/// Creation and modification times of `path` as RFC 3339.
pub(crate) fn file_times(path: &Path) -> (Option<String>, Option<String>) {
    match fs::metadata(path) {
        Ok(meta) => (
            meta.created().ok().map(rfc3339),
            meta.modified().ok().map(rfc3339),
        ),
        Err(_) => (None, None),
    }
}

fn rfc3339(time: SystemTime) -> String {
    DateTime::<Utc>::from(time).to_rfc3339()
}

/// Last segment of a `/` or `\` separated path.
pub(crate) fn short_name(path: &str) -> String {
    path.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or(path)
        .to_string()
}
