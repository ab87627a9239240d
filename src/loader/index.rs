//! Project and session listings over the on-disk stores.
//!
//! Claude keeps one directory per project under `~/.claude/projects`, named
//! after the working directory with separators replaced by `-`, and may keep
//! a `sessions-index.json` with precomputed metadata next to the
//! transcripts. Codex keeps every rollout in a dated tree under
//! `~/.codex/sessions`; its projects are the distinct working directories
//! recorded in each rollout's `session_meta`.

use super::store::{self, DataRoots};
use super::{claude, codex, read_lines};
use crate::model::{LoadError, ProjectEntry, SessionEntry, SourceCli};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const SESSIONS_INDEX: &str = "sessions-index.json";

// ===== sessions-index.json =====

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionsIndex {
    #[serde(default)]
    entries: Vec<IndexEntry>,
    #[serde(default)]
    original_path: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexEntry {
    session_id: String,
    #[serde(default)]
    full_path: Option<String>,
    #[serde(default)]
    first_prompt: Option<String>,
    #[serde(default)]
    message_count: Option<u32>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    modified: Option<String>,
    #[serde(default)]
    git_branch: Option<String>,
    #[serde(default)]
    project_path: Option<String>,
    #[serde(default)]
    is_sidechain: Option<bool>,
}

impl IndexEntry {
    fn into_session(self, project_dir: &Path) -> SessionEntry {
        let file_path = self.full_path.unwrap_or_else(|| {
            project_dir
                .join(format!("{}.jsonl", self.session_id))
                .to_string_lossy()
                .into_owned()
        });
        SessionEntry {
            source: SourceCli::Claude,
            session_id: self.session_id,
            file_path,
            first_prompt: self.first_prompt,
            message_count: self.message_count.unwrap_or(0),
            created: self.created,
            modified: self.modified,
            git_branch: self.git_branch,
            project_path: self.project_path,
            is_sidechain: self.is_sidechain,
            model_provider: None,
            cli_version: None,
        }
    }
}

/// Index of `project_dir`, if present and readable.
fn read_index(project_dir: &Path) -> Option<SessionsIndex> {
    let path = project_dir.join(SESSIONS_INDEX);
    let raw = fs::read_to_string(&path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(index) => Some(index),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "Ignoring malformed sessions index");
            None
        }
    }
}

/// Working directory for an encoded Claude project name. Lossy: a `-`
/// that was part of a directory name comes back as a separator.
pub fn decode_project_path(encoded: &str) -> String {
    if cfg!(windows) {
        let mut chars = encoded.chars();
        match (chars.next(), chars.next()) {
            (Some(drive), Some('-')) => format!("{}:{}", drive, chars.as_str().replace('-', "\\")),
            _ => encoded.replace('-', "\\"),
        }
    } else {
        encoded.replace('-', "/")
    }
}

// ===== Projects =====

/// Every project of `source` with at least one transcript, most recently
/// modified first.
pub fn list_projects(roots: &DataRoots, source: SourceCli) -> Vec<ProjectEntry> {
    let mut projects = match source {
        SourceCli::Claude => claude_projects(roots),
        SourceCli::Codex => codex_projects(roots),
    };
    projects.sort_by(|a, b| b.last_modified.cmp(&a.last_modified));
    debug!(source = %source, count = projects.len(), "Listed projects");
    projects
}

fn claude_projects(roots: &DataRoots) -> Vec<ProjectEntry> {
    store::subdirectories(&roots.claude_projects())
        .into_iter()
        .filter_map(|dir| {
            let id = dir.file_name()?.to_str()?.to_string();
            let session_count = store::jsonl_files(&dir).len();
            if session_count == 0 {
                return None;
            }
            let display_path = read_index(&dir)
                .and_then(|index| index.original_path)
                .unwrap_or_else(|| decode_project_path(&id));
            Some(ProjectEntry {
                source: SourceCli::Claude,
                short_name: store::short_name(&display_path),
                display_path,
                id,
                session_count,
                last_modified: store::file_times(&dir).1,
                model_provider: None,
            })
        })
        .collect()
}

fn codex_projects(roots: &DataRoots) -> Vec<ProjectEntry> {
    let mut by_cwd: BTreeMap<String, ProjectEntry> = BTreeMap::new();
    for session in codex_sessions(roots) {
        let Some(cwd) = session.project_path.clone().filter(|cwd| !cwd.is_empty()) else {
            continue;
        };
        let project = by_cwd.entry(cwd.clone()).or_insert_with(|| ProjectEntry {
            source: SourceCli::Codex,
            short_name: store::short_name(&cwd),
            display_path: cwd.clone(),
            id: cwd,
            session_count: 0,
            last_modified: None,
            model_provider: None,
        });
        project.session_count += 1;
        if session.modified > project.last_modified {
            project.last_modified = session.modified;
        }
        if project.model_provider.is_none() {
            project.model_provider = session.model_provider;
        }
    }
    by_cwd.into_values().collect()
}

// ===== Sessions =====

/// Sessions of one project, most recently modified first. Empty sessions
/// are left out.
///
/// `project_id` is [`ProjectEntry::id`]: the encoded directory name for
/// Claude, the working directory for Codex.
///
/// # Errors
///
/// [`LoadError::ProjectNotFound`] when Claude has no such project directory.
pub fn list_sessions(
    roots: &DataRoots,
    source: SourceCli,
    project_id: &str,
) -> Result<Vec<SessionEntry>, LoadError> {
    let mut sessions = match source {
        SourceCli::Claude => claude_sessions(roots, project_id)?,
        SourceCli::Codex => codex_sessions(roots)
            .into_iter()
            .filter(|s| s.project_path.as_deref() == Some(project_id))
            .collect(),
    };
    sessions.retain(|s| s.message_count > 0);
    sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
    debug!(source = %source, project = project_id, count = sessions.len(), "Listed sessions");
    Ok(sessions)
}

fn claude_sessions(roots: &DataRoots, project_id: &str) -> Result<Vec<SessionEntry>, LoadError> {
    let project_dir = roots.claude_projects().join(project_id);
    if project_id.is_empty() || !project_dir.is_dir() {
        return Err(LoadError::ProjectNotFound(project_id.to_string()));
    }
    let on_disk = store::jsonl_files(&project_dir);

    let Some(index) = read_index(&project_dir).filter(|index| !index.entries.is_empty()) else {
        return Ok(on_disk.iter().filter_map(|path| claude_session(path)).collect());
    };

    let original_path = index.original_path;
    let indexed: HashSet<String> = index.entries.iter().map(|e| e.session_id.clone()).collect();
    let mut sessions: Vec<SessionEntry> = index
        .entries
        .into_iter()
        .map(|entry| entry.into_session(&project_dir))
        .collect();
    // Transcripts written after the index was last refreshed.
    sessions.extend(
        on_disk
            .iter()
            .filter(|path| session_stem(path).is_some_and(|id| !indexed.contains(id)))
            .filter_map(|path| claude_session(path)),
    );
    for session in &mut sessions {
        if session.project_path.is_none() {
            session.project_path = original_path.clone();
        }
    }
    Ok(sessions)
}

fn session_stem(path: &Path) -> Option<&str> {
    path.file_stem()?.to_str().filter(|stem| !stem.is_empty())
}

fn claude_session(path: &Path) -> Option<SessionEntry> {
    let session_id = session_stem(path)?.to_string();
    let lines = read_lines(path).ok()?;
    let summary = claude::summarize(&lines);
    let (created, modified) = store::file_times(path);
    Some(SessionEntry {
        source: SourceCli::Claude,
        session_id,
        file_path: path.to_string_lossy().into_owned(),
        first_prompt: summary.first_prompt,
        message_count: summary.message_count,
        created,
        modified,
        git_branch: summary.git_branch,
        project_path: summary.cwd,
        is_sidechain: summary.is_sidechain,
        model_provider: None,
        cli_version: None,
    })
}

/// Every Codex rollout, summarized.
pub(crate) fn codex_sessions(roots: &DataRoots) -> Vec<SessionEntry> {
    store::jsonl_files_recursive(&roots.codex_sessions())
        .iter()
        .filter_map(|path| codex_session(path))
        .collect()
}

fn codex_session(path: &Path) -> Option<SessionEntry> {
    let lines = read_lines(path).ok()?;
    let summary = codex::summarize(&lines);
    let session_id = summary
        .session_id
        .or_else(|| session_stem(path).map(str::to_string))?;
    let (created, modified) = store::file_times(path);
    Some(SessionEntry {
        source: SourceCli::Codex,
        session_id,
        file_path: path.to_string_lossy().into_owned(),
        first_prompt: summary.first_prompt,
        message_count: summary.message_count,
        created,
        modified,
        git_branch: summary.git_branch,
        project_path: summary.cwd,
        is_sidechain: None,
        model_provider: summary.model_provider,
        cli_version: summary.cli_version,
    })
}

// ===== Delete =====

/// Remove one transcript from disk.
///
/// # Errors
///
/// [`LoadError::FileNotFound`] if `path` does not exist,
/// [`LoadError::NotATranscript`] unless it is a `.jsonl` file, and
/// [`LoadError::Io`] if removal fails.
pub fn delete_session(path: &Path) -> Result<(), LoadError> {
    if !path.exists() {
        return Err(LoadError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    if !path.is_file() || !store::is_jsonl(path) {
        return Err(LoadError::NotATranscript {
            path: path.to_path_buf(),
        });
    }
    fs::remove_file(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), "Deleted session transcript");
    Ok(())
}

/// Every transcript of `source` with the project it belongs to:
/// `(project id, project short name, path)`.
pub(crate) fn all_transcripts(roots: &DataRoots, source: SourceCli) -> Vec<(String, String, PathBuf)> {
    match source {
        SourceCli::Claude => store::subdirectories(&roots.claude_projects())
            .into_iter()
            .filter_map(|dir| {
                let id = dir.file_name()?.to_str()?.to_string();
                Some((id, dir))
            })
            .flat_map(|(id, dir)| {
                let name = store::short_name(&decode_project_path(&id));
                store::jsonl_files(&dir)
                    .into_iter()
                    .map(move |path| (id.clone(), name.clone(), path))
            })
            .collect(),
        SourceCli::Codex => store::jsonl_files_recursive(&roots.codex_sessions())
            .into_iter()
            .map(|path| (String::new(), String::new(), path))
            .collect(),
    }
}
