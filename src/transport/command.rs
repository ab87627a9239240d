//! CLI discovery and command construction.

use super::LaunchRequest;
use crate::model::{SourceCli, TransportError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Environment variables passed through to the CLI. Everything else is
/// cleared so that variables from an enclosing CLI session do not leak in.
pub const ENV_WHITELIST: &[&str] = &[
    "PATH",
    "PATHEXT",
    "SYSTEMROOT",
    "SYSTEMDRIVE",
    "COMSPEC",
    "TEMP",
    "TMP",
    "HOME",
    "HOMEDRIVE",
    "HOMEPATH",
    "USERPROFILE",
    "USERNAME",
    "USER",
    "SHELL",
    "LANG",
    "LC_ALL",
    "LC_CTYPE",
    "NODE_PATH",
    "NVM_DIR",
    "NVM_BIN",
    "NVM_SYMLINK",
    "APPDATA",
    "LOCALAPPDATA",
    "PROGRAMFILES",
    "PROGRAMDATA",
    "HTTP_PROXY",
    "HTTPS_PROXY",
    "NO_PROXY",
    "ALL_PROXY",
];

/// Model suffix the CLI does not accept.
const LATEST_SUFFIX: &str = "-latest";

// ===== CliPaths =====

/// Per-source executable overrides (from `[cli]` in the config file).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliPaths {
    /// Executable to use for Claude.
    pub claude: Option<PathBuf>,
    /// Executable to use for Codex.
    pub codex: Option<PathBuf>,
}

impl CliPaths {
    /// Override for `source`, if configured.
    pub fn get(&self, source: SourceCli) -> Option<&Path> {
        match source {
            SourceCli::Claude => self.claude.as_deref(),
            SourceCli::Codex => self.codex.as_deref(),
        }
    }
}

// ===== Arguments =====

/// Argument vector for one run.
///
/// Claude: `[--resume ID] -p PROMPT [--model M] --output-format stream-json
/// --verbose [--dangerously-skip-permissions]`, with a trailing `-latest`
/// stripped from the model.
///
/// Codex: `exec --json [-m M] [--session ID] PROMPT`.
pub fn cli_args(request: &LaunchRequest) -> Vec<String> {
    let mut args: Vec<String> = Vec::new();
    match request.source {
        SourceCli::Claude => {
            if let Some(session) = &request.resume {
                args.extend(["--resume".to_string(), session.to_string()]);
            }
            args.extend(["-p".to_string(), request.prompt.clone()]);
            if !request.model.is_empty() {
                let model = request
                    .model
                    .strip_suffix(LATEST_SUFFIX)
                    .unwrap_or(&request.model);
                args.extend(["--model".to_string(), model.to_string()]);
            }
            args.extend([
                "--output-format".to_string(),
                "stream-json".to_string(),
                "--verbose".to_string(),
            ]);
            if request.skip_permissions {
                args.push("--dangerously-skip-permissions".to_string());
            }
        }
        SourceCli::Codex => {
            args.extend(["exec".to_string(), "--json".to_string()]);
            if !request.model.is_empty() {
                args.extend(["-m".to_string(), request.model.clone()]);
            }
            if let Some(session) = &request.resume {
                args.extend(["--session".to_string(), session.to_string()]);
            }
            args.push(request.prompt.clone());
        }
    }
    args
}

/// Full command: whitelisted environment, working directory, piped output.
pub fn build_command(program: &Path, request: &LaunchRequest) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(cli_args(request));

    cmd.env_clear();
    for key in ENV_WHITELIST {
        if let Ok(value) = std::env::var(key) {
            cmd.env(key, value);
        }
    }

    if !request.working_directory.is_empty() {
        cmd.current_dir(&request.working_directory);
    }
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }

    debug!(
        program = %program.display(),
        source = %request.source,
        model = %request.model,
        cwd = %request.working_directory,
        "Built CLI command"
    );
    cmd
}

// ===== Discovery =====

/// Locate the executable for `source`: configured override, then `PATH`,
/// then known install locations.
pub fn find_cli(source: SourceCli, override_path: Option<&Path>) -> Result<PathBuf, TransportError> {
    if let Some(path) = override_path {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        warn!(path = %path.display(), source = %source, "Configured CLI path does not exist");
    }

    if let Ok(path) = which::which(source.binary_name()) {
        return Ok(path);
    }

    known_paths(source)
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or(TransportError::CliNotFound { source_cli: source })
}

/// Install locations checked when the CLI is not on `PATH`.
pub fn known_paths(source: SourceCli) -> Vec<PathBuf> {
    let binary = source.binary_name();
    let mut paths = Vec::new();

    if let Some(home) = dirs::home_dir() {
        if cfg!(windows) {
            paths.push(home.join("AppData/Roaming/npm").join(&binary));
        } else {
            paths.push(home.join(".npm-global/bin").join(&binary));
        }

        if let Ok(entries) = std::fs::read_dir(home.join(".nvm/versions/node")) {
            for entry in entries.flatten() {
                paths.push(entry.path().join("bin").join(&binary));
            }
        }

        paths.push(home.join(".local/bin").join(&binary));
        paths.push(home.join(".bun/bin").join(&binary));
    }

    if cfg!(not(windows)) {
        paths.push(PathBuf::from("/usr/local/bin").join(&binary));
        paths.push(PathBuf::from("/opt/homebrew/bin").join(&binary));
    }

    paths
}

/// An installed CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliInstallation {
    /// Resolved executable.
    pub path: PathBuf,
    /// Output of `--version`, when it ran.
    pub version: Option<String>,
    /// Which CLI this is.
    pub source: SourceCli,
}

/// Every CLI that can be found, with its `--version` output.
pub async fn discover_installations(overrides: &CliPaths) -> Vec<CliInstallation> {
    let mut found = Vec::new();
    for source in SourceCli::ALL {
        if let Ok(path) = find_cli(source, overrides.get(source)) {
            let version = cli_version(&path).await;
            found.push(CliInstallation {
                path,
                version,
                source,
            });
        }
    }
    found
}

async fn cli_version(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("--version").output().await.ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!version.is_empty()).then_some(version)
}

// ===== Tests =====
