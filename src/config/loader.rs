//! Configuration file loading with precedence handling.

use crate::model::SourceCli;
use crate::transport::command::CliPaths;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Errors that can occur during config loading.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Config file path contains invalid UTF-8 or cannot be resolved.
    #[error("Invalid config path: {0}")]
    InvalidPath(String),

    /// Failed to read config file (permission issues, not a file).
    #[error("Failed to read config file at {}: {reason}", path.display())]
    ReadError {
        /// Path that failed to read.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// Config file contains invalid TOML or an unknown key.
    #[error("Invalid TOML in {}: {reason}", path.display())]
    ParseError {
        /// Path with invalid TOML.
        path: PathBuf,
        /// Parse error details.
        reason: String,
    },
}

/// TOML configuration file structure.
///
/// All fields are optional - if not specified, hardcoded defaults are used.
/// Corresponds to `~/.config/asv/config.toml`:
///
/// ```toml
/// default_source = "codex"
/// default_model = "gpt-5-codex"
/// remote_url = "ws://localhost:3001/ws/chat"
/// reconnect_delay_secs = 3
///
/// [cli]
/// claude_path = "/opt/claude/bin/claude"
/// ```
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// Source CLI used when `--source` is not given.
    #[serde(default)]
    pub default_source: Option<SourceCli>,

    /// Model passed to the CLI when `--model` is not given.
    #[serde(default)]
    pub default_model: Option<String>,

    /// Pass the CLI permission bypass flag on every run.
    #[serde(default)]
    pub skip_permissions: Option<bool>,

    /// Chat server WebSocket; when set, chat runs remotely.
    #[serde(default)]
    pub remote_url: Option<String>,

    /// Chat server quick-chat endpoint; when unset, quick chat calls the
    /// provider API directly.
    #[serde(default)]
    pub quick_chat_url: Option<String>,

    /// Wait before reconnecting a dropped chat server socket.
    #[serde(default)]
    pub reconnect_delay_secs: Option<u64>,

    /// Path to log file for tracing output.
    #[serde(default)]
    pub log_file_path: Option<PathBuf>,

    /// Executable overrides.
    #[serde(default)]
    pub cli: Option<CliSection>,

    /// Messages per history page.
    #[serde(default)]
    pub page_size: Option<usize>,
}

/// `[cli]` section.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CliSection {
    /// Claude executable, instead of a PATH lookup.
    #[serde(default)]
    pub claude_path: Option<PathBuf>,
    /// Codex executable, instead of a PATH lookup.
    #[serde(default)]
    pub codex_path: Option<PathBuf>,
}

/// Resolved configuration after applying precedence rules.
///
/// Created by merging defaults, config file, env vars, and CLI args.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// CLI used when `--source` is not given.
    pub default_source: SourceCli,
    /// Empty means the CLI's own default.
    pub default_model: String,
    /// Pass the CLI permission bypass flag.
    pub skip_permissions: bool,
    /// Chat server WebSocket, when chat runs remotely.
    pub remote_url: Option<String>,
    /// Chat server quick-chat endpoint.
    pub quick_chat_url: Option<String>,
    /// Wait before reconnecting the chat server socket.
    pub reconnect_delay: Duration,
    /// Log file path.
    pub log_file_path: PathBuf,
    /// Executable overrides.
    pub cli_paths: CliPaths,
    /// Messages per history page.
    pub page_size: usize,
}

/// Reconnect delay when none is configured.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
/// History page size when none is configured.
pub const DEFAULT_PAGE_SIZE: usize = 50;

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            default_source: SourceCli::Claude,
            default_model: String::new(),
            skip_permissions: false,
            remote_url: None,
            quick_chat_url: None,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            log_file_path: default_log_path(),
            cli_paths: CliPaths::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Resolve default log file path.
///
/// Returns `~/.local/state/asv/asv.log` on Linux, the platform state
/// directory elsewhere, or `asv.log` in the working directory when there
/// is none.
pub fn default_log_path() -> PathBuf {
    match dirs::state_dir() {
        Some(state_dir) => state_dir.join("asv").join("asv.log"),
        None => PathBuf::from("asv.log"),
    }
}

/// Load configuration file from a specific path.
///
/// Returns `Ok(None)` if file doesn't exist (not an error - use defaults).
///
/// # Errors
///
/// Returns error if file exists but has read or parse errors.
pub fn load_config_file(path: impl Into<PathBuf>) -> Result<Option<ConfigFile>, ConfigError> {
    let path = path.into();

    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    let config: ConfigFile = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        reason: e.to_string(),
    })?;

    Ok(Some(config))
}

/// Resolve default config file path: `~/.config/asv/config.toml` on Linux.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("asv").join("config.toml"))
}

/// Load configuration with precedence handling.
///
/// Precedence (highest to lowest):
/// 1. Explicit `config_path` argument (CLI `--config`)
/// 2. `ASV_CONFIG` environment variable
/// 3. Default path `~/.config/asv/config.toml`
///
/// Missing config files are NOT errors - defaults are used.
pub fn load_config_with_precedence(
    config_path: Option<PathBuf>,
) -> Result<Option<ConfigFile>, ConfigError> {
    if let Some(path) = config_path {
        return load_config_file(path);
    }

    if let Some(env_path) = std::env::var_os("ASV_CONFIG") {
        if env_path.is_empty() {
            return Err(ConfigError::InvalidPath("ASV_CONFIG is empty".to_string()));
        }
        return load_config_file(PathBuf::from(env_path));
    }

    match default_config_path() {
        Some(default_path) => load_config_file(default_path),
        None => Ok(None),
    }
}

/// Apply environment variable overrides to resolved config.
///
/// - `ASV_SOURCE`: `claude` or `codex` (invalid values are ignored with a warning)
/// - `ASV_MODEL`
/// - `ASV_REMOTE_URL`
/// - `ASV_SKIP_PERMISSIONS`: `1` or `true` enables, anything else disables
pub fn apply_env_overrides(mut config: ResolvedConfig) -> ResolvedConfig {
    if let Ok(source) = std::env::var("ASV_SOURCE") {
        match SourceCli::parse(&source) {
            Some(source) => config.default_source = source,
            None => warn!(value = %source, "Ignoring invalid ASV_SOURCE"),
        }
    }

    if let Ok(model) = std::env::var("ASV_MODEL") {
        config.default_model = model;
    }

    if let Ok(url) = std::env::var("ASV_REMOTE_URL") {
        config.remote_url = Some(url).filter(|url| !url.trim().is_empty());
    }

    if let Ok(flag) = std::env::var("ASV_SKIP_PERMISSIONS") {
        let flag = flag.trim().to_ascii_lowercase();
        config.skip_permissions = flag == "1" || flag == "true";
    }

    config
}

/// Merge config file into defaults to create resolved config.
///
/// For each field in `ConfigFile`, if `Some(value)`, use it; otherwise use default.
pub fn merge_config(config_file: Option<ConfigFile>) -> ResolvedConfig {
    let defaults = ResolvedConfig::default();

    let Some(config) = config_file else {
        return defaults;
    };

    let cli = config.cli.unwrap_or_default();
    ResolvedConfig {
        default_source: config.default_source.unwrap_or(defaults.default_source),
        default_model: config.default_model.unwrap_or(defaults.default_model),
        skip_permissions: config.skip_permissions.unwrap_or(defaults.skip_permissions),
        remote_url: config.remote_url.or(defaults.remote_url),
        quick_chat_url: config.quick_chat_url.or(defaults.quick_chat_url),
        reconnect_delay: config
            .reconnect_delay_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.reconnect_delay),
        log_file_path: config.log_file_path.unwrap_or(defaults.log_file_path),
        cli_paths: CliPaths {
            claude: cli.claude_path,
            codex: cli.codex_path,
        },
        page_size: config
            .page_size
            .filter(|size| *size > 0)
            .unwrap_or(defaults.page_size),
    }
}

/// Overrides taken from command-line flags. `None` means "not given".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOverrides {
    /// `--source`
    pub source: Option<SourceCli>,
    /// `--model`
    pub model: Option<String>,
    /// `--remote`
    pub remote_url: Option<String>,
    /// `--url` of `quick`
    pub quick_chat_url: Option<String>,
    /// `--skip-permissions` can only turn the flag on.
    pub skip_permissions: bool,
}

/// Apply CLI argument overrides to resolved config.
///
/// Precedence chain: Defaults → Config File → Env Vars → CLI Args (highest)
pub fn apply_cli_overrides(mut config: ResolvedConfig, overrides: CliOverrides) -> ResolvedConfig {
    if let Some(source) = overrides.source {
        config.default_source = source;
    }
    if let Some(model) = overrides.model {
        config.default_model = model;
    }
    if let Some(url) = overrides.remote_url {
        config.remote_url = Some(url);
    }
    if let Some(url) = overrides.quick_chat_url {
        config.quick_chat_url = Some(url);
    }
    if overrides.skip_permissions {
        config.skip_permissions = true;
    }
    config
}

/// Full precedence chain in one call.
pub fn resolve(
    config_path: Option<PathBuf>,
    overrides: CliOverrides,
) -> Result<ResolvedConfig, ConfigError> {
    let file = load_config_with_precedence(config_path)?;
    let config = apply_env_overrides(merge_config(file));
    Ok(apply_cli_overrides(config, overrides))
}

#[cfg(test)]
#[path = "loader_tests.rs"]
mod tests;
