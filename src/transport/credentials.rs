//! Provider credentials for quick chat and model listing.
//!
//! The CLIs keep their own credentials: Claude Code in
//! `~/.claude/settings.json` (`env` table), Codex in `~/.codex/auth.json`
//! with its provider table in `~/.codex/config.toml`. Those win; the
//! `ANTHROPIC_*` / `OPENAI_*` environment variables fill whatever the files
//! leave unset. Unreadable or malformed files count as empty.

use crate::model::SourceCli;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default Anthropic API base.
pub const ANTHROPIC_DEFAULT_BASE: &str = "https://api.anthropic.com";
/// Default OpenAI API base.
pub const OPENAI_DEFAULT_BASE: &str = "https://api.openai.com";

// ===== On-disk formats =====

#[derive(Debug, Default, Deserialize)]
struct ClaudeSettings {
    #[serde(default)]
    env: HashMap<String, String>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CodexAuth {
    #[serde(default, rename = "OPENAI_API_KEY")]
    openai_api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CodexConfig {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    model_provider: Option<String>,
    #[serde(default)]
    model_providers: HashMap<String, CodexProvider>,
}

#[derive(Debug, Default, Deserialize)]
struct CodexProvider {
    #[serde(default)]
    base_url: Option<String>,
}

// ===== CliSettings =====

/// What one CLI's configuration says about reaching its provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliSettings {
    /// Which CLI the settings belong to.
    pub source: SourceCli,
    /// API key or auth token, if any was found.
    pub api_key: Option<String>,
    /// Provider API base URL.
    pub base_url: String,
    /// Model the CLI uses by default; `None` when not configured.
    pub default_model: Option<String>,
    /// The file the settings were read from.
    pub config_path: PathBuf,
}

impl CliSettings {
    /// Read the settings of `source` under the home directory `home`,
    /// consulting `env` for anything the files leave unset.
    pub fn read<F>(source: SourceCli, home: &Path, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| non_blank(env(key));
        match source {
            SourceCli::Claude => {
                let config_path = home.join(".claude").join("settings.json");
                let settings: ClaudeSettings = read_json(&config_path).unwrap_or_default();
                let setting = |key: &str| non_blank(settings.env.get(key).cloned());

                let api_key = setting("ANTHROPIC_AUTH_TOKEN")
                    .or_else(|| setting("ANTHROPIC_API_KEY"))
                    .or_else(|| env("ANTHROPIC_API_KEY"));
                let base_url = setting("ANTHROPIC_BASE_URL")
                    .or_else(|| env("ANTHROPIC_BASE_URL"))
                    .unwrap_or_else(|| ANTHROPIC_DEFAULT_BASE.to_string());

                Self {
                    source,
                    api_key,
                    base_url,
                    default_model: non_blank(settings.model),
                    config_path,
                }
            }
            SourceCli::Codex => {
                let codex_dir = home.join(".codex");
                let auth: CodexAuth = read_json(&codex_dir.join("auth.json")).unwrap_or_default();
                let config_path = codex_dir.join("config.toml");
                let config: CodexConfig = read_toml(&config_path).unwrap_or_default();

                let api_key = non_blank(auth.openai_api_key).or_else(|| env("OPENAI_API_KEY"));
                let base_url = config
                    .model_provider
                    .as_deref()
                    .and_then(|name| config.model_providers.get(name))
                    .and_then(|provider| non_blank(provider.base_url.clone()))
                    .or_else(|| env("OPENAI_BASE_URL"))
                    .unwrap_or_else(|| OPENAI_DEFAULT_BASE.to_string());

                Self {
                    source,
                    api_key,
                    base_url,
                    default_model: non_blank(config.model),
                    config_path,
                }
            }
        }
    }

    /// Settings of `source` for the current user.
    pub fn discover(source: SourceCli) -> Self {
        let home = dirs::home_dir().unwrap_or_default();
        Self::read(source, &home, |key| std::env::var(key).ok())
    }

    /// The key with everything but its first three and last four
    /// characters hidden; short keys are fully masked.
    pub fn masked_key(&self) -> String {
        self.api_key.as_deref().map(mask_key).unwrap_or_default()
    }
}

fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let prefix: String = chars[..3].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{prefix}...{suffix}")
}

// ===== ProviderCredentials =====

/// API keys and base URLs for the direct provider binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    /// Key sent as `x-api-key` to the Anthropic API.
    pub anthropic_api_key: Option<String>,
    /// Anthropic API base URL, without the `/v1/...` path.
    pub anthropic_base_url: String,
    /// Bearer token for the OpenAI-compatible API.
    pub openai_api_key: Option<String>,
    /// OpenAI-compatible API base URL, without the `/v1/...` path.
    pub openai_base_url: String,
}

impl Default for ProviderCredentials {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_base_url: ANTHROPIC_DEFAULT_BASE.to_string(),
            openai_api_key: None,
            openai_base_url: OPENAI_DEFAULT_BASE.to_string(),
        }
    }
}

impl ProviderCredentials {
    /// Read `ANTHROPIC_API_KEY`, `ANTHROPIC_BASE_URL`, `OPENAI_API_KEY` and
    /// `OPENAI_BASE_URL`. Blank values count as unset.
    pub fn from_env() -> Self {
        let var = |key: &str| non_blank(std::env::var(key).ok());
        let defaults = Self::default();
        Self {
            anthropic_api_key: var("ANTHROPIC_API_KEY"),
            anthropic_base_url: var("ANTHROPIC_BASE_URL").unwrap_or(defaults.anthropic_base_url),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_base_url: var("OPENAI_BASE_URL").unwrap_or(defaults.openai_base_url),
        }
    }

    /// Combine the settings of both CLIs.
    pub fn from_settings(claude: &CliSettings, codex: &CliSettings) -> Self {
        Self {
            anthropic_api_key: claude.api_key.clone(),
            anthropic_base_url: claude.base_url.clone(),
            openai_api_key: codex.api_key.clone(),
            openai_base_url: codex.base_url.clone(),
        }
    }

    /// CLI configuration files first, then the environment.
    pub fn discover() -> Self {
        let claude = CliSettings::discover(SourceCli::Claude);
        let codex = CliSettings::discover(SourceCli::Codex);
        debug!(
            claude_config = %claude.config_path.display(),
            claude_key = claude.api_key.is_some(),
            codex_config = %codex.config_path.display(),
            codex_key = codex.api_key.is_some(),
            "Discovered provider credentials"
        );
        Self::from_settings(&claude, &codex)
    }

    /// Key and base URL for `source`.
    pub fn for_source(&self, source: SourceCli) -> (Option<&str>, &str) {
        match source {
            SourceCli::Claude => (
                self.anthropic_api_key.as_deref(),
                self.anthropic_base_url.as_str(),
            ),
            SourceCli::Codex => (
                self.openai_api_key.as_deref(),
                self.openai_base_url.as_str(),
            ),
        }
    }
}

// ===== Helpers =====

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&content)
        .map_err(|err| debug!(path = %path.display(), error = %err, "Ignoring malformed CLI config"))
        .ok()
}

fn read_toml<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = std::fs::read_to_string(path).ok()?;
    toml::from_str(&content)
        .map_err(|err| debug!(path = %path.display(), error = %err, "Ignoring malformed CLI config"))
        .ok()
}
