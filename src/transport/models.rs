//! Model catalogue for a source CLI.
//!
//! Built-in entries mirror what each CLI offers by default and always come
//! first. With credentials available, the provider's `/v1/models` listing
//! is fetched and any model not already built in is appended, newest first.
//! A failed fetch is logged and leaves the built-in list.

use super::credentials::ProviderCredentials;
use super::quick::{http_client, ANTHROPIC_VERSION};
use crate::model::{SourceCli, TransportError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// One selectable model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    /// Identifier passed as `--model`.
    pub id: String,
    /// Human-friendly label.
    pub name: String,
    /// `anthropic` or `openai`.
    pub provider: String,
    /// Family used to group models in a picker.
    pub group: String,
    /// Creation time as Unix seconds, when the provider reports it.
    pub created: Option<i64>,
}

impl ModelInfo {
    fn builtin(id: &str, name: &str, source: SourceCli) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            provider: provider_name(source).to_string(),
            group: infer_group(id),
            created: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ApiModel>,
}

#[derive(Debug, Deserialize)]
struct ApiModel {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    /// Anthropic: RFC 3339 string.
    #[serde(default)]
    created_at: Option<String>,
    /// OpenAI: Unix seconds.
    #[serde(default)]
    created: Option<i64>,
}

fn provider_name(source: SourceCli) -> &'static str {
    match source {
        SourceCli::Claude => "anthropic",
        SourceCli::Codex => "openai",
    }
}

/// Built-in models of `source`, in display order.
pub fn builtin_models(source: SourceCli) -> Vec<ModelInfo> {
    let entries: &[(&str, &str)] = match source {
        SourceCli::Claude => &[
            ("claude-sonnet-4-6", "Sonnet 4.6"),
            ("claude-opus-4-6", "Opus 4.6"),
            ("claude-haiku-4-5", "Haiku 4.5"),
        ],
        SourceCli::Codex => &[
            ("codex-mini-latest", "Codex Mini (latest)"),
            ("o4-mini", "o4 Mini"),
            ("o3", "o3"),
            ("o3-mini", "o3 Mini"),
            ("gpt-4.1", "GPT-4.1"),
            ("gpt-4.1-mini", "GPT-4.1 Mini"),
        ],
    };
    entries
        .iter()
        .map(|(id, name)| ModelInfo::builtin(id, name, source))
        .collect()
}

/// Family of a model id, for grouping.
pub fn infer_group(id: &str) -> String {
    let lower = id.to_lowercase();
    let group = if lower.contains("opus") {
        "Claude Opus"
    } else if lower.contains("sonnet") {
        "Claude Sonnet"
    } else if lower.contains("haiku") {
        "Claude Haiku"
    } else if lower.starts_with("codex") {
        "Codex"
    } else if lower.starts_with("o4") {
        "o4"
    } else if lower.starts_with("o3") {
        "o3"
    } else if lower.starts_with("o1") {
        "o1"
    } else if lower.starts_with("gpt-5") {
        "GPT-5"
    } else if lower.starts_with("gpt-4") {
        "GPT-4"
    } else if lower.starts_with("gpt-3") {
        "GPT-3.5"
    } else {
        "Other"
    };
    group.to_string()
}

/// Display name derived from a model id.
pub fn infer_name(id: &str) -> String {
    let name = id
        .replace("claude-", "Claude ")
        .replace("codex-", "Codex ")
        .replace("-latest", " (latest)")
        .replace("-preview", " (preview)");
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Built-in models followed by provider-only extras, without duplicates.
pub fn merge_models(builtin: Vec<ModelInfo>, fetched: Vec<ModelInfo>) -> Vec<ModelInfo> {
    let known: HashSet<String> = builtin.iter().map(|m| m.id.clone()).collect();
    let mut merged = builtin;
    merged.extend(fetched.into_iter().filter(|m| !known.contains(&m.id)));
    merged
}

/// Fetch the provider's model listing for `source`.
pub async fn fetch_models(
    source: SourceCli,
    api_key: &str,
    base_url: &str,
) -> Result<Vec<ModelInfo>, TransportError> {
    let url = format!("{}/v1/models", base_url.trim_end_matches('/'));
    let request = http_client()?.get(&url);
    let request = match source {
        SourceCli::Claude => request
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION),
        SourceCli::Codex => request.bearer_auth(api_key),
    };

    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(TransportError::Api {
            status: status.as_u16(),
            body,
        });
    }
    let listing: ModelsResponse = response.json().await?;

    let mut models: Vec<ModelInfo> = listing
        .data
        .into_iter()
        .map(|model| {
            let created = model.created.or_else(|| {
                model
                    .created_at
                    .as_deref()
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.timestamp())
            });
            ModelInfo {
                name: model.display_name.unwrap_or_else(|| infer_name(&model.id)),
                group: infer_group(&model.id),
                provider: provider_name(source).to_string(),
                id: model.id,
                created,
            }
        })
        .collect();
    models.sort_by(|a, b| b.created.cmp(&a.created));
    debug!(source = %source, count = models.len(), "Fetched provider models");
    Ok(models)
}

/// Every model selectable for `source`.
pub async fn list_models(source: SourceCli, credentials: &ProviderCredentials) -> Vec<ModelInfo> {
    let builtin = builtin_models(source);
    let (Some(api_key), base_url) = credentials.for_source(source) else {
        return builtin;
    };
    match fetch_models(source, api_key, base_url).await {
        Ok(fetched) => merge_models(builtin, fetched),
        Err(err) => {
            warn!(source = %source, error = %err, "Model listing failed; using built-in models");
            builtin
        }
    }
}
