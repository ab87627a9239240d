//! Token usage totals per source.
//!
//! Claude aggregates its own usage into `~/.claude/stats-cache.json`; Codex
//! has no such file, so every rollout's last cumulative `token_count` is
//! summed instead.

use super::store::{self, DataRoots};
use super::{codex, read_lines};
use crate::model::{DailyTokens, LoadError, SourceCli, UsageSummary};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use tracing::debug;

const UNKNOWN_PROVIDER: &str = "unknown";

/// Usage totals of `source`. A source with no data yields zeros.
///
/// # Errors
///
/// Only for Claude: [`LoadError::Io`] or [`LoadError::Parse`] when the
/// stats cache exists but cannot be read.
pub fn usage_stats(roots: &DataRoots, source: SourceCli) -> Result<UsageSummary, LoadError> {
    let summary = match source {
        SourceCli::Claude => claude_stats(&roots.claude_stats_cache())?,
        SourceCli::Codex => codex_stats(roots),
    };
    debug!(
        source = %source,
        total_tokens = summary.total_tokens,
        sessions = summary.session_count,
        "Computed usage stats"
    );
    Ok(summary)
}

// ===== Claude =====

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsCache {
    #[serde(default)]
    daily_activity: Vec<DailyActivity>,
    #[serde(default)]
    daily_model_tokens: Vec<DailyModelTokens>,
    #[serde(default)]
    model_usage: HashMap<String, ModelUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyActivity {
    #[serde(default)]
    message_count: u64,
    #[serde(default)]
    session_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyModelTokens {
    date: String,
    #[serde(default)]
    tokens_by_model: BTreeMap<String, u64>,
}

fn claude_stats(path: &Path) -> Result<UsageSummary, LoadError> {
    if !path.exists() {
        return Ok(UsageSummary::default());
    }
    let raw = fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let cache: StatsCache = serde_json::from_str(&raw).map_err(|e| LoadError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut summary = UsageSummary::default();
    for usage in cache.model_usage.values() {
        summary.total_input_tokens +=
            usage.input_tokens + usage.cache_read_input_tokens + usage.cache_creation_input_tokens;
        summary.total_output_tokens += usage.output_tokens;
    }
    for day in &cache.daily_activity {
        summary.message_count += day.message_count;
        summary.session_count += day.session_count;
    }

    // Daily figures only carry a total; split it by the overall input share.
    let overall = summary.total_input_tokens + summary.total_output_tokens;
    let input_share = if overall > 0 {
        summary.total_input_tokens as f64 / overall as f64
    } else {
        0.5
    };
    for day in cache.daily_model_tokens {
        let day_total: u64 = day.tokens_by_model.values().sum();
        for (model, tokens) in day.tokens_by_model {
            *summary.tokens_by_model.entry(model).or_default() += tokens;
        }
        summary.total_tokens += day_total;
        let input_tokens = (day_total as f64 * input_share) as u64;
        summary.daily_tokens.push(DailyTokens {
            date: day.date,
            input_tokens,
            output_tokens: day_total.saturating_sub(input_tokens),
            total_tokens: day_total,
        });
    }
    summary.daily_tokens.sort_by(|a, b| a.date.cmp(&b.date));
    Ok(summary)
}

// ===== Codex =====

fn codex_stats(roots: &DataRoots) -> UsageSummary {
    let mut summary = UsageSummary::default();
    let mut daily: BTreeMap<String, DailyTokens> = BTreeMap::new();

    for path in store::jsonl_files_recursive(&roots.codex_sessions()) {
        let Ok(lines) = read_lines(&path) else {
            continue;
        };
        let rollout = codex::summarize(&lines);
        summary.session_count += 1;
        summary.message_count += u64::from(rollout.message_count);

        let Some(usage) = rollout.usage else {
            continue;
        };
        let total = match usage.total_tokens {
            0 => usage.input_tokens + usage.output_tokens,
            total => total,
        };
        summary.total_input_tokens += usage.input_tokens;
        summary.total_output_tokens += usage.output_tokens;
        summary.total_tokens += total;
        let provider = rollout
            .model_provider
            .unwrap_or_else(|| UNKNOWN_PROVIDER.to_string());
        *summary.tokens_by_model.entry(provider).or_default() += total;

        if let Some(date) = date_from_path(&path) {
            let day = daily.entry(date.clone()).or_insert_with(|| DailyTokens {
                date,
                input_tokens: 0,
                output_tokens: 0,
                total_tokens: 0,
            });
            day.input_tokens += usage.input_tokens;
            day.output_tokens += usage.output_tokens;
            day.total_tokens += total;
        }
    }
    summary.daily_tokens = daily.into_values().collect();
    summary
}

/// `YYYY-MM-DD` from a `.../YYYY/MM/DD/<file>` path.
fn date_from_path(path: &Path) -> Option<String> {
    let mut dirs = path.parent()?.iter().rev().filter_map(|c| c.to_str());
    let (day, month, year) = (dirs.next()?, dirs.next()?, dirs.next()?);
    let digits = |s: &str, max: usize| {
        !s.is_empty() && s.len() <= max && s.bytes().all(|b| b.is_ascii_digit())
    };
    if year.len() == 4 && digits(year, 4) && digits(month, 2) && digits(day, 2) {
        Some(format!("{}-{:0>2}-{:0>2}", year, month, day))
    } else {
        None
    }
}
