//! Noise filter for CLI stderr.
//!
//! The CLIs write progress chatter and real failures to the same stream.
//! This heuristic drops blank lines and lines that start with a known
//! informational prefix, and surfaces everything else. False positives and
//! negatives are accepted: there is no better signal available.

/// Case-insensitive prefixes of lines that are never errors.
const NOISE_PREFIXES: &[&str] = &[
    "warning:",
    "warn:",
    "info:",
    "debug:",
    "trace:",
    "note:",
    "[request interrupted",
];

/// Classification of one stderr line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StderrLine {
    /// Progress chatter that is not an error.
    Noise,
    /// Trimmed line to show as the session error.
    Error(String),
}

/// Sort one stderr line into noise or a user-visible error.
pub fn classify(line: &str) -> StderrLine {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return StderrLine::Noise;
    }
    let lower = trimmed.to_lowercase();
    if NOISE_PREFIXES.iter().any(|prefix| lower.starts_with(prefix)) {
        return StderrLine::Noise;
    }
    StderrLine::Error(trimmed.to_string())
}

/// Shorthand for `classify(line)` being an error.
pub fn is_actual_error(line: &str) -> bool {
    matches!(classify(line), StderrLine::Error(_))
}
