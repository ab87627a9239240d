//! Source CLI identification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The external CLI whose output is being parsed or proxied.
///
/// The two CLIs emit structurally different stream schemas and persist
/// transcripts in different on-disk formats. Everything downstream of the
/// parser is source-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCli {
    /// Claude Code (`claude -p --output-format stream-json`)
    #[default]
    Claude,
    /// Codex CLI (`codex exec --json`)
    Codex,
}

impl SourceCli {
    /// All supported sources, in discovery order.
    pub const ALL: [SourceCli; 2] = [SourceCli::Claude, SourceCli::Codex];

    /// Parse the wire identifier (`"claude"` / `"codex"`).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            _ => None,
        }
    }

    /// Canonical wire identifier.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Codex => "codex",
        }
    }

    /// Executable name on the current platform.
    pub fn binary_name(&self) -> String {
        if cfg!(windows) {
            format!("{}.exe", self.as_str())
        } else {
            self.as_str().to_string()
        }
    }
}

impl fmt::Display for SourceCli {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized source identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown source: {0}")]
pub struct UnknownSource(pub String);

impl FromStr for SourceCli {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| UnknownSource(s.to_string()))
    }
}
