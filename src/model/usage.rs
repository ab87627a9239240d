//! Token usage reported by the source CLI.

use serde::{Deserialize, Serialize};

/// Token usage statistics from a single turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Prompt tokens.
    pub input_tokens: u64,
    /// Completion tokens.
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Usage from raw counts.
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Input plus output.
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// A turn that produced no output tokens carried no real content.
    pub fn is_empty_output(&self) -> bool {
        self.output_tokens == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage::new(100, 50);
        assert_eq!(usage.total(), 150);
    }

    #[test]
    fn test_token_usage_default() {
        let usage = TokenUsage::default();
        assert_eq!(usage.input_tokens, 0);
        assert_eq!(usage.output_tokens, 0);
        assert!(usage.is_empty_output());
    }

    #[test]
    fn test_token_usage_serializes_camel_case() {
        let json = serde_json::to_value(TokenUsage::new(3, 4)).unwrap();
        assert_eq!(json["inputTokens"], 3);
        assert_eq!(json["outputTokens"], 4);
    }
}
