//! Evidence-sufficiency judge contract.

mod remote;

pub use remote::RemoteJudge;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::evidence::Evidence;
use crate::remote::RemoteError;

/// Where the loop stands when the judge is consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub iteration: u32,
    pub max_iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub sufficient: bool,
    #[serde(default)]
    pub refined_query: Option<String>,
    #[serde(default)]
    pub tokens_consumed: u64,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl Assessment {
    pub fn sufficient() -> Self {
        Self {
            sufficient: true,
            refined_query: None,
            tokens_consumed: 0,
            reasoning: None,
        }
    }

    pub fn insufficient() -> Self {
        Self {
            sufficient: false,
            ..Self::sufficient()
        }
    }

    pub fn with_refined_query(mut self, query: impl Into<String>) -> Self {
        self.refined_query = Some(query.into());
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_consumed = tokens;
        self
    }

    /// The refined query after sanitising, if anything usable is left.
    pub fn next_query(&self) -> Option<String> {
        self.refined_query.as_deref().and_then(sanitize_query)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JudgeError {
    #[error("judge timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("judge failed: {0}")]
    Failed(String),

    #[error("{0}")]
    Remote(#[from] RemoteError),
}

/// Decides whether the accumulated pool answers the question.
///
/// Treated as slow and fallible: the loop bounds every call with a timeout and
/// reads any error as "insufficient, keep the current query".
#[async_trait]
pub trait Judge: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(
        &self,
        question: &str,
        evidence: &[Evidence],
        progress: Progress,
    ) -> Result<Assessment, JudgeError>;
}

/// Strips model control tokens (`<|endoftext|>` and friends), wrapping quotes and
/// redundant whitespace. Returns `None` when nothing remains.
pub fn sanitize_query(raw: &str) -> Option<String> {
    let mut text = raw.to_string();
    while let Some(start) = text.find("<|") {
        match text[start + 2..].find("|>") {
            Some(rel_end) => text.replace_range(start..start + 2 + rel_end + 2, " "),
            None => break,
        }
    }

    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let unquoted = collapsed
        .trim_matches(|c| c == '"' || c == '\'' || c == '`')
        .trim();
    (!unquoted.is_empty()).then(|| unquoted.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_removes_special_tokens() {
        assert_eq!(
            sanitize_query("metformin <|endoftext|> longevity<|im_end|>").as_deref(),
            Some("metformin longevity")
        );
    }

    #[test]
    fn sanitize_strips_quotes_and_whitespace() {
        assert_eq!(
            sanitize_query("  \"sglt2 inhibitors\n heart failure\"  ").as_deref(),
            Some("sglt2 inhibitors heart failure")
        );
    }

    #[test]
    fn sanitize_empty_results_in_none() {
        assert_eq!(sanitize_query(""), None);
        assert_eq!(sanitize_query("   "), None);
        assert_eq!(sanitize_query("<|endoftext|>"), None);
        assert_eq!(sanitize_query("\"\""), None);
    }

    #[test]
    fn unterminated_token_is_left_alone() {
        assert_eq!(sanitize_query("a <| b").as_deref(), Some("a <| b"));
    }

    #[test]
    fn next_query_uses_sanitised_refinement() {
        let a = Assessment::insufficient().with_refined_query("  ");
        assert_eq!(a.next_query(), None);
        let b = Assessment::insufficient().with_refined_query("'drug X phase 3'");
        assert_eq!(b.next_query().as_deref(), Some("drug X phase 3"));
    }

    #[test]
    fn assessment_deserialises_with_defaults() {
        let a: Assessment = serde_json::from_str(r#"{"sufficient": false}"#).unwrap();
        assert_eq!(a, Assessment::insufficient());
    }
}
