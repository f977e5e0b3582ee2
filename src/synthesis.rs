//! Hand-off to the downstream report writer. The loop never synthesises itself.

use async_trait::async_trait;
use serde::Serialize;

use crate::evidence::Evidence;
use crate::orchestrator::{LoopOutcome, StopReason};

/// Everything a report writer receives once the loop stops.
#[derive(Debug, Clone, Serialize)]
pub struct Handoff {
    pub question: String,
    pub final_evidence_pool: Vec<Evidence>,
    pub outcome_reason: StopReason,
}

impl From<LoopOutcome> for Handoff {
    fn from(outcome: LoopOutcome) -> Self {
        Self {
            question: outcome.question,
            final_evidence_pool: outcome.pool,
            outcome_reason: outcome.reason,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("synthesis failed: {0}")]
pub struct SynthesisError(pub String);

/// Report produced by a [`Synthesizer`], with the tokens it spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub text: String,
    pub tokens_consumed: u64,
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, handoff: &Handoff) -> Result<Report, SynthesisError>;
}
