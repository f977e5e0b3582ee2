use std::fmt;

use serde::Serialize;

use crate::budget::{BudgetState, ExhaustionReason};
use crate::config::ConfigError;
use crate::evidence::{Evidence, SearchResult};
use crate::gather::AllSourcesFailedError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetKind {
    Tokens,
    WallClock,
}

/// Why the loop stopped. Every variant is a normal, successful termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    JudgeSatisfied,
    BudgetExhausted(BudgetKind),
    MaxIterations,
    NoProgress,
    Cancelled,
}

impl StopReason {
    /// False when the loop gave up before the judge was satisfied.
    pub fn is_satisfied(self) -> bool {
        self == StopReason::JudgeSatisfied
    }
}

impl From<ExhaustionReason> for StopReason {
    fn from(reason: ExhaustionReason) -> Self {
        match reason {
            ExhaustionReason::Iterations => StopReason::MaxIterations,
            ExhaustionReason::Tokens => StopReason::BudgetExhausted(BudgetKind::Tokens),
            ExhaustionReason::WallClock => StopReason::BudgetExhausted(BudgetKind::WallClock),
            ExhaustionReason::NoProgress => StopReason::NoProgress,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::JudgeSatisfied => f.write_str("JUDGE_SATISFIED"),
            StopReason::BudgetExhausted(BudgetKind::Tokens) => f.write_str("BUDGET_EXHAUSTED(token)"),
            StopReason::BudgetExhausted(BudgetKind::WallClock) => {
                f.write_str("BUDGET_EXHAUSTED(wall_clock)")
            }
            StopReason::MaxIterations => f.write_str("MAX_ITERATIONS"),
            StopReason::NoProgress => f.write_str("NO_PROGRESS"),
            StopReason::Cancelled => f.write_str("CANCELLED"),
        }
    }
}

/// Terminal value of a run.
#[derive(Debug, Clone, Serialize)]
pub struct LoopOutcome {
    pub question: String,
    pub reason: StopReason,
    /// Deduplicated evidence accumulated over every iteration.
    pub pool: Vec<Evidence>,
    /// One entry per completed iteration.
    pub history: Vec<SearchResult>,
    pub budget: BudgetState,
    pub final_query: String,
}

impl LoopOutcome {
    pub fn iterations(&self) -> usize {
        self.history.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoopError {
    #[error("question must not be empty")]
    EmptyQuestion,

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Carries the pool accumulated before the failing iteration.
    #[error("iteration {iteration}: {source}")]
    AllSourcesFailed {
        iteration: u32,
        #[source]
        source: AllSourcesFailedError,
        pool: Vec<Evidence>,
    },
}

/// Progress notifications streamed while the loop runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LoopEvent {
    Started {
        question: String,
    },
    Searching {
        iteration: u32,
        query: String,
    },
    SearchComplete {
        iteration: u32,
        found: usize,
        added: usize,
        failed: Vec<String>,
    },
    Judging {
        iteration: u32,
        pool_size: usize,
    },
    Refined {
        iteration: u32,
        query: String,
    },
    Finished {
        reason: StopReason,
        pool_size: usize,
    },
}
