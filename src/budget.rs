//! Iteration, wall-clock and token ceilings for the research loop.
//!
//! Pure bookkeeping: the tracker only counts and compares. Counters never go
//! down; the loop consults [`BudgetTracker::exceeded`] at the start of each pass.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

/// Consecutive zero-growth passes that end the loop.
pub const NO_PROGRESS_LIMIT: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetLimits {
    pub max_iterations: u32,
    pub wall_clock: Duration,
    pub tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionReason {
    Iterations,
    Tokens,
    WallClock,
    NoProgress,
}

impl fmt::Display for ExhaustionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExhaustionReason::Iterations => "iterations",
            ExhaustionReason::Tokens => "token",
            ExhaustionReason::WallClock => "wall_clock",
            ExhaustionReason::NoProgress => "no_progress",
        })
    }
}

/// Snapshot of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BudgetState {
    pub iterations: u32,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub tokens: u64,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u128(d.as_millis())
}

#[derive(Debug)]
pub struct BudgetTracker {
    limits: BudgetLimits,
    started: Instant,
    iterations: u32,
    tokens: u64,
    stalled_passes: u32,
}

impl BudgetTracker {
    pub fn new(limits: BudgetLimits) -> Self {
        Self {
            limits,
            started: Instant::now(),
            iterations: 0,
            tokens: 0,
            stalled_passes: 0,
        }
    }

    pub fn limits(&self) -> &BudgetLimits {
        &self.limits
    }

    pub fn record_iteration(&mut self) {
        self.iterations = self.iterations.saturating_add(1);
    }

    pub fn record_tokens(&mut self, tokens: u64) {
        self.tokens = self.tokens.saturating_add(tokens);
    }

    /// Feeds the number of entries the pass added to the pool; zero marks a stalled pass.
    pub fn record_growth(&mut self, added: usize) {
        if added == 0 {
            self.stalled_passes = self.stalled_passes.saturating_add(1);
        } else {
            self.stalled_passes = 0;
        }
    }

    pub fn no_progress(&self) -> bool {
        self.stalled_passes > 0
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn state(&self) -> BudgetState {
        BudgetState {
            iterations: self.iterations,
            elapsed: self.elapsed(),
            tokens: self.tokens,
        }
    }

    /// First tripped ceiling, checked in order: iterations, tokens, wall clock, no progress.
    pub fn exceeded(&self) -> Option<ExhaustionReason> {
        if self.iterations >= self.limits.max_iterations {
            Some(ExhaustionReason::Iterations)
        } else if self.tokens >= self.limits.tokens {
            Some(ExhaustionReason::Tokens)
        } else if self.elapsed() >= self.limits.wall_clock {
            Some(ExhaustionReason::WallClock)
        } else if self.stalled_passes >= NO_PROGRESS_LIMIT {
            Some(ExhaustionReason::NoProgress)
        } else {
            None
        }
    }
}
