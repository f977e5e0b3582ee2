//! The iterative search-and-judge loop.
//!
//! ```text
//! INIT -> SEARCHING -> JUDGING -> SEARCHING -> ... -> STOPPED
//! ```
//!
//! Each pass fans the current query out to every enabled source, folds the
//! results into the evidence pool, and asks the judge whether the pool answers
//! the question. Budgets are checked before every search and after every
//! verdict; cancellation is observed at the same boundaries, never in the middle
//! of an adapter call.

mod outcome;

pub use outcome::{BudgetKind, LoopError, LoopEvent, LoopOutcome, StopReason};

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::BudgetTracker;
use crate::config::{ConfigError, LoopConfig};
use crate::dedup::{Deduplicator, Embedder};
use crate::evidence::{Evidence, SearchResult};
use crate::gather::{GatherSettings, gather};
use crate::judge::{Assessment, Judge, JudgeError, Progress};
use crate::source::{Registry, SourceAdapter};

enum State {
    Init,
    Searching,
    Judging,
    Stopped(StopReason),
}

pub struct ResearchLoop {
    config: LoopConfig,
    sources: Vec<(String, Arc<dyn SourceAdapter>)>,
    judge: Arc<dyn Judge>,
    dedup: Deduplicator,
    events: Option<UnboundedSender<LoopEvent>>,
}

impl ResearchLoop {
    /// Validates `config` and resolves its enabled sources against `registry`.
    pub fn new(
        config: LoopConfig,
        registry: &Registry<dyn SourceAdapter>,
        judge: Arc<dyn Judge>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sources = registry.resolve(config.enabled_sources.as_ref())?;
        if sources.is_empty() {
            return Err(ConfigError::NoSources);
        }

        let priority = if config.source_priority.is_empty() {
            sources.iter().map(|(name, _)| name.clone()).collect()
        } else {
            config.source_priority.clone()
        };
        let dedup = Deduplicator::new(config.dedup_threshold, priority);

        Ok(Self {
            config,
            sources,
            judge,
            dedup,
            events: None,
        })
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.dedup = self.dedup.with_embedder(embedder);
        self
    }

    /// Streams [`LoopEvent`]s to `tx`. A dropped receiver is ignored.
    pub fn with_events(mut self, tx: UnboundedSender<LoopEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    pub fn source_names(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|(name, _)| name.as_str())
    }

    pub async fn run(&self, question: &str) -> Result<LoopOutcome, LoopError> {
        self.run_until_cancelled(question, &CancellationToken::new())
            .await
    }

    pub async fn run_until_cancelled(
        &self,
        question: &str,
        cancel: &CancellationToken,
    ) -> Result<LoopOutcome, LoopError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(LoopError::EmptyQuestion);
        }

        let settings = GatherSettings {
            per_source_timeout: self.config.per_source_timeout,
            iteration_deadline: self.config.iteration_deadline,
            max_results: self.config.max_results_per_source,
        };
        let mut tracker = BudgetTracker::new(self.config.budget_limits());
        let mut pool: Vec<Evidence> = Vec::new();
        let mut history: Vec<SearchResult> = Vec::new();
        let mut query = question.to_string();
        let mut state = State::Init;

        let reason = loop {
            state = match state {
                State::Init => {
                    info!(question, sources = self.sources.len(), "research loop started");
                    self.emit(LoopEvent::Started {
                        question: question.to_string(),
                    });
                    State::Searching
                }

                State::Searching => {
                    if cancel.is_cancelled() {
                        State::Stopped(StopReason::Cancelled)
                    } else if let Some(exhausted) = tracker.exceeded() {
                        info!(reason = %exhausted, "budget exhausted before search");
                        State::Stopped(exhausted.into())
                    } else {
                        let iteration = tracker.state().iterations + 1;
                        self.emit(LoopEvent::Searching {
                            iteration,
                            query: query.clone(),
                        });

                        let gathered = match gather(&self.sources, &query, &settings).await {
                            Ok(gathered) => gathered,
                            Err(source) => {
                                warn!(iteration, %source, "stopping: no source answered");
                                return Err(LoopError::AllSourcesFailed {
                                    iteration,
                                    source,
                                    pool,
                                });
                            }
                        };

                        let found = gathered.evidence.len();
                        let failures: Vec<(String, String)> = gathered
                            .failures
                            .into_iter()
                            .map(|f| (f.source, f.error.to_string()))
                            .collect();
                        let failed: Vec<String> =
                            failures.iter().map(|(name, _)| name.clone()).collect();

                        let merge = self.dedup.merge(&pool, gathered.evidence);
                        pool = merge.pool;
                        tracker.record_iteration();
                        tracker.record_growth(merge.added.len());

                        info!(
                            iteration,
                            found,
                            added = merge.added.len(),
                            absorbed = merge.absorbed,
                            replaced = merge.replaced,
                            pool = pool.len(),
                            "search pass complete"
                        );
                        self.emit(LoopEvent::SearchComplete {
                            iteration,
                            found,
                            added: merge.added.len(),
                            failed,
                        });
                        history.push(SearchResult::new(
                            query.clone(),
                            merge.added,
                            gathered.attempted,
                            failures,
                            found,
                        ));
                        State::Judging
                    }
                }

                State::Judging => {
                    if cancel.is_cancelled() {
                        State::Stopped(StopReason::Cancelled)
                    } else {
                        let progress = Progress {
                            iteration: tracker.state().iterations,
                            max_iterations: self.config.max_iterations,
                        };
                        self.emit(LoopEvent::Judging {
                            iteration: progress.iteration,
                            pool_size: pool.len(),
                        });

                        let assessment = self.consult_judge(question, &pool, progress).await;
                        tracker.record_tokens(assessment.tokens_consumed);

                        if assessment.sufficient {
                            State::Stopped(StopReason::JudgeSatisfied)
                        } else if let Some(exhausted) = tracker.exceeded() {
                            info!(reason = %exhausted, "budget exhausted after verdict");
                            State::Stopped(exhausted.into())
                        } else {
                            match assessment.next_query() {
                                Some(next) if next != query => {
                                    debug!(from = %query, to = %next, "adopting refined query");
                                    self.emit(LoopEvent::Refined {
                                        iteration: progress.iteration,
                                        query: next.clone(),
                                    });
                                    query = next;
                                }
                                _ => {}
                            }
                            State::Searching
                        }
                    }
                }

                State::Stopped(reason) => break reason,
            };
        };

        let budget = tracker.state();
        info!(
            %reason,
            iterations = budget.iterations,
            tokens = budget.tokens,
            elapsed_ms = budget.elapsed.as_millis() as u64,
            pool = pool.len(),
            "research loop stopped"
        );
        self.emit(LoopEvent::Finished {
            reason,
            pool_size: pool.len(),
        });

        Ok(LoopOutcome {
            question: question.to_string(),
            reason,
            pool,
            history,
            budget,
            final_query: query,
        })
    }

    /// A failed or timed-out judge counts as "insufficient, keep the query, no tokens".
    async fn consult_judge(
        &self,
        question: &str,
        pool: &[Evidence],
        progress: Progress,
    ) -> Assessment {
        let verdict = timeout(
            self.config.judge_timeout,
            self.judge.assess(question, pool, progress),
        )
        .await
        .unwrap_or(Err(JudgeError::Timeout(self.config.judge_timeout)));

        match verdict {
            Ok(assessment) => {
                info!(
                    judge = self.judge.name(),
                    iteration = progress.iteration,
                    sufficient = assessment.sufficient,
                    tokens = assessment.tokens_consumed,
                    "judge verdict"
                );
                assessment
            }
            Err(error) => {
                warn!(
                    judge = self.judge.name(),
                    iteration = progress.iteration,
                    %error,
                    "judge failed (treating evidence as insufficient)"
                );
                Assessment::insufficient()
            }
        }
    }

    fn emit(&self, event: LoopEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
