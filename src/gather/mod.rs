//! Scatter-gather over every enabled source for one query.
//!
//! All adapter calls start together and share one iteration deadline; each call
//! additionally carries its own timeout no larger than that deadline. Calls that
//! miss either bound are dropped (cancelled) and reported like any other failure.
//! The merged evidence is grouped by registration order regardless of which
//! adapter finished first.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use crate::evidence::Evidence;
use crate::source::{SourceAdapter, SourceError};

#[derive(Debug, Clone, Copy)]
pub struct GatherSettings {
    pub per_source_timeout: Duration,
    pub iteration_deadline: Duration,
    pub max_results: usize,
}

#[derive(Debug)]
pub struct SourceFailure {
    pub source: String,
    pub error: SourceError,
}

/// Raw, not yet deduplicated output of one fan-out.
#[derive(Debug)]
pub struct Gathered {
    pub query: String,
    pub evidence: Vec<Evidence>,
    pub attempted: Vec<String>,
    pub failures: Vec<SourceFailure>,
}

impl Gathered {
    pub fn failed_sources(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.source.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("all {} sources failed for query '{query}'", failures.len())]
pub struct AllSourcesFailedError {
    pub query: String,
    pub failures: Vec<SourceFailure>,
}

/// Fails only when at least one source was queried and every one failed; an
/// empty source list yields an empty [`Gathered`].
pub async fn gather(
    sources: &[(String, Arc<dyn SourceAdapter>)],
    query: &str,
    settings: &GatherSettings,
) -> Result<Gathered, AllSourcesFailedError> {
    info!(
        query,
        sources = ?sources.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
        "starting scatter-gather"
    );

    let deadline = Instant::now() + settings.iteration_deadline;
    let call_budget = settings.per_source_timeout.min(settings.iteration_deadline);

    let calls = sources.iter().map(|(name, adapter)| async move {
        let call_deadline = (Instant::now() + call_budget).min(deadline);
        let outcome = match timeout_at(call_deadline, adapter.search(query, settings.max_results)).await
        {
            Ok(result) => result,
            Err(_) if call_deadline < deadline => Err(SourceError::Timeout(call_budget)),
            Err(_) => Err(SourceError::DeadlineElapsed),
        };
        (name, outcome)
    });
    let outcomes = join_all(calls).await;

    let mut evidence = Vec::new();
    let mut attempted = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();

    for (name, outcome) in outcomes {
        attempted.push(name.clone());
        match outcome {
            Ok(items) => {
                info!(source = %name, count = items.len(), "source search succeeded");
                evidence.extend(items);
            }
            Err(error) => {
                warn!(source = %name, %error, retryable = error.is_retryable(), "source search failed (continuing with other sources)");
                failures.push(SourceFailure {
                    source: name.clone(),
                    error,
                });
            }
        }
    }

    if !sources.is_empty() && failures.len() == sources.len() {
        warn!(query, "every source failed");
        return Err(AllSourcesFailedError {
            query: query.to_string(),
            failures,
        });
    }

    debug!(query, merged = evidence.len(), failed = failures.len(), "scatter-gather complete");
    Ok(Gathered {
        query: query.to_string(),
        evidence,
        attempted,
        failures,
    })
}
