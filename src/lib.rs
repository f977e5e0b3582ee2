//! Iterative search-and-judge orchestration for biomedical evidence retrieval.
//!
//! A [`ResearchLoop`] fans a query out to every enabled [`SourceAdapter`],
//! deduplicates what comes back into a growing evidence pool, and asks a
//! [`Judge`] whether the pool answers the question. It stops when the judge is
//! satisfied or a budget runs out, and hands the pool to a downstream
//! [`synthesis::Synthesizer`].

pub mod budget;
pub mod config;
pub mod dedup;
pub mod evidence;
pub mod gather;
pub mod judge;
pub mod orchestrator;
pub mod remote;
pub mod report;
pub mod source;
pub mod synthesis;

#[cfg(test)]
pub(crate) mod testing;

pub const USER_AGENT: &str = concat!("medsift/", env!("CARGO_PKG_VERSION"));

pub use config::{ConfigError, LoopConfig};
pub use evidence::{Citation, Evidence, SearchResult};
pub use judge::{Assessment, Judge, JudgeError, Progress};
pub use orchestrator::{LoopError, LoopEvent, LoopOutcome, ResearchLoop, StopReason};
pub use source::{Registry, SourceAdapter, SourceError};
