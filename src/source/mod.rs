//! Source adapter contract and the registry that resolves adapters by name.

mod registry;
mod remote;

pub use registry::{Registry, RegistryError};
pub use remote::RemoteSource;

use std::time::Duration;

use async_trait::async_trait;

use crate::evidence::Evidence;
use crate::remote::RemoteError;

/// Per-adapter failure. Isolated by the coordinator; never fatal to the loop on its own.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("rate limited")]
    RateLimited,

    #[error("timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("cancelled: iteration deadline elapsed")]
    DeadlineElapsed,

    #[error("{message}")]
    Failed { message: String, retryable: bool },

    #[error("{0}")]
    Remote(#[from] RemoteError),
}

impl SourceError {
    pub fn failed(message: impl Into<String>, retryable: bool) -> Self {
        SourceError::Failed {
            message: message.into(),
            retryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::RateLimited | SourceError::Timeout(_) | SourceError::DeadlineElapsed => {
                true
            }
            SourceError::Failed { retryable, .. } => *retryable,
            SourceError::Remote(e) => e.is_retryable(),
        }
    }
}

/// A literature or trials database the loop can query.
///
/// Implementations own query construction and response parsing; the loop only
/// sees ordered evidence or a [`SourceError`].
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Evidence>, SourceError>;
}
