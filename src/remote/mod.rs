//! JSON-over-HTTP transport shared by the remote source and judge plug-ins.

use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const ERROR_SNIPPET_BYTES: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote rate limit exceeded")]
    RateLimited,

    #[error("remote error ({code}): {message}")]
    Status { code: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl RemoteError {
    pub fn is_retryable(&self) -> bool {
        match self {
            RemoteError::RateLimited => true,
            RemoteError::Status { code, .. } => (500..=599).contains(code),
            RemoteError::Malformed(_) => false,
            RemoteError::Network(e) => e.is_timeout() || e.is_connect(),
        }
    }
}

#[derive(Clone)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Posts JSON to a single endpoint, retrying transient failures with jittered backoff.
#[derive(Clone, Debug)]
pub struct RemoteClient {
    http: Client,
    endpoint: String,
    api_key: Option<ApiKey>,
    max_attempts: u32,
}

impl RemoteClient {
    pub fn new(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: None,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sent as a bearer token. Blank keys are ignored.
    pub fn with_api_key(mut self, key: &str) -> Self {
        let key = key.trim();
        self.api_key = (!key.is_empty()).then(|| ApiKey(key.to_string()));
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn post_json<Req, Resp>(&self, body: &Req) -> Result<Resp, RemoteError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            match self.post_once(body).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => {
                    last_err = Some(e);
                    if attempt + 1 < self.max_attempts {
                        let delay_ms = jittered_backoff(attempt);
                        debug!(
                            endpoint = %self.endpoint,
                            attempt = attempt + 1,
                            delay_ms,
                            "retrying after transient error"
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(RemoteError::RateLimited))
    }

    async fn post_once<Req, Resp>(&self, body: &Req) -> Result<Resp, RemoteError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let mut request = self
            .http
            .post(&self.endpoint)
            .header("User-Agent", crate::USER_AGENT)
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(&key.0);
        }

        let response = request.send().await?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!(endpoint = %self.endpoint, "remote rate limited");
            return Err(RemoteError::RateLimited);
        }

        let text = response.text().await?;
        if !status.is_success() {
            let end = text.floor_char_boundary(ERROR_SNIPPET_BYTES);
            warn!(endpoint = %self.endpoint, status = %status, "remote returned error status");
            return Err(RemoteError::Status {
                code: status.as_u16(),
                message: format!("HTTP {status}: {}", &text[..end]),
            });
        }

        serde_json::from_str(&text).map_err(|e| RemoteError::Malformed(e.to_string()))
    }
}

/// Equal jitter backoff: base/2 + rand(0, base/2).
fn jittered_backoff(attempt: u32) -> u64 {
    let base = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
    let half = base / 2;
    half + fastrand::u64(..half.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_stays_within_equal_jitter_bounds() {
        for attempt in 0..4 {
            let base = INITIAL_BACKOFF_MS * 2u64.pow(attempt);
            let delay = jittered_backoff(attempt);
            assert!(delay >= base / 2 && delay < base, "attempt {attempt}: {delay}");
        }
    }

    #[test]
    fn server_errors_and_rate_limits_are_retryable() {
        assert!(RemoteError::RateLimited.is_retryable());
        assert!(
            RemoteError::Status {
                code: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !RemoteError::Status {
                code: 404,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(!RemoteError::Malformed("eof".into()).is_retryable());
    }

    #[test]
    fn api_key_is_redacted_in_debug() {
        let client = RemoteClient::new(Client::new(), "http://localhost").with_api_key("s3cret");
        let debug = format!("{client:?}");
        assert!(!debug.contains("s3cret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
