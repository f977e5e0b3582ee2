use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{SourceAdapter, SourceError};
use crate::evidence::{Citation, Evidence};
use crate::remote::RemoteClient;

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<RemoteRecord>,
}

#[derive(Debug, Deserialize)]
struct RemoteRecord {
    #[serde(default)]
    content: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    date: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    relevance: Option<f64>,
    #[serde(default)]
    metadata: BTreeMap<String, Value>,
}

/// Adapter for any source exposed behind the JSON search endpoint contract:
/// `POST {query, max_results}` → `{results: [...]}`.
#[derive(Clone, Debug)]
pub struct RemoteSource {
    name: String,
    client: RemoteClient,
}

impl RemoteSource {
    pub fn new(name: impl Into<String>, client: RemoteClient) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    fn to_evidence(&self, record: RemoteRecord) -> Option<Evidence> {
        let mut citation = Citation::new(&self.name, record.title, &record.url)
            .with_authors(record.authors);
        if let Some(date) = record.date.filter(|d| !d.trim().is_empty()) {
            citation = citation.with_date(date);
        }
        let evidence = match Evidence::new(record.content, citation) {
            Ok(ev) => ev,
            Err(e) => {
                debug!(source = %self.name, url = %record.url, "skipping record: {e}");
                return None;
            }
        };
        let evidence = evidence.with_relevance(record.relevance.unwrap_or(0.0));
        Some(
            record
                .metadata
                .into_iter()
                .fold(evidence, |ev, (k, v)| ev.with_metadata(k, v)),
        )
    }
}

#[async_trait]
impl SourceAdapter for RemoteSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<Evidence>, SourceError> {
        let request = SearchRequest { query, max_results };
        let response: SearchResponse = self.client.post_json(&request).await?;

        let returned = response.results.len();
        let mut evidence: Vec<Evidence> = response
            .results
            .into_iter()
            .filter_map(|r| self.to_evidence(r))
            .collect();
        if evidence.len() > max_results {
            warn!(source = %self.name, returned, max_results, "source ignored max_results; truncating");
            evidence.truncate(max_results);
        }
        debug!(source = %self.name, returned, kept = evidence.len(), "remote search complete");
        Ok(evidence)
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{body_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::remote::RemoteError;

    fn source(server: &MockServer) -> RemoteSource {
        RemoteSource::new(
            "pubmed",
            RemoteClient::new(Client::new(), server.uri()).with_max_attempts(1),
        )
    }

    #[tokio::test]
    async fn parses_records_into_evidence() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({"query": "metformin aging", "max_results": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [{
                    "content": "Metformin extends lifespan in C. elegans.",
                    "title": "Metformin and aging",
                    "url": "https://pubmed.ncbi.nlm.nih.gov/111/",
                    "date": "2020-01-01",
                    "authors": ["Smith J", "Doe A"],
                    "relevance": 0.9,
                    "metadata": {"journal": "Cell"}
                }]
            })))
            .mount(&server)
            .await;

        let results = source(&server).search("metformin aging", 5).await.unwrap();

        assert_eq!(results.len(), 1);
        let ev = &results[0];
        assert_eq!(ev.source(), "pubmed");
        assert_eq!(ev.citation().authors(), ["Smith J", "Doe A"]);
        assert_eq!(ev.citation().date(), Some("2020-01-01"));
        assert_eq!(ev.relevance(), 0.9);
        assert_eq!(ev.metadata()["journal"], "Cell");
        assert_eq!(ev.paper_id().as_deref(), Some("PMID:111"));
    }

    #[tokio::test]
    async fn blank_content_records_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [
                    {"content": "  ", "title": "Empty", "url": "https://a.org"},
                    {"content": "Real finding", "title": "Full", "url": "https://b.org"}
                ]
            })))
            .mount(&server)
            .await;

        let results = source(&server).search("q", 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].citation().title(), "Full");
    }

    #[tokio::test]
    async fn excess_results_are_truncated() {
        let server = MockServer::start().await;
        let records: Vec<_> = (0..4)
            .map(|i| json!({"content": format!("finding number {i}"), "url": format!("https://x.org/{i}")}))
            .collect();
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "results": records })))
            .mount(&server)
            .await;

        let results = source(&server).search("q", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content(), "finding number 0");
    }

    #[tokio::test]
    async fn rate_limit_surfaces_as_retryable_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let err = source(&server).search("q", 5).await.unwrap_err();
        assert!(matches!(err, SourceError::Remote(RemoteError::RateLimited)));
        assert!(err.is_retryable());
    }
}
