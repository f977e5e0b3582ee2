use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use super::{Assessment, Judge, JudgeError, Progress};
use crate::evidence::Evidence;
use crate::remote::RemoteClient;

#[derive(Debug, Serialize)]
struct AssessRequest<'a> {
    question: &'a str,
    evidence: &'a [Evidence],
    iteration: u32,
    max_iterations: u32,
}

/// Judge served behind the JSON assessment endpoint contract:
/// `POST {question, evidence, iteration, max_iterations}` → [`Assessment`].
#[derive(Clone, Debug)]
pub struct RemoteJudge {
    client: RemoteClient,
}

impl RemoteJudge {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Judge for RemoteJudge {
    fn name(&self) -> &str {
        "remote"
    }

    async fn assess(
        &self,
        question: &str,
        evidence: &[Evidence],
        progress: Progress,
    ) -> Result<Assessment, JudgeError> {
        let request = AssessRequest {
            question,
            evidence,
            iteration: progress.iteration,
            max_iterations: progress.max_iterations,
        };
        let assessment: Assessment = self.client.post_json(&request).await?;
        debug!(
            endpoint = %self.client.endpoint(),
            sufficient = assessment.sufficient,
            tokens = assessment.tokens_consumed,
            "remote assessment received"
        );
        Ok(assessment)
    }
}

#[cfg(test)]
mod http_tests {
    use super::*;
    use reqwest::Client;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::testing::evidence;

    #[tokio::test]
    async fn sends_question_evidence_and_progress() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "question": "drug X for condition Y",
                "iteration": 2,
                "max_iterations": 10
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sufficient": false,
                "refined_query": "drug X randomized trial",
                "tokens_consumed": 1200
            })))
            .mount(&server)
            .await;

        let judge = RemoteJudge::new(RemoteClient::new(Client::new(), server.uri()));
        let pool = vec![evidence("pubmed", "Drug X improved outcomes")];
        let progress = Progress {
            iteration: 2,
            max_iterations: 10,
        };

        let assessment = judge
            .assess("drug X for condition Y", &pool, progress)
            .await
            .unwrap();

        assert!(!assessment.sufficient);
        assert_eq!(assessment.next_query().as_deref(), Some("drug X randomized trial"));
        assert_eq!(assessment.tokens_consumed, 1200);
    }

    #[test]
    fn request_carries_evidence_content_and_citation() {
        let pool = vec![evidence("pubmed", "Drug X improved outcomes")];
        let request = AssessRequest {
            question: "q",
            evidence: &pool,
            iteration: 1,
            max_iterations: 3,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["evidence"][0]["content"], "Drug X improved outcomes");
        assert_eq!(value["evidence"][0]["citation"]["source"], "pubmed");
        assert_eq!(value["max_iterations"], 3);
    }

    #[tokio::test]
    async fn malformed_verdict_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"verdict": "yes"})))
            .mount(&server)
            .await;

        let judge = RemoteJudge::new(RemoteClient::new(Client::new(), server.uri()));
        let progress = Progress {
            iteration: 1,
            max_iterations: 3,
        };
        let err = judge.assess("q", &[], progress).await.unwrap_err();
        assert!(matches!(err, JudgeError::Remote(_)));
    }
}
