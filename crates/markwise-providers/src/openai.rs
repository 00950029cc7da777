//! OpenAI-compatible chat completions grading backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use markwise_core::error::LlmError;
use markwise_core::model::LlmOpinion;
use markwise_core::traits::{
    build_grading_prompt, parse_opinion, AssessmentRequest, LlmGrader, GRADING_SYSTEM_PROMPT,
};

use crate::error::{check_status, from_reqwest, ProviderError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// OpenAI-compatible API grader.
pub struct OpenAiGrader {
    api_key: String,
    base_url: String,
    org_id: Option<String>,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiGrader {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
        org_id: Option<String>,
        model: &str,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::ClientBuild(e.to_string()))?;

        Ok(Self {
            api_key: api_key.to_string(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            org_id,
            model: model.to_string(),
            timeout,
            client,
        })
    }
}

#[derive(Serialize)]
struct OpenAiRequest {
    model: String,
    temperature: f64,
    messages: Vec<OpenAiMessage>,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Deserialize)]
struct OpenAiChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl LlmGrader for OpenAiGrader {
    fn name(&self) -> &str {
        "openai"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn assess(&self, request: &AssessmentRequest) -> Result<LlmOpinion, LlmError> {
        let body = OpenAiRequest {
            model: self.model.clone(),
            temperature: 0.0,
            messages: vec![
                OpenAiMessage {
                    role: "system".to_string(),
                    content: GRADING_SYSTEM_PROMPT.to_string(),
                },
                OpenAiMessage {
                    role: "user".to_string(),
                    content: build_grading_prompt(request),
                },
            ],
            response_format: ResponseFormat {
                kind: "json_object".to_string(),
            },
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json");

        if let Some(org) = &self.org_id {
            req = req.header("OpenAI-Organization", org);
        }

        let response = req
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(e, self.timeout.as_millis() as u64))?;
        let response = check_status(response, &self.model).await?;

        let api_response: OpenAiResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("failed to parse response: {e}"))
        })?;

        let content = api_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::MalformedResponse("no choices returned".into()))?;
        parse_opinion(&content, request.max_marks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> AssessmentRequest {
        AssessmentRequest {
            question_text: "Why did the Roman Republic fall?".into(),
            model_answer_text: "Political violence, ambitious generals and civil wars ended the Republic.".into(),
            student_answer_text: "Civil wars and Caesar.".into(),
            subject_area: "history".into(),
            max_marks: 8.0,
        }
    }

    fn grader(server: &MockServer, org: Option<&str>) -> OpenAiGrader {
        OpenAiGrader::new(
            "test-key",
            Some(server.uri()),
            org.map(Into::into),
            DEFAULT_MODEL,
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn successful_grading() {
        let server = MockServer::start().await;
        let response_body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"marks_awarded\": 4, \"missing_points\": [\"Sulla\"]}"}}],
            "model": DEFAULT_MODEL,
        });

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("Authorization", "Bearer test-key"))
            .and(header("OpenAI-Organization", "org-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let opinion = grader(&server, Some("org-1")).assess(&request()).await.unwrap();
        assert!((opinion.score - 0.5).abs() < 1e-9);
        assert_eq!(opinion.missing_points, vec!["Sulla"]);
    }

    #[tokio::test]
    async fn rate_limiting() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "5"))
            .mount(&server)
            .await;

        let err = grader(&server, None).assess(&request()).await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
        assert_eq!(err.retry_after_ms(), Some(5000));
    }

    #[tokio::test]
    async fn unknown_model() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = grader(&server, None).assess(&request()).await.unwrap_err();
        assert!(err.to_string().contains("model not found"));
    }

    #[tokio::test]
    async fn permanent_failures_are_sent_once() {
        use std::sync::Arc;

        use markwise_core::assessor::{AssessorConfig, LlmAssessor};

        for status in [401, 404] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/v1/chat/completions"))
                .respond_with(ResponseTemplate::new(status))
                .expect(1)
                .mount(&server)
                .await;

            let assessor = LlmAssessor::new(
                Arc::new(grader(&server, None)),
                AssessorConfig {
                    requests_per_minute: 0,
                    max_retry_wait: Duration::ZERO,
                    ..AssessorConfig::default()
                },
            );
            let outcome = assessor.assess(&request()).await;
            assert!(outcome.opinion.is_none());
            assert_eq!(outcome.attempts, 1, "HTTP {status}");
            assert!(matches!(outcome.failure, Some(LlmError::Rejected(_))));
            server.verify().await;
        }
    }
}
