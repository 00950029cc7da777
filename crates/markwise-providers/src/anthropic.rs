//! Anthropic Messages API grading backend.

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

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const MAX_TOKENS: u32 = 1024;

/// Anthropic API grader.
pub struct AnthropicGrader {
    api_key: String,
    base_url: String,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl AnthropicGrader {
    pub fn new(
        api_key: &str,
        base_url: Option<String>,
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
            model: model.to_string(),
            timeout,
            client,
        })
    }
}

#[derive(Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: String,
    messages: Vec<AnthropicMessage>,
}

#[derive(Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Deserialize)]
struct AnthropicContent {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmGrader for AnthropicGrader {
    fn name(&self) -> &str {
        "anthropic"
    }

    #[instrument(skip(self, request), fields(model = %self.model))]
    async fn assess(&self, request: &AssessmentRequest) -> Result<LlmOpinion, LlmError> {
        let body = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: MAX_TOKENS,
            temperature: 0.0,
            system: GRADING_SYSTEM_PROMPT.to_string(),
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: build_grading_prompt(request),
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| from_reqwest(e, self.timeout.as_millis() as u64))?;
        let response = check_status(response, &self.model).await?;

        let api_response: AnthropicResponse = response.json().await.map_err(|e| {
            ProviderError::MalformedResponse(format!("failed to parse response: {e}"))
        })?;

        let content: String = api_response.content.into_iter().map(|c| c.text).collect();
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
            question_text: "State Newton's first law.".into(),
            model_answer_text: "An object stays at rest or in uniform motion unless acted on by a net force.".into(),
            student_answer_text: "Things keep moving unless a force acts.".into(),
            subject_area: "physics".into(),
            max_marks: 5.0,
        }
    }

    #[tokio::test]
    async fn successful_grading() {
        let server = MockServer::start().await;
        let response_body = serde_json::json!({
            "content": [{"type": "text", "text": "{\"percentage\": 80, \"weaknesses\": [\"no mention of rest\"]}"}],
            "model": DEFAULT_MODEL,
        });

        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .mount(&server)
            .await;

        let grader = AnthropicGrader::new(
            "test-key",
            Some(server.uri()),
            DEFAULT_MODEL,
            Duration::from_secs(5),
        )
        .unwrap();
        let opinion = grader.assess(&request()).await.unwrap();
        assert!((opinion.score - 0.8).abs() < 1e-9);
        assert_eq!(opinion.weaknesses.len(), 1);
    }

    #[tokio::test]
    async fn authentication_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(401).set_body_string("unauthorized"))
            .mount(&server)
            .await;

        let grader = AnthropicGrader::new(
            "bad-key",
            Some(server.uri()),
            DEFAULT_MODEL,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = grader.assess(&request()).await.unwrap_err();
        assert!(err.to_string().contains("authentication"));
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(529).set_body_json(
                serde_json::json!({"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}),
            ))
            .mount(&server)
            .await;

        let grader = AnthropicGrader::new(
            "test-key",
            Some(server.uri()),
            DEFAULT_MODEL,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = grader.assess(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Unavailable(ref m) if m.contains("Overloaded")));
    }

    #[tokio::test]
    async fn non_json_reply_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "content": [{"type": "text", "text": "I think this deserves a B."}]
            })))
            .mount(&server)
            .await;

        let grader = AnthropicGrader::new(
            "test-key",
            Some(server.uri()),
            DEFAULT_MODEL,
            Duration::from_secs(5),
        )
        .unwrap();
        let err = grader.assess(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::MalformedResponse(_)));
    }
}
