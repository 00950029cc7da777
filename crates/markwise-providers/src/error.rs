//! Provider error types.

use serde::Deserialize;
use thiserror::Error;

use markwise_core::error::LlmError;

/// Errors that can occur when talking to a grading backend.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}ms")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(String),

    /// The response arrived but had no usable grading.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl From<ProviderError> for LlmError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::RateLimited { retry_after_ms } => LlmError::RateLimited { retry_after_ms },
            ProviderError::Timeout(ms) => LlmError::Timeout(ms),
            ProviderError::MalformedResponse(msg) => LlmError::MalformedResponse(msg),
            other if other.is_permanent() => LlmError::Rejected(other.to_string()),
            other => LlmError::Unavailable(other.to_string()),
        }
    }
}

impl ProviderError {
    /// Failures that repeating the same request cannot fix.
    pub fn is_permanent(&self) -> bool {
        match self {
            ProviderError::AuthenticationFailed(_)
            | ProviderError::ModelNotFound(_)
            | ProviderError::ClientBuild(_) => true,
            ProviderError::ApiError { status, .. } => {
                (400..500).contains(status) && !matches!(status, 408 | 409 | 425)
            }
            _ => false,
        }
    }
}

/// Error envelope shared by the Gemini, Anthropic and OpenAI APIs.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a transport failure.
pub(crate) fn from_reqwest(err: reqwest::Error, timeout_ms: u64) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout(timeout_ms)
    } else {
        ProviderError::NetworkError(err.to_string())
    }
}

/// Turn a non-success response into a typed error, or pass it through.
pub(crate) async fn check_status(
    response: reqwest::Response,
    model: &str,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }
    if status == 429 {
        let retry_after_ms = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(5)
            * 1000;
        return Err(ProviderError::RateLimited { retry_after_ms });
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);
    Err(match status {
        401 | 403 => ProviderError::AuthenticationFailed(message),
        404 => ProviderError::ModelNotFound(model.to_string()),
        _ => ProviderError::ApiError { status, message },
    })
}
