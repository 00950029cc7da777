//! Error and degradation types.
//!
//! Only [`ConfigurationError`] aborts an evaluation. Everything else the
//! engine encounters is recovered locally and surfaces as a [`Degradation`]
//! notice on the result. [`LlmError`] is defined here so the assessor can
//! classify provider failures for retry decisions without string matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Problems with the inputs that make scoring impossible.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// The question has no (or only whitespace) model answer.
    #[error("question '{question_id}' has no model answer")]
    MissingModelAnswer { question_id: String },

    /// The question's max marks are negative or not a finite number.
    #[error("question '{question_id}' has invalid max marks: {value}")]
    InvalidMaxMarks { question_id: String, value: f64 },

    /// A subject profile's weights are negative or do not sum to 1.0.
    #[error("subject profile '{subject}' is invalid: {reason}")]
    InvalidProfile { subject: String, reason: String },

    /// The hybrid weight is outside [0, 1].
    #[error("hybrid weight must be within [0, 1], got {0}")]
    InvalidHybridWeight(f64),
}

/// Typed failure of the remote LLM grading call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LlmError {
    /// The call did not finish within the client-side timeout.
    #[error("LLM request timed out after {0}ms")]
    Timeout(u64),

    /// The remote API (or the local gate) refused the call.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// The response could not be turned into an opinion.
    #[error("malformed LLM response: {0}")]
    MalformedResponse(String),

    /// Transient outage: network failure, 5xx, overloaded backend.
    #[error("LLM unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request and would refuse it again: bad
    /// credentials, unknown model, invalid request.
    #[error("LLM request rejected: {0}")]
    Rejected(String),
}

impl LlmError {
    /// Whether a single retry could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Timeout(_) | LlmError::RateLimited { .. } => true,
            LlmError::MalformedResponse(_) | LlmError::Unavailable(_) => true,
            LlmError::Rejected(_) => false,
        }
    }

    /// The retry-after hint in milliseconds, if the remote gave one.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            LlmError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// A recovered, non-fatal condition recorded on an evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    #[error("student answer is empty")]
    EmptyAnswer,

    #[error("OCR confidence {confidence:.2} is below {threshold:.2}")]
    LowOcrConfidence { confidence: f64, threshold: f64 },

    #[error("unknown subject '{requested}', using general weights")]
    UnknownSubjectProfile { requested: String },

    #[error("syntax error: {message}")]
    CodeSyntaxError { message: String },

    #[error("test case {case} timed out after {timeout_ms}ms")]
    SandboxTimeout { case: usize, timeout_ms: u64 },

    #[error("test case {case} crashed: {message}")]
    SandboxCrash { case: usize, message: String },

    #[error("code execution is not supported for {language}")]
    ExecutionUnsupported { language: String },

    #[error("LLM unavailable: {message}")]
    LlmUnavailable { message: String },

    #[error("LLM timed out")]
    LlmTimeout,

    #[error("LLM rate limited")]
    LlmRateLimited,

    #[error("LLM response malformed: {message}")]
    LlmMalformedResponse { message: String },
}

impl From<&LlmError> for Degradation {
    fn from(err: &LlmError) -> Self {
        match err {
            LlmError::Timeout(_) => Degradation::LlmTimeout,
            LlmError::RateLimited { .. } => Degradation::LlmRateLimited,
            LlmError::MalformedResponse(m) => Degradation::LlmMalformedResponse { message: m.clone() },
            LlmError::Unavailable(m) | LlmError::Rejected(m) => {
                Degradation::LlmUnavailable { message: m.clone() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejections_are_not_retried() {
        assert!(!LlmError::Rejected("authentication failed: bad key".into()).is_retryable());
        assert!(!LlmError::Rejected("model not found".into()).is_retryable());
        assert!(LlmError::Unavailable("authentication service down".into()).is_retryable());
        assert!(LlmError::Timeout(1000).is_retryable());
    }

    #[test]
    fn degradation_serializes_with_kind_tag() {
        let json = serde_json::to_value(Degradation::SandboxTimeout {
            case: 2,
            timeout_ms: 5000,
        })
        .unwrap();
        assert_eq!(json["kind"], "sandbox_timeout");
        assert_eq!(json["case"], 2);
    }

    #[test]
    fn llm_error_maps_to_notice() {
        let notice = Degradation::from(&LlmError::RateLimited {
            retry_after_ms: 10,
        });
        assert_eq!(notice, Degradation::LlmRateLimited);
        let notice = Degradation::from(&LlmError::Rejected("bad key".into()));
        assert!(matches!(notice, Degradation::LlmUnavailable { .. }));
    }
}
