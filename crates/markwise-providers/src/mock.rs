//! Mock grader for testing.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use markwise_core::error::LlmError;
use markwise_core::model::LlmOpinion;
use markwise_core::traits::{parse_opinion, AssessmentRequest, LlmGrader};

/// A grader that replies from a script instead of calling an API.
///
/// Queued results are returned first, in order; after that every call gets
/// the fixed response parsed the way a real backend's reply would be.
pub struct MockGrader {
    fixed_response: String,
    queued: Mutex<VecDeque<Result<String, LlmError>>>,
    delay: Duration,
    call_count: AtomicU32,
    last_request: Mutex<Option<AssessmentRequest>>,
}

impl MockGrader {
    /// A mock that always replies with `response` (JSON, possibly fenced).
    pub fn with_fixed_response(response: &str) -> Self {
        Self {
            fixed_response: response.to_string(),
            queued: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            call_count: AtomicU32::new(0),
            last_request: Mutex::new(None),
        }
    }

    /// A mock that always awards `percentage`.
    pub fn with_percentage(percentage: f64) -> Self {
        Self::with_fixed_response(&format!(
            r#"{{"percentage": {percentage}, "feedback": "Mock assessment."}}"#
        ))
    }

    /// Queue a one-off reply (or failure) ahead of the fixed response.
    pub fn then(self, reply: Result<&str, LlmError>) -> Self {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(reply.map(str::to_string));
        self
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    pub fn last_request(&self) -> Option<AssessmentRequest> {
        self.last_request
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl LlmGrader for MockGrader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn assess(&self, request: &AssessmentRequest) -> Result<LlmOpinion, LlmError> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        *self.last_request.lock().unwrap_or_else(|e| e.into_inner()) = Some(request.clone());

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let next = self
            .queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        let response = match next {
            Some(reply) => reply?,
            None => self.fixed_response.clone(),
        };
        parse_opinion(&response, request.max_marks)
    }
}
