//! Rate-limited, fail-soft wrapper around an [`LlmGrader`].
//!
//! Every call passes through a [`RateGate`] that bounds concurrency and
//! enforces a requests-per-minute budget. Waiting for the gate is bounded by
//! a queue timeout; a call that cannot get through in time degrades to "no
//! opinion" instead of blocking. Each attempt is wrapped in a client-side
//! timeout that drops (cancels) the in-flight request, and at most one retry
//! is made for retryable failures.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::error::LlmError;
use crate::model::LlmOpinion;
use crate::traits::{AssessmentRequest, LlmGrader};

/// Limits for the LLM path.
#[derive(Debug, Clone)]
pub struct AssessorConfig {
    /// Client-side timeout for one attempt.
    pub request_timeout: Duration,
    /// Remote quota; 0 disables the token bucket.
    pub requests_per_minute: u32,
    /// Calls allowed in flight at once.
    pub max_concurrency: usize,
    /// Longest a call may wait for the gate before degrading.
    pub queue_timeout: Duration,
    /// Cap on the retry-after hint honoured before the single retry.
    pub max_retry_wait: Duration,
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            requests_per_minute: 15,
            max_concurrency: 4,
            queue_timeout: Duration::from_millis(2000),
            max_retry_wait: Duration::from_secs(2),
        }
    }
}

struct Bucket {
    tokens: f64,
    capacity: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    /// Take a token, or report how long until one is available.
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            Err(Duration::from_secs_f64(
                (1.0 - self.tokens) / self.refill_per_sec,
            ))
        }
    }
}

/// Concurrency limit plus token bucket in front of the remote API.
///
/// The bucket lock is only held for arithmetic, never across an await.
pub struct RateGate {
    permits: Arc<Semaphore>,
    bucket: Option<Mutex<Bucket>>,
    queue_timeout: Duration,
}

impl RateGate {
    pub fn new(max_concurrency: usize, requests_per_minute: u32, queue_timeout: Duration) -> Self {
        let max_concurrency = max_concurrency.max(1);
        let bucket = (requests_per_minute > 0).then(|| {
            // Burst no larger than what may be in flight at once.
            let capacity = (max_concurrency as f64).min(requests_per_minute as f64);
            Mutex::new(Bucket {
                tokens: capacity,
                capacity,
                refill_per_sec: requests_per_minute as f64 / 60.0,
                last_refill: Instant::now(),
            })
        });
        Self {
            permits: Arc::new(Semaphore::new(max_concurrency)),
            bucket,
            queue_timeout,
        }
    }

    /// Wait for a slot, up to the queue timeout.
    ///
    /// Returns `RateLimited` when the gate stays saturated past the deadline.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, LlmError> {
        let deadline = Instant::now() + self.queue_timeout;
        let permit = match tokio::time::timeout_at(deadline, self.permits.clone().acquire_owned())
            .await
        {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(LlmError::Unavailable("rate gate closed".into())),
            Err(_) => {
                return Err(LlmError::RateLimited {
                    retry_after_ms: self.queue_timeout.as_millis() as u64,
                })
            }
        };

        let Some(bucket) = &self.bucket else {
            return Ok(permit);
        };
        loop {
            let now = Instant::now();
            let wait = {
                let mut bucket = bucket.lock().unwrap_or_else(PoisonError::into_inner);
                bucket.try_take(now)
            };
            match wait {
                Ok(()) => return Ok(permit),
                Err(wait) if now + wait > deadline => {
                    return Err(LlmError::RateLimited {
                        retry_after_ms: wait.as_millis() as u64,
                    })
                }
                Err(wait) => tokio::time::sleep(wait).await,
            }
        }
    }
}

/// Result of an assessment: an opinion, or the failure that prevented one.
#[derive(Debug, Clone)]
pub struct AssessmentOutcome {
    pub opinion: Option<LlmOpinion>,
    pub failure: Option<LlmError>,
    pub attempts: u32,
}

/// Fail-soft LLM assessor. Never returns an error.
#[derive(Clone)]
pub struct LlmAssessor {
    grader: Arc<dyn LlmGrader>,
    gate: Arc<RateGate>,
    config: AssessorConfig,
}

impl LlmAssessor {
    pub fn new(grader: Arc<dyn LlmGrader>, config: AssessorConfig) -> Self {
        let gate = RateGate::new(
            config.max_concurrency,
            config.requests_per_minute,
            config.queue_timeout,
        );
        Self {
            grader,
            gate: Arc::new(gate),
            config,
        }
    }

    pub fn grader_name(&self) -> &str {
        self.grader.name()
    }

    pub fn gate(&self) -> &RateGate {
        &self.gate
    }

    pub async fn assess(&self, request: &AssessmentRequest) -> AssessmentOutcome {
        let mut attempts = 0;
        let mut last_error: Option<LlmError> = None;

        for attempt in 0..2 {
            if attempt > 0 {
                let Some(err) = &last_error else { break };
                if !err.is_retryable() {
                    break;
                }
                let wait = err
                    .retry_after_ms()
                    .map(Duration::from_millis)
                    .unwrap_or(Duration::from_millis(250))
                    .min(self.config.max_retry_wait);
                tokio::time::sleep(wait).await;
            }

            attempts += 1;
            match self.attempt(request).await {
                Ok(opinion) => {
                    return AssessmentOutcome {
                        opinion: Some(opinion),
                        failure: None,
                        attempts,
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        grader = self.grader.name(),
                        attempt = attempts,
                        "LLM assessment failed: {e}"
                    );
                    last_error = Some(e);
                }
            }
        }

        AssessmentOutcome {
            opinion: None,
            failure: last_error,
            attempts,
        }
    }

    async fn attempt(&self, request: &AssessmentRequest) -> Result<LlmOpinion, LlmError> {
        let _permit = self.gate.acquire().await?;
        match tokio::time::timeout(self.config.request_timeout, self.grader.assess(request)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(
                self.config.request_timeout.as_millis() as u64,
            )),
        }
    }
}
