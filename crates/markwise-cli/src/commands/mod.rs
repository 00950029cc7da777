//! Subcommand implementations.

pub mod evaluate;
pub mod grade;
pub mod init;
pub mod profiles;
pub mod validate;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use markwise_core::assessor::LlmAssessor;
use markwise_core::embedding::LazyEmbedder;
use markwise_core::engine::EvaluationEngine;
use markwise_providers::{configured_grader, MarkwiseConfig};
use markwise_runner::LocalRunner;

/// Build an engine from config: sandbox runner if Python is available, LLM
/// assessor if `[llm]` is enabled and `no_llm` is not set.
pub(crate) fn build_engine(config: &MarkwiseConfig, no_llm: bool) -> Result<EvaluationEngine> {
    let profiles = config.profile_resolver()?;
    let mut engine = EvaluationEngine::new(
        config.engine.clone(),
        profiles,
        Arc::new(LazyEmbedder::hashing()),
    )?;

    let runner = LocalRunner::new(config.sandbox.clone());
    if runner.interpreter_available() {
        engine = engine.with_runner(Arc::new(runner), config.sandbox.timeout());
    } else {
        warn!(
            python = %config.sandbox.python,
            "interpreter not found, code answers will be scored without execution"
        );
    }

    if !no_llm {
        if let Some(grader) = configured_grader(config)? {
            info!(provider = grader.name(), "hybrid scoring enabled");
            engine = engine.with_assessor(LlmAssessor::new(grader, config.llm.assessor_config()));
        }
    }
    Ok(engine)
}
