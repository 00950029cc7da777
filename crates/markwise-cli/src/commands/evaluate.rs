//! The `markwise evaluate` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use markwise_core::model::{AnswerInput, Language};
use markwise_core::parser::parse_paper;
use markwise_providers::load_config_from;

use super::build_engine;

pub async fn execute(
    paper_path: PathBuf,
    question_id: String,
    answer_path: PathBuf,
    language: Option<Language>,
    config_path: Option<PathBuf>,
    no_llm: bool,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let paper = parse_paper(&paper_path)?;
    let question = paper
        .question(&question_id)
        .with_context(|| format!("question '{question_id}' is not on paper '{}'", paper.id))?
        .clone();
    let answer = std::fs::read_to_string(&answer_path)
        .with_context(|| format!("failed to read answer: {}", answer_path.display()))?;

    let mut input = AnswerInput::new(question, answer);
    if let Some(language) = language {
        input = input.with_language(language);
    }

    let engine = build_engine(&config, no_llm)?;
    let result = engine.evaluate(&input).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
