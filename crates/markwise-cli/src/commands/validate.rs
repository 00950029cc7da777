//! The `markwise validate` command.

use std::path::PathBuf;

use anyhow::Result;

use markwise_core::groups::GroupResolver;
use markwise_core::validation::validate_paper;

pub fn execute(paper_path: PathBuf) -> Result<()> {
    let paper = markwise_core::parser::parse_paper(&paper_path)?;
    let total = GroupResolver::new(&paper.questions)
        .resolve(&Default::default())
        .total_possible_marks;
    println!(
        "Paper: {} ({} questions, {total} marks)",
        paper.name,
        paper.questions.len()
    );

    let issues = validate_paper(&paper);
    let mut errors = 0;
    for issue in &issues {
        let prefix = issue
            .question_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        if issue.is_error() {
            errors += 1;
            println!("{prefix} ERROR: {}", issue.message);
        } else {
            println!("{prefix} WARNING: {}", issue.message);
        }
    }

    if errors > 0 {
        anyhow::bail!("{errors} validation error(s) found");
    }
    if issues.is_empty() {
        println!("Paper is valid.");
    } else {
        println!("\n{} warning(s) found.", issues.len());
    }
    Ok(())
}
