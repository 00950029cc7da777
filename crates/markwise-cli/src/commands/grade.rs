//! The `markwise grade` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table};

use markwise_core::engine::ProgressReporter;
use markwise_core::model::EvaluationResult;
use markwise_core::parser::{parse_paper, parse_submissions};
use markwise_core::report::GradingReport;
use markwise_core::validation::validate_paper;
use markwise_providers::load_config_from;

use super::build_engine;

/// Console progress reporter.
struct ConsoleReporter;

impl ProgressReporter for ConsoleReporter {
    fn on_evaluation_complete(&self, student: &str, result: &EvaluationResult) {
        let flag = if result.low_confidence() { " (review)" } else { "" };
        eprintln!(
            "  Done: {student} :: {} {}/{} [{}]{flag}",
            result.question_id(),
            result.marks_awarded(),
            result.max_marks(),
            result.source(),
        );
    }

    fn on_grading_complete(&self, students: usize, answers: usize, elapsed: Duration) {
        eprintln!(
            "\nGraded {answers} answers from {students} students ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(
    paper_path: PathBuf,
    submissions_path: PathBuf,
    output: PathBuf,
    config_path: Option<PathBuf>,
    no_llm: bool,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let paper = parse_paper(&paper_path)?;

    let errors: Vec<String> = validate_paper(&paper)
        .into_iter()
        .filter(|i| i.is_error())
        .map(|i| match i.question_id {
            Some(id) => format!("[{id}] {}", i.message),
            None => i.message,
        })
        .collect();
    if !errors.is_empty() {
        anyhow::bail!("paper '{}' is invalid:\n  {}", paper.id, errors.join("\n  "));
    }

    let submissions = parse_submissions(&submissions_path)?;
    anyhow::ensure!(!submissions.is_empty(), "no submissions found");

    let engine = build_engine(&config, no_llm)?;
    eprintln!(
        "markwise v{}: grading {} submissions for '{}'{}",
        env!("CARGO_PKG_VERSION"),
        submissions.len(),
        paper.name,
        if engine.has_assessor() { " (hybrid)" } else { "" }
    );
    eprintln!();

    let report = engine.grade_paper(&paper, &submissions, &ConsoleReporter).await?;

    print_ranking(&report);
    print_analytics(&report);

    let flagged = report.flagged().count();
    if flagged > 0 {
        eprintln!("{flagged} evaluation(s) flagged for review");
    }

    std::fs::create_dir_all(&output)?;
    let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
    let path = output.join(format!("report-{timestamp}.json"));
    report.save_json(&path)?;
    eprintln!("Results saved to: {}", path.display());

    Ok(())
}

fn print_ranking(report: &GradingReport) {
    let mut table = Table::new();
    table.set_header(vec!["Rank", "Student", "Marks", "Percentage"]);
    for total in &report.totals {
        table.add_row(vec![
            Cell::new(total.rank),
            Cell::new(&total.student_name),
            Cell::new(format!(
                "{} / {}",
                total.total_marks, total.total_possible_marks
            )),
            Cell::new(format!("{:.1}%", total.percentage)),
        ]);
    }
    println!("{table}");
}

fn print_analytics(report: &GradingReport) {
    let analytics = &report.analytics;
    println!(
        "\nAverage {:.1}%  Median {:.1}%  Highest {:.1}%  Lowest {:.1}%",
        analytics.average_percentage,
        analytics.median_percentage,
        analytics.highest_percentage,
        analytics.lowest_percentage,
    );
    let distribution: Vec<String> = analytics
        .distribution
        .iter()
        .filter(|b| b.count > 0)
        .map(|b| format!("{}: {}", b.label, b.count))
        .collect();
    if !distribution.is_empty() {
        println!("Distribution: {}", distribution.join(", "));
    }
}
