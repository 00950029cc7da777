//! End-to-end pipeline tests: paper and submissions parsed from TOML, graded
//! with the local sandbox and a mock LLM, resolved, ranked and reported.

use std::path::Path;
use std::sync::Arc;

use markwise_core::assessor::{AssessorConfig, LlmAssessor};
use markwise_core::code::SandboxConfig;
use markwise_core::embedding::HashingEmbedder;
use markwise_core::engine::{EngineConfig, EvaluationEngine, NoopReporter};
use markwise_core::error::Degradation;
use markwise_core::model::{AnswerInput, EvaluationResult, EvaluationSource};
use markwise_core::parser::{parse_paper_str, parse_submissions_str};
use markwise_core::profile::SubjectProfileResolver;
use markwise_core::report::GradingReport;
use markwise_providers::mock::MockGrader;
use markwise_runner::LocalRunner;

const PAPER: &str = r#"
[paper]
id = "cs-1"
name = "Intro Programming"
default_subject = "programming"

[[questions]]
id = "q1"
text = "What does a compiler do?"
model_answer = "A compiler translates source code written in a high-level language into machine code before the program runs."
max_marks = 4
main_question_number = 1

[[questions]]
id = "q2"
text = "Write sum_even(numbers) returning the sum of the even numbers."
model_answer = """
# test: [1, 2, 3, 4, 5, 6] -> 12
# test: [] -> 0
# test: [7, 9, 10] -> 10
def sum_even(numbers):
    return sum(n for n in numbers if n % 2 == 0)
"""
max_marks = 10
type = "coding"
main_question_number = 2
or_group = "q2"

[[questions]]
id = "q3"
text = "Write count_vowels(text) returning the number of vowels."
model_answer = """
# test: "banana" -> 3
def count_vowels(text):
    return sum(1 for c in text.lower() if c in "aeiou")
"""
max_marks = 10
type = "coding"
main_question_number = 2
or_group = "q2"
"#;

const SUBMISSIONS: &str = r#"
[[submissions]]
student_name = "Asha"

[[submissions.answers]]
question_id = "q1"
text = "A compiler translates source code written in a high-level language into machine code before the program runs."

[[submissions.answers]]
question_id = "q2"
text = """
def sum_even(numbers):
    return sum(n for n in numbers if n % 2 == 0)
"""

[[submissions]]
student_name = "Ben"

[[submissions.answers]]
question_id = "q1"
text = "It runs code."

[[submissions.answers]]
question_id = "q3"
text = """
def count_vowels(text):
    while True:
        pass
"""
"#;

fn python_runner() -> Option<LocalRunner> {
    let runner = LocalRunner::new(SandboxConfig {
        timeout_secs: 1,
        ..SandboxConfig::default()
    });
    if runner.interpreter_available() {
        Some(runner)
    } else {
        eprintln!("skipping: python3 not found on PATH");
        None
    }
}

fn engine() -> EvaluationEngine {
    EvaluationEngine::new(
        EngineConfig::default(),
        SubjectProfileResolver::default(),
        Arc::new(HashingEmbedder::default()),
    )
    .unwrap()
}

async fn grade(engine: &EvaluationEngine) -> GradingReport {
    let paper = parse_paper_str(PAPER, Path::new("paper.toml")).unwrap();
    let submissions = parse_submissions_str(SUBMISSIONS, Path::new("subs.toml")).unwrap();
    engine
        .grade_paper(&paper, &submissions, &NoopReporter)
        .await
        .unwrap()
}

#[tokio::test]
async fn e2e_sandboxed_grading() {
    let Some(runner) = python_runner() else { return };
    let timeout = runner.config().timeout();
    let engine = engine().with_runner(Arc::new(runner), timeout);
    let report = grade(&engine).await;

    // OR-group q2/q3 counts once, so the paper is out of 14.
    assert_eq!(report.paper.total_marks, 14.0);

    let asha = report.student("Asha").unwrap();
    let q2 = asha
        .evaluations
        .iter()
        .find(|e| e.question_id() == "q2")
        .unwrap();
    assert_eq!(q2.dimension_breakdown().get("execution"), 100.0);
    assert_eq!(q2.marks_awarded(), 10.0);

    let ben = report.student("Ben").unwrap();
    let q3 = ben
        .evaluations
        .iter()
        .find(|e| e.question_id() == "q3")
        .unwrap();
    assert_eq!(q3.dimension_breakdown().get("execution"), 0.0);
    assert!(q3
        .notices()
        .iter()
        .any(|n| matches!(n, Degradation::SandboxTimeout { .. })));

    let totals: Vec<(&str, u32)> = report
        .totals
        .iter()
        .map(|t| (t.student_name.as_str(), t.rank))
        .collect();
    assert_eq!(totals, vec![("Asha", 1), ("Ben", 2)]);
    assert_eq!(report.total_for("Asha").unwrap().percentage, 100.0);
}

#[tokio::test]
async fn e2e_without_runner_still_grades_code() {
    let report = grade(&engine()).await;
    let asha = report.student("Asha").unwrap();
    let q2 = asha
        .evaluations
        .iter()
        .find(|e| e.question_id() == "q2")
        .unwrap();
    assert!(!q2.dimension_breakdown().contains("execution"));
    assert!(q2
        .notices()
        .iter()
        .any(|n| matches!(n, Degradation::ExecutionUnsupported { .. })));
    assert_eq!(q2.marks_awarded(), 10.0);
}

#[tokio::test]
async fn e2e_hybrid_with_mock_llm() {
    let grader = Arc::new(MockGrader::with_percentage(50.0));
    let engine = engine().with_assessor(LlmAssessor::new(
        grader.clone(),
        AssessorConfig {
            requests_per_minute: 0,
            ..AssessorConfig::default()
        },
    ));

    let paper = parse_paper_str(PAPER, Path::new("paper.toml")).unwrap();
    let question = paper.question("q1").unwrap().clone();
    let input = AnswerInput::new(question.clone(), question.model_answer.clone());
    let result = engine.evaluate(&input).await.unwrap();

    assert_eq!(result.source(), EvaluationSource::Hybrid);
    assert!((result.transformer_score() - 1.0).abs() < 1e-9);
    assert!((result.final_score() - 0.7).abs() < 1e-9);
    assert_eq!(result.marks_awarded(), 3.0);
    assert_eq!(grader.call_count(), 1);
    assert!(result.llm_opinion().is_some());
}

#[tokio::test]
async fn e2e_llm_outage_keeps_transformer_score() {
    let grader = Arc::new(MockGrader::with_fixed_response("not json at all"));
    let hybrid = engine().with_assessor(LlmAssessor::new(
        grader.clone(),
        AssessorConfig {
            requests_per_minute: 0,
            max_retry_wait: std::time::Duration::ZERO,
            ..AssessorConfig::default()
        },
    ));
    let answer = "Compilers turn source code into machine code.";
    let baseline = engine_result(&engine(), answer).await;
    let degraded = engine_result(&hybrid, answer).await;

    assert_eq!(degraded.source(), EvaluationSource::Transformer);
    assert_eq!(degraded.final_score(), baseline.final_score());
    assert_eq!(degraded.marks_awarded(), baseline.marks_awarded());
    assert!(degraded
        .notices()
        .iter()
        .any(|n| matches!(n, Degradation::LlmMalformedResponse { .. })));
    // One retry after the malformed reply.
    assert_eq!(grader.call_count(), 2);
}

async fn engine_result(engine: &EvaluationEngine, answer: &str) -> EvaluationResult {
    let paper = parse_paper_str(PAPER, Path::new("paper.toml")).unwrap();
    let question = paper.question("q1").unwrap().clone();
    engine
        .evaluate(&AnswerInput::new(question, answer))
        .await
        .unwrap()
}

#[tokio::test]
async fn e2e_report_roundtrip() {
    let report = grade(&engine()).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.save_json(&path).unwrap();
    let loaded = GradingReport::load_json(&path).unwrap();
    assert_eq!(loaded.totals, report.totals);
    assert_eq!(loaded.analytics.student_count, 2);
    assert!(loaded.flagged().count() >= 1);
}
