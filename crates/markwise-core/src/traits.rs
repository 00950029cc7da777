//! Core trait definitions for LLM graders and code runners.
//!
//! These async traits are implemented by the `markwise-providers` and
//! `markwise-runner` crates respectively.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;
use crate::model::{DimensionScores, Language, LlmOpinion};

// ---------------------------------------------------------------------------
// LLM grader trait
// ---------------------------------------------------------------------------

/// Trait for remote LLM backends that grade an answer.
#[async_trait]
pub trait LlmGrader: Send + Sync {
    /// Human-readable backend name (e.g. "gemini").
    fn name(&self) -> &str;

    /// Grade one answer.
    async fn assess(&self, request: &AssessmentRequest) -> Result<LlmOpinion, LlmError>;
}

/// Request sent to an LLM grader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentRequest {
    pub question_text: String,
    pub model_answer_text: String,
    pub student_answer_text: String,
    pub subject_area: String,
    /// Marks the question is out of; lets the model answer in marks.
    pub max_marks: f64,
}

// ---------------------------------------------------------------------------
// Code runner trait
// ---------------------------------------------------------------------------

/// Trait for sandboxed execution of student code.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    /// Languages this runner can execute.
    fn supports(&self, language: Language) -> bool;

    /// Run the code once per test case.
    ///
    /// Timeouts and crashes are per-case verdicts, not errors. An `Err` means
    /// the sandbox itself could not be set up.
    async fn run_cases(&self, request: &ExecutionRequest) -> anyhow::Result<ExecutionReport>;
}

/// One `(input, expected output)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    /// `None` for smoke runs that only need a clean exit.
    pub expected: Option<String>,
}

/// Request to execute code against test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub code: String,
    pub language: Language,
    /// Function to call with each input; `None` feeds the input on stdin.
    #[serde(default)]
    pub entry_point: Option<String>,
    pub cases: Vec<TestCase>,
    /// Per-case timeout in milliseconds.
    pub timeout_ms: u64,
}

/// Per-case verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseVerdict {
    Passed,
    Failed,
    TimedOut,
    Crashed,
}

/// What happened when one case ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub verdict: CaseVerdict,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Results for every case of a request, in request order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub cases: Vec<CaseOutcome>,
}

impl ExecutionReport {
    pub fn passed(&self) -> usize {
        self.cases
            .iter()
            .filter(|c| c.verdict == CaseVerdict::Passed)
            .count()
    }
}

/// Compare program output to an expected value, ignoring whitespace and
/// quote style so `[1, 2]` matches `[1,2]` and `'a'` matches `"a"`.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    let canonical = |s: &str| -> String {
        s.chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == '"' { '\'' } else { c })
            .collect()
    };
    canonical(actual) == canonical(expected)
}

// ---------------------------------------------------------------------------
// Grading prompt
// ---------------------------------------------------------------------------

/// System prompt for grading providers.
pub const GRADING_SYSTEM_PROMPT: &str = "You are an expert educational evaluator. You grade examination answers fairly but strictly and respond ONLY with the requested JSON object.";

/// Build the user prompt for a grading request.
pub fn build_grading_prompt(request: &AssessmentRequest) -> String {
    let subject = if request.subject_area.trim().is_empty() {
        "general"
    } else {
        request.subject_area.trim()
    };
    let max = request.max_marks;
    format!(
        r#"Grade this {subject} examination answer.

QUESTION:
{question}

MODEL/EXPECTED ANSWER:
{model}

STUDENT'S ANSWER:
{student}

GRADING CRITERIA:
- Maximum marks: {max}
- Conceptual understanding (40%), accuracy (30%), completeness (20%), clarity (10%)
- Give partial credit for partially correct answers and accept valid paraphrases
- Deduct marks for incorrect or irrelevant content

REQUIRED OUTPUT FORMAT (JSON):
{{
  "marks_awarded": <number between 0 and {max}>,
  "percentage": <0-100>,
  "strengths": ["..."],
  "weaknesses": ["..."],
  "missing_points": ["..."],
  "feedback": "<constructive feedback>",
  "detailed_scores": {{
    "conceptual_understanding": <0-100>,
    "accuracy": <0-100>,
    "completeness": <0-100>,
    "clarity": <0-100>
  }}
}}"#,
        question = request.question_text,
        model = request.model_answer_text,
        student = request.student_answer_text,
    )
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Strip a markdown code fence (```json or ```) around a response, if any.
pub fn extract_json_from_markdown(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[start + 3..];
    // Skip the language tag line.
    let body = match after_fence.find('\n') {
        Some(nl) => &after_fence[nl + 1..],
        None => after_fence,
    };
    match body.find("```") {
        Some(end) => body[..end].trim(),
        // Truncated (unclosed) fence; take what arrived.
        None => body.trim(),
    }
}

#[derive(Debug, Deserialize)]
struct RawOpinion {
    #[serde(default)]
    marks_awarded: Option<f64>,
    #[serde(default)]
    percentage: Option<f64>,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default)]
    strengths: Vec<String>,
    #[serde(default)]
    weaknesses: Vec<String>,
    #[serde(default)]
    missing_points: Vec<String>,
    #[serde(default)]
    feedback: Option<String>,
    #[serde(default)]
    detailed_scores: std::collections::BTreeMap<String, f64>,
}

/// Parse a grading response into an opinion.
///
/// The overall score comes from `percentage`, else `marks_awarded / max_marks`,
/// else a `score` already in [0, 1].
pub fn parse_opinion(response: &str, max_marks: f64) -> Result<LlmOpinion, LlmError> {
    let body = extract_json_from_markdown(response);
    let raw: RawOpinion = serde_json::from_str(body)
        .map_err(|e| LlmError::MalformedResponse(format!("invalid JSON: {e}")))?;

    let score = if let Some(pct) = raw.percentage {
        pct / 100.0
    } else if let (Some(marks), true) = (raw.marks_awarded, max_marks > 0.0) {
        marks / max_marks
    } else if let Some(score) = raw.score {
        score
    } else {
        return Err(LlmError::MalformedResponse(
            "response has no percentage, marks_awarded or score".into(),
        ));
    };
    if !score.is_finite() {
        return Err(LlmError::MalformedResponse(format!(
            "score is not a number: {score}"
        )));
    }

    Ok(LlmOpinion {
        score: score.clamp(0.0, 1.0),
        strengths: raw.strengths,
        weaknesses: raw.weaknesses,
        missing_points: raw.missing_points,
        summary: raw.feedback.filter(|f| !f.trim().is_empty()),
        dimension_scores: DimensionScores::new(raw.detailed_scores),
    })
}
