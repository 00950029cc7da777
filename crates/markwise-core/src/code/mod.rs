//! Dimension scores for code answers: syntax, logic, execution and style.

pub mod cases;
pub mod style;
pub mod syntax;

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Degradation;
use crate::model::{DimensionScores, Language};
use crate::traits::{CaseVerdict, CodeRunner, ExecutionRequest, TestCase};

use self::syntax::SyntaxCheck;

pub const SYNTAX: &str = "syntax";
pub const LOGIC: &str = "logic";
pub const EXECUTION: &str = "execution";
pub const STYLE: &str = "style";

/// Fixed weights for combining code dimensions.
pub const CODE_WEIGHTS: [(&str, f64); 4] = [
    (SYNTAX, 0.25),
    (LOGIC, 0.35),
    (EXECUTION, 0.30),
    (STYLE, 0.10),
];

/// Limits for executing student code (the `[sandbox]` config section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit per test case.
    pub timeout_secs: u64,
    /// Interpreter used for Python answers.
    pub python: String,
    /// Address-space limit for the child process.
    pub memory_limit_mb: u64,
    /// stdout/stderr beyond this many bytes is discarded.
    pub max_output_bytes: usize,
    /// Sandboxes alive at once.
    pub max_parallel: usize,
    /// Run the interpreter in a fresh network namespace (`unshare`) when the
    /// host allows unprivileged user namespaces.
    pub network_namespace: bool,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 5,
            python: "python3".to_string(),
            memory_limit_mb: 256,
            max_output_bytes: 64 * 1024,
            max_parallel: 2,
            network_namespace: true,
        }
    }
}

impl SandboxConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

/// Output of [`CodeDimensionAnalyzer::analyze`].
#[derive(Debug, Clone)]
pub struct CodeAnalysis {
    pub language: Language,
    pub scores: DimensionScores,
    /// Weighted combination in [0, 1].
    pub score: f64,
    pub notices: Vec<Degradation>,
    /// Human-readable observations for feedback.
    pub notes: Vec<String>,
    pub low_confidence: bool,
}

/// Combine code dimensions with [`CODE_WEIGHTS`].
///
/// A dimension missing from `scores` (execution for a language the runner
/// cannot execute) is left out and the remaining weights renormalised.
pub fn combine_code_scores(scores: &DimensionScores) -> f64 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;
    for (dim, weight) in CODE_WEIGHTS {
        if scores.contains(dim) {
            weighted += weight * scores.get(dim) / 100.0;
            total_weight += weight;
        }
    }
    if total_weight == 0.0 {
        return 0.0;
    }
    (weighted / total_weight).clamp(0.0, 1.0)
}

/// Analyzes code answers, executing them through a [`CodeRunner`].
#[derive(Clone)]
pub struct CodeDimensionAnalyzer {
    runner: Option<Arc<dyn CodeRunner>>,
    timeout: Duration,
}

impl CodeDimensionAnalyzer {
    pub fn new(runner: Option<Arc<dyn CodeRunner>>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }

    pub async fn analyze(
        &self,
        student: &str,
        model_answer: &str,
        language_hint: Option<Language>,
    ) -> CodeAnalysis {
        let language = language_hint.unwrap_or_else(|| cases::detect_language(student));

        if student.trim().is_empty() {
            let scores = DimensionScores::new(CODE_WEIGHTS.map(|(dim, _)| (dim, 0.0)));
            return CodeAnalysis {
                language,
                scores,
                score: 0.0,
                notices: vec![Degradation::EmptyAnswer],
                notes: Vec::new(),
                low_confidence: true,
            };
        }

        let mut notices = Vec::new();
        let mut notes = Vec::new();

        let syntax_ok = match syntax::check_syntax(student, language) {
            SyntaxCheck::Valid => true,
            SyntaxCheck::Invalid { message } => {
                notes.push(format!("syntax error: {message}"));
                notices.push(Degradation::CodeSyntaxError { message });
                false
            }
        };

        let model_language = cases::detect_language(model_answer);
        let logic = syntax::feature_similarity(
            &syntax::structural_features(model_answer, model_language),
            &syntax::structural_features(student, language),
        ) * 100.0;

        let style = style::assess_style(student, language);
        notes.extend(style.notes.iter().cloned());

        let mut entries = vec![
            (SYNTAX, if syntax_ok { 100.0 } else { 0.0 }),
            (LOGIC, logic),
            (STYLE, style.score),
        ];
        if let Some(execution) = self
            .execution_score(student, model_answer, language, syntax_ok, &mut notices, &mut notes)
            .await
        {
            entries.push((EXECUTION, execution));
        }

        let scores = DimensionScores::new(entries);
        let score = combine_code_scores(&scores);
        tracing::debug!(%language, ?scores, score, "code dimensions computed");

        CodeAnalysis {
            language,
            scores,
            score,
            notices,
            notes,
            low_confidence: false,
        }
    }

    /// Percentage of test cases passed, or `None` when execution cannot be
    /// measured for this language.
    async fn execution_score(
        &self,
        student: &str,
        model_answer: &str,
        language: Language,
        syntax_ok: bool,
        notices: &mut Vec<Degradation>,
        notes: &mut Vec<String>,
    ) -> Option<f64> {
        let runner = match &self.runner {
            Some(runner) if runner.supports(language) => runner,
            _ => {
                tracing::warn!(%language, "code execution unavailable");
                notices.push(Degradation::ExecutionUnsupported {
                    language: language.to_string(),
                });
                return None;
            }
        };

        if !syntax_ok {
            notes.push("execution skipped because the code does not parse".to_string());
            return Some(0.0);
        }

        let mut test_cases = cases::extract_test_cases(model_answer);
        let entry_point = if test_cases.is_empty() {
            test_cases.push(TestCase {
                input: String::new(),
                expected: None,
            });
            None
        } else {
            cases::entry_point(student, model_answer)
        };
        let total = test_cases.len();

        let request = ExecutionRequest {
            code: student.to_string(),
            language,
            entry_point,
            cases: test_cases,
            timeout_ms: self.timeout.as_millis() as u64,
        };

        let report = match runner.run_cases(&request).await {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("sandbox failed: {e:#}");
                notices.push(Degradation::SandboxCrash {
                    case: 0,
                    message: format!("{e:#}"),
                });
                return Some(0.0);
            }
        };

        for (i, outcome) in report.cases.iter().enumerate() {
            let case = i + 1;
            match outcome.verdict {
                CaseVerdict::Passed => notes.push(format!("test case {case} passed")),
                CaseVerdict::Failed => notes.push(format!(
                    "test case {case} failed: got `{}`",
                    outcome.stdout.trim()
                )),
                CaseVerdict::TimedOut => {
                    notes.push(format!("test case {case} timed out"));
                    notices.push(Degradation::SandboxTimeout {
                        case,
                        timeout_ms: request.timeout_ms,
                    });
                }
                CaseVerdict::Crashed => {
                    let message = outcome
                        .stderr
                        .lines()
                        .rev()
                        .find(|l| !l.trim().is_empty())
                        .unwrap_or("process exited abnormally")
                        .trim()
                        .to_string();
                    notes.push(format!("test case {case} crashed: {message}"));
                    notices.push(Degradation::SandboxCrash { case, message });
                }
            }
        }

        // Cases the runner never reported count as failed.
        Some(report.passed() as f64 / total as f64 * 100.0)
    }
}
