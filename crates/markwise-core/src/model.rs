//! Core data model types for markwise.
//!
//! Question units and answers come from outside the engine (test authoring
//! and OCR respectively). Evaluation results and student totals are what the
//! engine produces.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Degradation;

/// One markable unit of a question paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionUnit {
    /// Unique identifier within the paper.
    pub id: String,
    /// The question text shown to the student.
    pub text: String,
    /// Reference answer the student is compared against.
    #[serde(default)]
    pub model_answer: String,
    /// Maximum marks (may be fractional, e.g. 2.5).
    pub max_marks: f64,
    /// Whether the answer is prose or code.
    #[serde(default, rename = "type")]
    pub question_type: QuestionType,
    /// Subject label used to pick a weight profile.
    #[serde(default)]
    pub subject_area: String,
    /// Parent question number ("2" for "2a").
    pub main_question_number: u32,
    /// Lettered child label ("a" for "2a"), if this is a sub-question.
    #[serde(default)]
    pub sub_question: Option<String>,
    /// OR-group this unit is an alternative within.
    #[serde(default, alias = "or_group")]
    pub or_group_id: Option<String>,
}

impl QuestionUnit {
    /// Human label such as "2a" or "3".
    pub fn label(&self) -> String {
        match &self.sub_question {
            Some(sub) => format!("{}{}", self.main_question_number, sub),
            None => self.main_question_number.to_string(),
        }
    }
}

/// The kind of answer a question expects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionType {
    #[default]
    Subjective,
    Coding,
}

/// A student's answer to one question unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerInput {
    /// The question being answered.
    pub question: QuestionUnit,
    /// Extracted text (prose) or source code. `None` means OCR produced nothing.
    #[serde(default)]
    pub student_text_or_code: Option<String>,
    /// Explicit language for code answers.
    #[serde(default)]
    pub language_hint: Option<Language>,
    /// OCR confidence in [0, 1], when the text came from a handwritten image.
    #[serde(default)]
    pub ocr_confidence: Option<f64>,
}

impl AnswerInput {
    pub fn new(question: QuestionUnit, student_text_or_code: impl Into<String>) -> Self {
        Self {
            question,
            student_text_or_code: Some(student_text_or_code.into()),
            language_hint: None,
            ocr_confidence: None,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language_hint = Some(language);
        self
    }

    pub fn with_ocr_confidence(mut self, confidence: f64) -> Self {
        self.ocr_confidence = Some(confidence);
        self
    }

    /// The answer text, or "" when absent.
    pub fn text(&self) -> &str {
        self.student_text_or_code.as_deref().unwrap_or("")
    }

    /// True when the answer is missing or whitespace-only.
    pub fn is_empty(&self) -> bool {
        self.text().trim().is_empty()
    }
}

/// Programming languages recognised in code answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    Java,
    Cpp,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::Python => write!(f, "python"),
            Language::JavaScript => write!(f, "javascript"),
            Language::Java => write!(f, "java"),
            Language::Cpp => write!(f, "cpp"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "python" | "py" | "python3" => Ok(Language::Python),
            "javascript" | "js" | "node" => Ok(Language::JavaScript),
            "java" => Ok(Language::Java),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// Per-dimension scores, each in [0, 100].
///
/// Values are clamped on construction and there are no mutators, so a
/// computed set of scores cannot drift after the fact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionScores(BTreeMap<String, f64>);

impl DimensionScores {
    pub fn new<K: Into<String>>(entries: impl IntoIterator<Item = (K, f64)>) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| {
                    let v = if v.is_finite() { v.clamp(0.0, 100.0) } else { 0.0 };
                    (k.into(), v)
                })
                .collect(),
        )
    }

    /// Score for a dimension, 0 when absent.
    pub fn get(&self, dimension: &str) -> f64 {
        self.0.get(dimension).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, dimension: &str) -> bool {
        self.0.contains_key(dimension)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Every dimension at zero.
    pub fn all_zero(&self) -> bool {
        self.0.values().all(|v| *v == 0.0)
    }
}

/// A structured grading opinion from the remote LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmOpinion {
    /// Overall score in [0, 1].
    pub score: f64,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub missing_points: Vec<String>,
    /// Free-form summary from the model, if any.
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub dimension_scores: DimensionScores,
}

/// Which scoring path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationSource {
    Transformer,
    Hybrid,
}

impl fmt::Display for EvaluationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationSource::Transformer => write!(f, "transformer"),
            EvaluationSource::Hybrid => write!(f, "hybrid"),
        }
    }
}

/// The engine's output for one answer.
///
/// Fields are private; a re-evaluation produces a new value rather than
/// editing an existing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    question_id: String,
    final_score: f64,
    transformer_score: f64,
    marks_awarded: f64,
    max_marks: f64,
    dimension_breakdown: DimensionScores,
    feedback_text: String,
    source: EvaluationSource,
    low_confidence: bool,
    #[serde(default)]
    notices: Vec<Degradation>,
    #[serde(default)]
    llm_opinion: Option<LlmOpinion>,
}

impl EvaluationResult {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        question_id: String,
        final_score: f64,
        transformer_score: f64,
        marks_awarded: f64,
        max_marks: f64,
        dimension_breakdown: DimensionScores,
        feedback_text: String,
        source: EvaluationSource,
        low_confidence: bool,
        notices: Vec<Degradation>,
        llm_opinion: Option<LlmOpinion>,
    ) -> Self {
        Self {
            question_id,
            final_score,
            transformer_score,
            marks_awarded,
            max_marks,
            dimension_breakdown,
            feedback_text,
            source,
            low_confidence,
            notices,
            llm_opinion,
        }
    }

    pub fn question_id(&self) -> &str {
        &self.question_id
    }

    /// Combined score in [0, 1].
    pub fn final_score(&self) -> f64 {
        self.final_score
    }

    /// Score of the local (non-LLM) path in [0, 1].
    pub fn transformer_score(&self) -> f64 {
        self.transformer_score
    }

    pub fn marks_awarded(&self) -> f64 {
        self.marks_awarded
    }

    pub fn max_marks(&self) -> f64 {
        self.max_marks
    }

    pub fn dimension_breakdown(&self) -> &DimensionScores {
        &self.dimension_breakdown
    }

    pub fn feedback_text(&self) -> &str {
        &self.feedback_text
    }

    pub fn source(&self) -> EvaluationSource {
        self.source
    }

    pub fn low_confidence(&self) -> bool {
        self.low_confidence
    }

    pub fn notices(&self) -> &[Degradation] {
        &self.notices
    }

    pub fn llm_opinion(&self) -> Option<&LlmOpinion> {
        self.llm_opinion.as_ref()
    }
}

/// A set of alternative questions where only the best attempt counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrGroup {
    pub group_id: String,
    pub member_question_ids: Vec<String>,
}

impl OrGroup {
    /// Collect OR-groups from a paper, preserving first-seen order.
    pub fn collect(questions: &[QuestionUnit]) -> Vec<OrGroup> {
        let mut groups: Vec<OrGroup> = Vec::new();
        for q in questions {
            let Some(group_id) = &q.or_group_id else {
                continue;
            };
            match groups.iter_mut().find(|g| &g.group_id == group_id) {
                Some(group) => group.member_question_ids.push(q.id.clone()),
                None => groups.push(OrGroup {
                    group_id: group_id.clone(),
                    member_question_ids: vec![q.id.clone()],
                }),
            }
        }
        groups
    }
}

/// A student's aggregated result on one paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentTotal {
    pub student_name: String,
    pub total_marks: f64,
    pub total_possible_marks: f64,
    /// Percentage rounded to one decimal place.
    pub percentage: f64,
    /// 1-based rank; tied totals share a rank.
    pub rank: u32,
}
