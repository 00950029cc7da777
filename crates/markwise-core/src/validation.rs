//! Question paper and answer validation.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;
use crate::model::{OrGroup, QuestionUnit};
use crate::parser::QuestionPaper;

/// Model answers shorter than this (in words) draw a warning.
const MIN_MODEL_ANSWER_WORDS: usize = 5;
/// Student answers shorter than this (in characters) draw a warning.
const MIN_ANSWER_CHARS: usize = 10;

const NON_ANSWERS: &[&str] = &[
    "i don't know",
    "i dont know",
    "don't know",
    "dont know",
    "no idea",
    "not sure",
    "idk",
    "n/a",
    "na",
    "none",
    "skip",
    "pass",
    "?",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A problem found while validating a paper or an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    fn error(question_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            question_id: question_id.map(Into::into),
            message: message.into(),
        }
    }

    fn warning(question_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            question_id: question_id.map(Into::into),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// Checks that abort an evaluation before scoring begins.
pub fn check_question(question: &QuestionUnit) -> Result<(), ConfigurationError> {
    if question.model_answer.trim().is_empty() {
        return Err(ConfigurationError::MissingModelAnswer {
            question_id: question.id.clone(),
        });
    }
    if !question.max_marks.is_finite() || question.max_marks < 0.0 {
        return Err(ConfigurationError::InvalidMaxMarks {
            question_id: question.id.clone(),
            value: question.max_marks,
        });
    }
    Ok(())
}

/// Validate a whole paper.
pub fn validate_paper(paper: &QuestionPaper) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if paper.questions.is_empty() {
        issues.push(ValidationIssue::error(None, "paper has no questions"));
    }

    let mut seen_ids = HashSet::new();
    for q in &paper.questions {
        let id = Some(q.id.as_str());
        if !seen_ids.insert(q.id.as_str()) {
            issues.push(ValidationIssue::error(id, format!("duplicate question ID: {}", q.id)));
        }
        if q.text.trim().is_empty() {
            issues.push(ValidationIssue::error(id, "question text is empty"));
        }
        if q.model_answer.trim().is_empty() {
            issues.push(ValidationIssue::error(id, "model answer is missing"));
        } else if q.model_answer.split_whitespace().count() < MIN_MODEL_ANSWER_WORDS {
            issues.push(ValidationIssue::warning(
                id,
                "model answer is very short; keyword and coverage scores will be coarse",
            ));
        }
        if !q.max_marks.is_finite() || q.max_marks <= 0.0 {
            issues.push(ValidationIssue::error(
                id,
                format!("max marks must be positive, got {}", q.max_marks),
            ));
        }
    }

    let mut group_mains: HashMap<&str, HashSet<u32>> = HashMap::new();
    for q in &paper.questions {
        if let Some(group) = &q.or_group_id {
            group_mains
                .entry(group.as_str())
                .or_default()
                .insert(q.main_question_number);
        }
    }
    let mut groups: Vec<_> = group_mains.into_iter().collect();
    groups.sort_by_key(|(group, _)| *group);
    for (group, mains) in groups {
        if mains.len() > 1 {
            issues.push(ValidationIssue::error(
                None,
                format!("OR-group '{group}' spans different main question numbers"),
            ));
        }
    }

    let with_subs: HashSet<u32> = paper
        .questions
        .iter()
        .filter(|q| q.sub_question.is_some())
        .map(|q| q.main_question_number)
        .collect();
    for group in OrGroup::collect(&paper.questions) {
        let all_parents = group.member_question_ids.iter().all(|id| {
            paper.question(id).is_some_and(|q| {
                q.sub_question.is_none() && with_subs.contains(&q.main_question_number)
            })
        });
        if all_parents {
            issues.push(ValidationIssue::warning(
                None,
                format!(
                    "OR-group '{}' has only parent questions with sub-questions; it will not be counted",
                    group.group_id
                ),
            ));
        }
    }
    for q in &paper.questions {
        if q.sub_question.is_none() && with_subs.contains(&q.main_question_number) {
            issues.push(ValidationIssue::error(
                Some(&q.id),
                format!(
                    "question {} has sub-questions and must not carry its own marks",
                    q.main_question_number
                ),
            ));
        }
    }

    issues
}

/// Warnings about a student answer. Never blocks evaluation.
pub fn answer_warnings(answer: &str) -> Vec<String> {
    let trimmed = answer.trim();
    if trimmed.is_empty() {
        return vec!["answer is empty".to_string()];
    }
    let mut warnings = Vec::new();
    let lowered = trimmed
        .trim_end_matches(['.', '!'])
        .to_lowercase();
    if NON_ANSWERS.contains(&lowered.as_str()) {
        warnings.push("answer looks like a non-answer".to_string());
    } else if trimmed.chars().count() < MIN_ANSWER_CHARS {
        warnings.push("answer is very short".to_string());
    }
    warnings
}
