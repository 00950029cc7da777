//! TOML question-paper and submissions parser.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AnswerInput, Language, QuestionUnit};
use crate::sheet::parse_answer_sheet;

/// A question paper: header plus its question units in paper order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionPaper {
    pub id: String,
    pub name: String,
    pub default_subject: String,
    pub questions: Vec<QuestionUnit>,
}

impl QuestionPaper {
    pub fn question(&self, id: &str) -> Option<&QuestionUnit> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Sum of max marks over all units, ignoring grouping.
    pub fn raw_max_marks(&self) -> f64 {
        self.questions.iter().map(|q| q.max_marks).sum()
    }
}

/// One student's answers to a paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub student_name: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub answers: Vec<SubmittedAnswer>,
    /// Whole answer-sheet text, split into answers against the paper.
    #[serde(default)]
    pub sheet: Option<String>,
}

/// An answer as handed over by OCR or typed in directly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmittedAnswer {
    pub question_id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub ocr_confidence: Option<f64>,
    #[serde(default)]
    pub language: Option<Language>,
}

impl Submission {
    /// Explicit answers plus any split from the sheet. An explicit answer
    /// wins over a sheet section for the same question.
    pub fn resolved_answers(&self, paper: &QuestionPaper) -> Vec<SubmittedAnswer> {
        let mut answers = self.answers.clone();
        if let Some(text) = &self.sheet {
            let sheet = parse_answer_sheet(text, paper);
            tracing::debug!(
                student = %self.student_name,
                confidence = sheet.confidence,
                order = ?sheet.sequence,
                "split answer sheet"
            );
            for answer in sheet.answers {
                if !answers.iter().any(|a| a.question_id == answer.question_id) {
                    answers.push(answer);
                }
            }
        }
        answers
    }

    /// Pair each answer with its question. Answers to unknown questions are
    /// skipped with a warning.
    pub fn answer_inputs(&self, paper: &QuestionPaper) -> Vec<AnswerInput> {
        self.resolved_answers(paper)
            .iter()
            .filter_map(|a| {
                let Some(question) = paper.question(&a.question_id) else {
                    tracing::warn!(
                        student = %self.student_name,
                        question = %a.question_id,
                        "answer refers to a question not on the paper, skipping"
                    );
                    return None;
                };
                Some(AnswerInput {
                    question: question.clone(),
                    student_text_or_code: a.text.clone(),
                    language_hint: a.language,
                    ocr_confidence: a.ocr_confidence,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct TomlPaperFile {
    paper: TomlPaperHeader,
    #[serde(default)]
    questions: Vec<QuestionUnit>,
}

#[derive(Debug, Deserialize)]
struct TomlPaperHeader {
    id: String,
    name: String,
    #[serde(default = "default_subject")]
    default_subject: String,
}

fn default_subject() -> String {
    "general".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlSubmissionsFile {
    #[serde(default)]
    submissions: Vec<Submission>,
}

/// Parse a question paper file.
pub fn parse_paper(path: &Path) -> Result<QuestionPaper> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read paper file: {}", path.display()))?;
    parse_paper_str(&content, path)
}

/// Parse a question paper from a TOML string.
///
/// Questions with a blank subject inherit the paper's default subject.
pub fn parse_paper_str(content: &str, source_path: &Path) -> Result<QuestionPaper> {
    let parsed: TomlPaperFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let default_subject = parsed.paper.default_subject;
    let questions = parsed
        .questions
        .into_iter()
        .map(|mut q| {
            if q.subject_area.trim().is_empty() {
                q.subject_area = default_subject.clone();
            }
            q
        })
        .collect();

    Ok(QuestionPaper {
        id: parsed.paper.id,
        name: parsed.paper.name,
        default_subject,
        questions,
    })
}

/// Parse a submissions file.
pub fn parse_submissions(path: &Path) -> Result<Vec<Submission>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read submissions file: {}", path.display()))?;
    parse_submissions_str(&content, path)
}

/// Parse submissions from a TOML string, merging entries that share a
/// student name (a later answer to the same question replaces the earlier).
pub fn parse_submissions_str(content: &str, source_path: &Path) -> Result<Vec<Submission>> {
    let parsed: TomlSubmissionsFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;
    Ok(merge_by_student(parsed.submissions))
}

/// Merge submissions by student name, keeping first-seen order.
pub fn merge_by_student(submissions: Vec<Submission>) -> Vec<Submission> {
    let mut merged: Vec<Submission> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for submission in submissions {
        let name = submission.student_name.trim().to_string();
        match index.get(&name) {
            None => {
                index.insert(name.clone(), merged.len());
                merged.push(Submission {
                    student_name: name,
                    ..submission
                });
            }
            Some(&i) => {
                tracing::debug!(student = %name, "merging repeated submission");
                let target = &mut merged[i];
                if submission.submitted_at > target.submitted_at {
                    target.submitted_at = submission.submitted_at;
                }
                if submission.sheet.is_some() {
                    target.sheet = submission.sheet;
                }
                for answer in submission.answers {
                    match target
                        .answers
                        .iter_mut()
                        .find(|a| a.question_id == answer.question_id)
                    {
                        Some(existing) => *existing = answer,
                        None => target.answers.push(answer),
                    }
                }
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionType;
    use std::path::PathBuf;

    const PAPER: &str = r#"
[paper]
id = "bio-101"
name = "Biology midterm"
default_subject = "science"

[[questions]]
id = "q1"
text = "What is photosynthesis?"
model_answer = "Plants convert light energy into chemical energy."
max_marks = 5
main_question_number = 1

[[questions]]
id = "q2"
text = "Write sum_even"
model_answer = "def sum_even(nums):\n    return sum(n for n in nums if n % 2 == 0)"
max_marks = 2.5
type = "coding"
subject_area = "programming"
main_question_number = 2
or_group = "g2"
"#;

    const SUBMISSIONS: &str = r#"
[[submissions]]
student_name = "Asha"
submitted_at = "2024-03-01T10:00:00Z"

[[submissions.answers]]
question_id = "q1"
text = "Plants use light to make food."
ocr_confidence = 0.92

[[submissions]]
student_name = "Ben"

[[submissions.answers]]
question_id = "q2"
text = "def sum_even(nums): return 0"
language = "python"

[[submissions]]
student_name = "Asha "
submitted_at = "2024-03-01T11:00:00Z"

[[submissions.answers]]
question_id = "q1"
text = "Plants convert light into chemical energy."
"#;

    #[test]
    fn parse_paper_with_defaults() {
        let paper = parse_paper_str(PAPER, &PathBuf::from("paper.toml")).unwrap();
        assert_eq!(paper.id, "bio-101");
        assert_eq!(paper.questions.len(), 2);
        assert_eq!(paper.questions[0].subject_area, "science");
        assert_eq!(paper.questions[0].question_type, QuestionType::Subjective);
        assert_eq!(paper.questions[1].question_type, QuestionType::Coding);
        assert_eq!(paper.questions[1].or_group_id.as_deref(), Some("g2"));
        assert_eq!(paper.raw_max_marks(), 7.5);
    }

    #[test]
    fn parse_and_merge_submissions() {
        let subs = parse_submissions_str(SUBMISSIONS, &PathBuf::from("subs.toml")).unwrap();
        assert_eq!(subs.len(), 2);
        let asha = &subs[0];
        assert_eq!(asha.student_name, "Asha");
        assert_eq!(asha.answers.len(), 1);
        assert_eq!(
            asha.answers[0].text.as_deref(),
            Some("Plants convert light into chemical energy.")
        );
        assert_eq!(
            asha.submitted_at.unwrap().to_rfc3339(),
            "2024-03-01T11:00:00+00:00"
        );
        assert_eq!(subs[1].answers[0].language, Some(Language::Python));
    }

    #[test]
    fn answer_inputs_skip_unknown_questions() {
        let paper = parse_paper_str(PAPER, &PathBuf::from("paper.toml")).unwrap();
        let submission = Submission {
            student_name: "Cai".into(),
            submitted_at: None,
            sheet: None,
            answers: vec![
                SubmittedAnswer {
                    question_id: "q1".into(),
                    text: Some("light".into()),
                    ocr_confidence: Some(0.4),
                    language: None,
                },
                SubmittedAnswer {
                    question_id: "q9".into(),
                    text: Some("?".into()),
                    ocr_confidence: None,
                    language: None,
                },
            ],
        };
        let inputs = submission.answer_inputs(&paper);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].question.id, "q1");
        assert_eq!(inputs[0].ocr_confidence, Some(0.4));
    }

    #[test]
    fn parse_malformed_toml() {
        let result = parse_paper_str("not valid [[[", &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn missing_paper_header_is_an_error() {
        let result = parse_paper_str("[[questions]]\nid = \"q1\"", &PathBuf::from("x.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn parse_paper_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paper.toml");
        std::fs::write(&path, PAPER).unwrap();
        let paper = parse_paper(&path).unwrap();
        assert_eq!(paper.name, "Biology midterm");
        assert!(parse_paper(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn sheet_fills_questions_without_explicit_answers() {
        let paper = parse_paper_str(PAPER, &PathBuf::from("paper.toml")).unwrap();
        let toml = r#"
[[submissions]]
student_name = "Dev"
sheet = """
2) def sum_even(nums):
    return 0
1. Plants turn light into chemical energy.
"""

[[submissions.answers]]
question_id = "q2"
text = "def sum_even(nums): return sum(n for n in nums if n % 2 == 0)"
"#;
        let subs = parse_submissions_str(toml, &PathBuf::from("subs.toml")).unwrap();
        let inputs = subs[0].answer_inputs(&paper);
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[0].question.id, "q2");
        assert!(inputs[0].student_text_or_code.as_deref().unwrap().contains("sum(n for n"));
        assert_eq!(inputs[1].question.id, "q1");
        assert_eq!(
            inputs[1].student_text_or_code.as_deref(),
            Some("Plants turn light into chemical energy.")
        );
    }
}
