//! Splitting a whole answer sheet into per-question answers.
//!
//! OCR of a handwritten script yields one block of text with the student's
//! own question markers ("1.", "2a)", "Q3:", "(b)") in whatever order they
//! answered. Each marker opens a section that runs until the next marker;
//! sections are then mapped onto the paper's question units.

use std::collections::BTreeSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::model::QuestionUnit;
use crate::parser::{QuestionPaper, SubmittedAnswer};
use crate::text::content_terms;

/// One answer section found on a sheet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetSection {
    /// Question unit this section was mapped to, if any.
    pub question_id: Option<String>,
    pub question_number: u32,
    pub sub_question: Option<char>,
    pub content: String,
    /// Byte offset of the marker in the normalized text.
    pub position: usize,
    pub confidence: f64,
}

/// A sheet split into sections and the answers they add up to.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnswerSheet {
    /// Sections in the order they appear on the sheet.
    pub sections: Vec<SheetSection>,
    /// One answer per mapped question, in paper order.
    pub answers: Vec<SubmittedAnswer>,
    /// Question ids in the order the student answered them.
    pub sequence: Vec<String>,
    /// Mean section confidence; 0 when nothing was found.
    pub confidence: f64,
}

fn numbered_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^[ \t]*(?P<prefix>(?:question|ques|qn|q)[ \t]*\.?[ \t]*)?(?P<num>\d{1,3})[ \t]*(?:(?P<delim>[.):])[ \t]*)?(?:\((?P<psub>[a-z])\)|(?P<sub>[a-z])[.)])?(?:[ \t]+(?P<rest>.*))?$",
        )
        .expect("numbered marker regex is valid")
    })
}

fn letter_marker() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^[ \t]*(?:\((?P<psub>[a-z])\)|(?P<sub>[a-z])[.)])(?:[ \t]+(?P<rest>.*))?$")
            .expect("letter marker regex is valid")
    })
}

/// Line endings to `\n`, form feeds to breaks, runs of spaces and tabs to a
/// single space, and no more than one blank line in a row.
pub fn normalize_sheet(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace(['\r', '\x0c'], "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0;
    for line in unified.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(&collapsed);
        out.push('\n');
    }
    out.trim().to_string()
}

/// The letter of a sub-question label: "a", "(a)" and "2a" all give 'a'.
fn sub_letter(label: &str) -> Option<char> {
    label
        .chars()
        .rev()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_lowercase())
}

fn has_unit(paper: &QuestionPaper, number: u32, sub: Option<char>) -> bool {
    paper.questions.iter().any(|q| {
        q.main_question_number == number
            && (sub.is_none() || q.sub_question.as_deref().and_then(sub_letter) == sub)
    })
}

struct Marker {
    number: u32,
    sub: Option<char>,
    rest: String,
}

/// Read a line as a section marker. Numbers and letters the paper does not
/// have are treated as answer text, so a numbered list inside an answer
/// does not split it.
fn marker(line: &str, current: Option<u32>, paper: &QuestionPaper) -> Option<Marker> {
    if let Some(caps) = numbered_marker().captures(line) {
        let explicit = caps.name("prefix").is_some()
            || caps.name("delim").is_some()
            || caps.name("psub").is_some()
            || caps.name("sub").is_some();
        let number = caps.name("num").and_then(|m| m.as_str().parse().ok());
        if let (true, Some(number)) = (explicit, number) {
            let sub = caps
                .name("psub")
                .or_else(|| caps.name("sub"))
                .and_then(|m| sub_letter(m.as_str()));
            if has_unit(paper, number, sub) {
                return Some(Marker {
                    number,
                    sub,
                    rest: caps.name("rest").map_or("", |m| m.as_str()).to_string(),
                });
            }
        }
    }
    let number = current?;
    let caps = letter_marker().captures(line)?;
    let sub = caps
        .name("psub")
        .or_else(|| caps.name("sub"))
        .and_then(|m| sub_letter(m.as_str()))?;
    if !has_unit(paper, number, Some(sub)) {
        return None;
    }
    Some(Marker {
        number,
        sub: Some(sub),
        rest: caps.name("rest").map_or("", |m| m.as_str()).to_string(),
    })
}

fn section_confidence(sub: Option<char>, content: &str) -> f64 {
    let mut confidence = 0.5;
    confidence += if sub.is_some() { 0.3 } else { 0.2 };
    let len = content.chars().count();
    if len > 50 {
        confidence += 0.2;
    } else if len > 20 {
        confidence += 0.1;
    }
    f64::min(confidence, 1.0)
}

/// Pick the question unit a section answers. Where several units share the
/// marker (OR alternatives under one number) the one whose question and
/// model answer share the most terms with the section wins.
fn resolve<'a>(
    paper: &'a QuestionPaper,
    number: u32,
    sub: Option<char>,
    content: &str,
) -> (Option<&'a QuestionUnit>, bool) {
    let candidates: Vec<&QuestionUnit> = paper
        .questions
        .iter()
        .filter(|q| q.main_question_number == number)
        .filter(|q| match sub {
            Some(letter) => q.sub_question.as_deref().and_then(sub_letter) == Some(letter),
            None => true,
        })
        .collect();

    let pool: Vec<&QuestionUnit> = match sub {
        Some(_) => candidates,
        None => {
            let top_level: Vec<&QuestionUnit> = candidates
                .iter()
                .copied()
                .filter(|q| q.sub_question.is_none())
                .collect();
            if top_level.is_empty() {
                candidates
            } else {
                top_level
            }
        }
    };

    match pool.as_slice() {
        [] => (None, false),
        [only] => (Some(*only), false),
        many => {
            let terms = content_terms(content);
            let overlap = |q: &QuestionUnit| -> usize {
                let reference: BTreeSet<String> =
                    content_terms(&format!("{} {}", q.text, q.model_answer));
                terms.intersection(&reference).count()
            };
            let mut best = many[0];
            let mut best_overlap = overlap(best);
            for &q in &many[1..] {
                let o = overlap(q);
                if o > best_overlap {
                    best = q;
                    best_overlap = o;
                }
            }
            (Some(best), true)
        }
    }
}

/// Split a whole answer sheet into answers to the paper's questions.
///
/// Text before the first marker is ignored. Sections that map to the same
/// question are joined with a blank line in sheet order.
pub fn parse_answer_sheet(text: &str, paper: &QuestionPaper) -> AnswerSheet {
    let normalized = normalize_sheet(text);

    struct Open {
        number: u32,
        sub: Option<char>,
        position: usize,
        lines: Vec<String>,
    }

    let mut open: Vec<Open> = Vec::new();
    let mut offset = 0;
    for line in normalized.split('\n') {
        let current = open.last().map(|s| s.number);
        match marker(line, current, paper) {
            Some(m) => {
                let mut lines = Vec::new();
                if !m.rest.trim().is_empty() {
                    lines.push(m.rest.trim().to_string());
                }
                open.push(Open {
                    number: m.number,
                    sub: m.sub,
                    position: offset,
                    lines,
                });
            }
            None => {
                if let Some(section) = open.last_mut() {
                    section.lines.push(line.to_string());
                }
            }
        }
        offset += line.len() + 1;
    }

    let mut sheet = AnswerSheet::default();
    for section in open {
        let content = section.lines.join("\n").trim().to_string();
        let (unit, ambiguous) = resolve(paper, section.number, section.sub, &content);
        let mut confidence = section_confidence(section.sub, &content);
        if ambiguous {
            confidence *= 0.8;
        }
        if unit.is_none() {
            tracing::debug!(
                number = section.number,
                sub = ?section.sub,
                "sheet section matches no single question"
            );
        }
        sheet.sections.push(SheetSection {
            question_id: unit.map(|q| q.id.clone()),
            question_number: section.number,
            sub_question: section.sub,
            content,
            position: section.position,
            confidence,
        });
    }

    for section in &sheet.sections {
        let Some(id) = &section.question_id else {
            continue;
        };
        if section.content.is_empty() {
            continue;
        }
        if !sheet.sequence.contains(id) {
            sheet.sequence.push(id.clone());
        }
    }

    for question in &paper.questions {
        let parts: Vec<&str> = sheet
            .sections
            .iter()
            .filter(|s| s.question_id.as_deref() == Some(question.id.as_str()))
            .map(|s| s.content.as_str())
            .filter(|c| !c.is_empty())
            .collect();
        if parts.is_empty() {
            continue;
        }
        sheet.answers.push(SubmittedAnswer {
            question_id: question.id.clone(),
            text: Some(parts.join("\n\n")),
            ocr_confidence: None,
            language: None,
        });
    }

    if !sheet.sections.is_empty() {
        sheet.confidence = sheet.sections.iter().map(|s| s.confidence).sum::<f64>()
            / sheet.sections.len() as f64;
    }
    tracing::debug!(
        sections = sheet.sections.len(),
        answers = sheet.answers.len(),
        confidence = sheet.confidence,
        "split answer sheet"
    );
    sheet
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionType;

    fn unit(id: &str, number: u32, sub: Option<&str>, text: &str, model: &str) -> QuestionUnit {
        QuestionUnit {
            id: id.into(),
            text: text.into(),
            model_answer: model.into(),
            max_marks: 5.0,
            question_type: QuestionType::Subjective,
            subject_area: "science".into(),
            main_question_number: number,
            sub_question: sub.map(Into::into),
            or_group_id: None,
        }
    }

    fn paper() -> QuestionPaper {
        QuestionPaper {
            id: "p".into(),
            name: "Paper".into(),
            default_subject: "science".into(),
            questions: vec![
                unit("q1", 1, None, "Define photosynthesis.", "Plants make food from light."),
                unit("q2a", 2, Some("a"), "Name a planet.", "Mars."),
                unit("q2b", 2, Some("b"), "Name a star.", "The Sun."),
                unit("q3", 3, None, "Describe evaporation.", "Water turns into vapour when heated."),
            ],
        }
    }

    fn answer<'a>(sheet: &'a AnswerSheet, id: &str) -> Option<&'a str> {
        sheet
            .answers
            .iter()
            .find(|a| a.question_id == id)
            .and_then(|a| a.text.as_deref())
    }

    #[test]
    fn out_of_order_answers_map_by_marker() {
        let text = "Name: Asha\r\n\r\nQ3: Water is heated and becomes vapour.\r\n1. Plants use sunlight\r\nto make glucose.\r\n2a) Mars\r\n(b) The Sun\r\n";
        let sheet = parse_answer_sheet(text, &paper());

        assert_eq!(sheet.sequence, vec!["q3", "q1", "q2a", "q2b"]);
        assert_eq!(answer(&sheet, "q1"), Some("Plants use sunlight\nto make glucose."));
        assert_eq!(answer(&sheet, "q2a"), Some("Mars"));
        assert_eq!(answer(&sheet, "q2b"), Some("The Sun"));
        assert_eq!(answer(&sheet, "q3"), Some("Water is heated and becomes vapour."));
        // Paper order, not sheet order.
        let ids: Vec<&str> = sheet.answers.iter().map(|a| a.question_id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q2a", "q2b", "q3"]);
    }

    #[test]
    fn numbers_not_on_the_paper_stay_in_the_answer() {
        let text = "3. Steps:\n1) heat the water\n7. it evaporates\n3.5 units of heat";
        let sheet = parse_answer_sheet(text, &paper());
        // "1)" is a question on the paper, so it opens q1.
        assert_eq!(answer(&sheet, "q3"), Some("Steps:"));
        assert_eq!(
            answer(&sheet, "q1"),
            Some("heat the water\n7. it evaporates\n3.5 units of heat")
        );
    }

    #[test]
    fn repeated_sections_are_joined() {
        let text = "1. Light is absorbed.\n3. Heat.\n1. Glucose is made.";
        let sheet = parse_answer_sheet(text, &paper());
        assert_eq!(answer(&sheet, "q1"), Some("Light is absorbed.\n\nGlucose is made."));
        assert_eq!(sheet.sequence, vec!["q1", "q3"]);
    }

    #[test]
    fn section_confidence_reflects_marker_and_length() {
        let text = "2a) Mars\n3. Water turns into vapour when it is heated by the sun over a lake.";
        let sheet = parse_answer_sheet(text, &paper());
        assert_eq!(sheet.sections.len(), 2);
        // Lettered marker, short content.
        assert!((sheet.sections[0].confidence - 0.8).abs() < 1e-9);
        // Number only, over fifty characters.
        assert!((sheet.sections[1].confidence - 0.9).abs() < 1e-9);
        assert!((sheet.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn or_alternatives_under_one_number_pick_by_content() {
        let mut paper = paper();
        paper.questions.push(unit(
            "q3alt",
            3,
            None,
            "Describe condensation.",
            "Vapour cools and becomes liquid droplets.",
        ));
        let sheet = parse_answer_sheet("3. Vapour cools into liquid droplets.", &paper);
        assert_eq!(sheet.sections[0].question_id.as_deref(), Some("q3alt"));
        assert!(sheet.sections[0].confidence < 0.8);
    }

    #[test]
    fn empty_or_unmarked_sheet_has_no_answers() {
        let sheet = parse_answer_sheet("just some words without markers", &paper());
        assert!(sheet.sections.is_empty());
        assert!(sheet.answers.is_empty());
        assert_eq!(sheet.confidence, 0.0);
        assert!(parse_answer_sheet("", &paper()).answers.is_empty());
    }

    #[test]
    fn normalization_collapses_whitespace_and_blank_runs() {
        let text = "a \t b\r\n\r\n\r\n\x0cc";
        assert_eq!(normalize_sheet(text), "a b\n\nc");
    }
}
