//! Raw dimension scores for prose answers.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::embedding::{cosine_similarity, Embedder};
use crate::model::DimensionScores;
use crate::text;

pub const SEMANTIC: &str = "semantic";
pub const KEYWORD: &str = "keyword";
pub const STRUCTURE: &str = "structure";
pub const COMPREHENSIVENESS: &str = "comprehensiveness";

/// Output of [`DimensionAnalyzer::analyze`].
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectiveAnalysis {
    pub scores: DimensionScores,
    /// Set when the answer was empty and every dimension was zeroed.
    pub low_confidence: bool,
}

/// Computes semantic, keyword, structure and comprehensiveness scores.
///
/// Holds the shared embedding model; cheap to clone.
#[derive(Clone)]
pub struct DimensionAnalyzer {
    embedder: Arc<dyn Embedder>,
}

impl DimensionAnalyzer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }

    pub fn analyze(&self, student: &str, model_answer: &str) -> SubjectiveAnalysis {
        if student.trim().is_empty() {
            return SubjectiveAnalysis {
                scores: DimensionScores::new([
                    (SEMANTIC, 0.0),
                    (KEYWORD, 0.0),
                    (STRUCTURE, 0.0),
                    (COMPREHENSIVENESS, 0.0),
                ]),
                low_confidence: true,
            };
        }

        let student_terms = text::content_terms(student);
        let scores = DimensionScores::new([
            (SEMANTIC, self.semantic(student, model_answer)),
            (KEYWORD, keyword_score(&student_terms, student, model_answer)),
            (STRUCTURE, structure_score(student, model_answer)),
            (
                COMPREHENSIVENESS,
                comprehensiveness_score(&student_terms, student, model_answer),
            ),
        ]);
        tracing::debug!(?scores, "subjective dimensions computed");

        SubjectiveAnalysis {
            scores,
            low_confidence: false,
        }
    }

    fn semantic(&self, student: &str, model_answer: &str) -> f64 {
        let a = self.embedder.embed(student);
        let b = self.embedder.embed(model_answer);
        cosine_similarity(&a, &b).max(0.0) * 100.0
    }
}

/// Score used when the model answer has no content words to compare.
fn literal_match(student: &str, model_answer: &str) -> f64 {
    if text::normalize(student) == text::normalize(model_answer) {
        100.0
    } else {
        0.0
    }
}

fn keyword_score(student_terms: &BTreeSet<String>, student: &str, model_answer: &str) -> f64 {
    let key_terms = text::content_terms(model_answer);
    if key_terms.is_empty() {
        return literal_match(student, model_answer);
    }
    let present = key_terms
        .iter()
        .filter(|t| student_terms.contains(*t))
        .count();
    present as f64 / key_terms.len() as f64 * 100.0
}

/// 1.0 when counts match, falling linearly to 0 at twice (or zero times) the
/// reference count.
fn count_similarity(actual: usize, reference: usize) -> f64 {
    let reference = reference.max(1) as f64;
    1.0 - ((actual as f64 / reference) - 1.0).abs().min(1.0)
}

/// Shape of the answer: 70 points for sentence/paragraph proportions,
/// 15 for discourse markers, 15 for a clean (non-truncated) ending.
fn structure_score(student: &str, model_answer: &str) -> f64 {
    let sentence_sim = count_similarity(
        text::sentences(student).len(),
        text::sentences(model_answer).len(),
    );
    let paragraph_sim = count_similarity(text::paragraphs(student), text::paragraphs(model_answer));
    let proportion = 70.0 * (0.8 * sentence_sim + 0.2 * paragraph_sim);

    let model_markers = text::discourse_markers(model_answer);
    let marker_ratio = if model_markers == 0 {
        1.0
    } else {
        (text::discourse_markers(student) as f64 / model_markers as f64).min(1.0)
    };
    let markers = 15.0 * marker_ratio;

    let truncated = !text::ends_cleanly(student) && text::ends_cleanly(model_answer);
    let ending = if truncated { 0.0 } else { 15.0 };

    proportion + markers + ending
}

/// Fraction of model-answer segments (sentences) with at least one of
/// their concepts present in the student answer.
fn comprehensiveness_score(
    student_terms: &BTreeSet<String>,
    student: &str,
    model_answer: &str,
) -> f64 {
    let segments: Vec<BTreeSet<String>> = text::sentences(model_answer)
        .into_iter()
        .map(text::content_terms)
        .filter(|terms| !terms.is_empty())
        .collect();
    if segments.is_empty() {
        return literal_match(student, model_answer);
    }
    let covered = segments
        .iter()
        .filter(|terms| terms.iter().any(|t| student_terms.contains(t)))
        .count();
    covered as f64 / segments.len() as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    const MODEL: &str = "Photosynthesis converts light energy into chemical energy. \
        Chlorophyll in the chloroplasts absorbs sunlight. \
        Therefore, plants produce glucose and release oxygen.";

    fn analyzer() -> DimensionAnalyzer {
        DimensionAnalyzer::new(Arc::new(HashingEmbedder::default()))
    }

    #[test]
    fn identical_answer_scores_full_marks() {
        let result = analyzer().analyze(MODEL, MODEL);
        assert!(!result.low_confidence);
        for dim in [SEMANTIC, KEYWORD, STRUCTURE, COMPREHENSIVENESS] {
            assert!(
                (result.scores.get(dim) - 100.0).abs() < 1e-6,
                "{dim} = {}",
                result.scores.get(dim)
            );
        }
    }

    #[test]
    fn empty_answer_is_zero_and_low_confidence() {
        for answer in ["", "   ", "\n\t"] {
            let result = analyzer().analyze(answer, MODEL);
            assert!(result.low_confidence);
            assert_eq!(result.scores.len(), 4);
            assert!(result.scores.all_zero());
        }
    }

    #[test]
    fn partial_answer_scores_between_extremes() {
        let result = analyzer().analyze("Plants absorb sunlight with chlorophyll.", MODEL);
        let keyword = result.scores.get(KEYWORD);
        assert!(keyword > 0.0 && keyword < 100.0, "keyword = {keyword}");
        let comp = result.scores.get(COMPREHENSIVENESS);
        assert!(comp > 0.0 && comp < 100.0, "comprehensiveness = {comp}");
    }

    #[test]
    fn unrelated_answer_scores_low() {
        let result = analyzer().analyze(
            "The Treaty of Versailles ended the First World War.",
            MODEL,
        );
        assert_eq!(result.scores.get(KEYWORD), 0.0);
        assert_eq!(result.scores.get(COMPREHENSIVENESS), 0.0);
        assert!(result.scores.get(SEMANTIC) < 30.0);
    }

    #[test]
    fn inflected_key_terms_still_count() {
        let a = analyzer();
        let result = a.analyze("A running process.", "Processes that are run.");
        assert_eq!(result.scores.get(KEYWORD), 100.0);
        let result = a.analyze("Classes of data.", "A class of data.");
        assert_eq!(result.scores.get(KEYWORD), 100.0);
    }

    #[test]
    fn truncated_answer_loses_structure_points() {
        let full = structure_score("Energy is stored. Oxygen is released.", "A is B. C is D.");
        let cut = structure_score("Energy is stored. Oxygen is rel", "A is B. C is D.");
        assert!(full > cut);
    }

    #[test]
    fn numeric_model_answer_uses_literal_match() {
        let a = analyzer();
        assert_eq!(a.analyze("42", "42").scores.get(KEYWORD), 100.0);
        assert_eq!(a.analyze("41", "42").scores.get(KEYWORD), 0.0);
        assert_eq!(a.analyze("x", "=").scores.get(COMPREHENSIVENESS), 0.0);
    }
}
