//! Merges dimension scores, subject weights and an optional LLM opinion
//! into one score in [0, 1] with feedback text.

use crate::analyzer::{COMPREHENSIVENESS, KEYWORD, SEMANTIC, STRUCTURE};
use crate::code::{EXECUTION, LOGIC, STYLE, SYNTAX};
use crate::error::ConfigurationError;
use crate::model::{DimensionScores, EvaluationSource, LlmOpinion};
use crate::profile::SubjectWeights;

pub const DEFAULT_HYBRID_WEIGHT: f64 = 0.6;

/// Weighted sum of the four prose dimensions, in [0, 1].
pub fn transformer_score(scores: &DimensionScores, weights: &SubjectWeights) -> f64 {
    let total = weights.semantic * scores.get(SEMANTIC) / 100.0
        + weights.keyword * scores.get(KEYWORD) / 100.0
        + weights.structure * scores.get(STRUCTURE) / 100.0
        + weights.comprehensiveness * scores.get(COMPREHENSIVENESS) / 100.0;
    total.clamp(0.0, 1.0)
}

/// Combines the transformer score with an optional LLM opinion.
#[derive(Debug, Clone, Copy)]
pub struct ScoreCombiner {
    hybrid_weight: f64,
}

impl Default for ScoreCombiner {
    fn default() -> Self {
        Self {
            hybrid_weight: DEFAULT_HYBRID_WEIGHT,
        }
    }
}

impl ScoreCombiner {
    pub fn new(hybrid_weight: f64) -> Result<Self, ConfigurationError> {
        if !hybrid_weight.is_finite() || !(0.0..=1.0).contains(&hybrid_weight) {
            return Err(ConfigurationError::InvalidHybridWeight(hybrid_weight));
        }
        Ok(Self { hybrid_weight })
    }

    pub fn hybrid_weight(&self) -> f64 {
        self.hybrid_weight
    }

    /// Final score and which path produced it.
    ///
    /// Without an opinion the transformer score is returned untouched.
    pub fn combine(&self, transformer: f64, opinion: Option<&LlmOpinion>) -> (f64, EvaluationSource) {
        match opinion {
            None => (transformer, EvaluationSource::Transformer),
            Some(opinion) => {
                let hybrid = self.hybrid_weight * opinion.score
                    + (1.0 - self.hybrid_weight) * transformer;
                (hybrid.clamp(0.0, 1.0), EvaluationSource::Hybrid)
            }
        }
    }
}

/// Transformer dimensions plus the LLM's own dimension scores, the latter
/// prefixed with `llm_`.
pub fn merge_breakdown(transformer: &DimensionScores, opinion: Option<&LlmOpinion>) -> DimensionScores {
    let llm = opinion
        .into_iter()
        .flat_map(|o| o.dimension_scores.iter())
        .map(|(k, v)| (format!("llm_{k}"), v));
    DimensionScores::new(
        transformer
            .iter()
            .map(|(k, v)| (k.to_string(), v))
            .chain(llm),
    )
}

/// Overall verdict for a final score in [0, 1].
pub fn headline(final_score: f64) -> &'static str {
    let pct = final_score * 100.0;
    if pct >= 85.0 {
        "Excellent answer"
    } else if pct >= 70.0 {
        "Good answer"
    } else if pct >= 50.0 {
        "Fair answer"
    } else {
        "Needs improvement"
    }
}

/// Threshold bucket for one dimension score.
pub fn bucket(score: f64) -> &'static str {
    if score < 40.0 {
        "weak"
    } else if score <= 70.0 {
        "adequate"
    } else {
        "strong"
    }
}

fn dimension_label(dimension: &str) -> &str {
    match dimension {
        SEMANTIC => "Semantic similarity",
        KEYWORD => "Key term coverage",
        STRUCTURE => "Structure",
        COMPREHENSIVENESS => "Topic coverage",
        SYNTAX => "Syntax",
        LOGIC => "Logic",
        EXECUTION => "Test results",
        STYLE => "Style",
        other => other,
    }
}

/// Compose the feedback paragraph.
///
/// With an opinion, the LLM's strengths, weaknesses and missing points come
/// first; the per-dimension buckets follow. `notes` are appended as-is.
pub fn compose_feedback(
    final_score: f64,
    dimensions: &DimensionScores,
    opinion: Option<&LlmOpinion>,
    notes: &[String],
) -> String {
    let mut parts = vec![format!(
        "{} ({:.0}%).",
        headline(final_score),
        final_score * 100.0
    )];

    if let Some(opinion) = opinion {
        if let Some(summary) = &opinion.summary {
            parts.push(summary.trim().to_string());
        }
        for (title, items) in [
            ("Strengths", &opinion.strengths),
            ("Weaknesses", &opinion.weaknesses),
            ("Missing points", &opinion.missing_points),
        ] {
            if !items.is_empty() {
                parts.push(format!("{title}: {}.", items.join("; ")));
            }
        }
    }

    let breakdown: Vec<String> = dimensions
        .iter()
        .filter(|(k, _)| !k.starts_with("llm_"))
        .map(|(k, v)| format!("{} is {} ({v:.0})", dimension_label(k), bucket(v)))
        .collect();
    if !breakdown.is_empty() {
        parts.push(format!("{}.", breakdown.join("; ")));
    }

    for note in notes {
        parts.push(format!("Note: {note}."));
    }
    parts.join(" ")
}
