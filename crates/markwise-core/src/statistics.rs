//! Paper analytics: score distribution, per-subject and per-question stats.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::aggregate::round1;
use crate::model::{EvaluationResult, EvaluationSource, StudentTotal};

/// Named percentage ranges used for the distribution.
pub const DISTRIBUTION_BUCKETS: [(&str, f64, f64); 6] = [
    ("Excellent", 90.0, 100.0),
    ("Very Good", 80.0, 90.0),
    ("Good", 70.0, 80.0),
    ("Satisfactory", 60.0, 70.0),
    ("Needs Improvement", 50.0, 60.0),
    ("Poor", 0.0, 50.0),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionBucket {
    pub label: String,
    pub min_percentage: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectStats {
    pub subject: String,
    pub answers: usize,
    pub average_percentage: f64,
    pub median_percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionStats {
    pub question_id: String,
    pub answers: usize,
    pub average_marks: f64,
    pub max_marks: f64,
    /// Answers that took the hybrid path.
    pub hybrid_count: usize,
}

/// Analytics for one graded paper.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperAnalytics {
    pub student_count: usize,
    pub average_percentage: f64,
    pub median_percentage: f64,
    pub highest_percentage: f64,
    pub lowest_percentage: f64,
    pub distribution: Vec<DistributionBucket>,
    pub subjects: Vec<SubjectStats>,
    pub questions: Vec<QuestionStats>,
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Distribution label for a percentage.
pub fn bucket_label(percentage: f64) -> &'static str {
    DISTRIBUTION_BUCKETS
        .iter()
        .find(|(_, min, _)| percentage >= *min)
        .map_or("Poor", |(label, _, _)| *label)
}

/// Compute analytics from ranked totals and every evaluation, each paired
/// with its resolved subject name.
pub fn compute_analytics<'a>(
    totals: &[StudentTotal],
    evaluations: impl IntoIterator<Item = (&'a str, &'a EvaluationResult)>,
) -> PaperAnalytics {
    let percentages: Vec<f64> = totals.iter().map(|t| t.percentage).collect();

    let distribution = DISTRIBUTION_BUCKETS
        .iter()
        .map(|(label, min, _)| DistributionBucket {
            label: label.to_string(),
            min_percentage: *min,
            count: percentages.iter().filter(|p| bucket_label(**p) == *label).count(),
        })
        .collect();

    let mut by_subject: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut by_question: BTreeMap<String, (Vec<f64>, f64, usize)> = BTreeMap::new();
    for (subject, eval) in evaluations {
        if eval.max_marks() > 0.0 {
            by_subject
                .entry(subject.to_string())
                .or_default()
                .push(eval.marks_awarded() / eval.max_marks() * 100.0);
        }
        let entry = by_question
            .entry(eval.question_id().to_string())
            .or_insert_with(|| (Vec::new(), eval.max_marks(), 0));
        entry.0.push(eval.marks_awarded());
        if eval.source() == EvaluationSource::Hybrid {
            entry.2 += 1;
        }
    }

    let subjects = by_subject
        .into_iter()
        .map(|(subject, values)| SubjectStats {
            subject,
            answers: values.len(),
            average_percentage: round1(mean(&values)),
            median_percentage: round1(median(&values)),
        })
        .collect();

    let questions = by_question
        .into_iter()
        .map(|(question_id, (marks, max_marks, hybrid_count))| QuestionStats {
            question_id,
            answers: marks.len(),
            average_marks: (mean(&marks) * 100.0).round() / 100.0,
            max_marks,
            hybrid_count,
        })
        .collect();

    PaperAnalytics {
        student_count: totals.len(),
        average_percentage: round1(mean(&percentages)),
        median_percentage: round1(median(&percentages)),
        highest_percentage: percentages.iter().copied().fold(0.0, f64::max),
        lowest_percentage: if percentages.is_empty() {
            0.0
        } else {
            percentages.iter().copied().fold(f64::INFINITY, f64::min)
        },
        distribution,
        subjects,
        questions,
    }
}
