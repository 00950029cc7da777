//! Grading report types with JSON persistence.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::groups::ResolvedPaper;
use crate::model::{EvaluationResult, StudentTotal};
use crate::statistics::PaperAnalytics;

/// A complete grading report for one paper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// Summary of the question paper.
    pub paper: PaperSummary,
    /// Per-student evaluations and resolved marks, in submission order.
    pub students: Vec<StudentReport>,
    /// Ranked totals.
    pub totals: Vec<StudentTotal>,
    pub analytics: PaperAnalytics,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

/// Summary of a paper (without the questions themselves).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperSummary {
    pub id: String,
    pub name: String,
    pub question_count: usize,
    /// Marks available after OR-group and sub-question resolution.
    pub total_marks: f64,
}

/// Everything graded for one student.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudentReport {
    pub student_name: String,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    pub evaluations: Vec<EvaluationResult>,
    pub resolved: ResolvedPaper,
    /// Answer-level validation warnings, keyed by question ID.
    #[serde(default)]
    pub warnings: Vec<AnswerWarning>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerWarning {
    pub question_id: String,
    pub message: String,
}

impl GradingReport {
    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: GradingReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    pub fn student(&self, name: &str) -> Option<&StudentReport> {
        self.students.iter().find(|s| s.student_name == name)
    }

    pub fn total_for(&self, name: &str) -> Option<&StudentTotal> {
        self.totals.iter().find(|t| t.student_name == name)
    }

    /// Evaluations that degraded or were flagged for review.
    pub fn flagged(&self) -> impl Iterator<Item = (&str, &EvaluationResult)> {
        self.students.iter().flat_map(|s| {
            s.evaluations
                .iter()
                .filter(|e| e.low_confidence() || !e.notices().is_empty())
                .map(move |e| (s.student_name.as_str(), e))
        })
    }
}
