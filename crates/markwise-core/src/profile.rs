//! Subject weight profiles for the four prose dimensions.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// Subjects with their own weight profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    Science,
    Math,
    Humanities,
    Programming,
    General,
}

impl Subject {
    pub const ALL: [Subject; 5] = [
        Subject::Science,
        Subject::Math,
        Subject::Humanities,
        Subject::Programming,
        Subject::General,
    ];

    /// What the profile emphasises.
    pub fn description(&self) -> &'static str {
        match self {
            Subject::Science => "Emphasizes scientific concepts and terminology",
            Subject::Math => "Focuses on mathematical accuracy and proper notation",
            Subject::Humanities => "Values analytical thinking and structured argumentation",
            Subject::Programming => "Emphasizes technical accuracy and implementation details",
            Subject::General => "Balanced evaluation focusing on understanding and expression",
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Subject::Science => "science",
            Subject::Math => "math",
            Subject::Humanities => "humanities",
            Subject::Programming => "programming",
            Subject::General => "general",
        };
        f.write_str(name)
    }
}

impl FromStr for Subject {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "science" => Ok(Subject::Science),
            "math" => Ok(Subject::Math),
            "humanities" => Ok(Subject::Humanities),
            "programming" => Ok(Subject::Programming),
            "general" => Ok(Subject::General),
            other => Err(format!("unknown subject: {other}")),
        }
    }
}

/// Labels that are not profile names but clearly belong to one.
const ALIASES: &[(&str, Subject)] = &[
    ("physics", Subject::Science),
    ("chemistry", Subject::Science),
    ("biology", Subject::Science),
    ("maths", Subject::Math),
    ("mathematics", Subject::Math),
    ("statistics", Subject::Math),
    ("history", Subject::Humanities),
    ("literature", Subject::Humanities),
    ("english", Subject::Humanities),
    ("philosophy", Subject::Humanities),
    ("computer science", Subject::Programming),
    ("cs", Subject::Programming),
    ("coding", Subject::Programming),
];

/// Weights for semantic, keyword, structure and comprehensiveness.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubjectWeights {
    pub semantic: f64,
    pub keyword: f64,
    pub structure: f64,
    pub comprehensiveness: f64,
}

impl SubjectWeights {
    pub const fn new(semantic: f64, keyword: f64, structure: f64, comprehensiveness: f64) -> Self {
        Self {
            semantic,
            keyword,
            structure,
            comprehensiveness,
        }
    }

    pub fn sum(&self) -> f64 {
        self.semantic + self.keyword + self.structure + self.comprehensiveness
    }

    /// Weights must be non-negative and sum to 1.0.
    pub fn validate(&self, subject: &str) -> Result<(), ConfigurationError> {
        let parts = [
            self.semantic,
            self.keyword,
            self.structure,
            self.comprehensiveness,
        ];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigurationError::InvalidProfile {
                subject: subject.to_string(),
                reason: "weights must be finite and non-negative".into(),
            });
        }
        if (self.sum() - 1.0).abs() > 1e-6 {
            return Err(ConfigurationError::InvalidProfile {
                subject: subject.to_string(),
                reason: format!("weights sum to {:.4}, expected 1.0", self.sum()),
            });
        }
        Ok(())
    }
}

/// Built-in weight table.
pub fn default_weights(subject: Subject) -> SubjectWeights {
    match subject {
        Subject::Science => SubjectWeights::new(0.35, 0.35, 0.15, 0.15),
        Subject::Math => SubjectWeights::new(0.30, 0.40, 0.15, 0.15),
        Subject::Humanities => SubjectWeights::new(0.40, 0.25, 0.20, 0.15),
        Subject::Programming => SubjectWeights::new(0.25, 0.45, 0.15, 0.15),
        Subject::General => SubjectWeights::new(0.35, 0.30, 0.20, 0.15),
    }
}

/// How a subject label was matched to a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileMatch {
    Exact,
    Alias,
    /// Unknown or blank label, general weights substituted.
    Fallback,
}

/// A resolved profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedProfile {
    pub subject: Subject,
    pub weights: SubjectWeights,
    pub matched: ProfileMatch,
}

/// Maps subject labels to validated weight vectors.
#[derive(Debug, Clone)]
pub struct SubjectProfileResolver {
    table: HashMap<Subject, SubjectWeights>,
}

impl SubjectProfileResolver {
    /// Built-in table, optionally with per-subject overrides (e.g. from
    /// config). Every entry is validated.
    pub fn new(overrides: &HashMap<Subject, SubjectWeights>) -> Result<Self, ConfigurationError> {
        let mut table = HashMap::new();
        for subject in Subject::ALL {
            let weights = overrides
                .get(&subject)
                .copied()
                .unwrap_or_else(|| default_weights(subject));
            weights.validate(&subject.to_string())?;
            table.insert(subject, weights);
        }
        Ok(Self { table })
    }

    pub fn weights(&self, subject: Subject) -> SubjectWeights {
        self.table
            .get(&subject)
            .copied()
            .unwrap_or_else(|| default_weights(subject))
    }

    /// Resolve a free-form subject label.
    ///
    /// Unknown or blank labels fall back to `general` and are logged.
    pub fn resolve(&self, label: &str) -> ResolvedProfile {
        let normalized = label.trim().to_lowercase();
        if let Ok(subject) = normalized.parse::<Subject>() {
            return ResolvedProfile {
                subject,
                weights: self.weights(subject),
                matched: ProfileMatch::Exact,
            };
        }
        if let Some((_, subject)) = ALIASES.iter().find(|(alias, _)| *alias == normalized) {
            tracing::debug!(label, subject = %subject, "subject label matched by alias");
            return ResolvedProfile {
                subject: *subject,
                weights: self.weights(*subject),
                matched: ProfileMatch::Alias,
            };
        }
        tracing::warn!(label, "unknown subject profile, using general weights");
        ResolvedProfile {
            subject: Subject::General,
            weights: self.weights(Subject::General),
            matched: ProfileMatch::Fallback,
        }
    }
}

impl Default for SubjectProfileResolver {
    fn default() -> Self {
        Self {
            table: Subject::ALL
                .into_iter()
                .map(|s| (s, default_weights(s)))
                .collect(),
        }
    }
}
