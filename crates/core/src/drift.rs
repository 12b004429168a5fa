//! Drift analysis types — per-turn, never persisted.

use serde::{Deserialize, Serialize};

/// How far a response has drifted from the persona's reference voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftSeverity {
    Stable,
    Minor,
    Warning,
    Critical,
}

/// A single matched violation contributing to the drift score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftViolation {
    /// Which rule family matched: `forbidden_phrase`, `generic_phrase`,
    /// `vocabulary_shortfall`, or `structural_pattern`.
    pub kind: String,

    /// The phrase or pattern involved.
    pub detail: String,

    /// Score contribution of this violation.
    pub weight: f64,
}

/// The result of scoring one response against a persona's markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftAnalysis {
    /// Drift score in [0, 1]; 0 means on-voice.
    pub score: f64,

    pub severity: DriftSeverity,

    /// Violations that contributed to the score, worst first.
    #[serde(default)]
    pub violations: Vec<DriftViolation>,

    /// Non-scoring notes: `insufficient_content`, `check_disabled`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DriftAnalysis {
    /// A zero-score stable analysis carrying one warning.
    pub fn stable_with_warning(warning: &str) -> Self {
        Self {
            score: 0.0,
            severity: DriftSeverity::Stable,
            violations: Vec::new(),
            warnings: vec![warning.into()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(DriftSeverity::Stable < DriftSeverity::Minor);
        assert!(DriftSeverity::Minor < DriftSeverity::Warning);
        assert!(DriftSeverity::Warning < DriftSeverity::Critical);
    }

    #[test]
    fn stable_with_warning_has_zero_score() {
        let analysis = DriftAnalysis::stable_with_warning("insufficient_content");
        assert_eq!(analysis.score, 0.0);
        assert_eq!(analysis.severity, DriftSeverity::Stable);
        assert_eq!(analysis.warnings, vec!["insufficient_content"]);
    }

    #[test]
    fn severity_serializes_screaming() {
        let json = serde_json::to_string(&DriftSeverity::Critical).unwrap();
        assert_eq!(json, "\"CRITICAL\"");
    }
}
