//! Drift scoring, severity classification, and correction synthesis.

use regex::Regex;
use tracing::debug;

use counterforce_config::DriftWeights;
use counterforce_core::drift::{DriftAnalysis, DriftSeverity, DriftViolation};
use counterforce_core::persona::Persona;

use crate::rules::GENERIC_ASSISTANT_PHRASES;
use crate::soul::extract_markers;

/// Responses shorter than this score 0 with an `insufficient_content`
/// warning — there is nothing meaningful to measure.
const MIN_RESPONSE_CHARS: usize = 10;

/// Score a response against a persona's voice markers.
///
/// Score components, each capped into the final [0, 1]:
/// - persona-specific forbidden-phrase hits × weight
/// - universal generic-assistant-phrase hits × weight
/// - vocabulary-shortfall penalty, only when the present/expected ratio
///   falls below the configured floor, scaled by the shortfall
/// - structural-pattern violations × weight
pub fn analyze_drift(response: &str, persona: &Persona, weights: &DriftWeights) -> DriftAnalysis {
    if response.trim().len() < MIN_RESPONSE_CHARS {
        return DriftAnalysis::stable_with_warning("insufficient_content");
    }
    if !persona.drift_config.enabled {
        return DriftAnalysis::stable_with_warning("check_disabled");
    }

    let markers = extract_markers(&persona.soul.content);
    let response_lower = response.to_lowercase();

    let mut score = 0.0;
    let mut violations: Vec<DriftViolation> = Vec::new();

    // Persona-specific forbidden phrases
    for phrase in &markers.forbidden_phrases {
        if response_lower.contains(&phrase.to_lowercase()) {
            score += weights.forbidden_phrase;
            violations.push(DriftViolation {
                kind: "forbidden_phrase".into(),
                detail: phrase.clone(),
                weight: weights.forbidden_phrase,
            });
        }
    }

    // Universal generic-assistant phrases
    for phrase in GENERIC_ASSISTANT_PHRASES {
        if response_lower.contains(phrase) {
            score += weights.generic_phrase;
            violations.push(DriftViolation {
                kind: "generic_phrase".into(),
                detail: (*phrase).into(),
                weight: weights.generic_phrase,
            });
        }
    }

    // Vocabulary shortfall
    if !markers.vocabulary.is_empty() {
        let present = markers
            .vocabulary
            .iter()
            .filter(|word| response_lower.contains(&word.to_lowercase()))
            .count();
        let ratio = present as f64 / markers.vocabulary.len() as f64;
        if ratio < weights.vocabulary_floor {
            let shortfall = (weights.vocabulary_floor - ratio) / weights.vocabulary_floor;
            let penalty = weights.vocabulary_penalty * shortfall;
            score += penalty;
            let missing: Vec<&str> = markers
                .vocabulary
                .iter()
                .filter(|word| !response_lower.contains(&word.to_lowercase()))
                .map(String::as_str)
                .collect();
            violations.push(DriftViolation {
                kind: "vocabulary_shortfall".into(),
                detail: missing.join(", "),
                weight: penalty,
            });
        }
    }

    // Structural patterns: a match IS the violation
    for pattern in &markers.structural_patterns {
        match Regex::new(pattern) {
            Ok(regex) => {
                if regex.is_match(response) {
                    score += weights.structural_pattern;
                    violations.push(DriftViolation {
                        kind: "structural_pattern".into(),
                        detail: pattern.clone(),
                        weight: weights.structural_pattern,
                    });
                }
            }
            Err(e) => {
                debug!(pattern = %pattern, error = %e, "Skipping unparseable structural pattern");
            }
        }
    }

    let score = score.min(1.0);
    violations.sort_by(|a, b| b.weight.partial_cmp(&a.weight).unwrap_or(std::cmp::Ordering::Equal));

    DriftAnalysis {
        score,
        severity: classify_severity(score, persona.drift_config.severity_threshold),
        violations,
        warnings: Vec::new(),
    }
}

/// Map a drift score onto a severity.
///
/// `<= 0.1` STABLE, `<= threshold` MINOR, `<= threshold + 0.2` WARNING,
/// above that CRITICAL. The threshold is per-persona.
pub fn classify_severity(score: f64, threshold: f64) -> DriftSeverity {
    if score <= 0.1 {
        DriftSeverity::Stable
    } else if score <= threshold {
        DriftSeverity::Minor
    } else if score <= threshold + 0.2 {
        DriftSeverity::Warning
    } else {
        DriftSeverity::Critical
    }
}

/// Compose a corrective directive for the next turn.
///
/// Names the specific violations and the persona itself. `None` whenever
/// the analysis is stable — a stable voice needs no correction.
pub fn generate_drift_correction(analysis: &DriftAnalysis, persona_name: &str) -> Option<String> {
    if analysis.severity == DriftSeverity::Stable {
        return None;
    }

    let mut parts: Vec<String> = Vec::new();

    let forbidden: Vec<&str> = analysis
        .violations
        .iter()
        .filter(|v| v.kind == "forbidden_phrase")
        .map(|v| v.detail.as_str())
        .collect();
    if !forbidden.is_empty() {
        parts.push(format!("never say \"{}\"", forbidden.join("\", \"")));
    }

    let generic: Vec<&str> = analysis
        .violations
        .iter()
        .filter(|v| v.kind == "generic_phrase")
        .map(|v| v.detail.as_str())
        .collect();
    if !generic.is_empty() {
        parts.push(format!(
            "drop the generic assistant phrasing (\"{}\")",
            generic.join("\", \"")
        ));
    }

    if let Some(shortfall) = analysis
        .violations
        .iter()
        .find(|v| v.kind == "vocabulary_shortfall")
    {
        parts.push(format!("work this vocabulary back in: {}", shortfall.detail));
    }

    if analysis
        .violations
        .iter()
        .any(|v| v.kind == "structural_pattern")
    {
        parts.push("keep the prose structure, no list formatting".into());
    }

    if parts.is_empty() {
        parts.push("return to the reference voice".into());
    }

    Some(format!(
        "Stay in character as {persona_name}: {}.",
        parts.join("; ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterforce_core::persona::{DriftConfig, SoulDefinition};

    const SOUL: &str = "\
## Vocabulary
- rocket
- zone
- preterite

## Forbidden Phrases
- happy to help

## Structural Patterns
- (?m)^\\s*[-*] .+
";

    fn persona(enabled: bool, threshold: f64) -> Persona {
        Persona {
            id: "p1".into(),
            slug: "slothrop".into(),
            name: "Slothrop".into(),
            soul: SoulDefinition {
                content: SOUL.into(),
                integrity_hash: "unchecked-here".into(),
                version: 1,
            },
            drift_config: DriftConfig {
                enabled,
                severity_threshold: threshold,
            },
        }
    }

    #[test]
    fn short_response_short_circuits_regardless_of_markers() {
        let analysis = analyze_drift("ok then.", &persona(true, 0.3), &DriftWeights::default());
        assert_eq!(analysis.score, 0.0);
        assert_eq!(analysis.severity, DriftSeverity::Stable);
        assert_eq!(analysis.warnings, vec!["insufficient_content"]);
    }

    #[test]
    fn disabled_check_short_circuits() {
        let analysis = analyze_drift(
            "happy to help! as an ai I'd be happy to assist you today",
            &persona(false, 0.3),
            &DriftWeights::default(),
        );
        assert_eq!(analysis.score, 0.0);
        assert_eq!(analysis.warnings, vec!["check_disabled"]);
    }

    #[test]
    fn on_voice_response_is_stable() {
        // Uses the vocabulary, avoids every phrase table, stays in prose
        let analysis = analyze_drift(
            "The rocket is somewhere over the zone tonight, and the preterite wait underneath.",
            &persona(true, 0.3),
            &DriftWeights::default(),
        );
        assert_eq!(analysis.severity, DriftSeverity::Stable);
        assert!(analysis.score <= 0.1);
    }

    #[test]
    fn forbidden_plus_two_generic_is_critical_with_correction() {
        // One forbidden phrase (0.25) + two universal generic phrases
        // (2 × 0.15) + full vocabulary shortfall — score >= 0.5, CRITICAL.
        let response = "I'm happy to help! As an AI, I'd be happy to explain anything you need.";
        let analysis = analyze_drift(response, &persona(true, 0.3), &DriftWeights::default());

        assert!(analysis.score >= 0.5, "score {}", analysis.score);
        assert_eq!(analysis.severity, DriftSeverity::Critical);

        let correction = generate_drift_correction(&analysis, "Slothrop").unwrap();
        assert!(correction.contains("Slothrop"));
        assert!(correction.contains("happy to help"));
    }

    #[test]
    fn vocabulary_shortfall_only_below_floor() {
        let weights = DriftWeights::default();
        // All three vocabulary words present: ratio 1.0, no penalty
        let analysis = analyze_drift(
            "rocket zone preterite, a sentence long enough to measure",
            &persona(true, 0.3),
            &weights,
        );
        assert!(!analysis.violations.iter().any(|v| v.kind == "vocabulary_shortfall"));

        // None present: ratio 0, full penalty
        let analysis = analyze_drift(
            "a sentence long enough to measure with nothing expected in it",
            &persona(true, 0.3),
            &weights,
        );
        let shortfall = analysis
            .violations
            .iter()
            .find(|v| v.kind == "vocabulary_shortfall")
            .unwrap();
        assert!((shortfall.weight - weights.vocabulary_penalty).abs() < 1e-9);
        assert!(shortfall.detail.contains("rocket"));
    }

    #[test]
    fn structural_pattern_match_is_violation() {
        let analysis = analyze_drift(
            "Here is the answer:\n- first point about the rocket\n- second point about the zone",
            &persona(true, 0.3),
            &DriftWeights::default(),
        );
        assert!(analysis.violations.iter().any(|v| v.kind == "structural_pattern"));
    }

    #[test]
    fn severity_boundaries_default_threshold() {
        assert_eq!(classify_severity(0.0, 0.3), DriftSeverity::Stable);
        assert_eq!(classify_severity(0.1, 0.3), DriftSeverity::Stable);
        assert_eq!(classify_severity(0.3, 0.3), DriftSeverity::Minor);
        assert_eq!(classify_severity(0.5, 0.3), DriftSeverity::Warning);
        assert_eq!(classify_severity(0.50001, 0.3), DriftSeverity::Critical);
    }

    #[test]
    fn severity_boundaries_custom_threshold() {
        assert_eq!(classify_severity(0.1, 0.5), DriftSeverity::Stable);
        assert_eq!(classify_severity(0.5, 0.5), DriftSeverity::Minor);
        assert_eq!(classify_severity(0.7, 0.5), DriftSeverity::Warning);
        assert_eq!(classify_severity(0.71, 0.5), DriftSeverity::Critical);
    }

    #[test]
    fn stable_analysis_yields_no_correction() {
        let analysis = DriftAnalysis {
            score: 0.05,
            severity: DriftSeverity::Stable,
            violations: vec![],
            warnings: vec![],
        };
        assert!(generate_drift_correction(&analysis, "Slothrop").is_none());
    }

    #[test]
    fn score_capped_at_one() {
        // Pile up every violation type
        let response = "happy to help, as an ai, i'd be happy to, great question, \
                        let me know if, i hope this helps, feel free to ask\n- and a list";
        let analysis = analyze_drift(response, &persona(true, 0.3), &DriftWeights::default());
        assert!(analysis.score <= 1.0);
        assert_eq!(analysis.severity, DriftSeverity::Critical);
    }
}
