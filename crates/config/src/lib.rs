//! Configuration loading, validation, and management for Counterforce.
//!
//! Loads configuration from a TOML file with environment variable
//! overrides. Validates all numeric ranges at startup so the engine never
//! runs with a weight outside [0, 1] or a zero budget.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Environment variable overriding the store path.
pub const STORE_PATH_ENV: &str = "COUNTERFORCE_DB";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// The root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub budget: BudgetConfig,

    #[serde(default)]
    pub relationship: RelationshipConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub drift: DriftWeights,

    #[serde(default)]
    pub atmosphere: AtmosphereConfig,
}

/// Persistent store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite path; `":memory:"` for an ephemeral database.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "counterforce.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

/// Token budgets for context assembly.
///
/// Each component has a fixed sub-budget; the total bounds the composed
/// prompt. Estimation is the 4-chars-per-token heuristic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_total_tokens")]
    pub total_tokens: usize,

    #[serde(default = "default_drift_tokens")]
    pub drift_correction: usize,

    #[serde(default = "default_relationship_tokens")]
    pub relationship: usize,

    #[serde(default = "default_setting_tokens")]
    pub setting: usize,

    #[serde(default = "default_memories_tokens")]
    pub memories: usize,

    #[serde(default = "default_ambient_tokens")]
    pub ambient: usize,
}

fn default_total_tokens() -> usize {
    2048
}
fn default_drift_tokens() -> usize {
    256
}
fn default_relationship_tokens() -> usize {
    192
}
fn default_setting_tokens() -> usize {
    192
}
fn default_memories_tokens() -> usize {
    768
}
fn default_ambient_tokens() -> usize {
    512
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            total_tokens: default_total_tokens(),
            drift_correction: default_drift_tokens(),
            relationship: default_relationship_tokens(),
            setting: default_setting_tokens(),
            memories: default_memories_tokens(),
            ambient: default_ambient_tokens(),
        }
    }
}

/// Relationship tracker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipConfig {
    /// Familiarity delta for a fully-engaged session, before the
    /// engagement multiplier.
    #[serde(default = "default_base_delta")]
    pub base_delta: f64,

    /// Hard cap on the per-session familiarity delta.
    #[serde(default = "default_max_delta")]
    pub max_delta: f64,

    #[serde(default = "default_engagement_floor")]
    pub engagement_floor: f64,

    #[serde(default = "default_engagement_ceiling")]
    pub engagement_ceiling: f64,
}

fn default_base_delta() -> f64 {
    0.05
}
fn default_max_delta() -> f64 {
    0.08
}
fn default_engagement_floor() -> f64 {
    0.1
}
fn default_engagement_ceiling() -> f64 {
    2.0
}

impl Default for RelationshipConfig {
    fn default() -> Self {
        Self {
            base_delta: default_base_delta(),
            max_delta: default_max_delta(),
            engagement_floor: default_engagement_floor(),
            engagement_ceiling: default_engagement_ceiling(),
        }
    }
}

/// Memory pipeline tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Candidates below this importance are dropped at extraction.
    #[serde(default = "default_min_importance")]
    pub min_importance: f64,

    /// Per-session candidate cap.
    #[serde(default = "default_max_candidates")]
    pub max_candidates_per_session: usize,

    /// Sessions longer than this earn the length bonus.
    #[serde(default = "default_length_bonus_minutes")]
    pub length_bonus_minutes: f64,

    /// Importance bonus for long sessions.
    #[serde(default = "default_length_bonus")]
    pub length_bonus: f64,

    /// Similarity floor for semantic retrieval.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Hybrid blend weights: similarity, recency, importance.
    #[serde(default = "default_hybrid_weights")]
    pub hybrid_weights: [f64; 3],

    /// Default retrieval result cap.
    #[serde(default = "default_retrieval_limit")]
    pub retrieval_limit: usize,
}

fn default_min_importance() -> f64 {
    0.3
}
fn default_max_candidates() -> usize {
    5
}
fn default_length_bonus_minutes() -> f64 {
    20.0
}
fn default_length_bonus() -> f64 {
    0.1
}
fn default_min_similarity() -> f64 {
    0.35
}
fn default_hybrid_weights() -> [f64; 3] {
    [0.6, 0.2, 0.2]
}
fn default_retrieval_limit() -> usize {
    5
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            min_importance: default_min_importance(),
            max_candidates_per_session: default_max_candidates(),
            length_bonus_minutes: default_length_bonus_minutes(),
            length_bonus: default_length_bonus(),
            min_similarity: default_min_similarity(),
            hybrid_weights: default_hybrid_weights(),
            retrieval_limit: default_retrieval_limit(),
        }
    }
}

/// Drift scoring weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftWeights {
    /// Score per persona-specific forbidden-phrase hit.
    #[serde(default = "default_forbidden_weight")]
    pub forbidden_phrase: f64,

    /// Score per universal generic-assistant-phrase hit.
    #[serde(default = "default_generic_weight")]
    pub generic_phrase: f64,

    /// Vocabulary presence ratio below which the shortfall penalty applies.
    #[serde(default = "default_vocabulary_floor")]
    pub vocabulary_floor: f64,

    /// Maximum vocabulary-shortfall penalty (scaled by the shortfall).
    #[serde(default = "default_vocabulary_penalty")]
    pub vocabulary_penalty: f64,

    /// Score per structural-pattern violation.
    #[serde(default = "default_structural_weight")]
    pub structural_pattern: f64,
}

fn default_forbidden_weight() -> f64 {
    0.25
}
fn default_generic_weight() -> f64 {
    0.15
}
fn default_vocabulary_floor() -> f64 {
    0.3
}
fn default_vocabulary_penalty() -> f64 {
    0.2
}
fn default_structural_weight() -> f64 {
    0.1
}

impl Default for DriftWeights {
    fn default() -> Self {
        Self {
            forbidden_phrase: default_forbidden_weight(),
            generic_phrase: default_generic_weight(),
            vocabulary_floor: default_vocabulary_floor(),
            vocabulary_penalty: default_vocabulary_penalty(),
            structural_pattern: default_structural_weight(),
        }
    }
}

/// Decay/narrative layer tuning. Each layer is independently toggleable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AtmosphereConfig {
    #[serde(default = "default_true")]
    pub entropy_enabled: bool,

    #[serde(default = "default_true")]
    pub narrative_enabled: bool,

    #[serde(default = "default_true")]
    pub temporal_enabled: bool,

    #[serde(default = "default_true")]
    pub paranoia_enabled: bool,

    /// Entropy decay rate per elapsed hour.
    #[serde(default = "default_entropy_decay_rate")]
    pub entropy_decay_rate: f64,

    /// Base entropy added per completed session.
    #[serde(default = "default_entropy_session_delta")]
    pub entropy_session_delta: f64,

    /// Minimum layer score before any snippet is emitted.
    #[serde(default = "default_activation_floor")]
    pub activation_floor: f64,
}

fn default_true() -> bool {
    true
}
fn default_entropy_decay_rate() -> f64 {
    0.01
}
fn default_entropy_session_delta() -> f64 {
    0.05
}
fn default_activation_floor() -> f64 {
    0.25
}

impl Default for AtmosphereConfig {
    fn default() -> Self {
        Self {
            entropy_enabled: true,
            narrative_enabled: true,
            temporal_enabled: true,
            paranoia_enabled: true,
            entropy_decay_rate: default_entropy_decay_rate(),
            entropy_session_delta: default_entropy_session_delta(),
            activation_floor: default_activation_floor(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, apply env overrides, validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let mut config: EngineConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Defaults with env overrides applied; used when no config file exists.
    pub fn from_defaults() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(STORE_PATH_ENV) {
            if !path.trim().is_empty() {
                tracing::debug!(%path, "Store path overridden from environment");
                self.store.path = path;
            }
        }
    }

    /// Validate numeric ranges. Called by `load`; call directly after
    /// constructing a config by hand.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.budget.total_tokens == 0 {
            return Err(ConfigError::Invalid("budget.total_tokens must be > 0".into()));
        }
        if self.relationship.max_delta <= 0.0 || self.relationship.max_delta > 1.0 {
            return Err(ConfigError::Invalid(
                "relationship.max_delta must be in (0, 1]".into(),
            ));
        }
        if self.relationship.engagement_floor > self.relationship.engagement_ceiling {
            return Err(ConfigError::Invalid(
                "relationship.engagement_floor exceeds engagement_ceiling".into(),
            ));
        }
        for (name, value) in [
            ("memory.min_importance", self.memory.min_importance),
            ("memory.min_similarity", self.memory.min_similarity),
            ("atmosphere.activation_floor", self.atmosphere.activation_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be in [0, 1]")));
            }
        }
        let weight_sum: f64 = self.memory.hybrid_weights.iter().sum();
        if (weight_sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::Invalid(format!(
                "memory.hybrid_weights must sum to 1.0 (got {weight_sum})"
            )));
        }
        if self.atmosphere.entropy_decay_rate < 0.0 {
            return Err(ConfigError::Invalid(
                "atmosphere.entropy_decay_rate must be >= 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert_eq!(config.budget.total_tokens, 2048);
        assert_eq!(config.memory.max_candidates_per_session, 5);
        assert!(config.atmosphere.entropy_enabled);
    }

    #[test]
    fn empty_toml_parses_to_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.budget.total_tokens, 2048);
        assert!((config.relationship.base_delta - 0.05).abs() < 1e-12);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config: EngineConfig = toml::from_str(
            r#"
            [budget]
            total_tokens = 4096

            [memory]
            min_importance = 0.5
            "#,
        )
        .unwrap();
        assert_eq!(config.budget.total_tokens, 4096);
        assert!((config.memory.min_importance - 0.5).abs() < 1e-12);
        // Untouched sections keep defaults
        assert_eq!(config.budget.memories, 768);
        assert!((config.relationship.max_delta - 0.08).abs() < 1e-12);
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[store]\npath = \"test.db\"").unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.store.path, "test.db");
    }

    #[test]
    fn invalid_weight_sum_rejected() {
        let mut config = EngineConfig::default();
        config.memory.hybrid_weights = [0.5, 0.5, 0.5];
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn zero_budget_rejected() {
        let mut config = EngineConfig::default();
        config.budget.total_tokens = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_engagement_bounds_rejected() {
        let mut config = EngineConfig::default();
        config.relationship.engagement_floor = 3.0;
        assert!(config.validate().is_err());
    }
}
