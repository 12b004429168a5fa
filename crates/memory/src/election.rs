//! Election — which memories stay whole, which are consigned.
//!
//! The election score blends emotional-language density, content length,
//! recency, and importance into [0, 1]. At `>= 0.6` a memory is elect,
//! `[0.3, 0.6)` borderline, below that preterite. Preterite content is
//! degraded by randomized fragment redaction; the dropped words are not
//! stored anywhere, so the original is never exactly reconstructible.
//! What remains carries a small resurfacing probability that decays with
//! age.

use chrono::{DateTime, Utc};
use rand::Rng;

use counterforce_core::memory::ElectionStatus;

/// Words counted toward emotional density.
const EMOTIONAL_LEXICON: &[&str] = &[
    "love", "hate", "afraid", "fear", "cry", "cried", "death", "dead", "dream", "alone",
    "lonely", "happy", "joy", "grief", "miss", "lost", "haunt", "ache", "want", "need",
];

/// Election thresholds.
pub const ELECT_THRESHOLD: f64 = 0.6;
pub const BORDERLINE_THRESHOLD: f64 = 0.3;

/// Blend emotional density, length, recency, and importance into [0, 1].
pub fn calculate_election_score(
    content: &str,
    importance: f64,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> f64 {
    let words: Vec<&str> = content.split_whitespace().collect();
    let word_count = words.len().max(1);

    let emotional_hits = words
        .iter()
        .filter(|w| {
            let cleaned: String = w
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            EMOTIONAL_LEXICON.contains(&cleaned.as_str())
        })
        .count();
    // One emotional word in ten is full density
    let emotional = ((emotional_hits as f64 / word_count as f64) * 10.0).min(1.0);

    let length = (content.len() as f64 / 200.0).min(1.0);

    let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
    let recency = 1.0 / (1.0 + age_days);

    (0.35 * emotional + 0.15 * length + 0.2 * recency + 0.3 * importance).clamp(0.0, 1.0)
}

/// Map an election score onto the three retention classes.
pub fn classify_election(score: f64) -> ElectionStatus {
    if score >= ELECT_THRESHOLD {
        ElectionStatus::Elect
    } else if score >= BORDERLINE_THRESHOLD {
        ElectionStatus::Borderline
    } else {
        ElectionStatus::Preterite
    }
}

/// Irreversibly degrade content for preterite consignment.
///
/// Drops a random contiguous window of 40–60% of the words and splices
/// the remainder around an ellipsis marker. Single-word content collapses
/// to the bare marker.
pub fn degrade_content<R: Rng>(content: &str, rng: &mut R) -> String {
    let words: Vec<&str> = content.split_whitespace().collect();
    if words.len() <= 1 {
        return "[…]".into();
    }

    let drop_fraction = rng.gen_range(0.4..0.6);
    let drop_count = ((words.len() as f64 * drop_fraction).round() as usize)
        .clamp(1, words.len() - 1);
    let start = rng.gen_range(0..=words.len() - drop_count);

    let mut fragments: Vec<&str> = Vec::with_capacity(words.len() - drop_count + 1);
    fragments.extend(&words[..start]);
    fragments.push("[…]");
    fragments.extend(&words[start + drop_count..]);
    fragments.join(" ")
}

/// Probability that a preterite memory resurfaces on a given retrieval.
///
/// Starts small and halves roughly every thirty days.
pub fn resurface_probability(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
    0.05 * (-age_days * std::f64::consts::LN_2 / 30.0).exp()
}
