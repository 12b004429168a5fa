//! Vector similarity and hybrid ranking utilities.

use chrono::{DateTime, Utc};
use counterforce_core::memory::MemoryRecord;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal.
/// Returns 0.0 if the vectors differ in length or are empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    dot / denom
}

/// Blend similarity, recency, and importance into one hybrid score.
///
/// Recency is scored as `1 / (1 + age_days)` so a memory from right now
/// scores 1.0 and halves after a day. Weights are the caller's
/// responsibility to normalize (they sum to 1.0 in config validation).
pub fn hybrid_score(
    similarity: f64,
    memory: &MemoryRecord,
    now: DateTime<Utc>,
    weights: [f64; 3],
) -> f64 {
    let age_days = (now - memory.created_at).num_seconds().max(0) as f64 / 86_400.0;
    let recency = 1.0 / (1.0 + age_days);
    weights[0] * similarity + weights[1] * recency + weights[2] * memory.importance
}

/// Rank memories by cosine similarity to a query embedding.
///
/// Entries without embeddings are skipped. Results carry the similarity
/// in `score`, best first.
pub fn rank_by_similarity(
    memories: &[MemoryRecord],
    query_embedding: &[f32],
    limit: usize,
) -> Vec<MemoryRecord> {
    let mut scored: Vec<MemoryRecord> = memories
        .iter()
        .filter_map(|memory| {
            let embedding = memory.embedding.as_ref()?;
            let similarity = cosine_similarity(embedding, query_embedding);
            let mut m = memory.clone();
            m.score = similarity;
            Some(m)
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use counterforce_core::memory::MemoryKind;

    fn memory(id: &str, embedding: Option<Vec<f32>>) -> MemoryRecord {
        let mut m = MemoryRecord::new("p1", "u1", &format!("content {id}"), MemoryKind::Interaction, 0.5, Utc::now());
        m.id = id.into();
        m.embedding = embedding;
        m
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_or_empty_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn rank_orders_by_similarity() {
        let query = vec![1.0, 0.0, 0.0];
        let memories = vec![
            memory("orthogonal", Some(vec![0.0, 1.0, 0.0])),
            memory("identical", Some(vec![1.0, 0.0, 0.0])),
            memory("partial", Some(vec![0.5, 0.5, 0.0])),
            memory("no_embedding", None),
        ];

        let ranked = rank_by_similarity(&memories, &query, 10);
        assert_eq!(ranked.len(), 3);
        assert_eq!(ranked[0].id, "identical");
        assert_eq!(ranked[1].id, "partial");
        assert_eq!(ranked[2].id, "orthogonal");
    }

    #[test]
    fn rank_respects_limit() {
        let query = vec![1.0, 0.0];
        let memories: Vec<_> = (0..10)
            .map(|i| memory(&format!("m{i}"), Some(vec![1.0, i as f32 * 0.1])))
            .collect();
        assert_eq!(rank_by_similarity(&memories, &query, 3).len(), 3);
    }

    #[test]
    fn hybrid_score_prefers_fresh_important_memories() {
        let now = Utc::now();
        let fresh = MemoryRecord::new("p", "u", "fresh", MemoryKind::Insight, 0.9, now);
        let stale = MemoryRecord {
            created_at: now - chrono::Duration::days(30),
            importance: 0.1,
            ..fresh.clone()
        };
        let weights = [0.6, 0.2, 0.2];
        assert!(hybrid_score(0.5, &fresh, now, weights) > hybrid_score(0.5, &stale, now, weights));
    }

    #[test]
    fn hybrid_score_recency_component_bounded() {
        let now = Utc::now();
        let m = MemoryRecord::new("p", "u", "x", MemoryKind::Interaction, 0.0, now);
        // similarity 0, importance 0 → pure recency term, at most the weight
        let score = hybrid_score(0.0, &m, now, [0.6, 0.2, 0.2]);
        assert!(score <= 0.2 + 1e-9);
        assert!(score > 0.19);
    }
}
