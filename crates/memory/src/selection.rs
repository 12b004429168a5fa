//! Pure memory-selection heuristic.
//!
//! Given already-retrieved candidates, pick at most `max` for the context
//! window: the single most important memory anchors the set, recency
//! fills for continuity, keyword overlap with the query fills the rest.

use std::collections::HashSet;

use counterforce_core::memory::MemoryRecord;

/// Select up to `max` memories for the context window.
///
/// Guarantees:
/// - the single highest-importance candidate is always included
/// - no id appears twice
/// - at most `max` results
/// - when `candidates.len() <= max`, everything is returned
pub fn select_memories(
    candidates: &[MemoryRecord],
    query: &str,
    max: usize,
) -> Vec<MemoryRecord> {
    if max == 0 || candidates.is_empty() {
        return Vec::new();
    }
    if candidates.len() <= max {
        return candidates.to_vec();
    }

    let mut selected: Vec<MemoryRecord> = Vec::with_capacity(max);
    let mut taken: HashSet<String> = HashSet::new();

    // Anchor: the single most important memory.
    if let Some(anchor) = candidates.iter().max_by(|a, b| {
        a.importance
            .partial_cmp(&b.importance)
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        taken.insert(anchor.id.clone());
        selected.push(anchor.clone());
    }

    // Continuity: newest first.
    let mut by_recency: Vec<&MemoryRecord> = candidates.iter().collect();
    by_recency.sort_by(|a, b| b.created_at.cmp(&a.created_at));

    let recency_slots = (max - selected.len()).div_ceil(2);
    for memory in &by_recency {
        if selected.len() >= 1 + recency_slots || selected.len() >= max {
            break;
        }
        if taken.insert(memory.id.clone()) {
            selected.push((*memory).clone());
        }
    }

    // Remainder: keyword overlap with the query.
    let query_tokens: HashSet<String> = query
        .to_lowercase()
        .split_whitespace()
        .filter(|t| t.len() >= 3)
        .map(str::to_string)
        .collect();

    let mut by_overlap: Vec<(usize, &MemoryRecord)> = candidates
        .iter()
        .map(|memory| {
            let content = memory.content.to_lowercase();
            let overlap = query_tokens
                .iter()
                .filter(|t| content.contains(t.as_str()))
                .count();
            (overlap, memory)
        })
        .filter(|(overlap, _)| *overlap > 0)
        .collect();
    by_overlap.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, memory) in by_overlap {
        if selected.len() >= max {
            break;
        }
        if taken.insert(memory.id.clone()) {
            selected.push(memory.clone());
        }
    }

    // Top up from recency if overlap couldn't fill the window.
    for memory in by_recency {
        if selected.len() >= max {
            break;
        }
        if taken.insert(memory.id.clone()) {
            selected.push(memory.clone());
        }
    }

    selected
}
