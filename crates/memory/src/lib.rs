//! Memory subsystem — extraction, retrieval, selection, and forgetting.
//!
//! Four stages, one per module:
//!
//! 1. [`extraction`] — session text → scored candidate memories
//! 2. [`election`] — candidates → elect / borderline / preterite, with
//!    irreversible degradation for the preterite
//! 3. [`retrieval`] — semantic search with graceful fallback to keyword
//!    and then importance ordering; never throws
//! 4. [`selection`] — the pure heuristic picking which retrieved memories
//!    enter the context window

pub mod election;
pub mod extraction;
pub mod retrieval;
pub mod selection;

pub use election::{calculate_election_score, classify_election, degrade_content, resurface_probability};
pub use extraction::{extract_candidates, ExtractionOutcome, MemoryCandidate};
pub use retrieval::MemoryRetriever;
pub use selection::select_memories;
