//! # Counterforce Core
//!
//! Domain types, traits, and error definitions for the Counterforce persona
//! continuity engine. This crate has **zero framework dependencies** — it
//! defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator is defined as a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping implementations via configuration
//! - Easy testing with mock/stub implementations
//! - Clean dependency graph (all crates depend inward on core)

pub mod clock;
pub mod decay;
pub mod drift;
pub mod error;
pub mod generate;
pub mod memory;
pub mod persona;
pub mod relationship;
pub mod session;
pub mod setting;

// Re-export key types at crate root for ergonomics
pub use clock::{Clock, FixedClock, SystemClock};
pub use decay::{EntropyState, NarrativeArc, NarrativePhase, TemporalGap};
pub use drift::{DriftAnalysis, DriftSeverity};
pub use error::{EmbeddingError, Error, Result, SoulError, StoreError};
pub use generate::TextGenerator;
pub use memory::{ElectionStatus, MemoryKind, MemoryRecord};
pub use persona::{DriftConfig, Persona, SoulDefinition, VoiceMarkers};
pub use relationship::{Relationship, TrustLevel};
pub use session::{SessionMessage, SessionOutcome, SessionQuality, SessionRecord, SessionRole};
pub use setting::UserSetting;
