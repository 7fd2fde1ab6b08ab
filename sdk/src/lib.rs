//! Cardsmith SDK
//!
//! Shared types and errors for the card generation pipeline.
//! This crate is used by the engine and by anything that consumes its
//! JSON summaries.

/// Error types and handling
pub mod errors;

/// Taxonomy and candidate types
pub mod types;

// Re-export commonly used types
pub use errors::{PipelineError, PipelineErrorExt};
pub use types::{
    CandidateCard, FundingScope, NumberType, Screen, SourceKind, SubjectKind, Tier,
};
