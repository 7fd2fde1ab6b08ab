//! Pipeline building blocks
//!
//! Business-logic-free primitives the orchestrator composes: the chunker
//! that windows source text, the bounded worker pool that runs generation
//! calls, and the text normalization helpers shared by the filters.

pub mod chunker;
pub mod runner;
pub mod text;

pub use chunker::Chunker;
pub use runner::{PoolOutput, RetryPolicy, Retryable, WorkerPool};
