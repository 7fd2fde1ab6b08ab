//! Cardsmith Engine Library
//!
//! This library provides the card generation pipeline: source units in,
//! classified and deduplicated cards out, with quota accounting on top.
//! It is used by both the main binary and integration tests.

/// Configuration management module
pub mod config;

/// Database persistence module
pub mod db;

/// Blob storage for source text
pub mod blob;

/// Generation service abstraction layer
pub mod llm;

/// Chunker, worker pool and text helpers
pub mod pipeline;

/// Prompting and reply parsing for the generation service
pub mod generation;

/// Screen/category taxonomy and label classification
pub mod taxonomy;

/// Acceptance gates for candidate cards
pub mod rubric;

/// Slugs and duplicate detection
pub mod dedup;

/// Per-subject quota accounting
pub mod quota;

/// End-to-end generation invocations
pub mod orchestrator;

/// URL probing and source registration
pub mod ingest;

/// Telemetry and Observability
pub mod telemetry;

/// CLI interface module
pub mod cli;

/// Command handlers module
pub mod handlers;

/// HTTP surface
pub mod server;
