//! Error types and handling
//!
//! This module provides the client-facing error type of the card pipeline.
//! All errors implement the `PipelineErrorExt` trait which provides a
//! user-friendly hint, a stable reason code for JSON summaries, and whether
//! the failure is worth retrying.
//!
//! Upstream generation failures are deliberately absent: they are retried
//! and absorbed inside the engine and only ever show up as reduced yield.
//!
//! # Examples
//!
//! ```
//! use sdk::errors::{PipelineError, PipelineErrorExt};
//!
//! let error = PipelineError::InvalidInput("id must be a positive integer".into());
//! assert_eq!(error.reason_code(), "invalid_input");
//! assert!(!error.is_recoverable());
//!
//! let db = PipelineError::Database("disk I/O error".into());
//! assert!(db.is_recoverable());
//! ```

use thiserror::Error;

/// Trait for pipeline error extensions
pub trait PipelineErrorExt {
    /// Returns a user-friendly hint for the error
    fn user_hint(&self) -> &str;

    /// Stable machine-readable reason code, used in JSON error bodies
    fn reason_code(&self) -> &'static str;

    /// Returns whether re-invoking later may succeed without caller changes
    fn is_recoverable(&self) -> bool;
}

/// Main pipeline error type
///
/// # Error Categories
///
/// - **Input**: missing or invalid owner id, unknown subject, no source units
/// - **Source**: a SourceUnit's text could not be read
/// - **Persistence**: database or blob store failures
/// - **Configuration**: invalid or missing configuration
#[derive(Debug, Error)]
pub enum PipelineError {
    // Input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Subject not found: {0}")]
    SubjectNotFound(i64),

    #[error("No source units available for subject {0}")]
    NoSourceUnits(i64),

    #[error("Source unit {unit_id} not found for subject {owner_id}")]
    SourceUnitNotFound { owner_id: i64, unit_id: i64 },

    // Source errors
    #[error("Failed to read source unit {unit_id}: {message}")]
    SourceRead { unit_id: i64, message: String },

    // Persistence errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Network errors
    #[error("Network error: {0}")]
    Network(String),

    // Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineErrorExt for PipelineError {
    fn user_hint(&self) -> &str {
        match self {
            Self::InvalidInput(_) => "Provide a numeric id as JSON { id }, ?id= or a raw body",
            Self::SubjectNotFound(_) => "Register the subject first with 'cardsmith subject add'",
            Self::NoSourceUnits(_) => "Add source material with 'cardsmith source add' or 'ingest'",
            Self::SourceUnitNotFound { .. } => {
                "Check the requested unit ids belong to this subject"
            }
            Self::SourceRead { .. } => {
                "The stored text could not be fetched. Check storage settings"
            }
            Self::Database(_) => "Database operation failed. Nothing was reported as inserted",
            Self::Storage(_) => "Blob storage operation failed. Check storage settings",
            Self::Config(_) => "Check your config.toml file for errors",
            Self::Network(_) => "Network operation failed. Check your connection",
            Self::Io(_) => "File system operation failed",
        }
    }

    fn reason_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::SubjectNotFound(_) => "subject_not_found",
            Self::NoSourceUnits(_) => "no_source_units",
            Self::SourceUnitNotFound { .. } => "source_unit_not_found",
            Self::SourceRead { .. } => "source_read_failed",
            Self::Database(_) => "database_error",
            Self::Storage(_) => "storage_error",
            Self::Config(_) => "config_error",
            Self::Network(_) => "network_error",
            Self::Io(_) => "io_error",
        }
    }

    fn is_recoverable(&self) -> bool {
        match self {
            Self::InvalidInput(_)
            | Self::SubjectNotFound(_)
            | Self::NoSourceUnits(_)
            | Self::SourceUnitNotFound { .. }
            | Self::Config(_) => false,

            Self::SourceRead { .. }
            | Self::Database(_)
            | Self::Storage(_)
            | Self::Network(_)
            | Self::Io(_) => true,
        }
    }
}

impl PipelineError {
    /// True for caller-side problems (bad id, unknown subject, nothing to read)
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::SubjectNotFound(_)
                | Self::NoSourceUnits(_)
                | Self::SourceUnitNotFound { .. }
        )
    }
}
