//! CLI interface for Cardsmith
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for driving the card pipeline.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Cardsmith card pipeline
///
/// Turns bill text and biographical pages into short, classified,
/// deduplicated cards and tracks per-subject quotas.
#[derive(Parser, Debug)]
#[command(name = "cardsmith")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Manage subjects
    Subject {
        #[command(subcommand)]
        action: SubjectAction,
    },

    /// Manage source units
    Source {
        #[command(subcommand)]
        action: SourceAction,
    },

    /// Fetch the first working URL and register it as a source unit
    Ingest {
        /// Owning subject id
        #[arg(long)]
        owner: i64,

        /// Candidate URLs, probed in parallel; earliest success wins
        #[arg(long = "url", required = true)]
        urls: Vec<String>,
    },

    /// Run one generation invocation for a subject
    Generate {
        /// Subject id
        owner_id: i64,

        /// Restrict the run to these source unit ids
        #[arg(long = "unit")]
        units: Vec<i64>,
    },

    /// Show quota status and what still needs to be generated
    Quota {
        /// Subject id
        owner_id: i64,
    },

    /// Start the HTTP server
    Serve {
        /// Override the configured bind address
        #[arg(long)]
        bind: Option<String>,
    },
}

/// Subject management actions
#[derive(Subcommand, Debug)]
pub enum SubjectAction {
    /// Create or update a subject
    Add {
        /// Subject id
        id: i64,

        /// Display name (bill name or person)
        #[arg(long)]
        name: String,

        /// bill or profile
        #[arg(long, default_value = "profile")]
        kind: String,

        /// hard, soft or base (profiles only)
        #[arg(long)]
        tier: Option<String>,
    },

    /// List all subjects
    List,
}

/// Source unit management actions
#[derive(Subcommand, Debug)]
pub enum SourceAction {
    /// Register a stored blob as a source unit
    Add {
        /// Owning subject id
        #[arg(long)]
        owner: i64,

        /// Blob store key
        #[arg(long)]
        path: String,

        /// Public link the text came from
        #[arg(long)]
        link: Option<String>,

        /// Part number (inferred from the key when omitted)
        #[arg(long)]
        part: Option<i64>,

        /// billtext, synopsis, webpage or metrics (inferred when omitted)
        #[arg(long)]
        kind: Option<String>,
    },

    /// List a subject's source units
    List {
        /// Owning subject id
        #[arg(long)]
        owner: i64,
    },
}
