// Cardsmith card pipeline
// Main entry point for the cardsmith binary

use cardsmith_engine::cli::{Cli, Command, SourceAction, SubjectAction};
use cardsmith_engine::config::Config;
use cardsmith_engine::handlers::{
    handle_generate, handle_ingest, handle_quota, handle_serve, handle_source_add,
    handle_source_list, handle_subject_add, handle_subject_list, OutputFormat,
};
use cardsmith_engine::telemetry::init_telemetry_with_level;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log > RUST_LOG > config
    match &cli.log {
        Some(level) => {
            std::env::remove_var("RUST_LOG");
            init_telemetry_with_level(level);
        }
        None => init_telemetry_with_level(&config.core.log_level),
    }

    tracing::debug!(
        "Cardsmith v{} ({} - {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_COMMIT_HASH"),
        env!("BUILD_TIMESTAMP")
    );

    // Determine output format
    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Handle commands
    match cli.command {
        Command::Subject { action } => match action {
            SubjectAction::Add {
                id,
                name,
                kind,
                tier,
            } => handle_subject_add(id, name, kind, tier, &config, format).await,
            SubjectAction::List => handle_subject_list(&config, format).await,
        },

        Command::Source { action } => match action {
            SourceAction::Add {
                owner,
                path,
                link,
                part,
                kind,
            } => handle_source_add(owner, path, link, part, kind, &config, format).await,
            SourceAction::List { owner } => handle_source_list(owner, &config, format).await,
        },

        Command::Ingest { owner, urls } => {
            tracing::info!("Probing {} URL(s) for subject {}", urls.len(), owner);
            handle_ingest(owner, urls, &config, format).await
        }

        Command::Generate { owner_id, units } => {
            handle_generate(owner_id, units, &config, format).await
        }

        Command::Quota { owner_id } => handle_quota(owner_id, &config, format).await,

        Command::Serve { bind } => handle_serve(bind, &config).await,
    }
}
