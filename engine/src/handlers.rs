//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - subject add/list: register bills and profiles
//! - source add/list: register stored text as source units
//! - ingest: probe URLs and register the first usable page
//! - generate: run one orchestrator invocation
//! - quota: show quota status and what still needs generating
//! - serve: start the HTTP surface

use anyhow::{anyhow, Context, Result};
use sdk::errors::{PipelineError, PipelineErrorExt};
use sdk::types::{SourceKind, SubjectKind, Tier};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::blob;
use crate::config::{Config, QuotaConfig};
use crate::db::{infer_from_path, Database, NewSourceUnit};
use crate::ingest::Ingestor;
use crate::llm::{LLMProvider, OpenAIProvider};
use crate::orchestrator::{GenerateRequest, GenerationReport, Orchestrator};
use crate::quota::QuotaReport;
use crate::server;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Open (and migrate) the configured database
pub async fn open_database(config: &Config) -> Result<Arc<Database>> {
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let database = Database::new(&db_path)
        .await
        .context("Failed to open database")?;
    Ok(Arc::new(database))
}

/// Wire the orchestrator to the configured generation service and blob store
pub fn build_orchestrator(config: &Config, db: Arc<Database>) -> Result<Orchestrator> {
    let provider = OpenAIProvider::from_config(&config.generation)
        .map_err(|e| anyhow!("Failed to create generation client: {}", e))?;
    let provider: Arc<dyn LLMProvider> = Arc::new(provider);
    let blobs = blob::from_config(config)?;
    Orchestrator::new(db, blobs, provider, config)
}

/// Quota report for a profile subject.
///
/// Bills have no quota; asking for one is an input error.
pub async fn load_quota(
    db: &Database,
    owner_id: i64,
    targets: &QuotaConfig,
) -> Result<QuotaReport, PipelineError> {
    if owner_id <= 0 {
        return Err(PipelineError::InvalidInput(
            "id must be a positive integer".to_string(),
        ));
    }

    let subject = db
        .subjects()
        .get(owner_id)
        .await
        .map_err(|e| PipelineError::Database(format!("{:#}", e)))?
        .ok_or(PipelineError::SubjectNotFound(owner_id))?;

    if subject.kind != SubjectKind::Profile {
        return Err(PipelineError::InvalidInput(format!(
            "subject {} is a {}; quotas apply to profiles only",
            owner_id, subject.kind
        )));
    }

    let counts = db
        .cards()
        .bucket_counts(owner_id)
        .await
        .map_err(|e| PipelineError::Database(format!("{:#}", e)))?;

    Ok(QuotaReport::build(
        owner_id,
        subject.effective_tier(),
        &counts,
        targets,
    ))
}

fn pipeline_error(e: PipelineError) -> anyhow::Error {
    anyhow!("{} ({})\nHint: {}", e, e.reason_code(), e.user_hint())
}

/// Create or update a subject
pub async fn handle_subject_add(
    id: i64,
    name: String,
    kind: String,
    tier: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    if id <= 0 {
        return Err(anyhow!("Subject id must be a positive integer"));
    }
    let kind: SubjectKind = kind.parse()?;
    let tier: Option<Tier> = tier.map(|t| t.parse()).transpose()?;
    if kind == SubjectKind::Bill && tier.is_some() {
        return Err(anyhow!("Tiers apply to profile subjects only"));
    }

    let database = open_database(config).await?;
    let subject = database.subjects().upsert(id, &name, kind, tier).await?;

    match format {
        OutputFormat::Text => {
            println!("✓ Subject {} saved", subject.id);
            println!("  Name: {}", subject.name);
            println!("  Kind: {}", subject.kind);
            if let Some(tier) = subject.tier {
                println!("  Tier: {}", tier);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&subject)?);
        }
    }
    Ok(())
}

/// List all subjects
pub async fn handle_subject_list(config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let subjects = database.subjects().list().await?;

    match format {
        OutputFormat::Text => {
            if subjects.is_empty() {
                println!("No subjects registered");
                return Ok(());
            }
            for subject in &subjects {
                let tier = subject.tier.map(|t| t.to_string()).unwrap_or_default();
                println!(
                    "{:>6}  {:<8} {:<5} scanned={:<3} {}",
                    subject.id,
                    subject.kind.as_str(),
                    tier,
                    subject.scanned,
                    subject.name
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "subjects": subjects,
                "count": subjects.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Register a stored blob as a source unit
pub async fn handle_source_add(
    owner: i64,
    path: String,
    link: Option<String>,
    part: Option<i64>,
    kind: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let hints = infer_from_path(&path)?;
    let kind: SourceKind = match kind {
        Some(k) => k.parse()?,
        None => hints.kind.unwrap_or(SourceKind::WebPage),
    };

    let database = open_database(config).await?;
    database
        .subjects()
        .get(owner)
        .await?
        .ok_or_else(|| anyhow!("Subject {} not found", owner))?;

    let part = match part.or(hints.part) {
        Some(p) if p > 0 => p,
        Some(p) => return Err(anyhow!("Part must be positive (got {})", p)),
        None => database.sources().count(owner).await? + 1,
    };

    let unit = database
        .sources()
        .add(&NewSourceUnit {
            owner_id: owner,
            part,
            kind,
            path,
            link,
        })
        .await?;

    match format {
        OutputFormat::Text => {
            println!("✓ Source unit {} registered", unit.id);
            println!("  Subject: {}", unit.owner_id);
            println!("  Part: {}", unit.part);
            println!("  Kind: {}", unit.kind);
            println!("  Key: {}", unit.path);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&unit)?);
        }
    }
    Ok(())
}

/// List a subject's source units
pub async fn handle_source_list(owner: i64, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let units = database.sources().list_for_owner(owner).await?;

    match format {
        OutputFormat::Text => {
            if units.is_empty() {
                println!("No source units for subject {}", owner);
                return Ok(());
            }
            for unit in &units {
                println!(
                    "{:>6}  part {:<3} {:<9} {} {}",
                    unit.id,
                    unit.part,
                    unit.kind.as_str(),
                    if unit.consumed { "consumed " } else { "pending  " },
                    unit.path
                );
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "owner_id": owner,
                "units": units,
                "count": units.len()
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }
    Ok(())
}

/// Probe URLs and register the first usable one
pub async fn handle_ingest(
    owner: i64,
    urls: Vec<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let blobs = blob::from_config(config)?;
    let ingestor = Ingestor::new(
        database,
        blobs,
        config.pipeline.tuning().parallel_requests,
        Duration::from_secs(config.generation.timeout_secs),
    )?;

    let unit = ingestor.ingest(owner, &urls).await?;

    match format {
        OutputFormat::Text => {
            println!("✓ Ingested {}", unit.link.as_deref().unwrap_or(&unit.path));
            println!("  Source unit: {} (part {})", unit.id, unit.part);
            println!("  Key: {}", unit.path);
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&unit)?);
        }
    }
    Ok(())
}

fn print_report_text(report: &GenerationReport) {
    println!("Run {} for subject {}", report.run_id, report.owner_id);
    if let Some(reason) = &report.reason {
        println!("  Status: {}", reason);
    }
    println!("  Inserted: {}", report.inserted);
    println!("  Units processed: {}", report.files_scanned);
    for detail in &report.details {
        println!(
            "    unit {} (part {}): {} inserted, {} candidates, {} rejected, {} duplicates{}",
            detail.web_id,
            detail.bill_section,
            detail.generated,
            detail.candidates,
            detail.rejected.total(),
            detail.duplicates.total(),
            if detail.consumed { ", consumed" } else { "" }
        );
    }
    println!("  Remaining units: {}", report.remaining_parts);
    if report.timed_out {
        println!("  ⚠ Invocation budget exhausted before all work finished");
    }
    println!("  Duration: {}ms", report.runtime_ms);
}

/// Run one generation invocation
pub async fn handle_generate(
    owner_id: i64,
    units: Vec<i64>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let database = open_database(config).await?;
    let orchestrator = build_orchestrator(config, Arc::clone(&database))?;

    let mut request = GenerateRequest::new(owner_id);
    if !units.is_empty() {
        request = request.with_units(units);
    }

    let report = orchestrator
        .generate(&request)
        .await
        .map_err(pipeline_error)?;

    database.flush_wal().await.ok();

    match format {
        OutputFormat::Text => print_report_text(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
    }
    Ok(())
}

/// Show quota status
pub async fn handle_quota(owner_id: i64, config: &Config, format: OutputFormat) -> Result<()> {
    let database = open_database(config).await?;
    let report = load_quota(&database, owner_id, &config.quota)
        .await
        .map_err(pipeline_error)?;

    match format {
        OutputFormat::Text => {
            let status = &report.status;
            println!("Quota for subject {} ({} tier)", owner_id, status.tier);
            println!(
                "  {}/{} cards, deficit {}{}",
                status.total_current,
                status.total_required,
                status.total_deficit,
                if status.is_complete { " ✓ complete" } else { "" }
            );
            println!();
            for bucket in &status.buckets {
                println!(
                    "  {:<11} {:<18} {:>3}/{:<3}{}",
                    bucket.screen.as_str(),
                    bucket.category.as_deref().unwrap_or("-"),
                    bucket.current,
                    bucket.target,
                    if bucket.deficit > 0 {
                        format!("  needs {}", bucket.deficit)
                    } else {
                        String::new()
                    }
                );
            }
            if !report.cards_to_create.is_empty() {
                println!();
                println!("Cards to create (highest priority first):");
                for item in &report.cards_to_create {
                    println!(
                        "  [{:>3}] {} {} x{}",
                        item.priority,
                        item.screen,
                        item.category.as_deref().unwrap_or("-"),
                        item.count
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}

/// Start the HTTP server and block until Ctrl-C
pub async fn handle_serve(bind: Option<String>, config: &Config) -> Result<()> {
    let database = open_database(config).await?;
    let orchestrator = build_orchestrator(config, Arc::clone(&database))?;
    let state = server::AppState::new(Arc::clone(&database), Arc::new(orchestrator), config.quota);

    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    tracing::info!("Listening on {}", listener.local_addr()?);
    server::serve(listener, state, async {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Shutdown signal received");
    })
    .await?;

    database.flush_wal().await.ok();
    Ok(())
}
