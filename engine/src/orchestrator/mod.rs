//! Orchestrator
//!
//! Drives one generation invocation for one subject:
//!
//! 1. Pick source units (requested ids, else the earliest unconsumed, else
//!    the first past the subject's `scanned` mark, else nothing to do)
//! 2. Read and chunk each unit's text
//! 3. Wave 1: `chunks x samples` generation calls through the worker pool
//! 4. Candidates flow through classify, rubric, rank, tag, then dedup until
//!    the soft cap is reached, then a single insert transaction
//! 5. Wave 2 at higher temperature when wave 1 inserted too little (bills)
//! 6. Mark units consumed, advance `scanned`, report
//!
//! Generation failures only reduce yield. Input, source-read and
//! persistence failures end the invocation with a `PipelineError`.

pub mod report;
pub mod shaping;

use crate::blob::BlobStore;
use crate::config::{Config, GenerationConfig, PipelineConfig, Tuning};
use crate::db::{Database, NewCard, SourceUnit, Subject};
use crate::dedup::{card_slug, DedupInput, DuplicateCounts, Deduplicator};
use crate::generation::{GenerationClient, GenerationRequest, PromptContext};
use crate::llm::LLMProvider;
use crate::pipeline::{text, Chunker, RetryPolicy, WorkerPool};
use crate::rubric::{Rubric, SourceContext};
use crate::taxonomy::{Classified, ClassificationPolicy, Classifier};
use anyhow::Context;
use sdk::errors::PipelineError;
use sdk::types::{CandidateCard, Screen, SubjectKind};
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

pub use report::{GenerationReport, RunStatus, UnitDetail};

/// Score stored for cards whose model gave none (and for all bill cards)
pub const DEFAULT_SCORE: i64 = 50;

/// Second-wave temperature
const WAVE2_TEMPERATURE: f64 = 0.4;
/// Temperature for extra wave-1 samples after the first
const WAVE1_DIVERSE_TEMPERATURE: f64 = 0.35;

fn db_error(e: anyhow::Error) -> PipelineError {
    PipelineError::Database(format!("{:#}", e))
}

/// One invocation's input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerateRequest {
    pub owner_id: i64,
    /// Restrict processing to these units; `None` lets the orchestrator pick
    pub unit_ids: Option<Vec<i64>>,
}

impl GenerateRequest {
    pub fn new(owner_id: i64) -> Self {
        Self {
            owner_id,
            unit_ids: None,
        }
    }

    pub fn with_units(mut self, unit_ids: Vec<i64>) -> Self {
        self.unit_ids = Some(unit_ids);
        self
    }

    fn validate(&self) -> Result<(), PipelineError> {
        if self.owner_id <= 0 {
            return Err(PipelineError::InvalidInput(
                "id must be a positive integer".to_string(),
            ));
        }
        if let Some(ids) = &self.unit_ids {
            if let Some(bad) = ids.iter().find(|id| **id <= 0) {
                return Err(PipelineError::InvalidInput(format!(
                    "web_ids must be positive integers (got {})",
                    bad
                )));
            }
        }
        Ok(())
    }
}

/// One generation call in a wave
#[derive(Debug, Clone, Copy)]
struct WaveTask {
    chunk_index: usize,
    temperature: f64,
}

/// Outcome of running one wave
#[derive(Debug, Default)]
struct WaveResult {
    candidates: Vec<CandidateCard>,
    calls: usize,
    failed: usize,
    skipped: usize,
}

impl WaveResult {
    /// Every call ran and at least one came back
    fn exhausted(&self) -> bool {
        self.skipped == 0 && self.failed < self.calls
    }
}

/// Candidate processing totals for one batch
#[derive(Debug, Default)]
struct BatchStats {
    inserted: usize,
    conflicts: usize,
}

/// The card generation pipeline
pub struct Orchestrator {
    db: Arc<Database>,
    blobs: Arc<dyn BlobStore>,
    client: GenerationClient,
    classifier: Classifier,
    rubric: Rubric,
    chunker: Chunker,
    pipeline: PipelineConfig,
    generation: GenerationConfig,
    tuning: Tuning,
}

impl Orchestrator {
    pub fn new(
        db: Arc<Database>,
        blobs: Arc<dyn BlobStore>,
        provider: Arc<dyn LLMProvider>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let classifier = Classifier::new().context("Failed to compile classifier rules")?;
        let rubric = Rubric::new(config.pipeline.evidence_overlap_threshold)
            .context("Failed to compile rubric rules")?;
        let client = GenerationClient::new(provider, &config.generation);
        debug!(
            "Orchestrator using provider '{}' (model {})",
            client.provider_name(),
            config.generation.model
        );

        Ok(Self {
            db,
            blobs,
            client,
            classifier,
            rubric,
            chunker: Chunker::new(
                config.pipeline.chunk_target_chars,
                config.pipeline.chunk_overlap_chars,
            ),
            pipeline: config.pipeline.clone(),
            generation: config.generation.clone(),
            tuning: config.pipeline.tuning(),
        })
    }

    pub fn tuning(&self) -> Tuning {
        self.tuning
    }

    /// Run one invocation.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` for a non-positive owner id or unit id
    /// - `SubjectNotFound`, `NoSourceUnits`, `SourceUnitNotFound`
    /// - `SourceRead` when a selected unit's text cannot be loaded
    /// - `Database` when the content store fails
    pub async fn generate(
        &self,
        request: &GenerateRequest,
    ) -> Result<GenerationReport, PipelineError> {
        request.validate()?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let span = info_span!("generate", run_id = %run_id, owner_id = request.owner_id);
        self.run(request, run_id).instrument(span).await
    }

    async fn run(
        &self,
        request: &GenerateRequest,
        run_id: String,
    ) -> Result<GenerationReport, PipelineError> {
        let started = Instant::now();
        let deadline = started + Duration::from_secs(self.pipeline.invocation_budget_secs);
        let owner_id = request.owner_id;

        let subject = self
            .db
            .subjects()
            .get(owner_id)
            .await
            .map_err(db_error)?
            .ok_or(PipelineError::SubjectNotFound(owner_id))?;

        if self.db.sources().count(owner_id).await.map_err(db_error)? == 0 {
            return Err(PipelineError::NoSourceUnits(owner_id));
        }

        let units = self.select_units(&subject, request).await?;
        let mut report = GenerationReport::new(run_id, owner_id, self.tuning);

        if units.is_empty() {
            info!("Nothing to do for subject {}", owner_id);
            report.set_status(RunStatus::NothingToDo);
            report.remaining_parts = self
                .db
                .sources()
                .count_unconsumed(owner_id)
                .await
                .map_err(db_error)?;
            report.runtime_ms = elapsed_ms(started);
            return Ok(report);
        }

        info!(
            "Processing {} unit(s) for {} subject '{}'",
            units.len(),
            subject.kind,
            subject.name
        );

        let history = self.db.cards().history(owner_id).await.map_err(db_error)?;
        let mut dedup =
            Deduplicator::new(self.pipeline.similarity_threshold).with_history(&history);

        for unit in &units {
            if Instant::now() >= deadline {
                warn!("Invocation budget exhausted before unit {}", unit.id);
                report.timed_out = true;
                break;
            }

            let detail = self.process_unit(&subject, unit, &mut dedup, deadline).await?;
            if detail.reason.as_deref() == Some("timed_out") {
                report.timed_out = true;
            }
            report.push(detail);
        }

        report.remaining_parts = self
            .db
            .sources()
            .count_unconsumed(owner_id)
            .await
            .map_err(db_error)?;

        if report.inserted == 0 && (report.files_scanned > 0 || report.timed_out) {
            report.set_status(report.empty_run_status());
        }
        report.runtime_ms = elapsed_ms(started);

        info!(
            "Run finished: {} inserted from {} unit(s), {} remaining, timed_out={}",
            report.inserted, report.files_scanned, report.remaining_parts, report.timed_out
        );
        Ok(report)
    }

    async fn select_units(
        &self,
        subject: &Subject,
        request: &GenerateRequest,
    ) -> Result<Vec<SourceUnit>, PipelineError> {
        let sources = self.db.sources();

        if let Some(ids) = request.unit_ids.as_ref().filter(|ids| !ids.is_empty()) {
            let mut units = Vec::with_capacity(ids.len());
            for &id in ids {
                let unit = sources
                    .get(id)
                    .await
                    .map_err(db_error)?
                    .filter(|u| u.owner_id == subject.id)
                    .ok_or(PipelineError::SourceUnitNotFound {
                        owner_id: subject.id,
                        unit_id: id,
                    })?;
                if !units.iter().any(|u: &SourceUnit| u.id == unit.id) {
                    units.push(unit);
                }
            }
            return Ok(units);
        }

        let unconsumed = sources
            .unconsumed(subject.id, self.pipeline.units_per_invocation)
            .await
            .map_err(db_error)?;
        if !unconsumed.is_empty() {
            return Ok(unconsumed);
        }

        Ok(sources
            .first_after(subject.id, subject.scanned)
            .await
            .map_err(db_error)?
            .into_iter()
            .collect())
    }

    async fn process_unit(
        &self,
        subject: &Subject,
        unit: &SourceUnit,
        dedup: &mut Deduplicator,
        deadline: Instant,
    ) -> Result<UnitDetail, PipelineError> {
        let started = Instant::now();
        let mut detail = UnitDetail {
            web_id: unit.id,
            web: unit.path.clone(),
            bill_section: unit.part,
            kind: Some(unit.kind),
            ..Default::default()
        };

        let raw = self
            .blobs
            .read_text(&unit.path)
            .await
            .map_err(|e| PipelineError::SourceRead {
                unit_id: unit.id,
                message: format!("{:#}", e),
            })?;

        let text = match subject.kind {
            SubjectKind::Bill => raw.as_str(),
            SubjectKind::Profile => {
                text::truncate_chars(&raw, self.pipeline.profile_text_cap_chars)
            }
        };

        let mut exhausted = true;
        let mut timed_out = false;

        if text.trim().is_empty() {
            debug!("Unit {} has no text", unit.id);
            detail.reason = Some("empty_source".to_string());
        } else {
            // Profiles read the whole page in one call
            let chunks: Vec<&str> = match subject.kind {
                SubjectKind::Bill => self.chunker.split(text),
                SubjectKind::Profile => vec![text],
            };
            detail.chunks = chunks.len();

            let wave1_tasks = self.wave1_tasks(subject.kind, chunks.len());
            let wave1 = self.run_wave(subject, unit, &chunks, wave1_tasks, deadline).await;
            detail.wave1_calls = wave1.calls;
            detail.failed_calls += wave1.failed;
            detail.candidates += wave1.candidates.len();
            exhausted &= wave1.exhausted();
            timed_out |= wave1.skipped > 0;

            let stats = self
                .process_candidates(subject, unit, text, wave1.candidates, dedup, &mut detail)
                .await?;
            detail.generated += stats.inserted;
            detail.store_conflicts += stats.conflicts;

            let wants_second_wave = subject.kind == SubjectKind::Bill
                && detail.generated < self.pipeline.min_cards_before_second_wave;
            if wants_second_wave {
                if Instant::now() >= deadline {
                    timed_out = true;
                    exhausted = false;
                } else {
                    info!(
                        "Unit {} yielded {} card(s), below {}; running second wave",
                        unit.id, detail.generated, self.pipeline.min_cards_before_second_wave
                    );
                    let tasks = self.wave2_tasks(chunks.len());
                    let wave2 = self.run_wave(subject, unit, &chunks, tasks, deadline).await;
                    detail.wave2_calls = wave2.calls;
                    detail.failed_calls += wave2.failed;
                    detail.candidates += wave2.candidates.len();
                    exhausted &= wave2.exhausted();
                    timed_out |= wave2.skipped > 0;

                    let stats = self
                        .process_candidates(
                            subject,
                            unit,
                            text,
                            wave2.candidates,
                            dedup,
                            &mut detail,
                        )
                        .await?;
                    detail.generated += stats.inserted;
                    detail.store_conflicts += stats.conflicts;
                }
            }
        }

        if timed_out {
            detail.reason = Some("timed_out".to_string());
        } else if detail.reason.is_none() && detail.generated == 0 && !exhausted {
            detail.reason = Some("generation_failed".to_string());
        }

        let consumed = detail.generated > 0 || (exhausted && !timed_out);
        if consumed {
            self.db
                .sources()
                .mark_consumed(unit.id)
                .await
                .map_err(db_error)?;
        }
        detail.consumed = consumed;

        self.db
            .subjects()
            .advance_scanned(subject.id, unit.part)
            .await
            .map_err(db_error)?;

        detail.runtime_ms = elapsed_ms(started);
        info!(
            "Unit {} (part {}): {} inserted from {} candidate(s), consumed={}",
            unit.id, unit.part, detail.generated, detail.candidates, consumed
        );
        Ok(detail)
    }

    fn wave1_tasks(&self, kind: SubjectKind, chunks: usize) -> Vec<WaveTask> {
        match kind {
            SubjectKind::Profile => vec![WaveTask {
                chunk_index: 0,
                temperature: self.generation.profile_temperature,
            }],
            SubjectKind::Bill => (0..chunks)
                .flat_map(|chunk_index| {
                    (0..self.tuning.samples_per_chunk_wave1).map(move |k| WaveTask {
                        chunk_index,
                        temperature: if k == 0 {
                            self.generation.temperature
                        } else {
                            WAVE1_DIVERSE_TEMPERATURE
                        },
                    })
                })
                .collect(),
        }
    }

    fn wave2_tasks(&self, chunks: usize) -> Vec<WaveTask> {
        (0..chunks)
            .flat_map(|chunk_index| {
                (0..self.tuning.samples_per_chunk_wave2).map(move |_| WaveTask {
                    chunk_index,
                    temperature: WAVE2_TEMPERATURE,
                })
            })
            .collect()
    }

    async fn run_wave(
        &self,
        subject: &Subject,
        unit: &SourceUnit,
        chunks: &[&str],
        tasks: Vec<WaveTask>,
        deadline: Instant,
    ) -> WaveResult {
        let calls = tasks.len();
        let pool = WorkerPool::new(self.tuning.parallel_requests)
            .with_retry(RetryPolicy {
                max_retries: self.pipeline.max_retries,
                backoff: Duration::from_millis(self.pipeline.retry_backoff_ms),
            })
            .with_task_timeout(Duration::from_secs(self.generation.timeout_secs))
            .with_deadline(deadline);

        let tier = subject.effective_tier();
        let total_chunks = chunks.len();
        let max_cards = self.pipeline.soft_max_cards;
        let max_tokens = self.tuning.max_output_tokens;
        let client = &self.client;

        debug!(
            "Launching {} generation call(s) over {} chunk(s) for unit {}",
            calls, total_chunks, unit.id
        );

        let output = pool
            .run(tasks, |task: WaveTask| async move {
                let context = match subject.kind {
                    SubjectKind::Bill => PromptContext::BillSection {
                        bill_name: &subject.name,
                        section: unit.part,
                        chunk_index: task.chunk_index,
                        total_chunks,
                    },
                    SubjectKind::Profile => PromptContext::Profile {
                        name: &subject.name,
                        tier,
                        link: unit.link.as_deref(),
                    },
                };
                client
                    .generate(&GenerationRequest {
                        context,
                        text: chunks[task.chunk_index],
                        max_cards,
                        temperature: task.temperature,
                        max_tokens,
                    })
                    .await
            })
            .await;

        let (failed, skipped) = (output.failed, output.skipped);
        let candidates: Vec<CandidateCard> = output.into_successes().flatten().collect();

        WaveResult {
            candidates,
            calls,
            failed,
            skipped,
        }
    }

    /// Classify, filter, rank, tag, dedup, cap and insert one batch
    async fn process_candidates(
        &self,
        subject: &Subject,
        unit: &SourceUnit,
        text: &str,
        candidates: Vec<CandidateCard>,
        dedup: &mut Deduplicator,
        detail: &mut UnitDetail,
    ) -> Result<BatchStats, PipelineError> {
        if candidates.is_empty() {
            return Ok(BatchStats::default());
        }

        let policy = match subject.kind {
            SubjectKind::Bill => ClassificationPolicy::Legislation,
            SubjectKind::Profile => ClassificationPolicy::Profile(subject.effective_tier()),
        };

        let classified: Vec<Classified> = candidates
            .into_iter()
            .filter_map(|mut card| {
                let (title, subtext) =
                    shaping::normalize_lengths(subject.kind, &card.title, &card.subtext);
                if title.is_empty() {
                    return None;
                }
                card.title = title;
                card.subtext = subtext;
                let class = self.classifier.classify(&card.category, policy);
                Some(Classified { card, class })
            })
            .collect();

        let outcome = self.rubric.filter(
            classified,
            &SourceContext {
                kind: unit.kind,
                text,
                require_evidence: self.pipeline.require_evidence,
            },
        );
        add_rejections(&mut detail.rejected, &outcome.rejected);
        detail.used_fallback |= outcome.used_fallback;
        debug!(
            "Rubric kept {} candidate(s), rejected {}",
            outcome.accepted.len(),
            outcome.rejected.total()
        );

        let mut accepted = outcome.accepted;
        if subject.kind == SubjectKind::Profile {
            accepted.sort_by(|a, b| rank(&b.card, &a.card));
        }

        let is_media = shaping::is_media_link(unit.link.as_deref());
        let cap = self.pipeline.soft_max_cards;
        let total = accepted.len();
        let mut rows: Vec<NewCard> = Vec::new();
        let mut duplicates = DuplicateCounts::default();

        // Candidates past the cap never reach the deduplicator; a later wave may insert them
        for (i, item) in accepted.into_iter().enumerate() {
            if rows.len() >= cap {
                debug!("Soft cap of {} reached: dropping {} candidate(s)", cap, total - i);
                break;
            }
            let Classified { card, class } = item;
            let title = if class.screen == Screen::AgendaLegi && self.pipeline.title_tags {
                shaping::tag_title(&card.title, &class.category)
            } else {
                card.title
            };
            let slug = card_slug(class.screen.as_str(), &class.category, &title);
            let bucket = class.bucket_key();

            let admitted = dedup.admit(&DedupInput {
                title: &title,
                subtext: &card.subtext,
                slug: &slug,
                bucket: &bucket,
            });
            if let Err(reason) = admitted {
                duplicates.record(reason);
                continue;
            }

            let score = match subject.kind {
                SubjectKind::Bill => DEFAULT_SCORE,
                SubjectKind::Profile => card.score.unwrap_or(DEFAULT_SCORE),
            };

            rows.push(NewCard {
                owner_id: subject.id,
                screen: class.screen,
                category: class.category,
                title,
                subtext: card.subtext,
                slug,
                score,
                is_media,
                link: unit.link.clone(),
                source_id: Some(unit.id),
                source_path: Some(unit.path.clone()),
                part: Some(unit.part),
            });
        }

        add_duplicates(&mut detail.duplicates, &duplicates);

        if rows.is_empty() {
            return Ok(BatchStats::default());
        }

        let outcome = self.db.cards().insert_batch(&rows).await.map_err(db_error)?;
        if outcome.conflicts > 0 {
            warn!(
                "Store refused {} row(s) with an existing active slug",
                outcome.conflicts
            );
        }

        Ok(BatchStats {
            inserted: outcome.inserted,
            conflicts: outcome.conflicts,
        })
    }
}

/// Confidence first, then score; missing values sort last
fn rank(a: &CandidateCard, b: &CandidateCard) -> Ordering {
    let conf = |c: &CandidateCard| c.confidence.unwrap_or(f64::NEG_INFINITY);
    let score = |c: &CandidateCard| c.score.unwrap_or(i64::MIN);
    conf(a)
        .total_cmp(&conf(b))
        .then_with(|| score(a).cmp(&score(b)))
}

fn add_rejections(
    total: &mut crate::rubric::RejectionCounts,
    batch: &crate::rubric::RejectionCounts,
) {
    total.materiality += batch.materiality;
    total.funding_safety += batch.funding_safety;
    total.style += batch.style;
    total.evidence += batch.evidence;
}

fn add_duplicates(total: &mut DuplicateCounts, batch: &DuplicateCounts) {
    total.exact_key += batch.exact_key;
    total.slug += batch.slug;
    total.near_duplicate += batch.near_duplicate;
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
