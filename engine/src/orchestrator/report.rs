//! Invocation summary returned by the orchestrator

use crate::config::Tuning;
use crate::dedup::DuplicateCounts;
use crate::rubric::RejectionCounts;
use sdk::types::SourceKind;
use serde::Serialize;

/// Why a run produced nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No eligible source unit was found
    NothingToDo,
    /// Generation answered but no card survived
    LowMateriality,
    /// No unit got a candidate back because its generation calls failed
    GenerationFailed,
    /// The invocation budget ran out before anything was inserted
    TimedOut,
}

impl RunStatus {
    pub fn reason(&self) -> &'static str {
        match self {
            RunStatus::NothingToDo => "all_units_consumed_or_scanned",
            RunStatus::LowMateriality => "no_material_cards_after_rubric",
            RunStatus::GenerationFailed => "all_generation_calls_failed",
            RunStatus::TimedOut => "invocation_budget_exhausted",
        }
    }
}

/// What happened to one source unit
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitDetail {
    pub web_id: i64,
    pub web: String,
    pub bill_section: i64,
    pub kind: Option<SourceKind>,
    pub chunks: usize,
    pub wave1_calls: usize,
    pub wave2_calls: usize,
    pub failed_calls: usize,
    pub candidates: usize,
    /// Cards inserted from this unit
    pub generated: usize,
    pub rejected: RejectionCounts,
    pub duplicates: DuplicateCounts,
    pub store_conflicts: usize,
    pub used_fallback: bool,
    pub consumed: bool,
    pub runtime_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// JSON summary of one invocation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationReport {
    pub run_id: String,
    pub owner_id: i64,
    pub processed_web_ids: Vec<i64>,
    pub inserted: usize,
    pub files_scanned: usize,
    pub details: Vec<UnitDetail>,
    pub remaining_parts: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub timed_out: bool,
    pub store_conflicts: usize,
    pub runtime_ms: u64,
    pub tuning: Tuning,
}

impl GenerationReport {
    pub(crate) fn new(run_id: String, owner_id: i64, tuning: Tuning) -> Self {
        Self {
            run_id,
            owner_id,
            processed_web_ids: Vec::new(),
            inserted: 0,
            files_scanned: 0,
            details: Vec::new(),
            remaining_parts: 0,
            status: None,
            reason: None,
            timed_out: false,
            store_conflicts: 0,
            runtime_ms: 0,
            tuning,
        }
    }

    pub(crate) fn push(&mut self, detail: UnitDetail) {
        self.processed_web_ids.push(detail.web_id);
        self.inserted += detail.generated;
        self.store_conflicts += detail.store_conflicts;
        self.files_scanned += 1;
        self.details.push(detail);
    }

    pub(crate) fn set_status(&mut self, status: RunStatus) {
        self.status = Some(status);
        self.reason = Some(status.reason().to_string());
    }

    /// Status for a run that inserted nothing
    pub(crate) fn empty_run_status(&self) -> RunStatus {
        let candidates: usize = self.details.iter().map(|d| d.candidates).sum();
        let any_failed = self
            .details
            .iter()
            .any(|d| d.reason.as_deref() == Some("generation_failed"));

        if self.timed_out {
            RunStatus::TimedOut
        } else if candidates == 0 && any_failed {
            RunStatus::GenerationFailed
        } else {
            RunStatus::LowMateriality
        }
    }

    pub fn is_nothing_to_do(&self) -> bool {
        self.status == Some(RunStatus::NothingToDo)
    }
}
