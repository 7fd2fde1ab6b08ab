/// Source unit persistence operations
///
/// A source unit is one addressable slice of a subject's raw text (a bill
/// section, a synopsis, a fetched page). Only its storage key lives here; the
/// text itself is in the blob store.
use anyhow::{anyhow, Context, Result};
use regex::Regex;
use sdk::types::SourceKind;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::now_secs;

/// Source unit record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceUnit {
    pub id: i64,
    pub owner_id: i64,
    /// Sequence number within the subject (1-based)
    pub part: i64,
    pub kind: SourceKind,
    /// Blob store key
    pub path: String,
    pub link: Option<String>,
    pub consumed: bool,
    pub created_at: i64,
}

/// Fields needed to register a source unit
#[derive(Debug, Clone)]
pub struct NewSourceUnit {
    pub owner_id: i64,
    pub part: i64,
    pub kind: SourceKind,
    pub path: String,
    pub link: Option<String>,
}

/// Source unit repository for database operations
pub struct SourceRepository {
    pool: SqlitePool,
}

const SELECT_COLUMNS: &str =
    "SELECT id, owner_id, part, kind, path, link, consumed, created_at FROM source_units";

impl SourceRepository {
    /// Create a new source unit repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a source unit
    ///
    /// Re-registering the same `(owner_id, path)` refreshes part, kind and
    /// link but keeps the consumed flag.
    pub async fn add(&self, unit: &NewSourceUnit) -> Result<SourceUnit> {
        let now = now_secs()?;

        sqlx::query(
            "INSERT INTO source_units (owner_id, part, kind, path, link, consumed, created_at)
             VALUES (?, ?, ?, ?, ?, 0, ?)
             ON CONFLICT(owner_id, path) DO UPDATE SET
                part = excluded.part,
                kind = excluded.kind,
                link = COALESCE(excluded.link, source_units.link)",
        )
        .bind(unit.owner_id)
        .bind(unit.part)
        .bind(unit.kind.as_str())
        .bind(&unit.path)
        .bind(&unit.link)
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to add source unit")?;

        let row = sqlx::query(&format!(
            "{} WHERE owner_id = ? AND path = ?",
            SELECT_COLUMNS
        ))
        .bind(unit.owner_id)
        .bind(&unit.path)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch source unit")?;

        row.map(|r| row_to_unit(&r))
            .transpose()?
            .ok_or_else(|| anyhow!("Source unit {} missing after insert", unit.path))
    }

    /// Get a source unit by ID
    pub async fn get(&self, id: i64) -> Result<Option<SourceUnit>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch source unit")?;

        row.map(|r| row_to_unit(&r)).transpose()
    }

    /// All units of an owner, ordered by part then id
    pub async fn list_for_owner(&self, owner_id: i64) -> Result<Vec<SourceUnit>> {
        let rows = sqlx::query(&format!(
            "{} WHERE owner_id = ? ORDER BY part ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list source units")?;

        rows.iter().map(row_to_unit).collect()
    }

    /// Up to `limit` units not yet consumed, earliest part first
    pub async fn unconsumed(&self, owner_id: i64, limit: usize) -> Result<Vec<SourceUnit>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = sqlx::query(&format!(
            "{} WHERE owner_id = ? AND consumed = 0 ORDER BY part ASC, id ASC LIMIT ?",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list unconsumed source units")?;

        rows.iter().map(row_to_unit).collect()
    }

    /// Earliest unit whose part exceeds the scanned pointer
    pub async fn first_after(&self, owner_id: i64, scanned: i64) -> Result<Option<SourceUnit>> {
        let row = sqlx::query(&format!(
            "{} WHERE owner_id = ? AND part > ? ORDER BY part ASC, id ASC LIMIT 1",
            SELECT_COLUMNS
        ))
        .bind(owner_id)
        .bind(scanned)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch next source unit")?;

        row.map(|r| row_to_unit(&r)).transpose()
    }

    /// Set the consumed flag
    pub async fn mark_consumed(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE source_units SET consumed = 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to mark source unit consumed")?;

        Ok(())
    }

    /// Number of units of an owner
    pub async fn count(&self, owner_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_units WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count source units")?;

        Ok(count)
    }

    /// Number of units of an owner still waiting to be consumed
    pub async fn count_unconsumed(&self, owner_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM source_units WHERE owner_id = ? AND consumed = 0",
        )
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to count unconsumed source units")?;

        Ok(count)
    }
}

fn row_to_unit(r: &SqliteRow) -> Result<SourceUnit> {
    let kind: String = r.get("kind");

    Ok(SourceUnit {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        part: r.get("part"),
        kind: kind.parse()?,
        path: r.get("path"),
        link: r.get("link"),
        consumed: r.get::<i64, _>("consumed") != 0,
        created_at: r.get("created_at"),
    })
}

/// What a storage key reveals about a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathHints {
    pub part: Option<i64>,
    pub kind: Option<SourceKind>,
}

/// Infer part number and kind from a storage key
///
/// `hr123/billtext.118.congress.3.txt` is part 3 of the bill text; a key with
/// no trailing part number is part 1. `*metrics.txt` and `*metrics.md` are
/// metrics summaries.
pub fn infer_from_path(path: &str) -> Result<PathHints> {
    let bill_part = Regex::new(r"(?i)(billtext|synopsis)\.(\d+)\.congress(?:\.(\d+))?\.txt$")?;
    let metrics = Regex::new(r"(?i)metrics\.(txt|md)$")?;

    if let Some(caps) = bill_part.captures(path) {
        let kind = match caps.get(1).map(|m| m.as_str().to_lowercase()) {
            Some(k) if k == "synopsis" => SourceKind::Synopsis,
            _ => SourceKind::BillText,
        };
        let part = caps
            .get(3)
            .and_then(|m| m.as_str().parse::<i64>().ok())
            .unwrap_or(1);
        return Ok(PathHints {
            part: Some(part),
            kind: Some(kind),
        });
    }

    if metrics.is_match(path) {
        return Ok(PathHints {
            part: None,
            kind: Some(SourceKind::Metrics),
        });
    }

    Ok(PathHints {
        part: None,
        kind: None,
    })
}
