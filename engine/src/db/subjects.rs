/// Subject persistence operations
///
/// A subject is a bill or a person profile. It owns source units and cards
/// and carries the `scanned` low-water-mark used to pick the next part.
use anyhow::{anyhow, Context, Result};
use sdk::types::{SubjectKind, Tier};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::now_secs;

/// Subject record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subject {
    pub id: i64,
    pub name: String,
    pub kind: SubjectKind,
    /// Only profile subjects carry a tier
    pub tier: Option<Tier>,
    pub scanned: i64,
    pub created_at: i64,
}

impl Subject {
    /// Tier used for quota and classification; untiered profiles count as base
    pub fn effective_tier(&self) -> Tier {
        self.tier.unwrap_or(Tier::Base)
    }
}

/// Subject repository for database operations
pub struct SubjectRepository {
    pool: SqlitePool,
}

impl SubjectRepository {
    /// Create a new subject repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a subject, or update name/kind/tier if the id already exists
    ///
    /// The `scanned` pointer is preserved on update.
    pub async fn upsert(
        &self,
        id: i64,
        name: &str,
        kind: SubjectKind,
        tier: Option<Tier>,
    ) -> Result<Subject> {
        let now = now_secs()?;

        sqlx::query(
            "INSERT INTO subjects (id, name, kind, tier, scanned, created_at) VALUES (?, ?, ?, ?, 0, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name, kind = excluded.kind, tier = excluded.tier",
        )
        .bind(id)
        .bind(name)
        .bind(kind.as_str())
        .bind(tier.map(|t| t.as_str()))
        .bind(now)
        .execute(&self.pool)
        .await
        .context("Failed to upsert subject")?;

        self.get(id)
            .await?
            .ok_or_else(|| anyhow!("Subject {} missing after upsert", id))
    }

    /// Get a subject by ID
    pub async fn get(&self, id: i64) -> Result<Option<Subject>> {
        let row = sqlx::query(
            "SELECT id, name, kind, tier, scanned, created_at FROM subjects WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch subject")?;

        row.map(|r| row_to_subject(&r)).transpose()
    }

    /// List all subjects ordered by id
    pub async fn list(&self) -> Result<Vec<Subject>> {
        let rows = sqlx::query(
            "SELECT id, name, kind, tier, scanned, created_at FROM subjects ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list subjects")?;

        rows.iter().map(row_to_subject).collect()
    }

    /// Raise the scanned pointer to at least `part`; never lowers it
    pub async fn advance_scanned(&self, id: i64, part: i64) -> Result<()> {
        sqlx::query("UPDATE subjects SET scanned = MAX(scanned, ?) WHERE id = ?")
            .bind(part)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to advance scanned pointer")?;

        Ok(())
    }
}

fn row_to_subject(r: &SqliteRow) -> Result<Subject> {
    let kind: String = r.get("kind");
    let tier: Option<String> = r.get("tier");

    Ok(Subject {
        id: r.get("id"),
        name: r.get("name"),
        kind: kind.parse()?,
        tier: tier.map(|t| t.parse()).transpose()?,
        scanned: r.get("scanned"),
        created_at: r.get("created_at"),
    })
}
