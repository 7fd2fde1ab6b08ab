/// Card persistence operations
///
/// Cards are only ever inserted here. Deactivation happens outside the
/// pipeline; the partial unique index keeps active slugs unique per owner.
use anyhow::{Context, Result};
use sdk::types::Screen;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use super::now_secs;

/// A card ready to be inserted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewCard {
    pub owner_id: i64,
    pub screen: Screen,
    pub category: String,
    pub title: String,
    pub subtext: String,
    pub slug: String,
    pub score: i64,
    pub is_media: bool,
    pub link: Option<String>,
    pub source_id: Option<i64>,
    pub source_path: Option<String>,
    pub part: Option<i64>,
}

/// Persisted card record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredCard {
    pub id: i64,
    pub owner_id: i64,
    pub screen: String,
    pub category: String,
    pub title: String,
    pub subtext: String,
    pub slug: String,
    pub score: i64,
    pub is_media: bool,
    pub link: Option<String>,
    pub is_active: bool,
    pub source_id: Option<i64>,
    pub part: Option<i64>,
    pub created_at: i64,
}

/// The fields deduplication needs from history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardKey {
    pub title: String,
    pub subtext: String,
    pub slug: String,
}

/// Active card count for one (screen, category) bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketCount {
    pub screen: String,
    pub category: String,
    pub count: i64,
}

/// Result of a batch insert
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InsertOutcome {
    pub inserted: usize,
    /// Rows the store refused because an active card already had the slug
    pub conflicts: usize,
}

/// Card repository for database operations
pub struct CardRepository {
    pool: SqlitePool,
}

impl CardRepository {
    /// Create a new card repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a batch of cards in one transaction
    ///
    /// Rows whose slug collides with an existing active card of the same
    /// owner are skipped and counted as conflicts. Any other failure rolls
    /// back the whole batch.
    pub async fn insert_batch(&self, cards: &[NewCard]) -> Result<InsertOutcome> {
        if cards.is_empty() {
            return Ok(InsertOutcome::default());
        }

        let now = now_secs()?;
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin card transaction")?;
        let mut outcome = InsertOutcome::default();

        for card in cards {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO cards
                    (owner_id, screen, category, title, subtext, slug, score, is_media, link,
                     is_active, source_id, source_path, part, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?, ?)",
            )
            .bind(card.owner_id)
            .bind(card.screen.as_str())
            .bind(&card.category)
            .bind(&card.title)
            .bind(&card.subtext)
            .bind(&card.slug)
            .bind(card.score)
            .bind(card.is_media)
            .bind(&card.link)
            .bind(card.source_id)
            .bind(&card.source_path)
            .bind(card.part)
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert card '{}'", card.slug))?;

            if result.rows_affected() == 0 {
                outcome.conflicts += 1;
            } else {
                outcome.inserted += 1;
            }
        }

        tx.commit()
            .await
            .context("Failed to commit card transaction")?;

        Ok(outcome)
    }

    /// Title, subtext and slug of every card the owner has ever had
    ///
    /// Inactive cards are included so deactivated content is not regenerated.
    pub async fn history(&self, owner_id: i64) -> Result<Vec<CardKey>> {
        let rows = sqlx::query("SELECT title, subtext, slug FROM cards WHERE owner_id = ?")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load card history")?;

        Ok(rows
            .iter()
            .map(|r| CardKey {
                title: r.get("title"),
                subtext: r.get("subtext"),
                slug: r.get("slug"),
            })
            .collect())
    }

    /// Active card counts grouped by (screen, category)
    pub async fn bucket_counts(&self, owner_id: i64) -> Result<Vec<BucketCount>> {
        let rows = sqlx::query(
            "SELECT screen, category, COUNT(*) AS n FROM cards
             WHERE owner_id = ? AND is_active = 1
             GROUP BY screen, category ORDER BY screen, category",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to count cards")?;

        Ok(rows
            .iter()
            .map(|r| BucketCount {
                screen: r.get("screen"),
                category: r.get("category"),
                count: r.get("n"),
            })
            .collect())
    }

    /// Active cards of an owner, newest first
    pub async fn list_active(&self, owner_id: i64, limit: i64) -> Result<Vec<StoredCard>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, screen, category, title, subtext, slug, score, is_media, link,
                    is_active, source_id, part, created_at
             FROM cards WHERE owner_id = ? AND is_active = 1
             ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(owner_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list cards")?;

        Ok(rows
            .iter()
            .map(|r| StoredCard {
                id: r.get("id"),
                owner_id: r.get("owner_id"),
                screen: r.get("screen"),
                category: r.get("category"),
                title: r.get("title"),
                subtext: r.get("subtext"),
                slug: r.get("slug"),
                score: r.get("score"),
                is_media: r.get::<i64, _>("is_media") != 0,
                link: r.get("link"),
                is_active: r.get::<i64, _>("is_active") != 0,
                source_id: r.get("source_id"),
                part: r.get("part"),
                created_at: r.get("created_at"),
            })
            .collect())
    }

    /// Number of cards produced from one source unit
    pub async fn count_for_source(&self, source_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cards WHERE source_id = ?")
            .bind(source_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cards for source unit")?;

        Ok(count)
    }
}
