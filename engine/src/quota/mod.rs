//! Quota Engine
//!
//! Pure accounting of how many cards a profile subject still needs. Targets
//! depend on the subject's tier:
//!
//! - **base**: one target per profile screen
//! - **soft**: one target per named category
//! - **hard**: one target per named category, plus an overflow target per
//!   screen for the `more` bucket
//!
//! Status is recomputed from the active card counts on every call and is
//! never stored.

use crate::config::QuotaConfig;
use crate::db::BucketCount;
use crate::taxonomy::{named_categories, OVERFLOW_CATEGORY};
use sdk::types::{Screen, Tier};
use serde::Serialize;
use std::collections::BTreeMap;

/// One (screen[, category]) quota line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaBucket {
    pub screen: Screen,
    /// `None` for per-screen (base tier) targets
    pub category: Option<String>,
    pub current: u32,
    pub target: u32,
    pub deficit: u32,
}

impl QuotaBucket {
    fn new(screen: Screen, category: Option<&str>, current: u32, target: u32) -> Self {
        Self {
            screen,
            category: category.map(str::to_string),
            current,
            target,
            deficit: target.saturating_sub(current),
        }
    }
}

/// Quota position of one subject
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaStatus {
    pub owner_id: i64,
    pub tier: Tier,
    /// Every bucket the tier defines, satisfied ones included
    pub buckets: Vec<QuotaBucket>,
    pub total_deficit: u32,
    pub total_required: u32,
    pub total_current: u32,
    pub is_complete: bool,
    pub timestamp: String,
}

impl QuotaStatus {
    /// Buckets that still need cards
    pub fn deficits(&self) -> impl Iterator<Item = &QuotaBucket> {
        self.buckets.iter().filter(|b| b.deficit > 0)
    }

    /// Whether a screen (and, for per-category tiers, a category) is short
    pub fn needs_cards(&self, screen: Screen, category: Option<&str>) -> bool {
        self.deficits().any(|b| {
            b.screen == screen
                && match (&b.category, category) {
                    (None, _) => true,
                    (Some(c), Some(want)) => c.eq_ignore_ascii_case(want.trim()),
                    (Some(_), None) => false,
                }
        })
    }

    /// What to generate next, most urgent first
    pub fn cards_to_create(&self) -> Vec<CardsToCreate> {
        let mut list: Vec<CardsToCreate> = self
            .deficits()
            .map(|b| CardsToCreate {
                screen: b.screen,
                category: b.category.clone(),
                count: b.deficit,
                priority: priority(self.tier, b),
            })
            .collect();
        // Stable, so equal priorities keep bucket order
        list.sort_by(|a, b| b.priority.cmp(&a.priority));
        list
    }
}

/// A prioritized generation request derived from one deficit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardsToCreate {
    pub screen: Screen,
    pub category: Option<String>,
    pub count: u32,
    pub priority: u32,
}

fn tier_weight(tier: Tier) -> u32 {
    match tier {
        Tier::Hard => 100,
        Tier::Soft => 50,
        Tier::Base => 25,
    }
}

fn screen_weight(screen: Screen) -> u32 {
    match screen {
        Screen::AgendaPpl => 20,
        Screen::Identity => 15,
        Screen::Affiliates => 10,
        Screen::AgendaLegi | Screen::Impact => 0,
    }
}

fn priority(tier: Tier, bucket: &QuotaBucket) -> u32 {
    tier_weight(tier) + bucket.deficit * 10 + screen_weight(bucket.screen)
}

/// Active cards grouped for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CardDistribution {
    pub by_screen: BTreeMap<String, u32>,
    pub by_category: BTreeMap<String, u32>,
    pub total: u32,
}

impl CardDistribution {
    pub fn from_counts(counts: &[BucketCount]) -> Self {
        let mut dist = Self::default();
        for row in counts {
            let n = clamp_count(row.count);
            *dist.by_screen.entry(row.screen.clone()).or_default() += n;
            *dist.by_category.entry(row.category.clone()).or_default() += n;
            dist.total += n;
        }
        dist
    }
}

fn clamp_count(count: i64) -> u32 {
    u32::try_from(count.max(0)).unwrap_or(u32::MAX)
}

/// Counts indexed by (screen, category)
struct CountIndex<'a> {
    counts: &'a [BucketCount],
}

impl CountIndex<'_> {
    fn screen(&self, screen: Screen) -> u32 {
        self.counts
            .iter()
            .filter(|c| c.screen == screen.as_str())
            .map(|c| clamp_count(c.count))
            .sum()
    }

    fn bucket(&self, screen: Screen, category: &str) -> u32 {
        self.counts
            .iter()
            .filter(|c| c.screen == screen.as_str() && c.category == category)
            .map(|c| clamp_count(c.count))
            .sum()
    }
}

/// Compute a subject's quota status from its active card counts.
///
/// Deficits are floored at zero; cards beyond a target never offset
/// another bucket's shortfall.
pub fn compute_status(
    owner_id: i64,
    tier: Tier,
    counts: &[BucketCount],
    targets: &QuotaConfig,
) -> QuotaStatus {
    let index = CountIndex { counts };
    let mut buckets = Vec::new();

    for screen in Screen::PROFILE {
        match tier {
            Tier::Base => {
                buckets.push(QuotaBucket::new(
                    screen,
                    None,
                    index.screen(screen),
                    targets.base_per_screen,
                ));
            }
            Tier::Soft | Tier::Hard => {
                let per_category = if tier == Tier::Hard {
                    targets.hard_per_category
                } else {
                    targets.soft_per_category
                };
                for category in named_categories(tier, screen) {
                    buckets.push(QuotaBucket::new(
                        screen,
                        Some(category),
                        index.bucket(screen, category),
                        per_category,
                    ));
                }
                if tier.allows_overflow() {
                    buckets.push(QuotaBucket::new(
                        screen,
                        Some(OVERFLOW_CATEGORY),
                        index.bucket(screen, OVERFLOW_CATEGORY),
                        targets.hard_overflow_per_screen,
                    ));
                }
            }
        }
    }

    let total_deficit = buckets.iter().map(|b| b.deficit).sum();
    let total_required = buckets.iter().map(|b| b.target).sum();
    let total_current = buckets.iter().map(|b| b.current).sum();

    QuotaStatus {
        owner_id,
        tier,
        buckets,
        total_deficit,
        total_required,
        total_current,
        is_complete: total_deficit == 0,
        timestamp: chrono::Utc::now().to_rfc3339(),
    }
}

/// Everything `quota` reports for one subject
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaReport {
    pub status: QuotaStatus,
    pub cards_to_create: Vec<CardsToCreate>,
    pub distribution: CardDistribution,
}

impl QuotaReport {
    pub fn build(owner_id: i64, tier: Tier, counts: &[BucketCount], targets: &QuotaConfig) -> Self {
        let status = compute_status(owner_id, tier, counts, targets);
        Self {
            cards_to_create: status.cards_to_create(),
            distribution: CardDistribution::from_counts(counts),
            status,
        }
    }
}
