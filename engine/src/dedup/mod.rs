//! Deduplicator
//!
//! Decides which accepted candidates are new relative to the subject's card
//! history and to each other. A candidate is rejected when any of these hold:
//!
//! - its normalized title+subtext key matches a known card
//! - its slug matches a known card (active or retired)
//! - its title is a near-duplicate of a title already kept in the same
//!   `screen:category` bucket during this batch
//!
//! Candidates are processed in the order given and the first one accepted
//! wins; callers sort beforehand when they want a different preference.

use crate::db::CardKey;
use crate::pipeline::text;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// URL-safe slug: lowercase ASCII alphanumerics separated by single dashes.
///
/// Quotes are dropped rather than turned into separators, so `don't` and
/// `dont` produce the same slug.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;

    for c in input.chars() {
        if matches!(c, '\'' | '"' | '\u{2018}' | '\u{2019}' | '\u{201C}' | '\u{201D}') {
            continue;
        }
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

/// Slug of a card's placement and title
pub fn card_slug(screen: &str, category: &str, title: &str) -> String {
    slugify(&format!("{}:{}:{}", screen, category, title))
}

/// Exact-duplicate key: lowercased, whitespace-collapsed title and subtext
pub fn normalize_key(title: &str, subtext: &str) -> String {
    format!(
        "{}||{}",
        text::collapse_whitespace(title).to_lowercase(),
        text::collapse_whitespace(subtext).to_lowercase()
    )
}

/// Jaccard similarity of two titles' token sets, in `[0, 1]`.
///
/// Titles without tokens share nothing, so an empty pair scores 0.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<String> = text::tokens(a).into_iter().collect();
    let b: HashSet<String> = text::tokens(b).into_iter().collect();

    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }

    let intersection = a.intersection(&b).count();
    intersection as f64 / union as f64
}

/// Why a candidate was not kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateReason {
    ExactKey,
    Slug,
    NearDuplicate,
}

/// Per-reason rejection tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DuplicateCounts {
    pub exact_key: usize,
    pub slug: usize,
    pub near_duplicate: usize,
}

impl DuplicateCounts {
    pub fn record(&mut self, reason: DuplicateReason) {
        match reason {
            DuplicateReason::ExactKey => self.exact_key += 1,
            DuplicateReason::Slug => self.slug += 1,
            DuplicateReason::NearDuplicate => self.near_duplicate += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.exact_key + self.slug + self.near_duplicate
    }
}

/// What the deduplicator needs to know about one candidate
#[derive(Debug, Clone, Copy)]
pub struct DedupInput<'a> {
    pub title: &'a str,
    pub subtext: &'a str,
    pub slug: &'a str,
    /// `screen:category`
    pub bucket: &'a str,
}

/// Running dedup state for one subject
///
/// Seeded with the subject's history, then fed candidates one at a time.
/// Accepted candidates become part of the state so later ones are checked
/// against them too.
#[derive(Debug)]
pub struct Deduplicator {
    threshold: f64,
    keys: HashSet<String>,
    slugs: HashSet<String>,
    kept_titles: HashMap<String, Vec<String>>,
}

impl Deduplicator {
    /// `threshold` is the title similarity at or above which two titles in
    /// the same bucket count as near-duplicates.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            keys: HashSet::new(),
            slugs: HashSet::new(),
            kept_titles: HashMap::new(),
        }
    }

    /// Seed from existing cards; history only feeds the exact and slug checks
    pub fn with_history<'a>(mut self, history: impl IntoIterator<Item = &'a CardKey>) -> Self {
        for card in history {
            self.keys.insert(normalize_key(&card.title, &card.subtext));
            self.slugs.insert(card.slug.clone());
        }
        self
    }

    /// Check a candidate without recording it
    pub fn check(&self, input: &DedupInput<'_>) -> Result<(), DuplicateReason> {
        if self.keys.contains(&normalize_key(input.title, input.subtext)) {
            return Err(DuplicateReason::ExactKey);
        }
        if self.slugs.contains(input.slug) {
            return Err(DuplicateReason::Slug);
        }
        if let Some(titles) = self.kept_titles.get(input.bucket) {
            if titles
                .iter()
                .any(|kept| title_similarity(kept, input.title) >= self.threshold)
            {
                return Err(DuplicateReason::NearDuplicate);
            }
        }
        Ok(())
    }

    /// Check a candidate and record it when accepted
    pub fn admit(&mut self, input: &DedupInput<'_>) -> Result<(), DuplicateReason> {
        self.check(input)?;
        self.keys.insert(normalize_key(input.title, input.subtext));
        self.slugs.insert(input.slug.to_string());
        self.kept_titles
            .entry(input.bucket.to_string())
            .or_default()
            .push(input.title.to_string());
        Ok(())
    }
}
