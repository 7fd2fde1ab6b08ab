//! Category taxonomy and classification policy
//!
//! Maps a model-proposed free-text category label to a canonical
//! (screen, category) pair. Profiles use a tier-dependent enumeration:
//! hard tier routes unknown labels to a per-screen overflow bucket, soft and
//! base tiers coerce them into the screen's default category. Bills use a
//! synonym-rewriting canonicalizer over the agenda/impact taxonomy.
//!
//! The same tables drive the quota targets in `crate::quota`.

use regex::Regex;
use sdk::types::{CandidateCard, Screen, Tier};
use serde::Serialize;

/// Overflow category used by the hard tier
pub const OVERFLOW_CATEGORY: &str = "more";

const HARD_AGENDA: &[&str] = &[
    "economy",
    "immigration",
    "healthcare",
    "environment",
    "defense",
    "education",
];
const HARD_IDENTITY: &[&str] = &[
    "background",
    "career",
    "public image",
    "accomplishments",
    "statements",
    "awards",
];
const HARD_AFFILIATES: &[&str] = &[
    "party",
    "organizations",
    "businesses",
    "politicians",
    "medias",
    "donors",
];

const SOFT_AGENDA: &[&str] = &["economy", "social programs", "immigration", "national security"];
const SOFT_IDENTITY: &[&str] = &["background", "career", "public image", "beliefs"];
const SOFT_AFFILIATES: &[&str] = &["party", "politicians", "enterprises", "donors"];

/// What a bill does
pub const AGENDA_LEGI_CATEGORIES: &[&str] = &["action", "scope", "process", "exceptions"];
/// Who or what a bill affects
pub const IMPACT_CATEGORIES: &[&str] = &["sectors", "demographics", "regions", "aftermath"];

/// Named categories of a profile screen under a tier (overflow excluded)
///
/// Soft and base tiers share one enumeration. Legislative screens return
/// their fixed sets regardless of tier.
pub fn named_categories(tier: Tier, screen: Screen) -> &'static [&'static str] {
    match (tier, screen) {
        (Tier::Hard, Screen::AgendaPpl) => HARD_AGENDA,
        (Tier::Hard, Screen::Identity) => HARD_IDENTITY,
        (Tier::Hard, Screen::Affiliates) => HARD_AFFILIATES,
        (_, Screen::AgendaPpl) => SOFT_AGENDA,
        (_, Screen::Identity) => SOFT_IDENTITY,
        (_, Screen::Affiliates) => SOFT_AFFILIATES,
        (_, Screen::AgendaLegi) => AGENDA_LEGI_CATEGORIES,
        (_, Screen::Impact) => IMPACT_CATEGORIES,
    }
}

/// Category that soft/base tiers fall back to for a screen
pub fn default_category(screen: Screen) -> &'static str {
    match screen {
        Screen::AgendaPpl => "economy",
        Screen::Identity => "background",
        Screen::Affiliates => "party",
        Screen::AgendaLegi => "action",
        Screen::Impact => "aftermath",
    }
}

/// Which policy to classify under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassificationPolicy {
    /// Bill sections: agenda_legi / impact
    Legislation,
    /// Person profiles under a tier
    Profile(Tier),
}

/// Canonical placement of a card
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Classification {
    pub screen: Screen,
    pub category: String,
}

impl Classification {
    fn new(screen: Screen, category: impl Into<String>) -> Self {
        Self {
            screen,
            category: category.into(),
        }
    }

    /// `screen:category`, used to group near-duplicate checks
    pub fn bucket_key(&self) -> String {
        format!("{}:{}", self.screen, self.category)
    }
}

/// A candidate paired with its canonical placement
#[derive(Debug, Clone, PartialEq)]
pub struct Classified {
    pub card: CandidateCard,
    pub class: Classification,
}

/// Compiled classification rules
pub struct Classifier {
    screen_rules: Vec<(Regex, Screen)>,
    synonyms: Vec<(Regex, &'static str)>,
}

impl Classifier {
    pub fn new() -> Result<Self, regex::Error> {
        // First match wins; no match means identity
        let screen_rules = vec![
            (
                Regex::new(
                    r"econom|social program|immigration|national security|healthcare|environment|defense|education",
                )?,
                Screen::AgendaPpl,
            ),
            (
                Regex::new(
                    r"background|career|public image|belief|accomplishment|statement|award",
                )?,
                Screen::Identity,
            ),
            (
                Regex::new(r"party|politician|enterprise|organization|business|media|donor")?,
                Screen::Affiliates,
            ),
        ];

        // Applied in order over the whole label
        let synonyms = vec![
            (Regex::new(r"exemptions?|exceptions?")?, "exceptions"),
            (
                Regex::new(r"implementation|administration|enforcement|procedures?|process(es)?")?,
                "process",
            ),
            (
                Regex::new(r"coverage|applicability|reach|extent|scale|scopes?")?,
                "scope",
            ),
            (
                Regex::new(r"actions?|changes?|provisions?|measures?|requirements?")?,
                "action",
            ),
            (Regex::new(r"sectors?|industry|industries|fields?")?, "sectors"),
            (
                Regex::new(
                    r"populations?|groups?|people|citizens?|residents?|class(es)?|communit(y|ies)",
                )?,
                "demographics",
            ),
            (
                Regex::new(r"regions?|states?|areas?|local(ity|ities)?|geograph(y|ic(al)?)?")?,
                "regions",
            ),
            (
                Regex::new(r"impacts?|effects?|outcomes?|results?|consequences?|aftermath")?,
                "aftermath",
            ),
        ];

        Ok(Self {
            screen_rules,
            synonyms,
        })
    }

    /// Map a free-text label to its canonical placement under `policy`
    pub fn classify(&self, label: &str, policy: ClassificationPolicy) -> Classification {
        match policy {
            ClassificationPolicy::Legislation => self.canonicalize_legislative(label),
            ClassificationPolicy::Profile(tier) => self.classify_profile(label, tier),
        }
    }

    /// Keyword-group screen inference over a profile label
    pub fn infer_screen(&self, label: &str) -> Screen {
        let label = label.to_lowercase();
        self.screen_rules
            .iter()
            .find(|(re, _)| re.is_match(&label))
            .map(|(_, screen)| *screen)
            .unwrap_or(Screen::Identity)
    }

    fn classify_profile(&self, label: &str, tier: Tier) -> Classification {
        let normalized = label.trim().to_lowercase();

        for screen in Screen::PROFILE {
            if named_categories(tier, screen).contains(&normalized.as_str()) {
                return Classification::new(screen, normalized);
            }
        }

        let screen = self.infer_screen(&normalized);
        if tier.allows_overflow() {
            Classification::new(screen, OVERFLOW_CATEGORY)
        } else {
            Classification::new(screen, default_category(screen))
        }
    }

    fn canonicalize_legislative(&self, label: &str) -> Classification {
        let mut normalized = label.trim().to_lowercase();
        for (re, replacement) in &self.synonyms {
            normalized = re.replace_all(&normalized, *replacement).into_owned();
        }

        if AGENDA_LEGI_CATEGORIES.contains(&normalized.as_str()) {
            Classification::new(Screen::AgendaLegi, normalized)
        } else if IMPACT_CATEGORIES.contains(&normalized.as_str()) {
            Classification::new(Screen::Impact, normalized)
        } else {
            Classification::new(Screen::AgendaLegi, "action")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new().unwrap()
    }

    #[test]
    fn test_exact_match_passes_through() {
        let c = classifier().classify("Public Image", ClassificationPolicy::Profile(Tier::Hard));
        assert_eq!(c, Classification::new(Screen::Identity, "public image"));

        let c = classifier().classify("social programs", ClassificationPolicy::Profile(Tier::Soft));
        assert_eq!(c, Classification::new(Screen::AgendaPpl, "social programs"));
    }

    #[test]
    fn test_hard_tier_unknown_goes_to_overflow() {
        let c = classifier().classify(
            "Tax policy and the economic outlook",
            ClassificationPolicy::Profile(Tier::Hard),
        );
        assert_eq!(c, Classification::new(Screen::AgendaPpl, "more"));

        let c = classifier().classify(
            "media appearances",
            ClassificationPolicy::Profile(Tier::Hard),
        );
        assert_eq!(c, Classification::new(Screen::Affiliates, "more"));
    }

    #[test]
    fn test_strict_tiers_use_screen_default() {
        let policy = ClassificationPolicy::Profile(Tier::Base);
        // "healthcare" is only named for the hard tier
        assert_eq!(
            classifier().classify("healthcare", policy),
            Classification::new(Screen::AgendaPpl, "economy")
        );
        assert_eq!(
            classifier().classify("business ties", policy),
            Classification::new(Screen::Affiliates, "party")
        );
        assert_eq!(
            classifier().classify("hobbies", policy),
            Classification::new(Screen::Identity, "background")
        );
    }

    #[test]
    fn test_strict_tiers_never_emit_overflow() {
        let c = classifier().classify("more", ClassificationPolicy::Profile(Tier::Soft));
        assert_ne!(c.category, OVERFLOW_CATEGORY);
    }

    #[test]
    fn test_screen_inference_order() {
        // agenda keywords win over identity keywords
        assert_eq!(classifier().infer_screen("career in education"), Screen::AgendaPpl);
        assert_eq!(classifier().infer_screen("Party donors"), Screen::Affiliates);
        assert_eq!(classifier().infer_screen("misc"), Screen::Identity);
    }

    #[test]
    fn test_legislative_synonyms() {
        let c = classifier();
        let policy = ClassificationPolicy::Legislation;
        assert_eq!(
            c.classify("Exemptions", policy),
            Classification::new(Screen::AgendaLegi, "exceptions")
        );
        assert_eq!(
            c.classify("industry", policy),
            Classification::new(Screen::Impact, "sectors")
        );
        assert_eq!(
            c.classify("Populations", policy),
            Classification::new(Screen::Impact, "demographics")
        );
        assert_eq!(
            c.classify("enforcement", policy),
            Classification::new(Screen::AgendaLegi, "process")
        );
        assert_eq!(
            c.classify("effects", policy),
            Classification::new(Screen::Impact, "aftermath")
        );
    }

    #[test]
    fn test_legislative_unknown_defaults_to_action() {
        let c = classifier().classify("miscellaneous", ClassificationPolicy::Legislation);
        assert_eq!(c, Classification::new(Screen::AgendaLegi, "action"));
        assert_eq!(c.bucket_key(), "agenda_legi:action");
    }

    #[test]
    fn test_named_categories_by_tier() {
        assert_eq!(named_categories(Tier::Hard, Screen::Identity).len(), 6);
        assert_eq!(named_categories(Tier::Base, Screen::Identity).len(), 4);
        assert_eq!(
            named_categories(Tier::Soft, Screen::Affiliates),
            named_categories(Tier::Base, Screen::Affiliates)
        );
    }
}
