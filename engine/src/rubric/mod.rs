//! Rubric Filter
//!
//! Quality gates applied to classified candidates, in a fixed order:
//!
//! 1. **Materiality** (legislative sources): the card must change something.
//!    Boilerplate headings survive only with a coverage or policy cue.
//! 2. **Funding safety** (legislative sources): money claims must not
//!    over-state their scope.
//! 3. **Impact style** (impact screen only): titles lead with the affected
//!    subject, not the policy action.
//! 4. **Evidence** (page sources): snippets must be traceable to the page.
//!
//! A candidate is rejected by the first gate it fails. Rejections are counted
//! per gate for reporting.

use crate::pipeline::text;
use crate::taxonomy::Classified;
use regex::Regex;
use sdk::types::{CandidateCard, FundingScope, NumberType, Screen, SourceKind};
use serde::Serialize;
use std::collections::HashSet;
use tracing::debug;

/// Page text beyond this many characters is not searched for evidence
pub const EVIDENCE_SEARCH_CHARS: usize = 300_000;

/// At most this many snippets are checked per candidate
const MAX_SNIPPETS: usize = 3;

/// Snippets shorter than this carry no signal
const MIN_SNIPPET_CHARS: usize = 10;

/// Which gate rejected a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    Materiality,
    FundingSafety,
    Style,
    Evidence,
}

/// Per-gate rejection tallies for one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RejectionCounts {
    pub materiality: usize,
    pub funding_safety: usize,
    pub style: usize,
    pub evidence: usize,
}

impl RejectionCounts {
    fn record(&mut self, gate: Gate) {
        match gate {
            Gate::Materiality => self.materiality += 1,
            Gate::FundingSafety => self.funding_safety += 1,
            Gate::Style => self.style += 1,
            Gate::Evidence => self.evidence += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.materiality + self.funding_safety + self.style + self.evidence
    }
}

/// What the gates may consult about the source a batch came from
pub struct SourceContext<'a> {
    pub kind: SourceKind,
    /// Full text the candidates were generated from
    pub text: &'a str,
    /// Master switch for the evidence gate
    pub require_evidence: bool,
}

impl SourceContext<'_> {
    fn evidence_applies(&self) -> bool {
        self.require_evidence && self.kind.requires_evidence()
    }
}

/// Result of filtering one batch
#[derive(Debug, Default)]
pub struct RubricOutcome {
    pub accepted: Vec<Classified>,
    pub rejected: RejectionCounts,
    /// Every candidate failed evidence and the best one was kept anyway
    pub used_fallback: bool,
}

/// Source text prepared once per batch for evidence lookups
struct EvidenceIndex<'a> {
    text: &'a str,
    lowered: String,
    tokens: HashSet<String>,
    has_digit: bool,
}

impl<'a> EvidenceIndex<'a> {
    fn new(text: &'a str) -> Self {
        let text = text::truncate_chars(text, EVIDENCE_SEARCH_CHARS);
        let lowered = text.to_lowercase();
        let tokens = text::tokens(&lowered).into_iter().collect();
        Self {
            text,
            lowered,
            tokens,
            has_digit: text.chars().any(|c| c.is_ascii_digit()),
        }
    }
}

/// Compiled rubric rules
pub struct Rubric {
    evidence_threshold: f64,

    low_value_title: Regex,
    policy_verb: Regex,
    coverage_cue: Regex,
    definition: Regex,
    appropriation: Regex,
    money: Regex,
    timing: Regex,

    global_funding: Regex,
    max_benefit: Regex,
    shortfall: Regex,
    global_funding_rise: Regex,
    cautious: Regex,

    policy_first_word: Regex,
    sector: Regex,
    comparative: Regex,
    demographic: Regex,
    impact_verb: Regex,
    region: Regex,
    named_place: Regex,
    future_tense: Regex,
}

impl Rubric {
    /// Build the rubric; `evidence_threshold` is the minimum share of a
    /// snippet's tokens that must appear in the source text.
    pub fn new(evidence_threshold: f64) -> Result<Self, regex::Error> {
        Ok(Self {
            evidence_threshold,

            low_value_title: Regex::new(
                r"(?i)\b(short\s+title|table\s+of\s+contents|definitions?|rule\s+of\s+construction|findings|sense\s+of\s+congress|clerical|conforming|technical\s+corrections?)\b",
            )?,
            policy_verb: Regex::new(
                r"(?i)\b(require[sd]?|requiring|prohibit(s|ed|ing)?|repeal(s|ed|ing)?|expand(s|ed|ing)?|reduce[sd]?|reducing|increase[sd]?|increasing|create[sd]?|creating|terminate[sd]?|terminating|authorize[sd]?|authorizing|ban(s|ned|ning)?|limit(s|ed|ing)?|mandate[sd]?|mandating|tax(es|ed|ing)?|subsidize[sd]?|subsidizing|grant(s|ed|ing)?|penalize[sd]?|penalizing|enforce[sd]?|enforcing|preempt(s|ed|ing)?|rescind(s|ed|ing)?|rescission|fund(s|ed|ing)?|defund(s|ed|ing)?|reform(s|ed|ing)?|amend(s|ed|ing)?)\b",
            )?,
            coverage_cue: Regex::new(
                r"(?i)\b(include[sd]?|including|exclude[sd]?|excluding|exempt(s|ed|ing|ions?)?|appl(y|ies)\s+to|does\s+not\s+apply|covered|not\s+covered|eligib(le|ility))\b",
            )?,
            definition: Regex::new(r"(?i)\bdefinitions?\b")?,
            appropriation: Regex::new(
                r"(?i)\b(appropriations?|appropriates|appropriated|appropriating|authorization|authorized|rescission|rescind(s|ed)?)\b",
            )?,
            money: Regex::new(r"(?i)(\$\s?\d|\b(billion|million)\b)")?,
            timing: Regex::new(
                r"(?i)\b(fiscal\s+years?|fy\s?\d{2,4}|(19|20)\d{2}|annually|per\s+year|each\s+year|for\s+each\s+of|through|until|beginning|by\s+\w+\s+\d{1,2})\b",
            )?,

            global_funding: Regex::new(r"(?i)\b(funding|funds|budget|spending|costs?)\b")?,
            max_benefit: Regex::new(
                r"(?i)\b(maximum\s+(federal\s+)?pell\s+grant|max(imum)?\s+benefit|per[-\s]student|per[-\s]person|per[-\s]household)\b",
            )?,
            shortfall: Regex::new(r"(?i)\b(shortfall|reserve|deficit)\b")?,
            global_funding_rise: Regex::new(
                r"(?i)\bfunding\s+for\s+[^,]+(rises?|increases?|goes?\s+up)\s+from\b",
            )?,
            cautious: Regex::new(
                r"(?i)\b(this\s+section|subsection|reserve|shortfall|specific\s+program\s+line)\b",
            )?,

            policy_first_word: Regex::new(
                r"(?i)^(require[sd]?|prohibit(s|ed)?|repeal(s|ed)?|expand(s|ed)?|reduce[sd]?|increase[sd]?|create[sd]?|terminate[sd]?|authorize[sd]?|ban(s|ned)?|limit(s|ed)?|mandate[sd]?|tax(es|ed)?|subsidize[sd]?|grant(s|ed)?|penalize[sd]?|enforce[sd]?|preempt(s|ed)?|rescind(s|ed)?|reform(s|ed)?|amend(s|ed)?|new)$",
            )?,
            sector: Regex::new(
                r"(?i)\b(parks?|hospitals?|clinics?|schools?|universit(y|ies)|colleges?|utilit(y|ies)|power\s+plants?|refiner(y|ies)|farms?|farmers|manufactur(e|ers|ing)|airlines?|banks?|insurers?|pharmacies?|ports?|railroads?|transit|police|fire\s+departments?|employers|small\s+businesses)\b",
            )?,
            comparative: Regex::new(r"(?i)(%|\b(more|less|fewer|greater|smaller)\b)")?,
            demographic: Regex::new(
                r"(?i)\b(low-income|low\s+income|seniors?|older\s+adults|children|students|veterans|women|men|parents|famil(y|ies)|households?|immigrants?|asylum\s+seekers?|refugees|lgbtq\+?|black|african\s+american|latino|hispanic|asian|native\s+(american|alaskan)|rural|urban|workers|borrowers)\b",
            )?,
            impact_verb: Regex::new(
                r"(?i)\b(increase[sd]?|decrease[sd]?|reduce[sd]?|expand(s|ed)?|limit(s|ed)?|restrict(s|ed)?|boost(s|ed)?|cut(s)?|decline[sd]?|rise[sn]?|fall(s)?|tighten(s|ed)?|loosen(s|ed)?|delay(s|ed)?|accelerate[sd]?|lose|gain|face|struggle)\b",
            )?,
            region: Regex::new(
                r"(?i)\b(nationwide|state|states|county|counties|city|cities|metro|rural|urban|region|regions|territor(y|ies)|district)\b",
            )?,
            named_place: Regex::new(r"\bin\s+[A-Z][a-z]+(\s[A-Z][a-z]+)?\b")?,
            future_tense: Regex::new(
                r"(?i)\b(will|would|project(s|ed)?|expected\s+to|could|may|likely)\b",
            )?,
        })
    }

    /// Materiality gate over one title/subtext pair.
    pub fn is_material(&self, title: &str, subtext: &str) -> bool {
        let combined = format!("{} {}", title, subtext);
        let has_cue = self.coverage_cue.is_match(&combined) || self.policy_verb.is_match(&combined);

        if self.low_value_title.is_match(title) && !has_cue {
            return false;
        }

        // Funding lines may carry only an amount; the funding gate checks them
        if !has_cue && !self.money.is_match(&combined) {
            return false;
        }

        if self.definition.is_match(&combined) && !self.coverage_cue.is_match(&combined) {
            return false;
        }

        true
    }

    /// Funding-safety gate.
    ///
    /// Cards without money or appropriation language pass untouched.
    pub fn is_funding_safe(&self, card: &CandidateCard) -> bool {
        let t = card.title.as_str();
        let combined = format!("{} {}", card.title, card.subtext);

        let appropriation = self.appropriation.is_match(&combined);
        if !appropriation && !self.money.is_match(&combined) {
            return true;
        }

        // Appropriations must state how much and when
        if appropriation && !(self.money.is_match(&combined) && self.timing.is_match(&combined)) {
            return false;
        }

        let cautious = self.cautious.is_match(&combined);

        match (card.scope, card.number_type) {
            (None, None) => {
                !(self.max_benefit.is_match(&combined)
                    || self.global_funding_rise.is_match(t)
                    || (self.global_funding.is_match(t) && !cautious))
            }
            (Some(FundingScope::EntireProgram), Some(NumberType::BenefitFormula)) => {
                self.max_benefit.is_match(&combined)
            }
            (scope, number_type)
                if matches!(
                    number_type,
                    Some(NumberType::AppropriationCap | NumberType::ShortfallReserve)
                ) || matches!(scope, Some(FundingScope::Subprogram | FundingScope::Subsection)) =>
            {
                if self.max_benefit.is_match(&combined) {
                    return false;
                }
                if self.global_funding_rise.is_match(t)
                    && !self.shortfall.is_match(&combined)
                    && !cautious
                {
                    return false;
                }
                cautious || !self.global_funding.is_match(t)
            }
            _ => true,
        }
    }

    /// Impact-style gate for a card on the impact screen.
    pub fn impact_style_ok(&self, category: &str, title: &str, subtext: &str) -> bool {
        let first_word = title
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches(|c: char| !c.is_alphanumeric());
        if self.policy_first_word.is_match(first_word) {
            return false;
        }

        let combined = format!("{} {}", title, subtext);
        match category {
            "sectors" => {
                self.sector.is_match(title)
                    && (self.impact_verb.is_match(title) || self.comparative.is_match(title))
            }
            "demographics" => {
                self.demographic.is_match(title) && self.impact_verb.is_match(&combined)
            }
            "regions" => self.region.is_match(title) || self.named_place.is_match(title),
            "aftermath" => self.future_tense.is_match(&combined),
            _ => true,
        }
    }

    /// Whether any usable snippet can be traced back to `text`.
    pub fn evidence_supported(&self, text: &str, snippets: &[String]) -> bool {
        self.snippets_supported(&EvidenceIndex::new(text), snippets)
    }

    fn snippets_supported(&self, index: &EvidenceIndex<'_>, snippets: &[String]) -> bool {
        if index.text.is_empty() {
            return false;
        }

        snippets
            .iter()
            .take(MAX_SNIPPETS)
            .map(|s| text::collapse_whitespace(s))
            .filter(|s| s.chars().count() >= MIN_SNIPPET_CHARS)
            .any(|snippet| {
                let lowered = snippet.to_lowercase();
                if index.lowered.contains(&lowered) {
                    return true;
                }

                let tokens = text::tokens(&lowered);
                if !tokens.is_empty() {
                    let hits = tokens.iter().filter(|t| index.tokens.contains(*t)).count();
                    if hits as f64 / tokens.len() as f64 >= self.evidence_threshold {
                        return true;
                    }
                }

                index.has_digit && snippet.chars().any(|c| c.is_ascii_digit())
            })
    }

    fn check(
        &self,
        item: &Classified,
        ctx: &SourceContext<'_>,
        index: Option<&EvidenceIndex<'_>>,
    ) -> Result<(), Gate> {
        let card = &item.card;

        if ctx.kind.is_legislative() {
            if !self.is_material(&card.title, &card.subtext) {
                return Err(Gate::Materiality);
            }
            if !self.is_funding_safe(card) {
                return Err(Gate::FundingSafety);
            }
        }

        if item.class.screen == Screen::Impact
            && !self.impact_style_ok(&item.class.category, &card.title, &card.subtext)
        {
            return Err(Gate::Style);
        }

        if let Some(index) = index {
            if !self.snippets_supported(index, &card.evidence_snippets) {
                return Err(Gate::Evidence);
            }
        }

        Ok(())
    }

    /// Run every gate over a batch.
    ///
    /// When the evidence gate applies and rejects everything that survived
    /// the earlier gates, the single most confident of those candidates is
    /// kept (ties broken by score, then input order).
    pub fn filter(&self, items: Vec<Classified>, ctx: &SourceContext<'_>) -> RubricOutcome {
        let index = ctx.evidence_applies().then(|| EvidenceIndex::new(ctx.text));
        let mut outcome = RubricOutcome::default();
        let mut evidence_only: Vec<Classified> = Vec::new();

        for item in items {
            match self.check(&item, ctx, index.as_ref()) {
                Ok(()) => outcome.accepted.push(item),
                Err(gate) => {
                    debug!("Rubric rejected '{}' at {:?}", item.card.title, gate);
                    outcome.rejected.record(gate);
                    if gate == Gate::Evidence {
                        evidence_only.push(item);
                    }
                }
            }
        }

        if outcome.accepted.is_empty() && !evidence_only.is_empty() {
            let mut best: Option<Classified> = None;
            for item in evidence_only {
                let better = match &best {
                    None => true,
                    Some(current) => rank_key(&item.card) > rank_key(&current.card),
                };
                if better {
                    best = Some(item);
                }
            }
            if let Some(best) = best {
                debug!("Evidence fallback kept '{}'", best.card.title);
                outcome.accepted.push(best);
                outcome.used_fallback = true;
            }
        }

        outcome
    }
}

/// Confidence first, then score; missing values rank lowest
fn rank_key(card: &CandidateCard) -> (f64, i64) {
    (
        card.confidence.unwrap_or(f64::MIN),
        card.score.unwrap_or(i64::MIN),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::{ClassificationPolicy, Classifier};

    fn rubric() -> Rubric {
        Rubric::new(0.6).unwrap()
    }

    fn classified(card: CandidateCard, policy: ClassificationPolicy) -> Classified {
        let class = Classifier::new().unwrap().classify(&card.category, policy);
        Classified { card, class }
    }

    fn bill_ctx(text: &str) -> SourceContext<'_> {
        SourceContext {
            kind: SourceKind::BillText,
            text,
            require_evidence: true,
        }
    }

    fn page_ctx(text: &str) -> SourceContext<'_> {
        SourceContext {
            kind: SourceKind::WebPage,
            text,
            require_evidence: true,
        }
    }

    #[test]
    fn test_boilerplate_title_needs_a_cue() {
        let r = rubric();
        assert!(!r.is_material("Short Title", "Names the act the Small Business Relief Act"));
        assert!(r.is_material(
            "Short Title",
            "Exempts small businesses from quarterly reporting requirements"
        ));
    }

    #[test]
    fn test_scenario_short_title_batch() {
        let r = rubric();
        let items = vec![
            classified(
                CandidateCard::new("Short Title", "", "action"),
                ClassificationPolicy::Legislation,
            ),
            classified(
                CandidateCard::new(
                    "Short Title",
                    "Exempts small businesses from quarterly reporting",
                    "exemptions",
                ),
                ClassificationPolicy::Legislation,
            ),
        ];

        let outcome = r.filter(items, &bill_ctx("Sec. 1. Short title."));
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected.materiality, 1);
        assert_eq!(outcome.accepted[0].class.category, "exceptions");
    }

    #[test]
    fn test_definitions_must_change_coverage() {
        let r = rubric();
        assert!(!r.is_material("Definitions updated", "Amends the definition of vehicle"));
        assert!(r.is_material(
            "Definitions narrow coverage",
            "Amends the definition so farms under 10 acres are not covered"
        ));
    }

    #[test]
    fn test_cards_without_any_cue_fail() {
        assert!(!rubric().is_material("The agency", "The agency exists"));
        assert!(rubric().is_material(
            "Agency must publish rules",
            "Requires rules within 180 days"
        ));
    }

    #[test]
    fn test_funding_gate_requires_amount_and_timing() {
        let r = rubric();
        let vague =
            CandidateCard::new("This section appropriates money", "For the program", "action");
        assert!(!r.is_funding_safe(&vague));

        let specific = CandidateCard::new(
            "This section appropriates $5 million for rural clinics",
            "Available for fiscal year 2026",
            "action",
        );
        assert!(r.is_funding_safe(&specific));
    }

    #[test]
    fn test_funding_gate_rejects_global_claims() {
        let r = rubric();
        let global = CandidateCard::new(
            "Funding for Pell Grants rises from $1 billion to $2 billion",
            "Starting in 2026",
            "action",
        );
        assert!(!r.is_funding_safe(&global));

        let capped = CandidateCard::new(
            "Funding for the shortfall line rises from $1 billion to $2 billion",
            "This section sets the reserve for 2026",
            "action",
        )
        .with_funding(FundingScope::Subsection, NumberType::ShortfallReserve);
        assert!(r.is_funding_safe(&capped));

        let benefit =
            CandidateCard::new("Benefit formula changes by $500", "Starting 2026", "action")
                .with_funding(FundingScope::EntireProgram, NumberType::BenefitFormula);
        assert!(!r.is_funding_safe(&benefit));
    }

    #[test]
    fn test_non_funding_cards_pass_funding_gate() {
        let card =
            CandidateCard::new("Agencies must report annually", "Requires a report", "process");
        assert!(rubric().is_funding_safe(&card));
    }

    #[test]
    fn test_impact_titles_lead_with_subject() {
        let r = rubric();
        assert!(!r.impact_style_ok("sectors", "Requires hospitals to cut staff", ""));
        assert!(r.impact_style_ok("sectors", "Public parks get 15% less funding in 2028", ""));
        assert!(r.impact_style_ok(
            "demographics",
            "Low-income households face reduced SNAP benefits",
            ""
        ));
        assert!(!r.impact_style_ok("demographics", "People are affected", "Things change"));
        assert!(r.impact_style_ok("regions", "Rural counties lose broadband grants", ""));
        assert!(r.impact_style_ok("regions", "Farmers in North Dakota lose subsidies", ""));
        assert!(r.impact_style_ok("aftermath", "CBO projects deficit growth", ""));
        assert!(!r.impact_style_ok("aftermath", "Deficit grows", "It grew"));
    }

    #[test]
    fn test_style_gate_only_on_impact_screen() {
        let r = rubric();
        let item = classified(
            CandidateCard::new("Requires agencies to publish rules", "Within 180 days", "action"),
            ClassificationPolicy::Legislation,
        );
        let outcome = r.filter(vec![item], &bill_ctx("text"));
        assert_eq!(outcome.accepted.len(), 1);
    }

    #[test]
    fn test_evidence_substring_and_overlap() {
        let r = rubric();
        let page = "Senator Jane Doe chaired the Senate Finance Committee from 2015 to 2019.";
        assert!(r.evidence_supported(page, &["chaired the Senate Finance Committee".into()]));
        assert!(r.evidence_supported(page, &["Doe chaired Finance Committee".into()]));
        assert!(!r.evidence_supported(page, &["Plays the violin on weekends".into()]));
        // Too short to count
        assert!(!r.evidence_supported(page, &["Doe".into()]));
        assert!(!r.evidence_supported("", &["chaired the Senate Finance Committee".into()]));
    }

    #[test]
    fn test_evidence_digit_fallback() {
        let r = rubric();
        let page = "Re-elected in 2020 with 61 percent of the vote.";
        assert!(r.evidence_supported(page, &["Won roughly sixty-one pct, 2020".into()]));
    }

    #[test]
    fn test_evidence_fallback_keeps_most_confident() {
        let r = rubric();
        let policy = ClassificationPolicy::Profile(sdk::types::Tier::Hard);
        let items = vec![
            classified(
                CandidateCard::new("Sits on an oversight panel", "Unsupported", "career")
                    .with_confidence(0.4)
                    .with_evidence("Something not on the page at all"),
                policy,
            ),
            classified(
                CandidateCard::new("Led a charity drive", "Unsupported", "accomplishments")
                    .with_confidence(0.9)
                    .with_evidence("Another thing missing entirely"),
                policy,
            ),
        ];

        let outcome = r.filter(items, &page_ctx("A page about gardening tips and soil."));
        assert!(outcome.used_fallback);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].card.title, "Led a charity drive");
        assert_eq!(outcome.rejected.evidence, 2);
    }

    #[test]
    fn test_evidence_skipped_for_metrics_and_when_disabled() {
        let r = rubric();
        let policy = ClassificationPolicy::Profile(sdk::types::Tier::Soft);
        let item = || {
            classified(
                CandidateCard::new("Approval rating climbs", "Paraphrased", "public image"),
                policy,
            )
        };

        let metrics = SourceContext {
            kind: SourceKind::Metrics,
            text: "unrelated",
            require_evidence: true,
        };
        assert_eq!(r.filter(vec![item()], &metrics).accepted.len(), 1);

        let disabled = SourceContext {
            kind: SourceKind::WebPage,
            text: "unrelated",
            require_evidence: false,
        };
        let outcome = r.filter(vec![item()], &disabled);
        assert_eq!(outcome.accepted.len(), 1);
        assert!(!outcome.used_fallback);
    }

    #[test]
    fn test_no_fallback_when_something_passed() {
        let r = rubric();
        let policy = ClassificationPolicy::Profile(sdk::types::Tier::Soft);
        let page = "She founded the Riverside Food Bank in 2011.";
        let items = vec![
            classified(
                CandidateCard::new("Founded a food bank", "Supported", "background")
                    .with_evidence("founded the Riverside Food Bank"),
                policy,
            ),
            classified(
                CandidateCard::new("Won a medal", "Unsupported", "awards")
                    .with_confidence(0.99)
                    .with_evidence("Olympic gold medal winner"),
                policy,
            ),
        ];

        let outcome = r.filter(items, &page_ctx(page));
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.rejected.total(), 1);
        assert_eq!(outcome.accepted[0].class.screen, Screen::Identity);
    }
}
