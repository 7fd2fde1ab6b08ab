//! Taxonomy and candidate types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a taxonomy value fails to parse
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind}: '{value}'")]
pub struct ParseTypeError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseTypeError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Subject classification that selects quota targets and category policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Per-(screen, category) targets plus an overflow bucket per screen
    Hard,
    /// Per-(screen, category) targets, strict categories
    Soft,
    /// Per-screen targets only
    Base,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hard => "hard",
            Tier::Soft => "soft",
            Tier::Base => "base",
        }
    }

    /// Whether unmatched labels fall into the overflow category
    pub fn allows_overflow(&self) -> bool {
        matches!(self, Tier::Hard)
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hard" => Ok(Tier::Hard),
            "soft" => Ok(Tier::Soft),
            "base" => Ok(Tier::Base),
            _ => Err(ParseTypeError::new("tier", s)),
        }
    }
}

/// What a subject is: a piece of legislation or a person profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    Bill,
    Profile,
}

impl SubjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubjectKind::Bill => "bill",
            SubjectKind::Profile => "profile",
        }
    }
}

impl fmt::Display for SubjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubjectKind {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bill" | "legislation" => Ok(SubjectKind::Bill),
            "profile" | "ppl" | "person" => Ok(SubjectKind::Profile),
            _ => Err(ParseTypeError::new("subject kind", s)),
        }
    }
}

/// Kind of source material held by a SourceUnit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// One section of enrolled bill text
    BillText,
    /// A section synopsis
    Synopsis,
    /// A fetched biographical or news page
    WebPage,
    /// Poll / vote metrics summaries; often paraphrased
    Metrics,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::BillText => "billtext",
            SourceKind::Synopsis => "synopsis",
            SourceKind::WebPage => "webpage",
            SourceKind::Metrics => "metrics",
        }
    }

    pub fn is_legislative(&self) -> bool {
        matches!(self, SourceKind::BillText | SourceKind::Synopsis)
    }

    /// Whether candidates from this source must quote supporting evidence
    pub fn requires_evidence(&self) -> bool {
        matches!(self, SourceKind::WebPage)
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "billtext" | "bill_text" => Ok(SourceKind::BillText),
            "synopsis" => Ok(SourceKind::Synopsis),
            "webpage" | "web_page" | "web" => Ok(SourceKind::WebPage),
            "metrics" => Ok(SourceKind::Metrics),
            _ => Err(ParseTypeError::new("source kind", s)),
        }
    }
}

/// Top-level taxonomy branch a card belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    /// Profile agenda positions
    AgendaPpl,
    Identity,
    Affiliates,
    /// What a bill does
    AgendaLegi,
    /// Who or what a bill affects
    Impact,
}

impl Screen {
    /// Screens used by profile subjects, in reporting order
    pub const PROFILE: [Screen; 3] = [Screen::AgendaPpl, Screen::Identity, Screen::Affiliates];

    pub fn as_str(&self) -> &'static str {
        match self {
            Screen::AgendaPpl => "agenda_ppl",
            Screen::Identity => "identity",
            Screen::Affiliates => "affiliates",
            Screen::AgendaLegi => "agenda_legi",
            Screen::Impact => "impact",
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Screen {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "agenda_ppl" | "agenda" => Ok(Screen::AgendaPpl),
            "identity" => Ok(Screen::Identity),
            "affiliates" => Ok(Screen::Affiliates),
            "agenda_legi" => Ok(Screen::AgendaLegi),
            "impact" => Ok(Screen::Impact),
            _ => Err(ParseTypeError::new("screen", s)),
        }
    }
}

/// How much of a program a funding claim covers, as classified by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundingScope {
    EntireProgram,
    Subprogram,
    Subsection,
    Technical,
}

impl FromStr for FundingScope {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "entire_program" => Ok(FundingScope::EntireProgram),
            "subprogram" | "sub_program" => Ok(FundingScope::Subprogram),
            "subsection" | "sub_section" => Ok(FundingScope::Subsection),
            "technical" => Ok(FundingScope::Technical),
            _ => Err(ParseTypeError::new("funding scope", s)),
        }
    }
}

/// What kind of number a funding claim changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberType {
    BenefitFormula,
    AppropriationCap,
    ShortfallReserve,
    Penalty,
    Other,
}

impl FromStr for NumberType {
    type Err = ParseTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace([' ', '-'], "_").as_str() {
            "benefit_formula" => Ok(NumberType::BenefitFormula),
            "appropriation_cap" => Ok(NumberType::AppropriationCap),
            "shortfall_reserve" => Ok(NumberType::ShortfallReserve),
            "penalty" => Ok(NumberType::Penalty),
            "other" => Ok(NumberType::Other),
            _ => Err(ParseTypeError::new("number type", s)),
        }
    }
}

/// Validated output of one generation call, before any filtering
///
/// Optional metadata is `None` when the model omitted it or returned a value
/// outside the known enumerations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateCard {
    pub title: String,
    pub subtext: String,
    /// Free-text category label as proposed by the model
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<FundingScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_type: Option<NumberType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence_snippets: Vec<String>,
}

impl CandidateCard {
    /// Create a candidate with only the required fields
    pub fn new(
        title: impl Into<String>,
        subtext: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            subtext: subtext.into(),
            category: category.into(),
            score: None,
            confidence: None,
            scope: None,
            number_type: None,
            evidence_snippets: Vec::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_score(mut self, score: i64) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_evidence(mut self, snippet: impl Into<String>) -> Self {
        self.evidence_snippets.push(snippet.into());
        self
    }

    pub fn with_funding(mut self, scope: FundingScope, number_type: NumberType) -> Self {
        self.scope = Some(scope);
        self.number_type = Some(number_type);
        self
    }
}
