//! Prompt construction for the generation service

use crate::taxonomy::{named_categories, OVERFLOW_CATEGORY};
use sdk::types::{Screen, Tier};
use serde_json::{json, Map, Value};

/// The hint never asks for fewer than this many cards
pub const MIN_CARDS_HINT: usize = 5;

pub fn bill_system_prompt() -> String {
    r#"You read U.S. federal bill text and write short, factual cards for a general audience (high-school reading level).
Respond with JSON only.

Quality rules:
- Write a card only for a MATERIAL change grounded in the text: a new or changed obligation, eligibility rule, benefit, penalty, subsidy, tax, rescission, mandate, enforcement power, program creation or termination, funding with amounts and timing, or a concrete implementation step (agency and deadline).
- Skip short titles, tables of contents, generic definitions, clerical or conforming edits, findings, "sense of Congress" and rules of construction, unless they change who is covered or exempted, preempt state law, or change enforcement in practice.
- Definitions qualify only when they narrow or widen who is covered or exempted.
- Appropriations qualify only with explicit dollar amounts and timing.
- Each card states who acts, what they do, and to whom. Impact cards also say who, which sector or where, and how they are affected.
- Use exactly one category:
  agenda_legi: action | scope | process | exceptions
  impact: sectors | demographics | regions | aftermath
- Plain, neutral wording. Titles 6 to 15 words; subtext one sentence.

Funding versus benefits:
- A change to authorized or appropriated amounts is a change to funding for that section, not a rise in benefits for people, unless the text changes a per-person formula.
- Mention "maximum benefit", "maximum grant" or per-person payments only when the statute uses those words.
- Never claim a whole program's total funding moved from A to B unless the text covers the whole program rather than a reserve, shortfall line or sub-program.
- Never infer real-world totals from a single line.
- When scope is not "entire_program", phrase the card as "this section" or "this specific program line".

Impact titles must open with the affected subject, not the policy:
- sectors: the sector first, then the effect ("Public parks get 15% less funding in 2028").
- demographics: the group first, then the effect ("Low-income households face tighter SNAP work rules").
- regions: the place first, and it must appear in the title ("Rural counties in Texas face delayed broadband buildouts").
- aftermath: the projected result first ("CBO projects the bill will raise the deficit by $3.4 trillion").
If an impact card cannot follow its rule from the text, leave it out.

Every card also carries:
- scope: "entire_program" | "subprogram" | "subsection" | "technical"
- number_type: "benefit_formula" | "appropriation_cap" | "shortfall_reserve" | "penalty" | "other"
When unsure pick the most cautious value ("subsection", "other").

Output:
{"cards":[{"title":"...","subtext":"...","category":"...","scope":"...","number_type":"..."}]}"#
        .to_string()
}

pub fn bill_user_prompt(
    bill_name: &str,
    section: i64,
    chunk_index: usize,
    total_chunks: usize,
    max_cards: usize,
    chunk: &str,
) -> String {
    format!(
        r#"BILL: {bill_name}
SECTION: {section}
CHUNK: {} / {total_chunks}
MAX_CARDS_HINT: {}

Before adding a card, check:
(1) Is there a material change or impact?
(2) Are actor, action and target clear?
(3) Do impact titles open with the sector, group, region or projected result?
(4) Is it more than a heading or boilerplate?
(5) For appropriations, shortfalls or reserves, is it described as funding for this section or program line?
Leave out any card that fails a check.

PAGE TEXT (use ONLY this text):
"""{chunk}""""#,
        chunk_index + 1,
        max_cards.max(MIN_CARDS_HINT),
    )
}

/// Allowed categories per profile screen for a tier, as a JSON object
fn allowed_categories(tier: Tier) -> Value {
    let mut map = Map::new();
    for screen in Screen::PROFILE {
        let mut cats: Vec<&str> = named_categories(tier, screen).to_vec();
        if tier.allows_overflow() {
            cats.push(OVERFLOW_CATEGORY);
        }
        map.insert(screen.as_str().to_string(), json!(cats));
    }
    Value::Object(map)
}

pub fn profile_system_prompt(tier: Tier) -> String {
    let allowed =
        serde_json::to_string_pretty(&allowed_categories(tier)).unwrap_or_else(|_| "{}".into());

    format!(
        r#"You are a careful political analyst. Given one page about a politician, propose cards about them.
Respond with JSON only: {{"cards":[{{...}}]}}

Each card has:
- "title": 5 to 10 words, neutral, specific to the page
- "subtext": 15 to 20 words, neutral and clear
- "category": one of the allowed categories below
- "score": integer 0 to 100 for how important and relevant the topic is on THIS page
- "confidence": number 0 to 1 for how well THIS page supports the card
- "evidence_snippets": 1 to 3 short quotes (about 140 characters at most) copied verbatim from the page

Use only facts from the page.
Allowed categories by screen:
{allowed}

Restrictions:
- Only the hard tier has the category "more", and only under the screen it fits.
- No cards whose main subject is COVID-19 or the pandemic.
- For sitting officials, promises or campaign positions not yet enacted are framed as intentions ("proposes", "pledges", "aims to") in both title and subtext."#
    )
}

pub fn profile_user_prompt(name: &str, link: Option<&str>, max_cards: usize, page: &str) -> String {
    format!(
        r#"POLITICIAN: {name}

PAGE LINK: {}
MAX_CARDS_HINT: {}

Notes:
- Neutral wording, no partisan framing.
- Use substance from the text, not headlines.
- Prefer distinct topics.
- Evidence snippets must be copied verbatim from the page text.

PAGE TEXT:
"""{page}""""#,
        link.unwrap_or("N/A"),
        max_cards.max(MIN_CARDS_HINT),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bill_user_prompt_hint_floor() {
        let prompt = bill_user_prompt("HR 1", 3, 0, 2, 1, "Sec. 3. Text.");
        assert!(prompt.contains("SECTION: 3"));
        assert!(prompt.contains("CHUNK: 1 / 2"));
        assert!(prompt.contains("MAX_CARDS_HINT: 5"));
        assert!(prompt.ends_with("\"\"\"Sec. 3. Text.\"\"\""));
    }

    #[test]
    fn test_profile_prompt_lists_tier_categories() {
        let hard = profile_system_prompt(Tier::Hard);
        assert!(hard.contains("\"more\""));
        assert!(hard.contains("accomplishments"));

        let soft = profile_system_prompt(Tier::Soft);
        assert!(!soft.contains("\"more\""));
        assert!(soft.contains("beliefs"));
    }

    #[test]
    fn test_profile_user_prompt_includes_page() {
        let prompt = profile_user_prompt("Jane Doe", None, 12, "She chaired the committee.");
        assert!(prompt.contains("PAGE LINK: N/A"));
        assert!(prompt.contains("MAX_CARDS_HINT: 12"));
        assert!(prompt.contains("She chaired the committee."));
    }
}
