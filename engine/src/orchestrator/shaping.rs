//! Per-card shaping applied between the rubric and deduplication

use crate::pipeline::text;
use reqwest::Url;
use sdk::types::SubjectKind;

/// Wire services, broadcasters and fact-check/polling outlets
const MEDIA_DOMAINS: &[&str] = &[
    "reuters.com",
    "apnews.com",
    "bbc.com",
    "thehill.com",
    "bloomberg.com",
    "axios.com",
    "afp.com",
    "dw.com",
    "cbc.ca",
    "abc.net.au",
    "snopes.com",
    "politifact.com",
    "fivethirtyeight.com",
    "yougov.com",
    "morningconsult.com",
    "gallup.com",
];

/// Word limits for (title, subtext)
pub fn word_limits(kind: SubjectKind) -> (usize, usize) {
    match kind {
        SubjectKind::Bill => (15, 30),
        SubjectKind::Profile => (10, 20),
    }
}

/// Collapse whitespace and cut title and subtext to the subject's limits
pub fn normalize_lengths(kind: SubjectKind, title: &str, subtext: &str) -> (String, String) {
    let (title_words, subtext_words) = word_limits(kind);
    (
        text::trim_to_words(title, title_words),
        text::trim_to_words(subtext, subtext_words),
    )
}

/// Topic prefix for an `agenda_legi` title, e.g. `Healthcare, Medicaid: ...`
pub fn tag_title(title: &str, category: &str) -> String {
    let haystack = format!("{} {}", title, category).to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| haystack.contains(n));

    let (tag, sub) = if has(&["snap"]) {
        ("Social Programs", Some("SNAP"))
    } else if has(&["medicaid"]) {
        ("Healthcare", Some("Medicaid"))
    } else if has(&["medicare"]) {
        ("Healthcare", Some("Medicare"))
    } else if has(&["tax"]) {
        ("Taxes", None)
    } else if has(&["immigration", "asylum", "visa"]) {
        ("Immigration", None)
    } else if has(&["defense", "military"]) {
        ("Defense", None)
    } else if has(&["energy", "oil", "renewable", "epa"]) {
        ("Energy & Environment", None)
    } else if has(&["education", "student loan", "pell"]) {
        ("Education", None)
    } else {
        ("Policy", None)
    };

    match sub {
        Some(sub) => format!("{}, {}: {}", tag, sub, title),
        None => format!("{}: {}", tag, title),
    }
}

/// Whether a link points at a known media outlet (or one of its subdomains)
pub fn is_media_link(link: Option<&str>) -> bool {
    let Some(host) = link
        .and_then(|l| Url::parse(l.trim()).ok())
        .and_then(|u| u.host_str().map(str::to_lowercase))
    else {
        return false;
    };
    let host = host.strip_prefix("www.").unwrap_or(&host);

    MEDIA_DOMAINS.iter().any(|domain| {
        host == *domain
            || host
                .strip_suffix(domain)
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}
