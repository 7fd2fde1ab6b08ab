use proptest::prelude::*;
use sdk::errors::{PipelineError, PipelineErrorExt};
use sdk::types::{FundingScope, NumberType, Screen, SourceKind, SubjectKind, Tier};
use std::str::FromStr;

// Every error variant carries a non-empty hint and a snake_case reason code
// that never echoes the raw message back to the caller.
proptest! {
    #[test]
    fn test_error_hint_and_reason_completeness(message in "\\PC*", id in any::<i64>()) {
        let errs = vec![
            PipelineError::InvalidInput(message.clone()),
            PipelineError::SubjectNotFound(id),
            PipelineError::NoSourceUnits(id),
            PipelineError::SourceUnitNotFound { owner_id: id, unit_id: id },
            PipelineError::SourceRead { unit_id: id, message: message.clone() },
            PipelineError::Database(message.clone()),
            PipelineError::Storage(message.clone()),
            PipelineError::Config(message.clone()),
            PipelineError::Network(message.clone()),
        ];

        for err in errs {
            prop_assert!(!err.user_hint().is_empty());
            let code = err.reason_code();
            prop_assert!(code.chars().all(|c| c.is_ascii_lowercase() || c == '_'));
            if err.is_input_error() {
                prop_assert!(!err.is_recoverable());
            }
        }
    }
}

fn case_variants(s: &str) -> Vec<String> {
    vec![
        s.to_string(),
        s.to_uppercase(),
        format!("  {}\t", s),
    ]
}

// Display output parses back to the same value, whatever the case or padding.
proptest! {
    #[test]
    fn test_taxonomy_display_parses_back(
        tier in prop::sample::select(vec![Tier::Hard, Tier::Soft, Tier::Base]),
        subject in prop::sample::select(vec![SubjectKind::Bill, SubjectKind::Profile]),
        source in prop::sample::select(vec![
            SourceKind::BillText, SourceKind::Synopsis, SourceKind::WebPage, SourceKind::Metrics,
        ]),
        screen in prop::sample::select(vec![
            Screen::AgendaPpl,
            Screen::Identity,
            Screen::Affiliates,
            Screen::AgendaLegi,
            Screen::Impact,
        ]),
    ) {
        for raw in case_variants(tier.as_str()) {
            prop_assert_eq!(Tier::from_str(&raw).unwrap(), tier);
        }
        for raw in case_variants(subject.as_str()) {
            prop_assert_eq!(SubjectKind::from_str(&raw).unwrap(), subject);
        }
        for raw in case_variants(source.as_str()) {
            prop_assert_eq!(SourceKind::from_str(&raw).unwrap(), source);
        }
        for raw in case_variants(screen.as_str()) {
            prop_assert_eq!(Screen::from_str(&raw).unwrap(), screen);
        }

        // serde and as_str agree so stored values and JSON summaries match
        prop_assert_eq!(serde_json::to_value(tier).unwrap(), tier.as_str());
        prop_assert_eq!(serde_json::to_value(source).unwrap(), source.as_str());
        prop_assert_eq!(serde_json::to_value(screen).unwrap(), screen.as_str());
    }
}

// Unknown labels are rejected rather than coerced.
proptest! {
    #[test]
    fn test_unknown_labels_rejected(label in "[a-z]{1,12}") {
        let known_tier = ["hard", "soft", "base"].contains(&label.as_str());
        prop_assert_eq!(label.parse::<Tier>().is_ok(), known_tier);

        let known_scope = ["technical", "subprogram", "subsection"].contains(&label.as_str());
        prop_assert_eq!(label.parse::<FundingScope>().is_ok(), known_scope);

        let known_number = ["penalty", "other"].contains(&label.as_str());
        prop_assert_eq!(label.parse::<NumberType>().is_ok(), known_number);
    }
}
