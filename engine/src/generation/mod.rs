//! Generation Client
//!
//! Turns a slice of source text plus subject context into candidate cards by
//! calling the configured `LLMProvider`. Transport failures propagate as
//! `LLMError` so the worker pool can retry them. A reply whose *content* is
//! malformed is requested once more; a second malformed reply degrades to an
//! empty candidate list.

pub mod prompts;

use crate::config::GenerationConfig;
use crate::llm::{extract_json_object, CompletionRequest, LLMError, LLMProvider, Message};
use sdk::types::{CandidateCard, Tier};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Snippets beyond this count are dropped during parsing
pub const MAX_EVIDENCE_SNIPPETS: usize = 3;

/// Requests per call when the reply content is malformed
const MALFORMED_REPLY_ATTEMPTS: usize = 2;

/// What the model is told about the text it reads
#[derive(Debug, Clone, Copy)]
pub enum PromptContext<'a> {
    BillSection {
        bill_name: &'a str,
        section: i64,
        chunk_index: usize,
        total_chunks: usize,
    },
    Profile {
        name: &'a str,
        tier: Tier,
        link: Option<&'a str>,
    },
}

/// One generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub context: PromptContext<'a>,
    pub text: &'a str,
    pub max_cards: usize,
    pub temperature: f64,
    pub max_tokens: u32,
}

/// Client for the external generation service
#[derive(Clone)]
pub struct GenerationClient {
    provider: Arc<dyn LLMProvider>,
    model: String,
    large_model: String,
    large_model_cutoff_chars: usize,
}

impl GenerationClient {
    pub fn new(provider: Arc<dyn LLMProvider>, config: &GenerationConfig) -> Self {
        Self {
            provider,
            model: config.model.clone(),
            large_model: config.large_model.clone(),
            large_model_cutoff_chars: config.large_model_cutoff_chars,
        }
    }

    /// Model for a text of `chars` characters
    pub fn select_model(&self, chars: usize) -> &str {
        if chars > self.large_model_cutoff_chars {
            &self.large_model
        } else {
            &self.model
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one generation call.
    ///
    /// # Errors
    ///
    /// Only transport-level failures (timeout, HTTP status, network) are
    /// returned; output that stays unparseable after one re-request yields
    /// `Ok(vec![])`.
    pub async fn generate(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<Vec<CandidateCard>, LLMError> {
        let (system, user) = match request.context {
            PromptContext::BillSection {
                bill_name,
                section,
                chunk_index,
                total_chunks,
            } => (
                prompts::bill_system_prompt(),
                prompts::bill_user_prompt(
                    bill_name,
                    section,
                    chunk_index,
                    total_chunks,
                    request.max_cards,
                    request.text,
                ),
            ),
            PromptContext::Profile { name, tier, link } => (
                prompts::profile_system_prompt(tier),
                prompts::profile_user_prompt(name, link, request.max_cards, request.text),
            ),
        };

        let completion_request = CompletionRequest {
            model: self.select_model(request.text.chars().count()).to_string(),
            messages: vec![Message::system(system), Message::user(user)],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            json_mode: true,
        };

        for attempt in 1..=MALFORMED_REPLY_ATTEMPTS {
            let completion = self.provider.complete(&completion_request).await?;
            debug!(
                "Generation reply from {} ({} chars)",
                completion.model,
                completion.content.len()
            );

            if let Some(cards) = try_parse_candidates(&completion.content) {
                return Ok(cards);
            }
            warn!(
                "Malformed generation reply (attempt {}/{})",
                attempt, MALFORMED_REPLY_ATTEMPTS
            );
        }

        Ok(Vec::new())
    }
}

/// Validated parse of a `{"cards": [...]}` reply.
///
/// Entries without a title, or that are not objects, are skipped. Optional
/// fields outside their allowed range or enumeration become `None`. A reply
/// that is not JSON or has no `cards` array yields no candidates.
pub fn parse_candidates(content: &str) -> Vec<CandidateCard> {
    try_parse_candidates(content).unwrap_or_default()
}

/// Like `parse_candidates`, but `None` when the reply itself is malformed
fn try_parse_candidates(content: &str) -> Option<Vec<CandidateCard>> {
    let Some(value) = extract_json_object(content) else {
        debug!("Generation reply was not JSON ({} chars)", content.len());
        return None;
    };

    let Some(cards) = value.get("cards").and_then(Value::as_array) else {
        debug!("Generation reply had no cards array");
        return None;
    };

    Some(cards.iter().filter_map(parse_candidate).collect())
}

fn parse_candidate(raw: &Value) -> Option<CandidateCard> {
    let obj = raw.as_object()?;
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let title = text("title");
    if title.is_empty() {
        return None;
    }

    let mut card = CandidateCard::new(title, text("subtext"), text("category"));

    card.score = obj
        .get("score")
        .and_then(Value::as_f64)
        .filter(|s| s.is_finite())
        .map(|s| s.round().clamp(0.0, 100.0) as i64);
    card.confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .filter(|c| c.is_finite() && (0.0..=1.0).contains(c));
    card.scope = obj
        .get("scope")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok());
    card.number_type = obj
        .get("number_type")
        .and_then(Value::as_str)
        .and_then(|s| s.parse().ok());
    card.evidence_snippets = obj
        .get("evidence_snippets")
        .and_then(Value::as_array)
        .map(|snippets| {
            snippets
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .take(MAX_EVIDENCE_SNIPPETS)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(card)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, OpenAIProvider};
    use async_trait::async_trait;
    use sdk::types::{FundingScope, NumberType};
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct Recording {
        reply: String,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LLMProvider for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn complete(&self, request: &CompletionRequest) -> crate::llm::Result<Completion> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(Completion {
                model: request.model.clone(),
                content: self.reply.clone(),
            })
        }
    }

    fn config() -> GenerationConfig {
        let mut config = crate::config::Config::default_config().generation;
        config.large_model_cutoff_chars = 20;
        config
    }

    #[test]
    fn test_parse_validates_fields() {
        let content = json!({
            "cards": [
                {
                    "title": "  Expands Medicaid  ",
                    "subtext": "Adds adults",
                    "category": "action",
                    "score": 87.6,
                    "confidence": 1.7,
                    "scope": "Entire Program",
                    "number_type": "mystery",
                    "evidence_snippets": ["a", " ", "b", "c", "d"]
                },
                { "title": "", "subtext": "no title" },
                "not an object",
                { "title": "Minimal" }
            ]
        })
        .to_string();

        let cards = parse_candidates(&content);
        assert_eq!(cards.len(), 2);

        let first = &cards[0];
        assert_eq!(first.title, "Expands Medicaid");
        assert_eq!(first.score, Some(88));
        assert_eq!(first.confidence, None);
        assert_eq!(first.scope, Some(FundingScope::EntireProgram));
        assert_eq!(first.number_type, None);
        assert_eq!(first.evidence_snippets, vec!["a", "b", "c"]);

        assert_eq!(cards[1].category, "");
        assert!(cards[1].evidence_snippets.is_empty());
    }

    #[test]
    fn test_parse_degrades_to_empty() {
        assert!(parse_candidates("I cannot help with that").is_empty());
        assert!(parse_candidates("{\"items\": []}").is_empty());
        assert!(parse_candidates("{\"cards\": \"nope\"}").is_empty());
    }

    #[test]
    fn test_parse_accepts_fenced_reply() {
        let content = concat!(
            "```json\n",
            r#"{"cards":[{"title":"T","subtext":"S","#,
            r#""category":"scope","number_type":"penalty"}]}"#,
            "\n```"
        );
        let cards = parse_candidates(content);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].number_type, Some(NumberType::Penalty));
    }

    /// Replies with garbage first, then with `reply`
    struct Flaky {
        reply: String,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl LLMProvider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn complete(&self, request: &CompletionRequest) -> crate::llm::Result<Completion> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            let content = if *calls == 1 {
                "Sorry, here are some cards:".to_string()
            } else {
                self.reply.clone()
            };
            Ok(Completion {
                model: request.model.clone(),
                content,
            })
        }
    }

    fn profile_request(text: &str) -> GenerationRequest<'_> {
        GenerationRequest {
            context: PromptContext::Profile {
                name: "Jane Doe",
                tier: Tier::Soft,
                link: None,
            },
            text,
            max_cards: 10,
            temperature: 0.1,
            max_tokens: 100,
        }
    }

    #[tokio::test]
    async fn test_malformed_reply_is_requested_once_more() {
        let provider = Arc::new(Flaky {
            reply: "{\"cards\":[{\"title\":\"Former mayor\"}]}".into(),
            calls: Mutex::new(0),
        });
        let client =
            GenerationClient::new(Arc::clone(&provider) as Arc<dyn LLMProvider>, &config());

        let cards = client.generate(&profile_request("short")).await.unwrap();
        assert_eq!(cards.len(), 1);
        assert_eq!(*provider.calls.lock().unwrap(), 2);

        // twice malformed gives up with no candidates
        let provider = Arc::new(Flaky {
            reply: "still not json".into(),
            calls: Mutex::new(0),
        });
        let client =
            GenerationClient::new(Arc::clone(&provider) as Arc<dyn LLMProvider>, &config());
        assert!(client.generate(&profile_request("short")).await.unwrap().is_empty());
        assert_eq!(*provider.calls.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_model_selection_by_length() {
        let provider = Arc::new(Recording {
            reply: "{\"cards\":[]}".into(),
            seen: Mutex::new(Vec::new()),
        });
        let client =
            GenerationClient::new(Arc::clone(&provider) as Arc<dyn LLMProvider>, &config());

        for text in ["short", "this text is longer than twenty chars"] {
            client
                .generate(&GenerationRequest {
                    context: PromptContext::Profile {
                        name: "Jane Doe",
                        tier: Tier::Soft,
                        link: None,
                    },
                    text,
                    max_cards: 10,
                    temperature: 0.1,
                    max_tokens: 100,
                })
                .await
                .unwrap();
        }

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].model, config().model);
        assert_eq!(seen[1].model, config().large_model);
        assert!(seen[1].messages[1].content.contains("this text is longer"));
        assert!(seen.iter().all(|r| r.json_mode));
    }

    #[tokio::test]
    async fn test_generate_over_http() {
        let reply = json!({
            "cards": [{
                "title": "Requires reports",
                "subtext": "Agencies report yearly",
                "category": "process"
            }]
        })
        .to_string();
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("SECTION: 4"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": reply } }]
            })))
            .mount(&server)
            .await;

        let provider =
            OpenAIProvider::new(server.uri(), Some("k".into()), Duration::from_secs(5)).unwrap();
        let client = GenerationClient::new(Arc::new(provider), &config());

        let cards = client
            .generate(&GenerationRequest {
                context: PromptContext::BillSection {
                    bill_name: "HR 1",
                    section: 4,
                    chunk_index: 0,
                    total_chunks: 1,
                },
                text: "Sec. 4.",
                max_cards: 250,
                temperature: 0.2,
                max_tokens: 1800,
            })
            .await
            .unwrap();

        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].category, "process");
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let provider =
            OpenAIProvider::new(server.uri(), Some("k".into()), Duration::from_secs(5)).unwrap();
        let client = GenerationClient::new(Arc::new(provider), &config());
        let err = client
            .generate(&GenerationRequest {
                context: PromptContext::Profile {
                    name: "X",
                    tier: Tier::Base,
                    link: Some("https://example.com"),
                },
                text: "page",
                max_cards: 5,
                temperature: 0.1,
                max_tokens: 100,
            })
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
