//! Generation Service Abstraction Layer
//!
//! This module provides the interface to the external text-generation
//! service. The `LLMProvider` trait defines the contract the pipeline needs:
//! send a prompt with sampling parameters, get the raw completion text back,
//! or fail with a typed `LLMError`. Parsing the completion into cards is the
//! job of `crate::generation`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod openai;

pub use openai::OpenAIProvider;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Debug, thiserror::Error)]
pub enum LLMError {
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Timeout")]
    Timeout,

    #[error("Parse error: {0}")]
    ParseError(String),
}

impl LLMError {
    /// Whether a later attempt could plausibly succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LLMError::ProviderUnavailable(_)
                | LLMError::RateLimitExceeded
                | LLMError::NetworkError(_)
                | LLMError::Timeout
        )
    }
}

impl crate::pipeline::Retryable for LLMError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// Message in a prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender (system or user)
    pub role: MessageRole,

    /// Content of the message
    pub content: String,
}

impl Message {
    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    /// Create a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    System,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::System => write!(f, "system"),
        }
    }
}

/// One completion call
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub temperature: f64,
    pub max_tokens: u32,
    /// Ask the service to constrain output to a JSON object
    pub json_mode: bool,
}

/// Raw completion text returned by a provider
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub model: String,
    pub content: String,
}

/// Provider trait that every generation backend implements
#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Returns the name of the provider (e.g., "openai")
    fn name(&self) -> &str;

    /// Run one completion
    ///
    /// # Returns
    /// * `Ok(Completion)` - the raw text of the first choice
    /// * `Err(LLMError)` - transport, status, timeout or envelope failures
    async fn complete(&self, request: &CompletionRequest) -> Result<Completion>;
}

/// Best-effort extraction of a JSON object from model output.
///
/// Handles several output shapes, in order:
/// 1. The whole content is valid JSON
/// 2. A markdown code fence wraps the JSON (trailing prose allowed)
/// 3. Prose around an object: slice from the first `{` to the last `}`
/// 4. A balanced object starting at the first `{`
///
/// Returns `None` when nothing parses.
pub fn extract_json_object(content: &str) -> Option<serde_json::Value> {
    let trimmed = content.trim();

    // Pattern 1: Raw JSON
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        return Some(value);
    }

    // Pattern 2: Extract from markdown code fences
    if let Some(inner) = extract_fenced_json(trimmed) {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(inner.trim()) {
            return Some(value);
        }
    }

    // Pattern 3: Outermost braces
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&trimmed[start..=end]) {
                return Some(value);
            }
        }
    }

    // Pattern 4: First balanced object (content truncated after a complete object)
    if let Some(pos) = trimmed.find('{') {
        if let Some(json_str) = extract_balanced_json(&trimmed[pos..]) {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(json_str) {
                return Some(value);
            }
        }
    }

    None
}

/// Extract the body of the first markdown code fence in the text.
///
/// Works even when there is trailing prose after the closing ```.
/// Returns `None` if no fenced block is found.
fn extract_fenced_json(content: &str) -> Option<&str> {
    // Find opening fence
    let fence_start = content.find("```")?;
    let after_opening = &content[fence_start + 3..];

    // Skip the language tag line (e.g. "json\n")
    let body_start_rel = after_opening.find('\n')? + 1;
    let body_start = fence_start + 3 + body_start_rel;

    // Find closing fence after the body starts
    let closing = content[body_start..].find("```")?;
    let body_end = body_start + closing;

    if body_start >= body_end {
        return None;
    }

    Some(&content[body_start..body_end])
}

/// Extract a balanced JSON object starting at position 0 of `s`.
///
/// Counts `{` / `}` depth, respecting string literals, to find the
/// matching close brace.
fn extract_balanced_json(s: &str) -> Option<&str> {
    if !s.starts_with('{') {
        return None;
    }
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
