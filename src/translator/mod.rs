//! Natural-language to AQL translation
//!
//! The [`Translator`] trait is the seam between the repair pipeline and the
//! LLM vendors. Three providers implement it (OpenAI, Claude, Ollama); the
//! factory picks one from configuration, with `auto` trying them in order
//! of preference.

pub mod claude;
pub mod ollama;
pub mod openai;
pub mod prompts;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::Settings;
use crate::error::Result;
use crate::session::RepairFeedback;

pub use claude::ClaudeTranslator;
pub use ollama::OllamaTranslator;
pub use openai::OpenAiTranslator;

/// One translation produced by a provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Translation {
    pub query: String,
    pub explanation: String,
    pub understanding: String,
    pub provider: String,
}

/// LLM provider capability: translate a question, repair an invalid query.
#[async_trait]
pub trait Translator: Send + Sync {
    fn name(&self) -> &str;

    fn model(&self) -> &str;

    /// Cheap configuration check; no network traffic.
    fn is_available(&self) -> bool;

    async fn translate(&self, question: &str) -> Result<Translation>;

    /// Produce a repaired candidate from error feedback. The feedback
    /// carries the full attempt history for this session.
    async fn repair(
        &self,
        question: &str,
        invalid_query: &str,
        feedback: &RepairFeedback,
    ) -> Result<Translation>;
}

/// Select a provider from settings. `auto` prefers openai, then claude,
/// then an explicitly configured ollama; returns `None` when nothing is
/// configured.
pub fn provider_for(settings: &Settings) -> Option<Arc<dyn Translator>> {
    match settings.provider.as_str() {
        "openai" => Some(Arc::new(OpenAiTranslator::new(settings)) as Arc<dyn Translator>),
        "claude" => Some(Arc::new(ClaudeTranslator::new(settings)) as Arc<dyn Translator>),
        "ollama" => Some(Arc::new(OllamaTranslator::new(settings)) as Arc<dyn Translator>),
        _ => {
            info!("auto-selecting LLM provider");
            let candidates: Vec<Arc<dyn Translator>> = vec![
                Arc::new(OpenAiTranslator::new(settings)),
                Arc::new(ClaudeTranslator::new(settings)),
                Arc::new(OllamaTranslator::new(settings)),
            ];
            for candidate in candidates {
                if candidate.is_available() {
                    info!("selected {} as LLM provider", candidate.name());
                    return Some(candidate);
                }
            }
            warn!("no LLM provider is available - configure an API key or Ollama");
            None
        }
    }
}

/// Parse a raw model response into a [`Translation`].
///
/// Tolerates markdown code fences around the JSON. A response that is not
/// JSON at all is treated as a bare query, so "return only the corrected
/// query" answers still work.
pub fn parse_translation(raw: &str, provider: &str) -> Translation {
    let cleaned = strip_code_fences(raw);

    match serde_json::from_str::<serde_json::Value>(cleaned) {
        Ok(value) if value.is_object() => {
            let field = |name: &str| {
                value
                    .get(name)
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
            };
            Translation {
                query: field("query").unwrap_or_else(|| cleaned.to_string()),
                explanation: field("explanation")
                    .unwrap_or_else(|| "Missing explanation in LLM response".to_string()),
                understanding: field("understanding")
                    .unwrap_or_else(|| "Missing understanding in LLM response".to_string()),
                provider: provider.to_string(),
            }
        }
        _ => {
            warn!("LLM response was not JSON, treating it as a bare query");
            Translation {
                query: cleaned.trim().to_string(),
                explanation: "Response returned as plain text".to_string(),
                understanding: "Response returned as plain text".to_string(),
                provider: provider.to_string(),
            }
        }
    }
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|inner| inner.strip_suffix("```").unwrap_or(inner))
        .map(str::trim)
        .unwrap_or(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let raw = r#"{"understanding": "u", "query": "SELECT name", "explanation": "e"}"#;
        let t = parse_translation(raw, "openai");
        assert_eq!(t.query, "SELECT name");
        assert_eq!(t.understanding, "u");
        assert_eq!(t.provider, "openai");
    }

    #[test]
    fn test_parse_fenced_json() {
        let raw = "```json\n{\"query\": \"SELECT size\", \"explanation\": \"e\", \"understanding\": \"u\"}\n```";
        let t = parse_translation(raw, "claude");
        assert_eq!(t.query, "SELECT size");
    }

    #[test]
    fn test_parse_missing_fields_filled_with_placeholders() {
        let raw = r#"{"query": "SELECT name"}"#;
        let t = parse_translation(raw, "ollama");
        assert_eq!(t.query, "SELECT name");
        assert!(t.explanation.contains("Missing explanation"));
        assert!(t.understanding.contains("Missing understanding"));
    }

    #[test]
    fn test_parse_bare_query_text() {
        let t = parse_translation("SELECT name WHERE (size > 1)\n", "openai");
        assert_eq!(t.query, "SELECT name WHERE (size > 1)");
        assert_eq!(t.explanation, "Response returned as plain text");
    }
}
