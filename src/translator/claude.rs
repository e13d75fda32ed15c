//! Anthropic messages-API provider.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{AssistantError, Result};
use crate::session::RepairFeedback;

use super::prompts::{repair_user_prompt, REPAIR_SYSTEM_PROMPT, SYSTEM_PROMPT};
use super::{parse_translation, Translation, Translator};

const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeTranslator {
    api_key: Option<String>,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl ClaudeTranslator {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.llm_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            api_key: settings.claude_api_key.clone(),
            model: settings.claude_model.clone(),
            base_url: settings.claude_base_url.clone(),
            client,
        }
    }

    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(AssistantError::TranslationUnavailable)?;

        let body = json!({
            "model": self.model,
            "max_tokens": 4096,
            "system": system_prompt,
            "messages": [
                {"role": "user", "content": user_prompt},
            ],
        });

        debug!("calling Claude model {}", self.model);
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Transport(format!("Claude API call failed: {}", e)))?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Transport(format!("failed to parse Claude response: {}", e)))?;

        if !status.is_success() {
            let message = payload["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string();
            return Err(AssistantError::Translation(format!(
                "Claude returned HTTP {}: {}",
                status, message
            )));
        }

        payload["content"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AssistantError::Translation("No content in Claude response".to_string()))
    }
}

#[async_trait]
impl Translator for ClaudeTranslator {
    fn name(&self) -> &str {
        "claude"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.api_key.as_deref().map_or(false, |k| !k.is_empty())
    }

    async fn translate(&self, question: &str) -> Result<Translation> {
        info!("translating question with Claude");
        let raw = self.chat(SYSTEM_PROMPT, question).await?;
        Ok(parse_translation(&raw, self.name()))
    }

    async fn repair(
        &self,
        question: &str,
        invalid_query: &str,
        feedback: &RepairFeedback,
    ) -> Result<Translation> {
        info!("requesting query repair from Claude");
        let prompt = repair_user_prompt(question, invalid_query, feedback);
        let raw = self.chat(REPAIR_SYSTEM_PROMPT, &prompt).await?;
        Ok(parse_translation(&raw, self.name()))
    }
}
