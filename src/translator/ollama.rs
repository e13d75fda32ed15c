//! Local Ollama provider. No authentication; the daemon runs on localhost
//! by default.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{AssistantError, Result};
use crate::session::RepairFeedback;

use super::prompts::{repair_user_prompt, REPAIR_SYSTEM_PROMPT, SYSTEM_PROMPT};
use super::{parse_translation, Translation, Translator};

pub struct OllamaTranslator {
    model: String,
    base_url: String,
    configured: bool,
    client: reqwest::Client,
}

impl OllamaTranslator {
    pub fn new(settings: &Settings) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.llm_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            model: settings.ollama_model.clone(),
            base_url: settings.ollama_base_url.clone(),
            configured: settings.ollama_configured,
            client,
        }
    }

    async fn chat(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "stream": false,
            "messages": [
                {"role": "system", "content": system_prompt},
                {"role": "user", "content": user_prompt},
            ],
        });

        debug!("calling Ollama model {} at {}", self.model, self.base_url);
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| AssistantError::Transport(format!("Ollama API call failed: {}", e)))?;

        let status = response.status();
        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Transport(format!("failed to parse Ollama response: {}", e)))?;

        if !status.is_success() {
            let message = payload["error"].as_str().unwrap_or("unknown error").to_string();
            return Err(AssistantError::Translation(format!(
                "Ollama returned HTTP {}: {}",
                status, message
            )));
        }

        payload["message"]["content"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AssistantError::Translation("No content in Ollama response".to_string()))
    }
}

#[async_trait]
impl Translator for OllamaTranslator {
    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_available(&self) -> bool {
        self.configured
    }

    async fn translate(&self, question: &str) -> Result<Translation> {
        info!("translating question with Ollama");
        let raw = self.chat(SYSTEM_PROMPT, question).await?;
        Ok(parse_translation(&raw, self.name()))
    }

    async fn repair(
        &self,
        question: &str,
        invalid_query: &str,
        feedback: &RepairFeedback,
    ) -> Result<Translation> {
        info!("requesting query repair from Ollama");
        let prompt = repair_user_prompt(question, invalid_query, feedback);
        let raw = self.chat(REPAIR_SYSTEM_PROMPT, &prompt).await?;
        Ok(parse_translation(&raw, self.name()))
    }
}
