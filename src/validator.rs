//! Remote query validation
//!
//! The AQL service exposes validation through the query endpoint with a
//! `validate` option: a 200 response with `status == "OK"` means the query
//! parses; anything else carries a message and structured error detail.
//! Validation failures are data, never errors — only transport problems
//! surface as `Err`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{AssistantError, Result};

/// Structured error detail from the validator's error envelope.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorDetail {
    #[serde(default)]
    pub line: Option<u32>,
    #[serde(default)]
    pub column: Option<u32>,
    #[serde(default)]
    pub position: Option<u32>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, rename = "errorName")]
    pub error_name: Option<String>,
    #[serde(default)]
    pub expecting: Vec<String>,
}

/// Outcome of validating one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub message: Option<String>,
    pub detail: Option<ErrorDetail>,
}

impl ValidationOutcome {
    pub fn ok() -> Self {
        Self { valid: true, message: None, detail: None }
    }

    pub fn invalid(message: impl Into<String>, detail: Option<ErrorDetail>) -> Self {
        Self { valid: false, message: Some(message.into()), detail }
    }
}

/// Validation collaborator. The remote client implements this; tests
/// substitute fakes.
#[async_trait]
pub trait Validator: Send + Sync {
    async fn validate(&self, query: &str) -> Result<ValidationOutcome>;
}

/// HTTP client for the AQL service validation endpoint.
pub struct AqlValidatorClient {
    server: String,
    endpoint: String,
    username: String,
    password: String,
    client: reqwest::Client,
}

impl AqlValidatorClient {
    pub fn new(
        server: impl Into<String>,
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            server: server.into(),
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            client,
        }
    }

    fn url(&self) -> String {
        format!("http://{}{}", self.server, self.endpoint)
    }

    /// Probe the service with a trivial request.
    pub async fn test_connection(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url())
            .basic_auth(&self.username, Some(&self.password))
            .send()
            .await
            .map_err(|e| AssistantError::Transport(format!("connection test failed: {}", e)))?;
        info!("connection test returned HTTP {}", response.status());
        Ok(())
    }
}

#[async_trait]
impl Validator for AqlValidatorClient {
    async fn validate(&self, query: &str) -> Result<ValidationOutcome> {
        let options = json!({
            "format": "json",
            "stream": true,
            "validate": true,
        });

        debug!("validating query: {}", query);
        let response = self
            .client
            .get(self.url())
            .basic_auth(&self.username, Some(&self.password))
            .query(&[("select", query), ("options", &options.to_string())])
            .send()
            .await
            .map_err(|e| AssistantError::Transport(format!("validation request failed: {}", e)))?;

        let status = response.status();
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| AssistantError::Transport(format!("malformed validation response: {}", e)))?;

        let outcome = parse_validation_response(status.as_u16(), &body);
        if outcome.valid {
            info!("query validation successful");
        } else {
            warn!(
                "query validation failed: {}",
                outcome.message.as_deref().unwrap_or("unknown validation error")
            );
        }
        Ok(outcome)
    }
}

/// Turn the service's response envelope into a [`ValidationOutcome`].
pub fn parse_validation_response(http_status: u16, body: &serde_json::Value) -> ValidationOutcome {
    if http_status == 200 && body.get("status").and_then(|s| s.as_str()) == Some("OK") {
        return ValidationOutcome::ok();
    }

    let message = body
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown validation error")
        .to_string();

    let detail = body
        .get("error")
        .and_then(|e| e.get("params"))
        .and_then(|p| serde_json::from_value::<ErrorDetail>(p.clone()).ok());

    ValidationOutcome::invalid(message, detail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_response() {
        let body = json!({"status": "OK", "data": []});
        let outcome = parse_validation_response(200, &body);
        assert!(outcome.valid);
        assert!(outcome.message.is_none());
    }

    #[test]
    fn test_parse_invalid_response_with_detail() {
        let body = json!({
            "status": "error",
            "message": "Syntax error near 'YEAR'",
            "error": {
                "params": {
                    "line": 2,
                    "column": 8,
                    "token": "YEAR",
                    "errorName": "SyntaxError",
                    "expecting": ["identifier", "string"]
                }
            }
        });
        let outcome = parse_validation_response(200, &body);
        assert!(!outcome.valid);
        assert_eq!(outcome.message.as_deref(), Some("Syntax error near 'YEAR'"));
        let detail = outcome.detail.unwrap();
        assert_eq!(detail.line, Some(2));
        assert_eq!(detail.token.as_deref(), Some("YEAR"));
        assert_eq!(detail.expecting, vec!["identifier", "string"]);
    }

    #[test]
    fn test_parse_error_without_envelope() {
        let body = json!({"unexpected": true});
        let outcome = parse_validation_response(500, &body);
        assert!(!outcome.valid);
        assert_eq!(outcome.message.as_deref(), Some("Unknown validation error"));
        assert!(outcome.detail.is_none());
    }

    #[test]
    fn test_non_ok_status_with_http_200() {
        let body = json!({"status": "failed", "message": "boom"});
        let outcome = parse_validation_response(200, &body);
        assert!(!outcome.valid);
        assert_eq!(outcome.message.as_deref(), Some("boom"));
    }
}
