//! Translation-validation-repair pipeline
//!
//! A bounded-retry state machine. A freshly translated query that fails
//! validation enters a repair session: rule-based rewriting is tried once,
//! then the translator's repair capability takes over, fed with the full
//! history of prior attempts so it does not repeat a failed fix. The loop
//! terminates on success, on exhausting the attempt budget, or when the
//! translator stalls by returning its input unchanged.
//!
//! Expected failure modes (no provider, exhaustion, stall) are never raised
//! across this module's boundary; they are encoded in the returned
//! [`RepairSession`] status and message.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cache::{cache_key, TranslationCache};
use crate::config::Settings;
use crate::error::Result;
use crate::preprocess;
use crate::rewrite;
use crate::translator::{Translation, Translator};
use crate::validator::{ErrorDetail, ValidationOutcome, Validator};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Valid,
    Fixing,
    Failed,
}

/// One recorded repair attempt. Immutable once recorded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepairAttempt {
    /// 1-based position in the session's feedback history.
    pub index: usize,
    pub candidate: String,
    pub explanation: String,
    pub outcome: ValidationOutcome,
}

/// Error feedback handed to the translator's repair capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairFeedback {
    pub error: String,
    pub detail: Option<ErrorDetail>,
    pub previous_attempts: Vec<RepairAttempt>,
}

/// Snapshot of one translate-validate-repair cycle, returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepairSession {
    pub question: String,
    pub original_query: String,
    pub current_query: String,
    pub status: SessionStatus,
    pub attempts: Vec<RepairAttempt>,
    pub max_attempts: usize,
    /// Human-readable message for the last outcome.
    pub message: String,
    /// Derived progress hint for UI consumption; monotonically
    /// non-decreasing and never consulted by control flow.
    pub progress: u8,
}

impl RepairSession {
    fn new(question: &str, query: &str, max_attempts: usize, message: String) -> Self {
        Self {
            question: question.to_string(),
            original_query: query.to_string(),
            current_query: query.to_string(),
            status: SessionStatus::Fixing,
            attempts: Vec::new(),
            max_attempts,
            message,
            progress: 60,
        }
    }

    /// Session for a query that was valid without any repair.
    fn valid_first_try(question: &str, query: &str, max_attempts: usize) -> Self {
        Self {
            question: question.to_string(),
            original_query: query.to_string(),
            current_query: query.to_string(),
            status: SessionStatus::Valid,
            attempts: Vec::new(),
            max_attempts,
            message: "Query validated successfully".to_string(),
            progress: 75,
        }
    }

    /// Session for a question that never reached the repair loop because no
    /// translator is configured.
    fn unavailable(question: &str, max_attempts: usize) -> Self {
        Self {
            question: question.to_string(),
            original_query: String::new(),
            current_query: String::new(),
            status: SessionStatus::Failed,
            attempts: Vec::new(),
            max_attempts,
            message: "No LLM provider is configured. Add an API key or set up Ollama.".to_string(),
            progress: 0,
        }
    }

    fn record(&mut self, candidate: String, explanation: String, outcome: ValidationOutcome) {
        let index = self.attempts.len() + 1;
        self.current_query = candidate.clone();
        self.attempts.push(RepairAttempt { index, candidate, explanation, outcome });
        self.bump_progress(60 + (3 * self.attempts.len() as u8).min(27));
    }

    fn bump_progress(&mut self, value: u8) {
        if value > self.progress {
            self.progress = value;
        }
    }

    fn finish(&mut self, status: SessionStatus, message: String) {
        self.status = status;
        self.message = message;
        if status == SessionStatus::Valid {
            self.bump_progress(90);
        }
    }
}

/// Result of a full question-to-validated-query run.
#[derive(Debug, Clone)]
pub struct AnswerResult {
    pub question: String,
    pub translation: Option<Translation>,
    pub session: RepairSession,
    pub cache_hit: bool,
    /// Preprocessor warnings (unresolved template variables).
    pub warnings: Vec<String>,
}

/// Orchestrates translator, validator, preprocessor, rewriter and cache.
/// Collaborators are passed in explicitly; sessions are strictly sequential
/// and never shared.
pub struct QueryPipeline {
    translator: Option<Arc<dyn Translator>>,
    validator: Arc<dyn Validator>,
    cache: Option<Arc<TranslationCache>>,
    max_attempts: usize,
    row_limit: u64,
    cache_ttl_secs: u64,
}

impl QueryPipeline {
    pub fn new(
        translator: Option<Arc<dyn Translator>>,
        validator: Arc<dyn Validator>,
        settings: &Settings,
    ) -> Self {
        Self {
            translator,
            validator,
            cache: None,
            max_attempts: settings.max_attempts,
            row_limit: settings.row_limit,
            cache_ttl_secs: settings.cache_ttl_secs,
        }
    }

    pub fn with_cache(mut self, cache: Arc<TranslationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Translate `question`, validate the result, and repair it if needed.
    ///
    /// Transport failures on the initial translate or validate call are
    /// hard errors; inside the repair loop they are converted to ordinary
    /// invalid outcomes.
    pub async fn answer(&self, question: &str) -> Result<AnswerResult> {
        let Some(translator) = self.translator.clone() else {
            warn!("no translator available, not entering the repair loop");
            return Ok(AnswerResult {
                question: question.to_string(),
                translation: None,
                session: RepairSession::unavailable(question, self.max_attempts),
                cache_hit: false,
                warnings: Vec::new(),
            });
        };

        let key = cache_key(translator.name(), translator.model(), question);
        let mut cache_hit = false;
        let translation = match self.cache.as_ref().and_then(|c| c.lookup(&key)) {
            Some(hit) => {
                cache_hit = true;
                hit
            }
            None => {
                let translation = translator.translate(question).await?;
                if let Some(cache) = &self.cache {
                    if let Err(e) = cache.store(&key, question, &translation, self.cache_ttl_secs) {
                        warn!("failed to cache translation: {}", e);
                    }
                }
                translation
            }
        };

        let sanitized = preprocess::sanitize(&translation.query);
        let prepared = preprocess::preprocess(
            &sanitized,
            chrono::Local::now().date_naive(),
            self.row_limit,
        );

        let first = self.validator.validate(&prepared.query).await?;
        let session = if first.valid {
            info!("query validated successfully on first attempt");
            RepairSession::valid_first_try(question, &prepared.query, self.max_attempts)
        } else {
            self.run_session(question, &prepared.query, first).await
        };

        Ok(AnswerResult {
            question: question.to_string(),
            translation: Some(translation),
            session,
            cache_hit,
            warnings: prepared.warnings,
        })
    }

    /// Run the repair loop for a query that already failed validation once.
    ///
    /// `max_attempts == 0` is a caller bug, not an expected failure mode.
    pub async fn run_session(
        &self,
        question: &str,
        original_query: &str,
        first_outcome: ValidationOutcome,
    ) -> RepairSession {
        assert!(self.max_attempts > 0, "max_attempts must be positive");

        let first_message = first_outcome
            .message
            .clone()
            .unwrap_or_else(|| "Unknown validation error".to_string());
        let mut session =
            RepairSession::new(question, original_query, self.max_attempts, first_message);

        let Some(translator) = self.translator.clone() else {
            session.finish(
                SessionStatus::Failed,
                "No LLM provider is configured. Add an API key or set up Ollama.".to_string(),
            );
            return session;
        };

        let mut last_outcome = first_outcome;
        let mut rule_repair_tried = false;

        loop {
            if session.attempts.len() >= session.max_attempts {
                session.finish(
                    SessionStatus::Failed,
                    format!(
                        "Repair attempts exhausted after {} tries: {}",
                        session.max_attempts,
                        last_outcome.message.as_deref().unwrap_or("unknown validation error"),
                    ),
                );
                break;
            }

            // Deterministic rewriting gets one shot per session; after that
            // every remaining iteration goes to the model.
            if !rule_repair_tried {
                rule_repair_tried = true;
                let rewritten = rewrite::rewrite(&session.current_query);
                if rewritten.query != session.current_query {
                    info!("applying rule-based fix: {}", rewritten.changes.join("; "));
                    let outcome = self.validate_softly(&rewritten.query).await;
                    let explanation = format!("rule-based fix: {}", rewritten.changes.join("; "));
                    session.record(rewritten.query, explanation, outcome.clone());
                    if outcome.valid {
                        session.finish(
                            SessionStatus::Valid,
                            "Query fixed and validated successfully".to_string(),
                        );
                        break;
                    }
                    last_outcome = outcome;
                    if session.attempts.len() >= session.max_attempts {
                        continue;
                    }
                }
            }

            let feedback = RepairFeedback {
                error: last_outcome
                    .message
                    .clone()
                    .unwrap_or_else(|| "Unknown validation error".to_string()),
                detail: last_outcome.detail.clone(),
                previous_attempts: session.attempts.clone(),
            };

            info!(
                "repair attempt {} of {}: asking {} to fix the query",
                session.attempts.len() + 1,
                session.max_attempts,
                translator.name(),
            );

            match translator.repair(question, &session.current_query, &feedback).await {
                Err(e) => {
                    // A transport hiccup consumes one attempt slot rather
                    // than the whole budget or the whole session.
                    warn!("repair call failed, recording as invalid outcome: {}", e);
                    let outcome =
                        ValidationOutcome::invalid(format!("repair call failed: {}", e), None);
                    session.record(
                        session.current_query.clone(),
                        "repair call failed".to_string(),
                        outcome.clone(),
                    );
                    last_outcome = outcome;
                }
                Ok(repaired) => {
                    if repaired.query == session.current_query {
                        warn!("translator returned the query unchanged, giving up");
                        session.finish(
                            SessionStatus::Failed,
                            "Repair stalled: the model returned the query unchanged".to_string(),
                        );
                        break;
                    }

                    let outcome = self.validate_softly(&repaired.query).await;
                    session.record(repaired.query, repaired.explanation, outcome.clone());
                    if outcome.valid {
                        info!(
                            "query validated successfully after {} repair attempt(s)",
                            session.attempts.len(),
                        );
                        session.finish(
                            SessionStatus::Valid,
                            "Query fixed and validated successfully".to_string(),
                        );
                        break;
                    }
                    last_outcome = outcome;
                }
            }
        }

        session
    }

    /// Validate inside the repair loop: date tokens the model may have
    /// reintroduced are resolved first, and transport errors become
    /// ordinary invalid outcomes so one hiccup costs one attempt.
    async fn validate_softly(&self, query: &str) -> ValidationOutcome {
        let (resolved, _) =
            preprocess::substitute_dates(query, chrono::Local::now().date_naive());
        match self.validator.validate(&resolved).await {
            Ok(outcome) => outcome,
            Err(e) => ValidationOutcome::invalid(format!("{}", e), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_current_query_in_sync() {
        let mut session = RepairSession::new("q", "SELECT 1", 5, "err".to_string());
        assert_eq!(session.current_query, "SELECT 1");

        session.record(
            "SELECT 2".to_string(),
            "fix".to_string(),
            ValidationOutcome::invalid("still bad", None),
        );
        assert_eq!(session.current_query, "SELECT 2");
        assert_eq!(session.attempts.last().unwrap().index, 1);
        assert_eq!(session.attempts.last().unwrap().candidate, "SELECT 2");
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut session = RepairSession::new("q", "SELECT 1", 5, "err".to_string());
        let mut seen = vec![session.progress];
        for i in 0..5 {
            session.record(
                format!("SELECT {}", i + 2),
                "fix".to_string(),
                ValidationOutcome::invalid("bad", None),
            );
            seen.push(session.progress);
        }
        session.bump_progress(10); // stale lower value must not win
        seen.push(session.progress);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_valid_first_try_has_no_attempts() {
        let session = RepairSession::valid_first_try("q", "SELECT 1 LIMIT 25000", 5);
        assert_eq!(session.status, SessionStatus::Valid);
        assert!(session.attempts.is_empty());
        assert_eq!(session.current_query, session.original_query);
    }
}
