//! Translation cache
//!
//! SQLite-backed pass-through cache for first translations. Repaired
//! candidates are never cached: they are shaped by per-session error
//! feedback that does not transfer to other questions. Expiry is lazy:
//! expired rows are treated as misses and deleted at lookup time.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::error::{AssistantError, Result};
use crate::translator::Translation;

pub struct TranslationCache {
    db: Mutex<Connection>,
}

impl TranslationCache {
    /// Open (or create) a cache database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Connection::open(path)
            .map_err(|e| AssistantError::Cache(format!("failed to open cache database: {}", e)))?;
        let cache = Self { db: Mutex::new(db) };
        cache.init_schema()?;
        Ok(cache)
    }

    /// In-memory cache, used by tests and when no cache path is configured.
    pub fn in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()
            .map_err(|e| AssistantError::Cache(format!("failed to open cache database: {}", e)))?;
        let cache = Self { db: Mutex::new(db) };
        cache.init_schema()?;
        Ok(cache)
    }

    fn init_schema(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            r#"
            CREATE TABLE IF NOT EXISTS translation_cache (
                cache_key TEXT PRIMARY KEY,
                question TEXT NOT NULL,
                query_text TEXT NOT NULL,
                explanation TEXT NOT NULL,
                understanding TEXT NOT NULL,
                provider TEXT NOT NULL,
                inserted_at INTEGER NOT NULL,
                ttl_secs INTEGER NOT NULL
            )
            "#,
            [],
        )
        .map_err(|e| AssistantError::Cache(format!("failed to create cache table: {}", e)))?;
        Ok(())
    }

    /// Look up a cached translation. Expired entries are evicted and
    /// reported as misses.
    pub fn lookup(&self, key: &str) -> Option<Translation> {
        let db = self.db.lock().unwrap();
        let row = db
            .query_row(
                "SELECT question, query_text, explanation, understanding, provider, inserted_at, ttl_secs
                 FROM translation_cache WHERE cache_key = ?1",
                params![key],
                |row| {
                    Ok((
                        Translation {
                            query: row.get::<_, String>(1)?,
                            explanation: row.get::<_, String>(2)?,
                            understanding: row.get::<_, String>(3)?,
                            provider: row.get::<_, String>(4)?,
                        },
                        row.get::<_, i64>(5)?,
                        row.get::<_, i64>(6)?,
                    ))
                },
            );

        match row {
            Ok((translation, inserted_at, ttl_secs)) => {
                let age = Utc::now().timestamp() - inserted_at;
                if age > ttl_secs {
                    debug!("cache entry expired (age {}s, ttl {}s), evicting", age, ttl_secs);
                    let _ = db.execute(
                        "DELETE FROM translation_cache WHERE cache_key = ?1",
                        params![key],
                    );
                    None
                } else {
                    info!("translation cache hit");
                    Some(translation)
                }
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => {
                debug!("cache lookup failed: {}", e);
                None
            }
        }
    }

    /// Store a translation under `key` with the given TTL. Last write wins
    /// on concurrent misses for the same key.
    pub fn store(&self, key: &str, question: &str, translation: &Translation, ttl_secs: u64) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            r#"
            INSERT OR REPLACE INTO translation_cache
            (cache_key, question, query_text, explanation, understanding, provider, inserted_at, ttl_secs)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                key,
                question,
                translation.query,
                translation.explanation,
                translation.understanding,
                translation.provider,
                Utc::now().timestamp(),
                ttl_secs as i64,
            ],
        )
        .map_err(|e| AssistantError::Cache(format!("failed to store translation: {}", e)))?;
        Ok(())
    }
}

/// Stable cache key for a (provider, model, question) triple. The question
/// is normalized so trivially re-worded whitespace and casing share a key.
pub fn cache_key(provider: &str, model: &str, question: &str) -> String {
    let normalized = question.trim().to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
    let mut hasher = Sha256::new();
    hasher.update(provider.as_bytes());
    hasher.update(b"\n");
    hasher.update(model.as_bytes());
    hasher.update(b"\n");
    hasher.update(normalized.as_bytes());
    format!("{}_{}_{:x}", provider, model, hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Translation {
        Translation {
            query: "SELECT name".to_string(),
            explanation: "lists file names".to_string(),
            understanding: "user wants file names".to_string(),
            provider: "openai".to_string(),
        }
    }

    #[test]
    fn test_store_then_lookup() {
        let cache = TranslationCache::in_memory().unwrap();
        let key = cache_key("openai", "gpt-4", "show me all files");
        cache.store(&key, "show me all files", &sample(), 3600).unwrap();

        let hit = cache.lookup(&key).expect("expected cache hit");
        assert_eq!(hit.query, "SELECT name");
        assert_eq!(hit.provider, "openai");
    }

    #[test]
    fn test_miss_for_unknown_key() {
        let cache = TranslationCache::in_memory().unwrap();
        assert!(cache.lookup("nope").is_none());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = TranslationCache::in_memory().unwrap();
        let key = cache_key("openai", "gpt-4", "old question");
        cache.store(&key, "old question", &sample(), 0).unwrap();

        // Age is computed in whole seconds; backdate the row instead of sleeping.
        {
            let db = cache.db.lock().unwrap();
            db.execute(
                "UPDATE translation_cache SET inserted_at = inserted_at - 10",
                [],
            )
            .unwrap();
        }

        assert!(cache.lookup(&key).is_none());
        // Eviction happened, still a miss afterwards.
        assert!(cache.lookup(&key).is_none());
    }

    #[test]
    fn test_key_normalizes_question_text() {
        let a = cache_key("openai", "gpt-4", "  Show me ALL files ");
        let b = cache_key("openai", "gpt-4", "show me all files");
        assert_eq!(a, b);
    }

    #[test]
    fn test_key_varies_by_provider_and_model() {
        let q = "show me all files";
        assert_ne!(cache_key("openai", "gpt-4", q), cache_key("claude", "gpt-4", q));
        assert_ne!(cache_key("openai", "gpt-4", q), cache_key("openai", "gpt-3.5", q));
    }

    #[test]
    fn test_store_overwrites_existing_key() {
        let cache = TranslationCache::in_memory().unwrap();
        let key = cache_key("openai", "gpt-4", "q");
        cache.store(&key, "q", &sample(), 3600).unwrap();

        let mut updated = sample();
        updated.query = "SELECT size".to_string();
        cache.store(&key, "q", &updated, 3600).unwrap();

        assert_eq!(cache.lookup(&key).unwrap().query, "SELECT size");
    }
}
