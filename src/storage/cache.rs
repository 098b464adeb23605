//! SQLite-backed cache for LLM responses
//!
//! Entries are keyed by operation, model and input. Expired entries are
//! evicted on read. Cache problems are logged and otherwise ignored, so a
//! broken cache only costs an extra LLM call.

use crate::error::Result;
use crate::storage::DbPool;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct LlmCache {
    pool: DbPool,
    ttl: Duration,
}

impl LlmCache {
    pub fn new(pool: DbPool, ttl: Duration) -> Self {
        Self { pool, ttl }
    }

    /// TTL in milliseconds, saturating for durations beyond `i64`
    fn ttl_ms(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }

    /// `operation:<32 hex chars of blake3(operation:model:input)>`
    pub fn key(operation: &str, model: &str, input: &str) -> String {
        let hash = blake3::hash(format!("{}:{}:{}", operation, model, input).as_bytes());
        format!("{}:{}", operation, &hash.to_hex()[..32])
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("LLM cache read failed: {}", e);
                None
            }
        }
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        if let Err(e) = self.try_put(key, value) {
            warn!("LLM cache write failed: {}", e);
        }
    }

    fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.pool.get()?;
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT result_json, created_at FROM llm_cache WHERE cache_key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((json, created_at)) = row else {
            return Ok(None);
        };

        let age_ms = Utc::now().timestamp_millis() - created_at;
        if age_ms > self.ttl_ms() {
            debug!("Evicting expired LLM cache entry {}", key);
            conn.execute("DELETE FROM llm_cache WHERE cache_key = ?1", params![key])?;
            return Ok(None);
        }

        // an undecodable entry is treated as a miss
        Ok(serde_json::from_str(&json).ok())
    }

    fn try_put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string(value).map_err(|e| crate::error::HubseekError::Json {
            source: e,
            context: "Failed to encode LLM cache entry".to_string(),
        })?;

        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR REPLACE INTO llm_cache (cache_key, result_json, created_at)
             VALUES (?1, ?2, ?3)",
            params![key, json, Utc::now().timestamp_millis()],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use tempfile::TempDir;

    fn cache(ttl: Duration) -> (TempDir, Database, LlmCache) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("index.db")).unwrap();
        let cache = db.llm_cache(ttl);
        (temp_dir, db, cache)
    }

    #[test]
    fn test_key_shape() {
        let key = LlmCache::key("expand", "gpt-4o-mini", "rotate tokens");
        assert!(key.starts_with("expand:"));
        assert_eq!(key.len(), "expand:".len() + 32);
        assert_ne!(key, LlmCache::key("expand", "other-model", "rotate tokens"));
    }

    #[test]
    fn test_put_then_get() {
        let (_dir, _db, cache) = cache(Duration::from_secs(60));
        let key = LlmCache::key("expand", "m", "q");

        cache.put(&key, &vec!["a".to_string(), "b".to_string()]);
        let hit: Option<Vec<String>> = cache.get(&key);

        assert_eq!(hit, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn test_huge_ttl_never_expires() {
        let (_dir, _db, cache) = cache(Duration::from_secs(u64::MAX));
        assert_eq!(cache.ttl_ms(), i64::MAX);

        let key = LlmCache::key("expand", "m", "q");
        cache.put(&key, &vec!["x".to_string()]);
        assert_eq!(cache.get::<Vec<String>>(&key), Some(vec!["x".to_string()]));
    }

    #[test]
    fn test_miss_and_expiry() {
        let (_dir, db, cache) = cache(Duration::from_secs(60));
        assert_eq!(cache.get::<Vec<String>>("expand:missing"), None);

        let key = LlmCache::key("rerank", "m", "q");
        cache.put(&key, &vec![1, 2, 3]);

        // backdate the entry past the TTL
        db.get_conn()
            .unwrap()
            .execute(
                "UPDATE llm_cache SET created_at = created_at - 120000 WHERE cache_key = ?1",
                params![key],
            )
            .unwrap();

        assert_eq!(cache.get::<Vec<i32>>(&key), None);
        assert_eq!(db.stats().unwrap().cached_llm_responses, 0);
    }
}
