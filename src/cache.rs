//! Content-addressed analysis cache with wall-clock TTL.
//!
//! Keys are `<namespace>_<sha256 hex>` over the normalized inputs joined with
//! [`KEY_SEPARATOR`]. Changing the separator, the normalization or the input
//! order invalidates every existing entry.

use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::error::AppError;

/// ASCII unit separator; never produced by normal text input
pub const KEY_SEPARATOR: &str = "\u{1f}";

/// One stored cache row
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a cache read
#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Hit(CacheEntry),
    Miss,
}

impl CacheLookup {
    pub fn is_hit(&self) -> bool {
        matches!(self, CacheLookup::Hit(_))
    }
}

/// Normalize one input before hashing (trim, unify line endings).
///
/// Backslashes and separators inside the input are escaped so distinct input
/// lists can never join to the same string.
fn normalize_input(input: &str) -> String {
    input
        .replace("\r\n", "\n")
        .trim()
        .replace('\\', "\\\\")
        .replace(KEY_SEPARATOR, "\\u001f")
}

/// Deterministic cache key for an ordered list of inputs
pub fn compute_key(namespace: &str, inputs: &[&str]) -> String {
    let joined = inputs
        .iter()
        .map(|input| normalize_input(input))
        .collect::<Vec<_>>()
        .join(KEY_SEPARATOR);

    let digest = Sha256::digest(joined.as_bytes());
    format!("{}_{:x}", namespace, digest)
}

#[derive(Clone)]
pub struct CacheStore {
    pool: SqlitePool,
    namespace: String,
    ttl: Duration,
}

impl CacheStore {
    pub fn new(pool: SqlitePool, namespace: impl Into<String>, ttl_seconds: u64) -> Self {
        Self {
            pool,
            namespace: namespace.into(),
            ttl: Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX / 1000)),
        }
    }

    /// Key for this store's namespace
    pub fn compute_key(&self, inputs: &[&str]) -> String {
        compute_key(&self.namespace, inputs)
    }

    /// Read an entry; entries aged `ttl` or more are misses (rows are never deleted here)
    pub async fn get(&self, key: &str) -> Result<CacheLookup, AppError> {
        self.get_at(key, Utc::now()).await
    }

    /// [`CacheStore::get`] evaluated at an explicit wall-clock time
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Result<CacheLookup, AppError> {
        let row = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT value, created_at
            FROM analysis_cache
            WHERE key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Cache(format!("cache read failed: {}", e)))?;

        let Some((raw_value, created_at_ms)) = row else {
            return Ok(CacheLookup::Miss);
        };

        let created_at = DateTime::<Utc>::from_timestamp_millis(created_at_ms).ok_or_else(|| {
            AppError::Cache(format!("invalid created_at {} for key {}", created_at_ms, key))
        })?;

        if now - created_at >= self.ttl {
            tracing::debug!(key = %key, "Cache entry expired");
            return Ok(CacheLookup::Miss);
        }

        let value = serde_json::from_str(&raw_value)
            .map_err(|e| AppError::Cache(format!("corrupt cache value for key {}: {}", key, e)))?;

        Ok(CacheLookup::Hit(CacheEntry {
            key: key.to_string(),
            value,
            created_at,
        }))
    }

    /// Upsert by key, resetting `created_at` to now. Last writer wins.
    pub async fn put(&self, key: &str, value: &serde_json::Value) -> Result<(), AppError> {
        self.put_at(key, value, Utc::now()).await
    }

    /// [`CacheStore::put`] with an explicit creation time
    pub async fn put_at(
        &self,
        key: &str,
        value: &serde_json::Value,
        created_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let raw_value = serde_json::to_string(value)
            .map_err(|e| AppError::Cache(format!("failed to serialize cache value: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO analysis_cache (key, value, created_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                created_at = excluded.created_at
            "#,
        )
        .bind(key)
        .bind(raw_value)
        .bind(created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Cache(format!("cache write failed: {}", e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    async fn create_store() -> CacheStore {
        let pool = crate::db::connect_in_memory().await.unwrap();
        CacheStore::new(pool, "funnel_analysis", 24 * 60 * 60)
    }

    #[test]
    fn test_compute_key_is_deterministic() {
        let a = compute_key("funnel_analysis", &["Anúncio A", "Página B"]);
        let b = compute_key("funnel_analysis", &["Anúncio A", "Página B"]);
        assert_eq!(a, b);
        assert!(a.starts_with("funnel_analysis_"));
        // prefix + '_' + 64 hex chars
        assert_eq!(a.len(), "funnel_analysis_".len() + 64);
        assert!(a["funnel_analysis_".len()..]
            .chars()
            .all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_compute_key_differs_for_different_pairs() {
        let fixtures: &[(&str, &str)] = &[
            ("Anúncio A", "Página B"),
            ("Página B", "Anúncio A"),
            ("a|b", "c"),
            ("a", "b|c"),
            ("ab", "c"),
            ("a", "bc"),
            ("", "abc"),
            ("abc", ""),
            ("ad\u{1f}shared", "page"),
            ("ad", "shared\u{1f}page"),
            ("ad\\u001fshared", "page"),
            ("ad\\", "\u{1f}page"),
        ];

        let keys: HashSet<String> = fixtures
            .iter()
            .map(|(ad, page)| compute_key("funnel_analysis", &[ad, page]))
            .collect();
        assert_eq!(keys.len(), fixtures.len());
    }

    #[test]
    fn test_compute_key_many_generated_pairs() {
        let mut keys = HashSet::new();
        let mut seed: u64 = 0x9E37_79B9_7F4A_7C15;
        let mut next = || {
            // xorshift64
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        let mut pairs = HashSet::new();
        for _ in 0..500 {
            let ad = format!("ad {}", next() % 100_000);
            let page = format!("page {}", next() % 100_000);
            if pairs.insert((ad.clone(), page.clone())) {
                let key = compute_key("funnel_analysis", &[&ad, &page]);
                assert_eq!(key, compute_key("funnel_analysis", &[&ad, &page]));
                keys.insert(key);
            }
        }
        assert_eq!(keys.len(), pairs.len());
    }

    #[test]
    fn test_compute_key_normalizes_whitespace() {
        assert_eq!(
            compute_key("ns", &["  hello\r\nworld  ", "page"]),
            compute_key("ns", &["hello\nworld", "page"])
        );
    }

    #[test]
    fn test_compute_key_uses_namespace() {
        assert_ne!(
            compute_key("funnel_analysis", &["a", "b"]),
            compute_key("other_feature", &["a", "b"])
        );
    }

    #[tokio::test]
    async fn test_get_missing_key_is_miss() {
        let store = create_store().await;
        assert_eq!(store.get("funnel_analysis_nope").await.unwrap(), CacheLookup::Miss);
    }

    #[tokio::test]
    async fn test_ttl_boundaries() {
        let store = create_store().await;
        let written_at = Utc::now() - Duration::days(3);
        let value = json!({"funnelCoherenceScore": 7});

        store.put_at("k", &value, written_at).await.unwrap();

        let at = |offset: Duration| store.get_at("k", written_at + offset);

        assert!(at(Duration::zero()).await.unwrap().is_hit());
        assert!(at(Duration::hours(24) - Duration::seconds(1))
            .await
            .unwrap()
            .is_hit());
        assert_eq!(at(Duration::hours(24)).await.unwrap(), CacheLookup::Miss);
        assert_eq!(
            at(Duration::hours(24) + Duration::seconds(1)).await.unwrap(),
            CacheLookup::Miss
        );
    }

    #[tokio::test]
    async fn test_expired_rows_are_not_deleted() {
        let store = create_store().await;
        let written_at = Utc::now() - Duration::days(2);
        store.put_at("k", &json!({"v": 1}), written_at).await.unwrap();

        assert_eq!(store.get("k").await.unwrap(), CacheLookup::Miss);

        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM analysis_cache WHERE key = 'k'")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_put_overwrites_and_refreshes_created_at() {
        let store = create_store().await;
        let old = Utc::now() - Duration::days(2);
        store.put_at("k", &json!({"v": 1}), old).await.unwrap();

        store.put("k", &json!({"v": 2})).await.unwrap();

        match store.get("k").await.unwrap() {
            CacheLookup::Hit(entry) => {
                assert_eq!(entry.value, json!({"v": 2}));
                assert!(entry.created_at > old);
            }
            CacheLookup::Miss => panic!("expected a hit after overwrite"),
        }
    }

    #[tokio::test]
    async fn test_concurrent_puts_leave_one_row() {
        let store = create_store().await;

        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.put("same", &json!({"writer": i})).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM analysis_cache WHERE key = 'same'")
                .fetch_one(&store.pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
        assert!(store.get("same").await.unwrap().is_hit());
    }

    #[tokio::test]
    async fn test_corrupt_value_is_cache_error() {
        let store = create_store().await;
        sqlx::query("INSERT INTO analysis_cache (key, value, created_at) VALUES ('bad', 'not json', ?)")
            .bind(Utc::now().timestamp_millis())
            .execute(&store.pool)
            .await
            .unwrap();

        let result = store.get("bad").await;
        assert!(matches!(result, Err(AppError::Cache(_))));
    }
}
