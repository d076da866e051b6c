//! Provider connection registry backed by the `ai_providers` table.

use sqlx::SqlitePool;
use std::fmt;
use std::time::Duration;

use crate::error::AppError;
use crate::logging::SensitiveApiKey;

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI chat completions (also OpenAI-compatible services)
    OpenAI,
    /// Anthropic messages
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "openai" => Some(ProviderKind::OpenAI),
            "anthropic" => Some(ProviderKind::Anthropic),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved connection details for one provider
#[derive(Clone)]
pub struct ProviderConnection {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    pub api_key: String,
    pub api_version: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConnection")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("api_key", &SensitiveApiKey::new(&self.api_key))
            .field("api_version", &self.api_version)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(sqlx::FromRow)]
struct ProviderRow {
    name: String,
    kind: String,
    base_url: String,
    api_key: Option<String>,
    api_version: Option<String>,
    timeout_seconds: Option<i64>,
    is_active: i64,
}

#[derive(Clone)]
pub struct ProviderRegistry {
    pool: SqlitePool,
    default_timeout: Duration,
}

impl ProviderRegistry {
    pub fn new(pool: SqlitePool, default_timeout: Duration) -> Self {
        Self {
            pool,
            default_timeout,
        }
    }

    /// Connection for `name`; missing, inactive or keyless providers are not configured
    pub async fn lookup(&self, name: &str) -> Result<ProviderConnection, AppError> {
        let row = sqlx::query_as::<_, ProviderRow>(
            r#"
            SELECT name, kind, base_url, api_key, api_version, timeout_seconds, is_active
            FROM ai_providers
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::ProviderNotConfigured(format!("provider '{}' not found", name)))?;

        if row.is_active == 0 {
            return Err(AppError::ProviderNotConfigured(format!(
                "provider '{}' is inactive",
                name
            )));
        }

        let api_key = row
            .api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                AppError::ProviderNotConfigured(format!("provider '{}' has no API key", name))
            })?;

        let kind = ProviderKind::parse(&row.kind).ok_or_else(|| {
            AppError::ProviderNotConfigured(format!(
                "provider '{}' has unsupported kind '{}'",
                name, row.kind
            ))
        })?;

        let timeout = row
            .timeout_seconds
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64))
            .unwrap_or(self.default_timeout);

        Ok(ProviderConnection {
            name: row.name,
            kind,
            base_url: row.base_url.trim_end_matches('/').to_string(),
            api_key,
            api_version: row.api_version,
            timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn insert_provider(
        pool: &SqlitePool,
        name: &str,
        api_key: Option<&str>,
        timeout: Option<i64>,
        active: bool,
    ) {
        sqlx::query(
            r#"
            INSERT INTO ai_providers (name, kind, base_url, api_key, timeout_seconds, is_active)
            VALUES (?, 'openai', 'https://api.openai.com/v1/', ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(api_key)
        .bind(timeout)
        .bind(active as i64)
        .execute(pool)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_lookup_active_provider() {
        let pool = crate::db::connect_in_memory().await.unwrap();
        insert_provider(&pool, "openai", Some("sk-test-key-12345"), Some(15), true).await;

        let registry = ProviderRegistry::new(pool, Duration::from_secs(60));
        let conn = registry.lookup("openai").await.unwrap();

        assert_eq!(conn.kind, ProviderKind::OpenAI);
        assert_eq!(conn.base_url, "https://api.openai.com/v1");
        assert_eq!(conn.timeout, Duration::from_secs(15));

        // Debug output never shows the full key
        let debug = format!("{:?}", conn);
        assert!(!debug.contains("sk-test-key-12345"));
    }

    #[tokio::test]
    async fn test_default_timeout_applies() {
        let pool = crate::db::connect_in_memory().await.unwrap();
        insert_provider(&pool, "openai", Some("sk-test"), None, true).await;

        let registry = ProviderRegistry::new(pool, Duration::from_secs(42));
        assert_eq!(
            registry.lookup("openai").await.unwrap().timeout,
            Duration::from_secs(42)
        );
    }

    #[tokio::test]
    async fn test_unusable_providers_are_not_configured() {
        let pool = crate::db::connect_in_memory().await.unwrap();
        insert_provider(&pool, "inactive", Some("sk-test"), None, false).await;
        insert_provider(&pool, "keyless", None, None, true).await;
        insert_provider(&pool, "blank", Some("   "), None, true).await;

        let registry = ProviderRegistry::new(pool, Duration::from_secs(60));
        for name in ["inactive", "keyless", "blank", "missing"] {
            assert!(
                matches!(
                    registry.lookup(name).await,
                    Err(AppError::ProviderNotConfigured(_))
                ),
                "{name} should not be configured"
            );
        }
    }
}
