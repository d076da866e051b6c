//! Deduplicated application error log.
//!
//! Failures are grouped by `(error_type, fingerprint)` where the fingerprint
//! is the message with its variable parts (timestamps, UUIDs, hex ids and long
//! digit runs) replaced by placeholders. Status codes, quoted values and JSON
//! bodies are kept so different failures stay apart. Only unresolved rows are
//! merged into.

use chrono::{DateTime, Utc};
use regex::Regex;
use sqlx::SqlitePool;
use std::sync::LazyLock;

use crate::error::AppError;

/// Longest message stored per row
const MAX_MESSAGE_CHARS: usize = 2000;

static ISO_TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?").unwrap()
});

static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}\b")
        .unwrap()
});

static HEX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b0x[0-9a-fA-F]+\b|\b[0-9a-fA-F]{12,}\b").unwrap());

// Short numbers (status codes, limits) carry meaning and are kept
static LONG_NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{4,}\b").unwrap());

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Stable grouping key for an error message
pub fn fingerprint(message: &str) -> String {
    let s = ISO_TIMESTAMP_RE.replace_all(message, "<ts>");
    let s = UUID_RE.replace_all(&s, "<uuid>");
    let s = HEX_RE.replace_all(&s, "<hex>");
    let s = LONG_NUMBER_RE.replace_all(&s, "<n>");
    let s = WHITESPACE_RE.replace_all(&s, " ");
    truncate_chars(s.trim(), MAX_MESSAGE_CHARS)
}

fn truncate_chars(value: &str, max: usize) -> String {
    match value.char_indices().nth(max) {
        Some((idx, _)) => value[..idx].to_string(),
        None => value.to_string(),
    }
}

/// One row of the error log
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ErrorLogEntry {
    pub id: i64,
    pub error_type: String,
    pub error_message: String,
    pub message_fingerprint: String,
    pub endpoint: String,
    pub first_occurrence: i64,
    pub last_occurrence: i64,
    pub frequency: i64,
    pub resolved: bool,
}

#[derive(Clone)]
pub struct ErrorLog {
    pool: SqlitePool,
}

impl ErrorLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Best-effort record; write failures are logged and dropped
    pub async fn record(&self, error_type: &str, message: &str, endpoint: &str) {
        if let Err(e) = self.try_record(error_type, message, endpoint).await {
            tracing::warn!(
                error_type = %error_type,
                endpoint = %endpoint,
                error = %e,
                "Failed to write error log entry"
            );
        }
    }

    /// Insert a new open entry or bump the frequency of the matching one
    pub async fn try_record(
        &self,
        error_type: &str,
        message: &str,
        endpoint: &str,
    ) -> Result<(), AppError> {
        self.try_record_at(error_type, message, endpoint, Utc::now())
            .await
    }

    pub async fn try_record_at(
        &self,
        error_type: &str,
        message: &str,
        endpoint: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let now_ms = now.timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO error_logs (
                error_type, error_message, message_fingerprint, endpoint,
                first_occurrence, last_occurrence, frequency, resolved
            )
            VALUES (?, ?, ?, ?, ?, ?, 1, 0)
            ON CONFLICT(error_type, message_fingerprint) WHERE resolved = 0 DO UPDATE SET
                frequency = frequency + 1,
                last_occurrence = excluded.last_occurrence,
                error_message = excluded.error_message,
                endpoint = excluded.endpoint
            "#,
        )
        .bind(error_type)
        .bind(truncate_chars(message, MAX_MESSAGE_CHARS))
        .bind(fingerprint(message))
        .bind(endpoint)
        .bind(now_ms)
        .bind(now_ms)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::ErrorLogWrite(e.to_string()))?;

        Ok(())
    }

    /// Unresolved entries, most recent first
    pub async fn open_entries(&self) -> Result<Vec<ErrorLogEntry>, AppError> {
        let entries = sqlx::query_as::<_, ErrorLogEntry>(
            r#"
            SELECT id, error_type, error_message, message_fingerprint, endpoint,
                   first_occurrence, last_occurrence, frequency, resolved
            FROM error_logs
            WHERE resolved = 0
            ORDER BY last_occurrence DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
