//! Usage metering: per-call usage rows, daily aggregate counters and
//! per-billing-period feature counters.
//!
//! Counters are updated with a single atomic upsert each, so concurrent
//! increments are never lost.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use sqlx::SqlitePool;

use crate::access::ActiveSubscription;
use crate::error::AppError;

/// One provider call, success or failure. Never mutated after insert.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageMetric {
    pub user_id: String,
    pub model_name: String,
    pub service_type: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub estimated_cost: f64,
    pub response_time_ms: u64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

/// Daily aggregate counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlobalMetric {
    CacheHits,
    CacheMisses,
    AiRequests,
    AiFailures,
    TokensUsed,
}

impl GlobalMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            GlobalMetric::CacheHits => "cache_hits",
            GlobalMetric::CacheMisses => "cache_misses",
            GlobalMetric::AiRequests => "ai_requests",
            GlobalMetric::AiFailures => "ai_failures",
            GlobalMetric::TokensUsed => "tokens_used",
        }
    }
}

/// Half-open billing window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BillingPeriod {
    /// Calendar month (UTC) containing `now`
    pub fn calendar_month(now: DateTime<Utc>) -> Self {
        let start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);
        let (next_year, next_month) = if now.month() == 12 {
            (now.year() + 1, 1)
        } else {
            (now.year(), now.month() + 1)
        };
        let end = Utc
            .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
            .single()
            .unwrap_or(now);

        Self { start, end }
    }

    /// The subscription's current period when it covers `now`, else the calendar month
    pub fn current(subscription: Option<&ActiveSubscription>, now: DateTime<Utc>) -> Self {
        if let Some(sub) = subscription {
            if let (Some(start), Some(end)) = (sub.current_period_start, sub.current_period_end) {
                if start <= now && now < end {
                    return Self { start, end };
                }
            }
        }
        Self::calendar_month(now)
    }
}

#[derive(Clone)]
pub struct UsageTracker {
    pool: SqlitePool,
}

impl UsageTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one usage row
    pub async fn record(&self, metric: &UsageMetric) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO usage_metrics (
                user_id, model_name, service_type, input_tokens, output_tokens,
                estimated_cost, response_time_ms, success, timestamp
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&metric.user_id)
        .bind(&metric.model_name)
        .bind(&metric.service_type)
        .bind(i64::from(metric.input_tokens))
        .bind(i64::from(metric.output_tokens))
        .bind(metric.estimated_cost)
        .bind(i64::try_from(metric.response_time_ms).unwrap_or(i64::MAX))
        .bind(metric.success as i64)
        .bind(metric.timestamp.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::MetricUpdate(format!("failed to record usage metric: {}", e)))?;

        Ok(())
    }

    /// Add `amount` to today's (UTC) counter, creating the row if needed
    pub async fn increment_global_metric(
        &self,
        metric: GlobalMetric,
        amount: f64,
    ) -> Result<f64, AppError> {
        self.increment_global_metric_at(metric, amount, Utc::now()).await
    }

    pub async fn increment_global_metric_at(
        &self,
        metric: GlobalMetric,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<f64, AppError> {
        let date = now.format("%Y-%m-%d").to_string();

        let (value,): (f64,) = sqlx::query_as(
            r#"
            INSERT INTO global_metrics (date, metric_type, value, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(date, metric_type) DO UPDATE SET
                value = value + excluded.value,
                updated_at = excluded.updated_at
            RETURNING value
            "#,
        )
        .bind(&date)
        .bind(metric.as_str())
        .bind(amount)
        .bind(now.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::MetricUpdate(format!("failed to increment {}: {}", metric.as_str(), e))
        })?;

        Ok(value)
    }

    /// Count one use of `feature` in the given billing period; returns the new count
    pub async fn increment_feature_usage(
        &self,
        user_id: &str,
        feature: &str,
        period: BillingPeriod,
    ) -> Result<i64, AppError> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO feature_usage (user_id, feature, period_start, period_end, count, updated_at)
            VALUES (?, ?, ?, ?, 1, ?)
            ON CONFLICT(user_id, feature, period_start) DO UPDATE SET
                count = count + 1,
                updated_at = excluded.updated_at
            RETURNING count
            "#,
        )
        .bind(user_id)
        .bind(feature)
        .bind(period.start.timestamp_millis())
        .bind(period.end.timestamp_millis())
        .bind(Utc::now().timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            AppError::MetricUpdate(format!("failed to increment feature usage: {}", e))
        })?;

        Ok(count)
    }
}
