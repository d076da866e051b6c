//! Subscription-plan entitlement checks.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;

use crate::error::AppError;

/// Subscription statuses that grant access
const ACTIVE_STATUSES: &[&str] = &["active", "trialing"];

/// The caller's active subscription and its plan
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveSubscription {
    pub user_id: String,
    pub plan_name: String,
    pub features: HashMap<String, bool>,
    pub is_premium: bool,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

impl ActiveSubscription {
    /// Explicitly enabled in the feature map, or the plan is a premium tier
    pub fn entitles(&self, feature: &str) -> bool {
        self.is_premium || self.features.get(feature).copied().unwrap_or(false)
    }
}

/// Result of an access check
#[derive(Debug, Clone, PartialEq)]
pub struct AccessDecision {
    pub allowed: bool,
    pub subscription: Option<ActiveSubscription>,
}

impl AccessDecision {
    pub fn plan_name(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.plan_name.as_str())
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    plan_name: String,
    features: String,
    is_premium: i64,
    current_period_start: Option<i64>,
    current_period_end: Option<i64>,
}

/// Read-only entitlement gate
#[derive(Clone)]
pub struct FeatureAccessGate {
    pool: SqlitePool,
}

impl FeatureAccessGate {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `true` only when the user's active plan enables `feature` or is premium
    pub async fn can_use(&self, user_id: &str, feature: &str) -> Result<bool, AppError> {
        Ok(self.check(user_id, feature).await?.allowed)
    }

    /// Like [`FeatureAccessGate::can_use`], also returning the subscription it was decided on
    pub async fn check(&self, user_id: &str, feature: &str) -> Result<AccessDecision, AppError> {
        let subscription = self.active_subscription(user_id).await?;
        let allowed = subscription
            .as_ref()
            .map(|s| s.entitles(feature))
            .unwrap_or(false);

        tracing::debug!(
            user_id = %user_id,
            feature = %feature,
            plan = subscription.as_ref().map(|s| s.plan_name.as_str()).unwrap_or("none"),
            allowed,
            "Feature access checked"
        );

        Ok(AccessDecision {
            allowed,
            subscription,
        })
    }

    /// Most recent active subscription for the user, if any
    pub async fn active_subscription(
        &self,
        user_id: &str,
    ) -> Result<Option<ActiveSubscription>, AppError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT s.plan_name, p.features, p.is_premium,
                   s.current_period_start, s.current_period_end
            FROM subscriptions s
            JOIN plans p ON p.name = s.plan_name
            WHERE s.user_id = ?
              AND s.status IN (?, ?)
            ORDER BY s.created_at DESC, s.id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(ACTIVE_STATUSES[0])
        .bind(ACTIVE_STATUSES[1])
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(ActiveSubscription {
            user_id: user_id.to_string(),
            features: parse_feature_map(&row.plan_name, &row.features),
            plan_name: row.plan_name,
            is_premium: row.is_premium != 0,
            current_period_start: row
                .current_period_start
                .and_then(DateTime::<Utc>::from_timestamp_millis),
            current_period_end: row
                .current_period_end
                .and_then(DateTime::<Utc>::from_timestamp_millis),
        }))
    }
}

/// Parse a plan's feature JSON; non-boolean values count as disabled
fn parse_feature_map(plan_name: &str, raw: &str) -> HashMap<String, bool> {
    match serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(raw) {
        Ok(map) => map
            .into_iter()
            .map(|(feature, value)| (feature, value.as_bool().unwrap_or(false)))
            .collect(),
        Err(e) => {
            tracing::warn!(
                plan = %plan_name,
                error = %e,
                "Plan feature map is not a JSON object, treating as empty"
            );
            HashMap::new()
        }
    }
}
