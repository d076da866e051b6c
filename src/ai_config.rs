//! AI configuration model and the override hierarchy resolver.
//!
//! Rows live in `ai_configurations`, keyed by `(level, identifier)`. At most
//! one row per pair is active (enforced by a partial unique index). The
//! resolver walks service → plan → global and returns the first active row.

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::fmt;

use crate::error::AppError;

/// Hierarchy level of a configuration row, most general first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigLevel {
    Global,
    Plan,
    Service,
}

impl ConfigLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfigLevel::Global => "global",
            ConfigLevel::Plan => "plan",
            ConfigLevel::Service => "service",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "global" => Some(ConfigLevel::Global),
            "plan" => Some(ConfigLevel::Plan),
            "service" => Some(ConfigLevel::Service),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sampling parameters forwarded to the provider; `None` means provider default
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
}

/// Effective model / prompt configuration for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiConfiguration {
    pub id: i64,
    pub level: ConfigLevel,
    /// Plan or service name; `None` only for the global level
    pub identifier: Option<String>,
    /// Key into the provider connection registry
    pub provider_name: String,
    pub model_name: String,
    pub system_prompt: String,
    pub sampling: SamplingParams,
    pub is_active: bool,
}

#[derive(sqlx::FromRow)]
struct AiConfigurationRow {
    id: i64,
    level: String,
    identifier: Option<String>,
    provider_name: String,
    model_name: String,
    system_prompt: String,
    temperature: Option<f64>,
    top_p: Option<f64>,
    max_tokens: Option<i64>,
    frequency_penalty: Option<f64>,
    presence_penalty: Option<f64>,
    is_active: i64,
}

impl TryFrom<AiConfigurationRow> for AiConfiguration {
    type Error = AppError;

    fn try_from(row: AiConfigurationRow) -> Result<Self, Self::Error> {
        let level = ConfigLevel::parse(&row.level).ok_or_else(|| {
            AppError::Internal(format!(
                "ai_configurations row {} has unknown level '{}'",
                row.id, row.level
            ))
        })?;

        Ok(Self {
            id: row.id,
            level,
            identifier: row.identifier,
            provider_name: row.provider_name,
            model_name: row.model_name,
            system_prompt: row.system_prompt,
            sampling: SamplingParams {
                temperature: row.temperature.map(|v| v as f32),
                top_p: row.top_p.map(|v| v as f32),
                max_tokens: row.max_tokens.and_then(|v| u32::try_from(v).ok()),
                frequency_penalty: row.frequency_penalty.map(|v| v as f32),
                presence_penalty: row.presence_penalty.map(|v| v as f32),
            },
            is_active: row.is_active != 0,
        })
    }
}

/// Read-only resolver over the configuration store
#[derive(Clone)]
pub struct ConfigResolver {
    pool: SqlitePool,
}

impl ConfigResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Resolve the configuration for a service, optionally consulting the caller's plan.
    ///
    /// Order: `service(service_identifier)` → `plan(plan)` (when given) → `global`.
    /// Fails with [`AppError::ConfigNotFound`] when no level has an active row.
    pub async fn resolve(
        &self,
        service_identifier: &str,
        plan: Option<&str>,
    ) -> Result<AiConfiguration, AppError> {
        let mut chain: Vec<(ConfigLevel, Option<&str>)> =
            vec![(ConfigLevel::Service, Some(service_identifier))];
        if let Some(plan) = plan {
            chain.push((ConfigLevel::Plan, Some(plan)));
        }
        chain.push((ConfigLevel::Global, None));

        for (level, identifier) in chain {
            if let Some(config) = self.find_active(level, identifier).await? {
                tracing::debug!(
                    config_id = config.id,
                    level = %level,
                    model = %config.model_name,
                    "Resolved AI configuration"
                );
                return Ok(config);
            }
        }

        Err(AppError::ConfigNotFound(service_identifier.to_string()))
    }

    /// Active row at one level, if any
    pub async fn find_active(
        &self,
        level: ConfigLevel,
        identifier: Option<&str>,
    ) -> Result<Option<AiConfiguration>, AppError> {
        let row = sqlx::query_as::<_, AiConfigurationRow>(
            r#"
            SELECT id, level, identifier, provider_name, model_name, system_prompt,
                   temperature, top_p, max_tokens, frequency_penalty, presence_penalty,
                   is_active
            FROM ai_configurations
            WHERE level = ?
              AND is_active = 1
              AND (
                    (? IS NULL AND identifier IS NULL)
                 OR identifier = ?
              )
            ORDER BY updated_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(level.as_str())
        .bind(identifier)
        .bind(identifier)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AiConfiguration::try_from).transpose()
    }
}
