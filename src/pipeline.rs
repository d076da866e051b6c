//! Funnel analysis request pipeline.
//!
//! Steps run strictly in order: validate, gate, cache lookup, resolve
//! configuration, invoke provider, record usage, populate cache. Cache,
//! metric and error-log writes are side channels: their failures are logged
//! and dropped, never returned to the caller.

use chrono::Utc;
use reqwest::Client;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::{field, Instrument};

use crate::access::FeatureAccessGate;
use crate::ai_config::{AiConfiguration, ConfigResolver};
use crate::cache::{CacheLookup, CacheStore};
use crate::config::Config;
use crate::error::AppError;
use crate::error_log::ErrorLog;
use crate::metrics;
use crate::models::{FunnelAnalysis, FunnelAnalysisRequest};
use crate::pricing::CostModel;
use crate::prompt::build_user_prompt;
use crate::providers::{Invocation, ProviderClient, ProviderRegistry};
use crate::usage::{BillingPeriod, GlobalMetric, UsageMetric, UsageTracker};

/// Path of the single entry point, also used as the error log endpoint
pub const ENDPOINT: &str = "/funnel-analysis";

/// Whether the result came from the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub analysis: FunnelAnalysis,
    pub cache: CacheStatus,
    /// Model that produced a fresh result; `None` on cache hits
    pub model: Option<String>,
}

/// Request-independent knobs taken from [`Config`]
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub service_identifier: String,
    pub feature: String,
    pub max_input_chars: usize,
    pub use_plan_tier: bool,
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            service_identifier: config.analysis.service_identifier.clone(),
            feature: config.analysis.feature.clone(),
            max_input_chars: config.analysis.max_input_chars,
            use_plan_tier: config.analysis.use_plan_tier,
        }
    }
}

#[derive(Clone)]
pub struct RequestPipeline {
    gate: FeatureAccessGate,
    cache: CacheStore,
    resolver: ConfigResolver,
    provider: ProviderClient,
    usage: UsageTracker,
    errors: ErrorLog,
    costs: CostModel,
    settings: PipelineSettings,
}

impl RequestPipeline {
    /// Wire every component against one pool. Cheap: nothing is cached across requests.
    pub fn from_config(pool: SqlitePool, http: Client, config: &Config) -> Self {
        let registry = ProviderRegistry::new(
            pool.clone(),
            Duration::from_secs(config.provider.default_timeout_seconds),
        );

        Self {
            gate: FeatureAccessGate::new(pool.clone()),
            cache: CacheStore::new(
                pool.clone(),
                config.cache.namespace.clone(),
                config.cache.ttl_seconds,
            ),
            resolver: ConfigResolver::new(pool.clone()),
            provider: ProviderClient::new(http, registry),
            usage: UsageTracker::new(pool.clone()),
            errors: ErrorLog::new(pool),
            costs: CostModel::with_overrides(config.pricing.overrides.clone()),
            settings: PipelineSettings::from(config),
        }
    }

    /// Run the whole pipeline for an authenticated caller and a raw request body
    pub async fn run(
        &self,
        request_id: &str,
        user_id: &str,
        body: &[u8],
    ) -> Result<AnalysisOutcome, AppError> {
        let span = tracing::info_span!(
            "funnel_analysis",
            request_id = %request_id,
            user_id = %user_id,
            cache = field::Empty,
            model = field::Empty,
        );

        async {
            let result = self.execute(user_id, body).await;
            match &result {
                Ok(outcome) => {
                    metrics::record_request(&outcome.cache.as_str().to_lowercase(), 200);
                    tracing::info!(cache = outcome.cache.as_str(), "Funnel analysis completed");
                }
                Err(e) => {
                    metrics::record_request(e.type_name(), e.status_code().as_u16());
                    if e.is_client_error() {
                        tracing::info!(error_type = e.type_name(), error = %e, "Request rejected");
                    } else {
                        tracing::error!(error_type = e.type_name(), error = %e, "Funnel analysis failed");
                    }
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, user_id: &str, body: &[u8]) -> Result<AnalysisOutcome, AppError> {
        // Validate
        let request = FunnelAnalysisRequest::from_body(body, self.settings.max_input_chars)?;

        // Gate
        let decision = match self.gate.check(user_id, &self.settings.feature).await {
            Ok(decision) => decision,
            Err(e) => return Err(self.fail(e).await),
        };
        if !decision.allowed {
            return Err(AppError::AccessDenied(format!(
                "plan does not include feature '{}'",
                self.settings.feature
            )));
        }

        // Cache lookup
        let key = self
            .cache
            .compute_key(&[&request.ad_text, &request.landing_page_text]);
        if let Some(analysis) = self.cached_analysis(&key).await {
            tracing::Span::current().record("cache", CacheStatus::Hit.as_str());
            return Ok(AnalysisOutcome {
                analysis,
                cache: CacheStatus::Hit,
                model: None,
            });
        }
        tracing::Span::current().record("cache", CacheStatus::Miss.as_str());

        // Resolve configuration
        let plan = if self.settings.use_plan_tier {
            decision.plan_name()
        } else {
            None
        };
        let config = match self
            .resolver
            .resolve(&self.settings.service_identifier, plan)
            .await
        {
            Ok(config) => config,
            Err(e) => return Err(self.fail(e).await),
        };
        tracing::Span::current().record("model", config.model_name.as_str());

        // Invoke provider
        let prompt = build_user_prompt(&request);
        self.bump(GlobalMetric::AiRequests, 1.0).await;
        let invocation = self
            .provider
            .invoke(&config, &prompt, Some(user_id))
            .await
            .and_then(FunnelAnalysis::from_provider_value);

        let Invocation {
            result,
            usage,
            latency,
            ..
        } = invocation;
        let usage = usage.unwrap_or_default();

        let analysis = match result {
            Ok(analysis) => analysis,
            Err(e) => {
                // Input tokens were still billed when the provider answered
                let cost = self.costs.cost(&config.model_name, usage.input_tokens, 0);
                self.record_usage(user_id, &config, usage.input_tokens, 0, cost, latency, false)
                    .await;
                self.bump(GlobalMetric::AiFailures, 1.0).await;
                return Err(self.fail(e).await);
            }
        };

        // Record success
        let cost = self
            .costs
            .cost(&config.model_name, usage.input_tokens, usage.output_tokens);
        self.record_usage(
            user_id,
            &config,
            usage.input_tokens,
            usage.output_tokens,
            cost,
            latency,
            true,
        )
        .await;
        self.bump(GlobalMetric::TokensUsed, usage.total() as f64).await;

        let period = BillingPeriod::current(decision.subscription.as_ref(), Utc::now());
        if let Err(e) = self
            .usage
            .increment_feature_usage(user_id, &self.settings.feature, period)
            .await
        {
            tracing::warn!(error = %e, "Failed to increment feature usage");
        }

        // Populate cache
        match serde_json::to_value(&analysis) {
            Ok(value) => {
                if let Err(e) = self.cache.put(&key, &value).await {
                    tracing::warn!(error = %e, "Failed to store analysis in cache");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Failed to serialize analysis for cache"),
        }

        Ok(AnalysisOutcome {
            analysis,
            cache: CacheStatus::Miss,
            model: Some(config.model_name),
        })
    }

    /// Hit only when the entry is fresh and still decodes; everything else is a miss
    async fn cached_analysis(&self, key: &str) -> Option<FunnelAnalysis> {
        let analysis = match self.cache.get(key).await {
            Ok(CacheLookup::Hit(entry)) => match serde_json::from_value(entry.value) {
                Ok(analysis) => Some(analysis),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cached analysis has unexpected shape");
                    None
                }
            },
            Ok(CacheLookup::Miss) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        };

        let hit = analysis.is_some();
        metrics::record_cache_lookup(hit);
        let metric = if hit {
            GlobalMetric::CacheHits
        } else {
            GlobalMetric::CacheMisses
        };
        self.bump(metric, 1.0).await;

        analysis
    }

    /// Write a fatal error to the error log and hand it back
    async fn fail(&self, error: AppError) -> AppError {
        metrics::record_error(error.type_name());
        self.errors
            .record(error.type_name(), &error.to_string(), ENDPOINT)
            .await;
        error
    }

    async fn bump(&self, metric: GlobalMetric, amount: f64) {
        if let Err(e) = self.usage.increment_global_metric(metric, amount).await {
            tracing::warn!(metric = metric.as_str(), error = %e, "Failed to update global metric");
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_usage(
        &self,
        user_id: &str,
        config: &AiConfiguration,
        input_tokens: u32,
        output_tokens: u32,
        estimated_cost: f64,
        latency: Duration,
        success: bool,
    ) {
        let metric = UsageMetric {
            user_id: user_id.to_string(),
            model_name: config.model_name.clone(),
            service_type: self.settings.service_identifier.clone(),
            input_tokens,
            output_tokens,
            estimated_cost,
            response_time_ms: u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            success,
            timestamp: Utc::now(),
        };

        if let Err(e) = self.usage.record(&metric).await {
            tracing::warn!(error = %e, "Failed to record usage metric");
        }
    }
}
