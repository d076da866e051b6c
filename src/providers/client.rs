use reqwest::Client;
use std::time::{Duration, Instant};

use super::{
    parse, AnthropicProvider, ChatProvider, CompletionRequest, OpenAIProvider, ProviderKind,
    ProviderRegistry, TokenUsage,
};
use crate::ai_config::AiConfiguration;
use crate::error::AppError;
use crate::metrics;

/// Outcome of one provider call together with what it cost.
///
/// `result` may be an error while `usage` is still known, e.g. when the
/// provider answered 2xx with content that is not valid JSON.
#[derive(Debug)]
pub struct Invocation<T> {
    pub result: Result<T, AppError>,
    pub usage: Option<TokenUsage>,
    pub latency: Duration,
    /// Provider name from the configuration
    pub provider: String,
}

impl<T> Invocation<T> {
    /// Apply a fallible conversion to a successful result, keeping usage and latency
    pub fn and_then<U>(self, f: impl FnOnce(T) -> Result<U, AppError>) -> Invocation<U> {
        Invocation {
            result: self.result.and_then(f),
            usage: self.usage,
            latency: self.latency,
            provider: self.provider,
        }
    }
}

#[derive(Clone)]
pub struct ProviderClient {
    http: Client,
    registry: ProviderRegistry,
}

impl ProviderClient {
    pub fn new(http: Client, registry: ProviderRegistry) -> Self {
        Self { http, registry }
    }

    fn provider_for(kind: ProviderKind) -> &'static dyn ChatProvider {
        match kind {
            ProviderKind::OpenAI => &OpenAIProvider,
            ProviderKind::Anthropic => &AnthropicProvider,
        }
    }

    /// Call the configured provider and extract the JSON payload from its answer
    pub async fn invoke(
        &self,
        config: &AiConfiguration,
        prompt: &str,
        user_id: Option<&str>,
    ) -> Invocation<serde_json::Value> {
        let started = Instant::now();
        let provider = config.provider_name.clone();

        let connection = match self.registry.lookup(&config.provider_name).await {
            Ok(connection) => connection,
            Err(e) => {
                return Invocation {
                    result: Err(e),
                    usage: None,
                    latency: started.elapsed(),
                    provider,
                }
            }
        };

        let request = CompletionRequest {
            model: &config.model_name,
            system_prompt: &config.system_prompt,
            user_prompt: prompt,
            sampling: &config.sampling,
            user_id,
        };

        tracing::debug!(
            provider = %connection.name,
            kind = %connection.kind,
            model = %config.model_name,
            timeout_secs = connection.timeout.as_secs(),
            "Invoking provider"
        );

        let completion = Self::provider_for(connection.kind)
            .complete(&self.http, &connection, &request)
            .await;
        let latency = started.elapsed();

        let (result, usage) = match completion {
            Ok(completion) => {
                let result = match completion.text.as_deref() {
                    Some(text) => parse::extract_json(text),
                    None => Err(AppError::MalformedProviderResponse(
                        "provider returned no content".to_string(),
                    )),
                };
                (result, Some(completion.usage))
            }
            Err(e) => (Err(e), None),
        };

        metrics::record_provider_duration(&provider, &config.model_name, result.is_ok(), latency);
        if let Some(usage) = usage {
            metrics::record_tokens(&provider, &config.model_name, "input", u64::from(usage.input_tokens));
            metrics::record_tokens(&provider, &config.model_name, "output", u64::from(usage.output_tokens));
        }

        Invocation {
            result,
            usage,
            latency,
            provider,
        }
    }
}
