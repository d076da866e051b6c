//! AI provider access: connection registry, wire protocols and the client the
//! pipeline calls.

pub mod anthropic;
pub mod client;
pub mod openai;
pub mod parse;
pub mod registry;

pub use anthropic::AnthropicProvider;
pub use client::{Invocation, ProviderClient};
pub use openai::OpenAIProvider;
pub use registry::{ProviderConnection, ProviderKind, ProviderRegistry};

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

use crate::ai_config::SamplingParams;
use crate::error::AppError;
use crate::logging::redact_secrets;

/// Longest provider error body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 1000;

/// Protocol-agnostic single-turn chat request
#[derive(Debug, Clone)]
pub struct CompletionRequest<'a> {
    pub model: &'a str,
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
    pub sampling: &'a SamplingParams,
    /// Forwarded to providers that accept an end-user id
    pub user_id: Option<&'a str>,
}

/// Token counts reported by the provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens: u32::try_from(input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(output_tokens).unwrap_or(u32::MAX),
        }
    }

    pub fn total(&self) -> u64 {
        u64::from(self.input_tokens) + u64::from(self.output_tokens)
    }
}

/// Raw text answer plus usage.
///
/// `text` is `None` when the provider answered 2xx without any content; the
/// usage it reported is still billed.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: Option<String>,
    pub usage: TokenUsage,
}

/// One wire protocol.
///
/// Implementations build the URL, add authentication headers, apply the
/// connection timeout and decode the provider's envelope into a [`Completion`].
#[async_trait]
pub trait ChatProvider: Send + Sync + 'static {
    fn kind(&self) -> ProviderKind;

    async fn complete(
        &self,
        client: &Client,
        connection: &ProviderConnection,
        request: &CompletionRequest<'_>,
    ) -> Result<Completion, AppError>;
}

/// Map a transport failure to a provider error; timeouts are reported as such
pub(crate) fn transport_error(error: reqwest::Error, timeout: Duration) -> AppError {
    let message = if error.is_timeout() {
        format!("request timed out after {}s", timeout.as_secs())
    } else if error.is_connect() {
        format!("connection failed: {}", error)
    } else {
        error.to_string()
    };

    AppError::Provider {
        status: error.status().map(|s| s.as_u16()),
        message,
    }
}

/// Body of a 2xx response, or a provider error carrying status and body
pub(crate) async fn read_success_body(
    response: reqwest::Response,
    timeout: Duration,
) -> Result<String, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(AppError::Provider {
            status: Some(status.as_u16()),
            message: redact_secrets(&body)
                .chars()
                .take(MAX_ERROR_BODY_CHARS)
                .collect(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| transport_error(e, timeout))
}
