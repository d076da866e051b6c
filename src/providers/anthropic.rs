use async_trait::async_trait;
use reqwest::Client;

use super::{
    read_success_body, transport_error, ChatProvider, Completion, CompletionRequest,
    ProviderConnection, ProviderKind, TokenUsage,
};
use crate::error::AppError;
use crate::models::anthropic::{Message, MessagesRequest, MessagesResponse};

pub const DEFAULT_API_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory for the messages API
pub const DEFAULT_MAX_TOKENS: u32 = 2048;

/// Anthropic provider. Frequency and presence penalties have no equivalent and are dropped.
pub struct AnthropicProvider;

impl AnthropicProvider {
    pub fn build_request(request: &CompletionRequest<'_>) -> MessagesRequest {
        let sampling = request.sampling;
        let system = (!request.system_prompt.trim().is_empty())
            .then(|| request.system_prompt.to_string());

        MessagesRequest {
            model: request.model.to_string(),
            system,
            messages: vec![Message {
                role: "user".to_string(),
                content: request.user_prompt.to_string(),
            }],
            max_tokens: sampling.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            stream: Some(false),
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    async fn complete(
        &self,
        client: &Client,
        connection: &ProviderConnection,
        request: &CompletionRequest<'_>,
    ) -> Result<Completion, AppError> {
        let url = format!("{}/messages", connection.base_url);
        let api_version = connection
            .api_version
            .as_deref()
            .unwrap_or(DEFAULT_API_VERSION);
        let body = Self::build_request(request);

        let response = client
            .post(&url)
            .header("x-api-key", &connection.api_key)
            .header("anthropic-version", api_version)
            .header("Content-Type", "application/json")
            .timeout(connection.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, connection.timeout))?;

        let text = read_success_body(response, connection.timeout).await?;
        let parsed: MessagesResponse = serde_json::from_str(&text).map_err(|e| {
            AppError::MalformedProviderResponse(format!("invalid messages envelope: {}", e))
        })?;

        Ok(Completion {
            text: Some(parsed.text()).filter(|text| !text.is_empty()),
            usage: TokenUsage::new(parsed.usage.input_tokens, parsed.usage.output_tokens),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_config::SamplingParams;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_build_request_defaults_max_tokens_and_drops_penalties() {
        let sampling = SamplingParams {
            temperature: Some(0.2),
            frequency_penalty: Some(0.5),
            presence_penalty: Some(0.5),
            ..Default::default()
        };
        let request = CompletionRequest {
            model: "claude-3-5-sonnet-20241022",
            system_prompt: "sys",
            user_prompt: "usr",
            sampling: &sampling,
            user_id: None,
        };

        let body = serde_json::to_value(AnthropicProvider::build_request(&request)).unwrap();
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert_eq!(body["system"], "sys");
        assert_eq!(body["messages"][0], json!({"role": "user", "content": "usr"}));
        assert!(body.get("frequency_penalty").is_none());
        assert!(body.get("presence_penalty").is_none());
    }

    #[tokio::test]
    async fn test_complete_uses_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-ant-test"))
            .and(header("anthropic-version", DEFAULT_API_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "msg_1",
                "type": "message",
                "role": "assistant",
                "model": "claude-3-5-sonnet-20241022",
                "content": [{"type": "text", "text": "{\"ok\": 1}"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 50, "output_tokens": 10}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let connection = ProviderConnection {
            name: "anthropic".to_string(),
            kind: ProviderKind::Anthropic,
            base_url: server.uri(),
            api_key: "sk-ant-test".to_string(),
            api_version: None,
            timeout: Duration::from_secs(5),
        };
        let sampling = SamplingParams::default();
        let request = CompletionRequest {
            model: "claude-3-5-sonnet-20241022",
            system_prompt: "sys",
            user_prompt: "usr",
            sampling: &sampling,
            user_id: None,
        };

        let completion = AnthropicProvider
            .complete(&Client::new(), &connection, &request)
            .await
            .unwrap();
        assert_eq!(completion.text.as_deref(), Some("{\"ok\": 1}"));
        assert_eq!(completion.usage, TokenUsage::new(50, 10));
    }
}
