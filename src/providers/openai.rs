use async_trait::async_trait;
use reqwest::Client;

use super::{
    read_success_body, transport_error, ChatProvider, Completion, CompletionRequest,
    ProviderConnection, ProviderKind, TokenUsage,
};
use crate::error::AppError;
use crate::models::openai::{ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ResponseFormat};

/// OpenAI provider (also used for OpenAI-compatible services)
pub struct OpenAIProvider;

impl OpenAIProvider {
    pub fn build_request(request: &CompletionRequest<'_>) -> ChatCompletionRequest {
        let sampling = request.sampling;

        ChatCompletionRequest {
            model: request.model.to_string(),
            messages: vec![
                ChatMessage::system(request.system_prompt),
                ChatMessage::user(request.user_prompt),
            ],
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            presence_penalty: sampling.presence_penalty,
            frequency_penalty: sampling.frequency_penalty,
            stream: Some(false),
            user: request.user_id.map(str::to_string),
            response_format: Some(ResponseFormat::JsonObject),
        }
    }
}

#[async_trait]
impl ChatProvider for OpenAIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    async fn complete(
        &self,
        client: &Client,
        connection: &ProviderConnection,
        request: &CompletionRequest<'_>,
    ) -> Result<Completion, AppError> {
        let url = format!("{}/chat/completions", connection.base_url);
        let body = Self::build_request(request);

        let response = client
            .post(&url)
            .header("Authorization", format!("Bearer {}", connection.api_key))
            .header("Content-Type", "application/json")
            .timeout(connection.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, connection.timeout))?;

        let text = read_success_body(response, connection.timeout).await?;
        let parsed: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            AppError::MalformedProviderResponse(format!("invalid chat completion envelope: {}", e))
        })?;

        let usage = parsed
            .usage
            .as_ref()
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(Completion {
            text: parsed.first_text().map(str::to_string),
            usage,
        })
    }
}
