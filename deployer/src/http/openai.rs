//! Chat-completions API client

use async_trait::async_trait;
use openapi_client::models::{
    ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ResponseFormat,
};
use tracing::{debug, warn};

use crate::errors::{GenerationError, HttpError};
use crate::generate::backend::CompletionBackend;
use crate::generate::prompt::Prompt;
use crate::http::client::HttpClient;

pub const DEFAULT_MODEL: &str = "gpt-4o";

impl HttpClient {
    /// Request a chat completion
    pub async fn create_chat_completion(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, HttpError> {
        self.post("/v1/chat/completions", request).await
    }
}

/// [`CompletionBackend`] backed by an OpenAI-compatible chat-completions API
pub struct OpenAiCompletions {
    client: HttpClient,
    model: String,
    temperature: Option<f32>,
}

impl OpenAiCompletions {
    pub fn new(client: HttpClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    fn request_for(&self, prompt: &Prompt) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: prompt.system.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.user.clone(),
                },
            ],
            response_format: Some(ResponseFormat {
                format_type: "json_object".to_string(),
            }),
            temperature: self.temperature,
        }
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompletions {
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        debug!("Requesting completion from {} ({})", self.client.base_url(), self.model);
        let response = self
            .client
            .create_chat_completion(&self.request_for(prompt))
            .await
            .map_err(map_http_error)?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                GenerationError::ResponseMalformed("completion carried no content".to_string())
            })
    }
}

/// Classify a failed completion call
pub fn map_http_error(err: HttpError) -> GenerationError {
    if err.is_transient() {
        warn!("Completion backend unavailable: {}", err);
        return GenerationError::BackendUnavailable(err.to_string());
    }
    match err {
        HttpError::Status { .. } => GenerationError::BackendRejected(err.to_string()),
        HttpError::Decode(_) => GenerationError::ResponseMalformed(err.to_string()),
        _ => GenerationError::BackendUnavailable(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_http_error() {
        let unavailable = map_http_error(HttpError::Status {
            status: 503,
            body: "overloaded".to_string(),
        });
        assert_eq!(unavailable.kind(), "BackendUnavailable");

        let rejected = map_http_error(HttpError::Status {
            status: 401,
            body: "bad key".to_string(),
        });
        assert_eq!(rejected.kind(), "BackendRejected");

        let timeout = map_http_error(HttpError::Timeout("30s".to_string()));
        assert_eq!(timeout.kind(), "BackendUnavailable");

        let decode = map_http_error(HttpError::Decode("eof".to_string()));
        assert_eq!(decode.kind(), "ResponseMalformed");
    }
}
