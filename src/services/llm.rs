use crate::config::LlmConfig;
use crate::models::ChatMessage;
use crate::utils::error::GatewayError;
use futures::stream::Stream;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::debug;

/// One item of a streamed generation: incremental tokens in emission order,
/// terminated by exactly one aggregate of the full answer. The call is
/// complete only when the aggregate has been delivered.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationChunk {
    Token(String),
    Complete(String),
}

pub type GenerationStream =
    Pin<Box<dyn Stream<Item = Result<GenerationChunk, GatewayError>> + Send>>;

/// Collaborator seam for streamed answers and the non-streamed summarizer.
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate_stream(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<GenerationStream, GatewayError>;

    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, GatewayError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    choices: Vec<ChoiceChunk>,
}

#[derive(Debug, Deserialize)]
struct ChoiceChunk {
    delta: Delta,
}

#[derive(Debug, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorBody {
    error: Option<UpstreamErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct UpstreamErrorDetail {
    code: Option<String>,
}

#[derive(Clone)]
pub struct LlmService {
    client: Client,
    config: LlmConfig,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(config.timeout_seconds))
                .build()
                .unwrap_or_else(|_| Client::new()),
            config,
        }
    }

    async fn send_request(
        &self,
        messages: Vec<ChatMessage>,
        stream: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let request = ChatCompletionRequest {
            model: self.config.model.clone(),
            messages,
            max_tokens: self.config.max_tokens,
            temperature: 0.0,
            stream,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| GatewayError::Generation(format!("failed to call LLM API: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_upstream_error(status, &body));
        }

        Ok(response)
    }
}

/// Map an upstream error body onto the taxonomy. Context-length exhaustion
/// gets its own variant; everything else is a generic generation failure.
fn classify_upstream_error(status: reqwest::StatusCode, body: &str) -> GatewayError {
    if let Ok(parsed) = serde_json::from_str::<UpstreamErrorBody>(body) {
        if let Some(code) = parsed.error.and_then(|e| e.code) {
            if code == "context_length_exceeded" {
                return GatewayError::ContextLengthExceeded;
            }
        }
    }
    GatewayError::Generation(format!("LLM API error: {} - {}", status, body))
}

#[async_trait::async_trait]
impl GenerationProvider for LlmService {
    /// Streamed completion. Parses the SSE body line by line, yielding each
    /// delta as a token and finishing with the aggregated answer.
    async fn generate_stream(
        &self,
        messages: Vec<ChatMessage>,
    ) -> Result<GenerationStream, GatewayError> {
        debug!("Starting chat stream with {} messages", messages.len());

        let response = self.send_request(messages, true).await?;
        let mut bytes_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            let mut buffer = String::new();
            let mut aggregated = String::new();
            let mut done = false;

            while let Some(chunk) = bytes_stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(GatewayError::Generation(format!("stream error: {}", e)));
                        return;
                    }
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // SSE lines may split across network chunks; only consume
                // complete lines and keep the remainder buffered.
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(json_str) = line.strip_prefix("data: ") else {
                        continue;
                    };

                    if json_str == "[DONE]" {
                        done = true;
                        break;
                    }

                    if let Ok(parsed) = serde_json::from_str::<ChatCompletionChunk>(json_str) {
                        if let Some(content) = parsed
                            .choices
                            .first()
                            .and_then(|c| c.delta.content.as_ref())
                        {
                            if !content.is_empty() {
                                aggregated.push_str(content);
                                yield Ok(GenerationChunk::Token(content.clone()));
                            }
                        }
                    }
                }

                if done {
                    break;
                }
            }

            yield Ok(GenerationChunk::Complete(aggregated));
        };

        Ok(Box::pin(stream))
    }

    /// Non-streamed completion, used by the conversation summarizer.
    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, GatewayError> {
        debug!("Starting chat generation with {} messages", messages.len());

        let response = self.send_request(messages, false).await?;

        #[derive(Deserialize)]
        struct ChatCompletionResponse {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: Message,
        }
        #[derive(Deserialize)]
        struct Message {
            content: String,
        }

        let chat_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Generation(format!("failed to parse LLM response: {}", e)))?;

        chat_response
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| GatewayError::Generation("no choices returned from LLM".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_context_length_code_maps_to_dedicated_variant() {
        let body = r#"{"error":{"message":"too long","type":"invalid_request_error","code":"context_length_exceeded"}}"#;
        let err = classify_upstream_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, GatewayError::ContextLengthExceeded));
    }

    #[test]
    fn other_upstream_errors_stay_generic() {
        let body = r#"{"error":{"message":"rate limited","code":"rate_limit_exceeded"}}"#;
        let err = classify_upstream_error(reqwest::StatusCode::TOO_MANY_REQUESTS, body);
        assert!(matches!(err, GatewayError::Generation(_)));

        let err = classify_upstream_error(reqwest::StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, GatewayError::Generation(_)));
    }
}
