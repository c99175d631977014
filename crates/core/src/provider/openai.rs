//! OpenAI-compatible chat-completions client.
//!
//! Serves OpenAI, Groq and the Heurist gateway. Streaming responses are
//! Server-Sent Events whose `data:` payloads carry `choices[0].delta.content`
//! and end with `[DONE]`.

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use super::{ChatMessage, CompletionProvider, CompletionRequest, FragmentStream};
use crate::error::{ProviderError, ProviderResult};
use crate::models::ModelConfig;

const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
struct ResponseChoice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Text carried by one SSE `data:` payload, `None` for the terminator
fn parse_chunk(data: &str) -> ProviderResult<Option<String>> {
    let chunk: ChatCompletionChunk = serde_json::from_str(data)?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|content| !content.is_empty()))
}

/// Chat-completions client for any OpenAI-compatible endpoint
pub struct OpenAiCompatibleProvider {
    config: ModelConfig,
    client: reqwest::Client,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url())
    }

    fn build_body<'a>(
        &'a self,
        request: &CompletionRequest,
        stream: bool,
    ) -> ChatCompletionBody<'a> {
        ChatCompletionBody {
            model: &self.config.model,
            messages: request.messages(),
            temperature: self.config.provider.temperature(),
            max_tokens: self.config.provider.max_tokens(),
            stream,
        }
    }

    async fn send(
        &self,
        request: &CompletionRequest,
        stream: bool,
    ) -> ProviderResult<reqwest::Response> {
        let body = self.build_body(request, stream);
        debug!(
            model = %body.model,
            stream,
            system_chars = request.system_prompt.len(),
            context_chars = request.user_context.len(),
            "Sending completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().await.unwrap_or_default();
        error!(
            provider = self.config.provider.display_name(),
            status = status.as_u16(),
            "Completion API error"
        );
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited { message });
        }
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn open_stream(&self, request: &CompletionRequest) -> ProviderResult<FragmentStream> {
        let response = self.send(request, true).await?;
        let mut events = Box::pin(response.bytes_stream().eventsource());

        let fragments = async_stream::stream! {
            while let Some(event) = events.next().await {
                let decoded: ProviderResult<Option<String>> = match event {
                    Ok(event) if event.data.trim() == DONE_SENTINEL => break,
                    Ok(event) => parse_chunk(&event.data),
                    Err(e) => Err(ProviderError::Stream(e.to_string())),
                };
                match decoded {
                    Ok(Some(content)) => {
                        let item: ProviderResult<String> = Ok(content);
                        yield item;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        let item: ProviderResult<String> = Err(err);
                        yield item;
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(fragments))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        self.config.provider.display_name()
    }

    #[instrument(skip_all, fields(provider = self.config.provider.display_name(), model = %self.config.model))]
    async fn complete(&self, request: &CompletionRequest) -> ProviderResult<String> {
        if self.config.provider.stream_only() {
            let mut fragments = self.open_stream(request).await?;
            let mut text = String::new();
            while let Some(fragment) = fragments.next().await {
                text.push_str(&fragment?);
            }
            return Ok(text);
        }

        let response: ChatCompletionResponse = self.send(request, false).await?.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(ProviderError::EmptyResponse)
    }

    #[instrument(skip_all, fields(provider = self.config.provider.display_name(), model = %self.config.model))]
    async fn stream(&self, request: &CompletionRequest) -> ProviderResult<FragmentStream> {
        self.open_stream(request).await
    }
}
