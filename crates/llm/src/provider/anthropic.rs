mod input;
mod output;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;
use tokio_stream::wrappers::ReceiverStream;

use self::input::AnthropicRequest;
use self::output::{AnthropicResponse, AnthropicStreamEvent, AnthropicUsage};

use crate::capture::DebugCapture;
use crate::error::LlmError;
use crate::provider::{Provider, with_retries};
use crate::{GenerateParams, GenerateResult, GenerateStream, StreamChunk, Usage};

const PROVIDER_NAME: &str = "anthropic";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Adapter for the Anthropic Messages API.
pub(crate) struct AnthropicProvider {
    client: Client,
}

impl AnthropicProvider {
    pub(crate) fn new() -> crate::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| {
            log::error!("failed to create HTTP client for Anthropic provider: {e}");
            LlmError::Internal(None)
        })?;

        Ok(Self { client })
    }

    async fn send(&self, params: &GenerateParams, stream: bool) -> crate::Result<reqwest::Response> {
        let base_url = params.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{base_url}/messages");

        let request = AnthropicRequest::build(params, stream);
        let capture = DebugCapture::if_enabled(params, PROVIDER_NAME);

        if let Some(capture) = &capture {
            capture.request(&serde_json::to_string(&request).unwrap_or_default());
        }

        let response = self
            .client
            .post(&url)
            .header("x-api-key", params.config.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport("request to Anthropic failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            log::error!("Anthropic API error ({status}): {body}");
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn generate_reply(&self, params: &GenerateParams) -> crate::Result<GenerateResult> {
        with_retries(PROVIDER_NAME, || async {
            let response = self.send(params, false).await?;

            let body = response.text().await.map_err(|e| {
                log::error!("failed to read Anthropic response body: {e}");
                LlmError::Internal(None)
            })?;

            if let Some(capture) = DebugCapture::if_enabled(params, PROVIDER_NAME) {
                capture.response(&body);
            }

            let parsed: AnthropicResponse = sonic_rs::from_str(&body).map_err(|e| {
                log::error!("failed to parse Anthropic response: {e}");
                log::error!("raw response that failed to parse: {body}");
                LlmError::Internal(None)
            })?;

            Ok(GenerateResult {
                text: parsed.text(),
                // Anthropic has no cross-request continuity; conversations
                // replay history instead.
                response_id: None,
                usage: Usage::from(parsed.usage),
                citations: Vec::new(),
                model: parsed.model,
                provider: PROVIDER_NAME.to_string(),
            })
        })
        .await
    }

    async fn generate_reply_stream(&self, params: &GenerateParams) -> crate::Result<GenerateStream> {
        let response = with_retries(PROVIDER_NAME, || self.send(params, true)).await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<StreamChunk>(32);

        tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();
            let mut index: u64 = 0;
            let mut model = String::new();
            let mut input_usage = AnthropicUsage::default();
            let mut output_usage = AnthropicUsage::default();
            let mut terminal_sent = false;

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("SSE transport error in Anthropic stream: {e}");
                        let _ = tx
                            .send(StreamChunk::Error {
                                code: "unavailable".to_string(),
                                message: format!("stream error: {e}"),
                                retryable: index == 0,
                            })
                            .await;
                        terminal_sent = true;
                        break;
                    }
                };

                let Ok(parsed) = sonic_rs::from_str::<AnthropicStreamEvent>(&event.data) else {
                    log::warn!("unparseable Anthropic stream event: {}", event.data);
                    continue;
                };

                match parsed.kind.as_str() {
                    "message_start" => {
                        if let Some(message) = parsed.message {
                            model = message.model;
                            if let Some(usage) = message.usage {
                                input_usage = usage;
                            }
                        }
                    }
                    "content_block_delta" => {
                        let Some(delta) = parsed.delta else { continue };
                        if delta.kind.as_deref() != Some("text_delta") {
                            continue;
                        }
                        let Some(text) = delta.text else { continue };

                        if tx.send(StreamChunk::TextDelta { text, index }).await.is_err() {
                            return;
                        }
                        index += 1;
                    }
                    "message_delta" => {
                        if let Some(usage) = parsed.usage {
                            output_usage = usage;
                            let snapshot = Usage::new(input_usage.input_tokens, output_usage.output_tokens);
                            if tx.send(StreamChunk::UsageUpdate { usage: snapshot }).await.is_err() {
                                return;
                            }
                        }
                    }
                    "message_stop" => {
                        let final_usage = Usage::new(input_usage.input_tokens, output_usage.output_tokens);
                        let _ = tx
                            .send(StreamChunk::Complete {
                                response_id: None,
                                model: model.clone(),
                                provider: PROVIDER_NAME.to_string(),
                                final_usage,
                            })
                            .await;
                        terminal_sent = true;
                        break;
                    }
                    "error" => {
                        let message = parsed
                            .error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "provider stream error".to_string());
                        log::error!("Anthropic stream reported failure: {message}");
                        let _ = tx
                            .send(StreamChunk::Error {
                                code: "unavailable".to_string(),
                                message,
                                retryable: index == 0,
                            })
                            .await;
                        terminal_sent = true;
                        break;
                    }
                    _ => {}
                }
            }

            if !terminal_sent {
                let final_usage = Usage::new(input_usage.input_tokens, output_usage.output_tokens);
                let _ = tx
                    .send(StreamChunk::Complete {
                        response_id: None,
                        model,
                        provider: PROVIDER_NAME.to_string(),
                        final_usage,
                    })
                    .await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
