mod input;
mod output;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;
use tokio_stream::wrappers::ReceiverStream;

use self::input::OpenAiRequest;
use self::output::{OpenAiResponse, OpenAiStreamEvent};

use crate::capture::DebugCapture;
use crate::error::LlmError;
use crate::provider::{Provider, with_retries};
use crate::{GenerateParams, GenerateResult, GenerateStream, StreamChunk, Usage};

const PROVIDER_NAME: &str = "openai";
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Adapter for the OpenAI Responses API.
pub(crate) struct OpenAiProvider {
    client: Client,
}

impl OpenAiProvider {
    pub(crate) fn new() -> crate::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| {
            log::error!("failed to create HTTP client for OpenAI provider: {e}");
            LlmError::Internal(None)
        })?;

        Ok(Self { client })
    }

    async fn send(&self, params: &GenerateParams, stream: bool) -> crate::Result<reqwest::Response> {
        let base_url = params.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{base_url}/responses");

        let request = OpenAiRequest::build(params, stream);
        let capture = DebugCapture::if_enabled(params, PROVIDER_NAME);

        if let Some(capture) = &capture {
            capture.request(&serde_json::to_string(&request).unwrap_or_default());
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(params.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport("request to OpenAI failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            log::error!("OpenAI API error ({status}): {body}");
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn supports_file_search(&self) -> bool {
        true
    }

    fn supports_web_search(&self) -> bool {
        true
    }

    fn supports_native_continuity(&self) -> bool {
        true
    }

    async fn generate_reply(&self, params: &GenerateParams) -> crate::Result<GenerateResult> {
        with_retries(PROVIDER_NAME, || async {
            let response = self.send(params, false).await?;

            // Read as text first so a parse failure can log the raw body.
            let body = response.text().await.map_err(|e| {
                log::error!("failed to read OpenAI response body: {e}");
                LlmError::Internal(None)
            })?;

            if let Some(capture) = DebugCapture::if_enabled(params, PROVIDER_NAME) {
                capture.response(&body);
            }

            let parsed: OpenAiResponse = sonic_rs::from_str(&body).map_err(|e| {
                log::error!("failed to parse OpenAI response: {e}");
                log::error!("raw response that failed to parse: {body}");
                LlmError::Internal(None)
            })?;

            let usage = parsed.usage.map(Usage::from).unwrap_or_default();

            Ok(GenerateResult {
                text: parsed.text(),
                response_id: Some(parsed.id.clone()),
                usage,
                model: parsed.model.clone(),
                provider: PROVIDER_NAME.to_string(),
                citations: parsed.citations(),
            })
        })
        .await
    }

    async fn generate_reply_stream(&self, params: &GenerateParams) -> crate::Result<GenerateStream> {
        let response = with_retries(PROVIDER_NAME, || self.send(params, true)).await?;

        let (tx, rx) = tokio::sync::mpsc::channel::<StreamChunk>(32);

        // The spawned task owns the upstream response; every exit path
        // below drops it, and an abandoned receiver ends the task at the
        // next send.
        tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();
            let mut index: u64 = 0;
            let mut usage = Usage::default();
            let mut terminal_sent = false;

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("SSE transport error in OpenAI stream: {e}");
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

                if event.data == "[DONE]" {
                    break;
                }

                let Ok(parsed) = sonic_rs::from_str::<OpenAiStreamEvent>(&event.data) else {
                    log::warn!("unparseable OpenAI stream event: {}", event.data);
                    continue;
                };

                match parsed.kind.as_str() {
                    "response.output_text.delta" => {
                        let Some(text) = parsed.delta else { continue };
                        if tx.send(StreamChunk::TextDelta { text, index }).await.is_err() {
                            return;
                        }
                        index += 1;
                    }
                    "response.output_text.annotation.added" => {
                        let Some(citation) = parsed.annotation.and_then(|a| a.into_citation()) else {
                            continue;
                        };
                        if tx.send(StreamChunk::CitationUpdate { citation }).await.is_err() {
                            return;
                        }
                    }
                    "response.completed" => {
                        let (response_id, model) = match &parsed.response {
                            Some(response) => {
                                if let Some(u) = response.usage {
                                    usage = Usage::from(u);
                                }
                                (Some(response.id.clone()), response.model.clone())
                            }
                            None => (None, String::new()),
                        };

                        let _ = tx
                            .send(StreamChunk::Complete {
                                response_id,
                                model,
                                provider: PROVIDER_NAME.to_string(),
                                final_usage: usage,
                            })
                            .await;
                        terminal_sent = true;
                        break;
                    }
                    "error" | "response.failed" => {
                        let message = parsed.message.unwrap_or_else(|| "provider stream error".to_string());
                        log::error!("OpenAI stream reported failure: {message}");
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
                // Upstream closed without a completed event; report what
                // we know rather than leaving the stream unterminated.
                let _ = tx
                    .send(StreamChunk::Complete {
                        response_id: None,
                        model: String::new(),
                        provider: PROVIDER_NAME.to_string(),
                        final_usage: usage,
                    })
                    .await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
