mod input;
mod output;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use reqwest::Client;
use secrecy::ExposeSecret;
use tokio_stream::wrappers::ReceiverStream;

use self::input::GeminiRequest;
use self::output::GeminiResponse;

use crate::capture::DebugCapture;
use crate::error::LlmError;
use crate::provider::{Provider, with_retries};
use crate::{GenerateParams, GenerateResult, GenerateStream, StreamChunk, Usage};

const PROVIDER_NAME: &str = "gemini";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(120);

/// Adapter for the Gemini `generateContent` API.
pub(crate) struct GeminiProvider {
    client: Client,
}

impl GeminiProvider {
    pub(crate) fn new() -> crate::Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| {
            log::error!("failed to create HTTP client for Gemini provider: {e}");
            LlmError::Internal(None)
        })?;

        Ok(Self { client })
    }

    async fn send(&self, params: &GenerateParams, stream: bool) -> crate::Result<reqwest::Response> {
        let base_url = params.config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        let model = &params.config.model;

        // Streaming uses a different endpoint with the same body.
        let url = if stream {
            format!("{base_url}/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base_url}/models/{model}:generateContent")
        };

        let request = GeminiRequest::build(params);
        let capture = DebugCapture::if_enabled(params, PROVIDER_NAME);

        if let Some(capture) = &capture {
            capture.request(&serde_json::to_string(&request).unwrap_or_default());
        }

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", params.config.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::from_transport("request to Gemini failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_else(|_| "unknown error".to_string());
            log::error!("Gemini API error ({status}): {body}");
            return Err(LlmError::from_status(status.as_u16(), body));
        }

        Ok(response)
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn supports_web_search(&self) -> bool {
        true
    }

    async fn generate_reply(&self, params: &GenerateParams) -> crate::Result<GenerateResult> {
        with_retries(PROVIDER_NAME, || async {
            let response = self.send(params, false).await?;

            let body = response.text().await.map_err(|e| {
                log::error!("failed to read Gemini response body: {e}");
                LlmError::Internal(None)
            })?;

            if let Some(capture) = DebugCapture::if_enabled(params, PROVIDER_NAME) {
                capture.response(&body);
            }

            let parsed: GeminiResponse = sonic_rs::from_str(&body).map_err(|e| {
                log::error!("failed to parse Gemini response: {e}");
                log::error!("raw response that failed to parse: {body}");
                LlmError::Internal(None)
            })?;

            let usage = parsed.usage_metadata.map(Usage::from).unwrap_or_default();
            let model = parsed
                .model_version
                .clone()
                .unwrap_or_else(|| params.config.model.clone());

            Ok(GenerateResult {
                text: parsed.text(),
                response_id: None,
                usage,
                citations: Vec::new(),
                model,
                provider: PROVIDER_NAME.to_string(),
            })
        })
        .await
    }

    async fn generate_reply_stream(&self, params: &GenerateParams) -> crate::Result<GenerateStream> {
        let response = with_retries(PROVIDER_NAME, || self.send(params, true)).await?;
        let fallback_model = params.config.model.clone();

        let (tx, rx) = tokio::sync::mpsc::channel::<StreamChunk>(32);

        tokio::spawn(async move {
            let mut events = response.bytes_stream().eventsource();
            let mut index: u64 = 0;
            let mut usage = Usage::default();
            let mut model = fallback_model;
            let mut terminal_sent = false;

            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        log::warn!("SSE transport error in Gemini stream: {e}");
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

                let Ok(parsed) = sonic_rs::from_str::<GeminiResponse>(&event.data) else {
                    log::warn!("unparseable Gemini stream chunk: {}", event.data);
                    continue;
                };

                if let Some(version) = &parsed.model_version {
                    model = version.clone();
                }
                if let Some(metadata) = parsed.usage_metadata {
                    usage = Usage::from(metadata);
                }

                let text = parsed.text();
                if !text.is_empty() {
                    if tx.send(StreamChunk::TextDelta { text, index }).await.is_err() {
                        return;
                    }
                    index += 1;
                }
            }

            if !terminal_sent {
                let _ = tx
                    .send(StreamChunk::Complete {
                        response_id: None,
                        model,
                        provider: PROVIDER_NAME.to_string(),
                        final_usage: usage,
                    })
                    .await;
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
