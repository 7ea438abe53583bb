use serde::Deserialize;

use crate::Usage;

/// Response body of the Anthropic Messages API.
#[derive(Debug, Deserialize)]
pub(super) struct AnthropicResponse {
    /// Message identifier.
    pub(super) id: String,

    /// Model that served the request.
    pub(super) model: String,

    /// Content blocks; text blocks carry the generated reply.
    #[serde(default)]
    pub(super) content: Vec<ContentBlock>,

    pub(super) usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
pub(super) struct ContentBlock {
    #[serde(rename = "type")]
    pub(super) kind: String,

    #[serde(default)]
    pub(super) text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub(super) struct AnthropicUsage {
    #[serde(default)]
    pub(super) input_tokens: u32,

    #[serde(default)]
    pub(super) output_tokens: u32,
}

impl From<AnthropicUsage> for Usage {
    fn from(usage: AnthropicUsage) -> Self {
        Usage::new(usage.input_tokens, usage.output_tokens)
    }
}

impl AnthropicResponse {
    /// Concatenated text across text blocks.
    pub(super) fn text(&self) -> String {
        let mut out = String::new();
        for block in &self.content {
            if block.kind == "text"
                && let Some(text) = &block.text
            {
                out.push_str(text);
            }
        }
        out
    }
}

/// One server-sent event from a streaming message.
///
/// The Messages stream interleaves `message_start`, `content_block_delta`,
/// `message_delta`, and `message_stop` events; everything else is noise
/// for our purposes.
#[derive(Debug, Deserialize)]
pub(super) struct AnthropicStreamEvent {
    #[serde(rename = "type")]
    pub(super) kind: String,

    /// Present on `message_start`: the shell of the message with input
    /// usage.
    #[serde(default)]
    pub(super) message: Option<StreamMessage>,

    /// Present on `content_block_delta`.
    #[serde(default)]
    pub(super) delta: Option<StreamDelta>,

    /// Present on `message_delta`: cumulative output usage.
    #[serde(default)]
    pub(super) usage: Option<AnthropicUsage>,

    /// Present on `error` events.
    #[serde(default)]
    pub(super) error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StreamMessage {
    pub(super) id: String,

    pub(super) model: String,

    #[serde(default)]
    pub(super) usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StreamDelta {
    #[serde(rename = "type", default)]
    pub(super) kind: Option<String>,

    #[serde(default)]
    pub(super) text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct StreamError {
    #[serde(default)]
    pub(super) message: String,
}
