use serde::Deserialize;

use crate::{Citation, Usage};

/// Response body of the OpenAI Responses API.
#[derive(Debug, Deserialize)]
pub(super) struct OpenAiResponse {
    /// Response identifier, reusable as `previous_response_id`.
    pub(super) id: String,

    /// Model that served the request.
    pub(super) model: String,

    /// Output items; messages carry the generated text.
    #[serde(default)]
    pub(super) output: Vec<OutputItem>,

    #[serde(default)]
    pub(super) usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OutputItem {
    #[serde(rename = "type")]
    pub(super) kind: String,

    #[serde(default)]
    pub(super) content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ContentItem {
    #[serde(rename = "type")]
    pub(super) kind: String,

    #[serde(default)]
    pub(super) text: Option<String>,

    #[serde(default)]
    pub(super) annotations: Vec<Annotation>,
}

/// A citation annotation attached to output text.
#[derive(Debug, Deserialize)]
pub(super) struct Annotation {
    #[serde(rename = "type")]
    pub(super) kind: String,

    #[serde(default)]
    pub(super) url: Option<String>,

    #[serde(default)]
    pub(super) title: Option<String>,

    #[serde(default)]
    pub(super) start_index: Option<u32>,

    #[serde(default)]
    pub(super) end_index: Option<u32>,

    #[serde(default)]
    pub(super) file_id: Option<String>,

    #[serde(default)]
    pub(super) filename: Option<String>,

    #[serde(default)]
    pub(super) index: Option<u32>,
}

impl Annotation {
    /// Normalize into the internal citation taxonomy. Unknown annotation
    /// kinds are dropped.
    pub(super) fn into_citation(self) -> Option<Citation> {
        match self.kind.as_str() {
            "url_citation" => Some(Citation::Url {
                url: self.url.unwrap_or_default(),
                title: self.title.unwrap_or_default(),
                start: self.start_index.unwrap_or(0),
                end: self.end_index.unwrap_or(0),
            }),
            "file_citation" => Some(Citation::File {
                file_id: self.file_id.unwrap_or_default(),
                filename: self.filename.unwrap_or_default(),
                start: self.index.or(self.start_index).unwrap_or(0),
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(super) struct OpenAiUsage {
    #[serde(default)]
    pub(super) input_tokens: u32,

    #[serde(default)]
    pub(super) output_tokens: u32,

    #[serde(default)]
    pub(super) total_tokens: u32,
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        let total = if usage.total_tokens > 0 {
            usage.total_tokens
        } else {
            usage.input_tokens + usage.output_tokens
        };

        Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            total_tokens: total,
        }
    }
}

impl OpenAiResponse {
    /// Concatenated output text across message items.
    pub(super) fn text(&self) -> String {
        let mut out = String::new();
        for item in &self.output {
            if item.kind != "message" {
                continue;
            }
            for content in &item.content {
                if content.kind == "output_text"
                    && let Some(text) = &content.text
                {
                    out.push_str(text);
                }
            }
        }
        out
    }

    /// All recognized citations across message items.
    pub(super) fn citations(self) -> Vec<Citation> {
        self.output
            .into_iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content)
            .flat_map(|content| content.annotations)
            .filter_map(Annotation::into_citation)
            .collect()
    }
}

/// One server-sent event from a streaming response.
#[derive(Debug, Deserialize)]
pub(super) struct OpenAiStreamEvent {
    #[serde(rename = "type")]
    pub(super) kind: String,

    /// Text fragment for `response.output_text.delta` events.
    #[serde(default)]
    pub(super) delta: Option<String>,

    /// Full response snapshot for `response.completed` events.
    #[serde(default)]
    pub(super) response: Option<OpenAiResponse>,

    /// Citation payload for annotation events.
    #[serde(default)]
    pub(super) annotation: Option<Annotation>,

    /// Error message for `error` events.
    #[serde(default)]
    pub(super) message: Option<String>,
}
