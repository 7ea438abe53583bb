use serde::Deserialize;

use crate::Usage;

/// Response body of the Gemini `generateContent` API. Streaming chunks
/// share this shape with partial candidates.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GeminiResponse {
    #[serde(default)]
    pub(super) candidates: Vec<Candidate>,

    #[serde(default)]
    pub(super) usage_metadata: Option<UsageMetadata>,

    #[serde(default)]
    pub(super) model_version: Option<String>,

    #[serde(default)]
    pub(super) response_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct Candidate {
    #[serde(default)]
    pub(super) content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CandidateContent {
    #[serde(default)]
    pub(super) parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
pub(super) struct CandidatePart {
    #[serde(default)]
    pub(super) text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct UsageMetadata {
    #[serde(default)]
    pub(super) prompt_token_count: u32,

    #[serde(default)]
    pub(super) candidates_token_count: u32,

    #[serde(default)]
    pub(super) total_token_count: u32,
}

impl From<UsageMetadata> for Usage {
    fn from(usage: UsageMetadata) -> Self {
        let total = if usage.total_token_count > 0 {
            usage.total_token_count
        } else {
            usage.prompt_token_count + usage.candidates_token_count
        };

        Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
            total_tokens: total,
        }
    }
}

impl GeminiResponse {
    /// Concatenated text of the first candidate.
    pub(super) fn text(&self) -> String {
        let mut out = String::new();
        if let Some(candidate) = self.candidates.first()
            && let Some(content) = &candidate.content
        {
            for part in &content.parts {
                if let Some(text) = &part.text {
                    out.push_str(text);
                }
            }
        }
        out
    }
}
