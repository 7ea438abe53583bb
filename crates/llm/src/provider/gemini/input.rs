use serde::Serialize;

use crate::provider::{ShapeOptions, shape_history};
use crate::{GenerateParams, Role};

const HISTORY_CHAR_BUDGET: usize = 300_000;

/// Request body for the Gemini `generateContent` API.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) struct GeminiRequest {
    /// System prompt, kept outside the contents list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) system_instruction: Option<Content>,

    /// Conversation turns, oldest first. Must open with a user turn.
    pub(super) contents: Vec<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) generation_config: Option<GenerationConfig>,

    /// Built-in tools (currently only web grounding).
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(super) tools: Vec<Tool>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(super) struct Content {
    /// `user` or `model`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) role: Option<&'static str>,

    pub(super) parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(super) struct Part {
    pub(super) text: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) top_p: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) max_output_tokens: Option<u32>,

    /// `application/json` when structured output is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) response_mime_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) response_schema: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) thinking_config: Option<ThinkingConfig>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) struct ThinkingConfig {
    pub(super) thinking_budget: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(super) enum Tool {
    GoogleSearch {},
}

impl GeminiRequest {
    /// Build the upstream request. The unary and streaming paths share
    /// this so their options cannot diverge; streaming differs only in
    /// the endpoint.
    pub(super) fn build(params: &GenerateParams) -> Self {
        let history = shape_history(
            &params.history,
            ShapeOptions {
                require_user_first: true,
                char_budget: Some(HISTORY_CHAR_BUDGET),
            },
        );

        let mut contents: Vec<Content> = history
            .into_iter()
            .map(|m| Content {
                role: Some(match m.role {
                    Role::User => "user",
                    Role::Assistant => "model",
                }),
                parts: vec![Part { text: m.content }],
            })
            .collect();

        contents.push(Content {
            role: Some("user"),
            parts: vec![Part {
                text: params.user_input.clone(),
            }],
        });

        let thinking_config = params
            .config
            .extra_options
            .get("thinking_budget")
            .and_then(|v| v.parse().ok())
            .map(|thinking_budget| ThinkingConfig { thinking_budget });

        let (response_mime_type, response_schema) = match &params.structured_output {
            Some(schema) => (Some("application/json".to_string()), Some(schema.clone())),
            None => (None, None),
        };

        let generation_config = GenerationConfig {
            temperature: params.config.temperature,
            top_p: params.config.top_p,
            max_output_tokens: params.config.max_output_tokens,
            response_mime_type,
            response_schema,
            thinking_config,
        };

        let mut tools = Vec::new();
        if params.enable_web_search {
            tools.push(Tool::GoogleSearch {});
        }

        Self {
            system_instruction: (!params.instructions.is_empty()).then(|| Content {
                role: None,
                parts: vec![Part {
                    text: params.instructions.clone(),
                }],
            }),
            contents,
            generation_config: Some(generation_config),
            tools,
        }
    }
}
