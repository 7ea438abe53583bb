use serde::Serialize;

use crate::provider::{ShapeOptions, shape_history};
use crate::{ChatMessage, GenerateParams, Role};

/// OpenAI keeps well within this; the budget exists so a hostile history
/// cannot balloon the upstream payload.
const HISTORY_CHAR_BUDGET: usize = 400_000;

/// Request body for the OpenAI Responses API (`POST /v1/responses`).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub(super) struct OpenAiRequest {
    /// Model identifier.
    pub(super) model: String,

    /// System instructions applied to the response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) instructions: Option<String>,

    /// Conversation input items, oldest first.
    pub(super) input: Vec<InputItem>,

    /// Continues a previous response natively instead of replaying
    /// history.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) previous_response_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) top_p: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) max_output_tokens: Option<u32>,

    /// Hosted tools to enable for this response.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(super) tools: Vec<Tool>,

    /// Processing tier (`auto`, `default`, `flex`, `priority`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) service_tier: Option<String>,

    /// Reasoning effort for reasoning-capable models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) reasoning: Option<Reasoning>,

    /// Output text options: verbosity and structured format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) text: Option<TextOptions>,

    pub(super) stream: bool,
}

/// One conversation item.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub(super) struct InputItem {
    pub(super) role: &'static str,
    pub(super) content: String,
}

/// Hosted tool selector.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum Tool {
    WebSearch,
    FileSearch {
        vector_store_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(super) struct Reasoning {
    pub(super) effort: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(super) struct TextOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) verbosity: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) format: Option<TextFormat>,
}

/// Structured output format.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum TextFormat {
    JsonSchema {
        name: String,
        schema: serde_json::Value,
    },
}

impl OpenAiRequest {
    /// Build the upstream request. Shared by the unary and streaming
    /// paths so the applied options cannot diverge between them.
    pub(super) fn build(params: &GenerateParams, stream: bool) -> Self {
        // With native continuity the server already holds the history;
        // replaying it would double every turn.
        let history: Vec<ChatMessage> = if params.response_id.is_some() {
            Vec::new()
        } else {
            shape_history(
                &params.history,
                ShapeOptions {
                    require_user_first: false,
                    char_budget: Some(HISTORY_CHAR_BUDGET),
                },
            )
        };

        let mut input: Vec<InputItem> = history
            .into_iter()
            .map(|m| InputItem {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: m.content,
            })
            .collect();

        input.push(InputItem {
            role: "user",
            content: params.user_input.clone(),
        });

        let mut tools = Vec::new();
        if params.enable_web_search {
            tools.push(Tool::WebSearch);
        }
        if params.enable_file_search
            && let Some(store_id) = &params.file_store_id
        {
            tools.push(Tool::FileSearch {
                vector_store_ids: vec![store_id.clone()],
            });
        }

        let verbosity = params.config.extra_options.get("verbosity").cloned();
        let format = params.structured_output.clone().map(|schema| TextFormat::JsonSchema {
            name: "response".to_string(),
            schema,
        });

        let text = if verbosity.is_some() || format.is_some() {
            Some(TextOptions { verbosity, format })
        } else {
            None
        };

        Self {
            model: params.config.model.clone(),
            instructions: (!params.instructions.is_empty()).then(|| params.instructions.clone()),
            input,
            previous_response_id: params.response_id.clone(),
            temperature: params.config.temperature,
            top_p: params.config.top_p,
            max_output_tokens: params.config.max_output_tokens,
            tools,
            service_tier: params.config.extra_options.get("service_tier").cloned(),
            reasoning: params
                .config
                .extra_options
                .get("reasoning_effort")
                .map(|effort| Reasoning { effort: effort.clone() }),
            text,
            stream,
        }
    }
}
