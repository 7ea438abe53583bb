use serde::Serialize;

use crate::provider::{ShapeOptions, shape_history};
use crate::{GenerateParams, Role};

/// Anthropic rejects oversized payloads outright; keep the replayed
/// history bounded well below that.
const HISTORY_CHAR_BUDGET: usize = 300_000;

/// `max_tokens` is mandatory on the Messages API.
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Request body for the Anthropic Messages API (`POST /v1/messages`).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub(super) struct AnthropicRequest {
    pub(super) model: String,

    /// System prompt; Anthropic takes it outside the message list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) system: Option<String>,

    /// Conversation turns, oldest first. Must start with a user turn.
    pub(super) messages: Vec<AnthropicMessage>,

    pub(super) max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) top_p: Option<f64>,

    /// Extended thinking budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) thinking: Option<Thinking>,

    /// Processing tier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) service_tier: Option<String>,

    pub(super) stream: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub(super) struct AnthropicMessage {
    pub(super) role: &'static str,
    pub(super) content: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(super) enum Thinking {
    Enabled {
        budget_tokens: u32,
    },
}

impl AnthropicRequest {
    /// Build the upstream request. Shared by the unary and streaming
    /// paths so the applied options cannot diverge between them.
    pub(super) fn build(params: &GenerateParams, stream: bool) -> Self {
        let history = shape_history(
            &params.history,
            ShapeOptions {
                require_user_first: true,
                char_budget: Some(HISTORY_CHAR_BUDGET),
            },
        );

        let mut messages: Vec<AnthropicMessage> = history
            .into_iter()
            .map(|m| AnthropicMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: m.content,
            })
            .collect();

        messages.push(AnthropicMessage {
            role: "user",
            content: params.user_input.clone(),
        });

        let thinking = params
            .config
            .extra_options
            .get("thinking_budget")
            .and_then(|v| v.parse().ok())
            .map(|budget_tokens| Thinking::Enabled { budget_tokens });

        Self {
            model: params.config.model.clone(),
            system: (!params.instructions.is_empty()).then(|| params.instructions.clone()),
            messages,
            max_tokens: params.config.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: params.config.temperature,
            top_p: params.config.top_p,
            thinking,
            service_tier: params.config.extra_options.get("service_tier").cloned(),
            stream,
        }
    }
}
