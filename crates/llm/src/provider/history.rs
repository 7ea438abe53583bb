//! Conversation history shaping shared by the adapters.

use crate::{ChatMessage, Role};

/// Per-provider shaping requirements.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ShapeOptions {
    /// The upstream rejects histories that open with an assistant turn.
    pub require_user_first: bool,
    /// Character budget for the whole history; when exceeded, the oldest
    /// turns are dropped first.
    pub char_budget: Option<usize>,
}

/// Normalize a history for an upstream: trim whitespace, drop empty
/// turns, truncate oldest-first to the budget, and prepend a synthetic
/// user turn when the upstream forbids assistant-first conversations.
pub(crate) fn shape_history(history: &[ChatMessage], options: ShapeOptions) -> Vec<ChatMessage> {
    let mut shaped: Vec<ChatMessage> = history
        .iter()
        .map(|m| ChatMessage {
            role: m.role,
            content: m.content.trim().to_string(),
        })
        .filter(|m| !m.content.is_empty())
        .collect();

    if let Some(budget) = options.char_budget {
        let mut total = 0usize;
        let mut keep_from = shaped.len();

        // Walk from the newest turn backwards; everything before
        // `keep_from` is dropped.
        for (i, message) in shaped.iter().enumerate().rev() {
            if total + message.content.len() > budget {
                break;
            }
            total += message.content.len();
            keep_from = i;
        }

        shaped.drain(..keep_from);
    }

    if options.require_user_first && shaped.first().is_some_and(|m| m.role == Role::Assistant) {
        shaped.insert(0, ChatMessage::user("[continuing conversation]"));
    }

    shaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_and_drops_empty_turns() {
        let history = vec![
            ChatMessage::user("  hello  "),
            ChatMessage::assistant("   "),
            ChatMessage::assistant("hi"),
        ];

        let shaped = shape_history(&history, ShapeOptions::default());
        assert_eq!(shaped.len(), 2);
        assert_eq!(shaped[0].content, "hello");
        assert_eq!(shaped[1].content, "hi");
    }

    #[test]
    fn assistant_first_gets_synthetic_user_turn() {
        let history = vec![ChatMessage::assistant("previous answer"), ChatMessage::user("and then?")];

        let shaped = shape_history(
            &history,
            ShapeOptions {
                require_user_first: true,
                char_budget: None,
            },
        );

        assert_eq!(shaped.len(), 3);
        assert_eq!(shaped[0].role, Role::User);
        assert_eq!(shaped[0].content, "[continuing conversation]");
    }

    #[test]
    fn tolerant_upstreams_keep_assistant_first() {
        let history = vec![ChatMessage::assistant("previous answer")];
        let shaped = shape_history(&history, ShapeOptions::default());
        assert_eq!(shaped[0].role, Role::Assistant);
    }

    #[test]
    fn truncation_keeps_newest() {
        let history = vec![
            ChatMessage::user("oldest-oldest"),
            ChatMessage::assistant("middle"),
            ChatMessage::user("newest"),
        ];

        let shaped = shape_history(
            &history,
            ShapeOptions {
                require_user_first: false,
                char_budget: Some("middle".len() + "newest".len()),
            },
        );

        assert_eq!(shaped.len(), 2);
        assert_eq!(shaped[0].content, "middle");
        assert_eq!(shaped[1].content, "newest");
    }

    #[test]
    fn truncation_of_everything_yields_empty() {
        let history = vec![ChatMessage::user("too long to fit at all")];
        let shaped = shape_history(
            &history,
            ShapeOptions {
                require_user_first: true,
                char_budget: Some(4),
            },
        );
        assert!(shaped.is_empty());
    }
}
