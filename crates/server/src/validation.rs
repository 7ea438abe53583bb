//! Size and shape limits enforced at the service boundary.

use crate::error::ServiceError;
use crate::wire::GenerateRequest;

/// Maximum size of the user input in bytes (100 KB).
pub const MAX_USER_INPUT_BYTES: usize = 100 * 1024;

/// Maximum size of the system instructions in bytes (50 KB).
pub const MAX_INSTRUCTIONS_BYTES: usize = 50 * 1024;

/// Maximum number of conversation history turns.
pub const MAX_HISTORY_COUNT: usize = 100;

/// Maximum number of metadata entries.
pub const MAX_METADATA_ENTRIES: usize = 50;

/// Validate the chat request envelope's sizes.
pub fn validate_generate_request(request: &GenerateRequest) -> Result<(), ServiceError> {
    if request.user_input.len() > MAX_USER_INPUT_BYTES {
        return Err(ServiceError::InvalidArgument(format!(
            "user_input exceeds maximum size: {} bytes (max {MAX_USER_INPUT_BYTES})",
            request.user_input.len()
        )));
    }

    if request.instructions.len() > MAX_INSTRUCTIONS_BYTES {
        return Err(ServiceError::InvalidArgument(format!(
            "instructions exceed maximum size: {} bytes (max {MAX_INSTRUCTIONS_BYTES})",
            request.instructions.len()
        )));
    }

    if request.conversation_history.len() > MAX_HISTORY_COUNT {
        return Err(ServiceError::InvalidArgument(format!(
            "conversation_history exceeds maximum length: {} messages (max {MAX_HISTORY_COUNT})",
            request.conversation_history.len()
        )));
    }

    if request.metadata.len() > MAX_METADATA_ENTRIES {
        return Err(ServiceError::InvalidArgument(format!(
            "metadata exceeds maximum entries: {} (max {MAX_METADATA_ENTRIES})",
            request.metadata.len()
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_sizes() {
        let mut request = GenerateRequest {
            user_input: "x".repeat(MAX_USER_INPUT_BYTES),
            ..GenerateRequest::default()
        };
        validate_generate_request(&request).unwrap();

        request.user_input.push('x');
        assert!(matches!(
            validate_generate_request(&request),
            Err(ServiceError::InvalidArgument(_))
        ));
    }

    #[test]
    fn history_count_boundary() {
        let mut request = GenerateRequest::default();
        request.conversation_history = (0..MAX_HISTORY_COUNT).map(|_| llm::ChatMessage::user("hi")).collect();
        validate_generate_request(&request).unwrap();

        request.conversation_history.push(llm::ChatMessage::user("one too many"));
        assert!(validate_generate_request(&request).is_err());
    }

    #[test]
    fn instructions_and_metadata_limits() {
        let mut request = GenerateRequest::default();
        request.instructions = "x".repeat(MAX_INSTRUCTIONS_BYTES + 1);
        assert!(validate_generate_request(&request).is_err());

        let mut request = GenerateRequest::default();
        request.metadata = (0..=MAX_METADATA_ENTRIES)
            .map(|i| (format!("k{i}"), "v".to_string()))
            .collect();
        assert!(validate_generate_request(&request).is_err());
    }
}
