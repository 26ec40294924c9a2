use thiserror::Error;

/// Failure taxonomy for one question-answer exchange. Every error is caught
/// at the exchange boundary and converted into exactly one terminal error
/// event; nothing propagates to the transport layer.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("context length exceeded")]
    ContextLengthExceeded,

    #[error("retrieval error: {0}")]
    Retrieval(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl GatewayError {
    /// Wire-level metadata tag for the terminal error payload.
    pub fn tag(&self) -> &'static str {
        match self {
            GatewayError::ContextLengthExceeded => "context_length_exceeded",
            _ => "unexpected_error",
        }
    }

    /// User-facing message. Only context-length exhaustion is actionable;
    /// everything else gets the generic retry message.
    pub fn user_message(&self) -> &'static str {
        match self {
            GatewayError::ContextLengthExceeded => {
                "The context length has exceeded the model limit. Please reduce the length of your query."
            }
            _ => "An unexpected error occurred. Please try again.",
        }
    }
}

impl From<sqlx::Error> for GatewayError {
    fn from(e: sqlx::Error) -> Self {
        GatewayError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_length_maps_to_actionable_payload() {
        let err = GatewayError::ContextLengthExceeded;
        assert_eq!(err.tag(), "context_length_exceeded");
        assert!(err.user_message().contains("reduce the length"));
    }

    #[test]
    fn everything_else_maps_to_generic_payload() {
        let errors = [
            GatewayError::MalformedInput("not json".into()),
            GatewayError::Retrieval("index down".into()),
            GatewayError::Generation("upstream 500".into()),
            GatewayError::Storage("pool closed".into()),
        ];
        for err in errors {
            assert_eq!(err.tag(), "unexpected_error");
            assert_eq!(err.user_message(), "An unexpected error occurred. Please try again.");
        }
    }
}
