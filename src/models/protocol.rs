use crate::database::DocumentMetadata;
use crate::utils::error::GatewayError;
use serde::{Deserialize, Serialize};

/// Inbound frame. Anything that does not parse into this shape takes the
/// malformed-input error path before the pipeline starts.
#[derive(Debug, Clone, Deserialize)]
pub struct QuestionMessage {
    pub question: String,
}

/// Final answer payload carried inside the terminal result event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerationResult {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorTag {
    pub error: &'static str,
}

/// One outbound unit. Exists only on the wire; the serialized shapes are
/// part of the client contract and must not drift.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ProtocolEvent {
    Status {
        status: &'static str,
    },
    Token {
        status: &'static str,
        token: String,
    },
    Result {
        data: GenerationResult,
        metadata: Vec<DocumentMetadata>,
    },
    Error {
        data: ErrorBody,
        metadata: Vec<ErrorTag>,
    },
}

pub const STATUS_PROCESSING: &str = "Processing your message";
pub const STATUS_RETRIEVING: &str = "Performing similarity search";
pub const STATUS_GENERATING: &str = "Receiving the AI response";
pub const STATUS_PERSISTING: &str = "Formatting the response and adding to conversation memory";
pub const STATUS_FINISHED: &str = "Finished";
const STATUS_TOKEN: &str = "Received new token";

impl ProtocolEvent {
    pub fn status(status: &'static str) -> Self {
        ProtocolEvent::Status { status }
    }

    pub fn token(token: impl Into<String>) -> Self {
        ProtocolEvent::Token {
            status: STATUS_TOKEN,
            token: token.into(),
        }
    }

    pub fn result(text: impl Into<String>, metadata: Vec<DocumentMetadata>) -> Self {
        ProtocolEvent::Result {
            data: GenerationResult { text: text.into() },
            metadata,
        }
    }

    pub fn error(err: &GatewayError) -> Self {
        ProtocolEvent::Error {
            data: ErrorBody {
                message: err.user_message().to_string(),
                kind: "error",
            },
            metadata: vec![ErrorTag { error: err.tag() }],
        }
    }

    /// Serialize for the wire.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn as_value(event: &ProtocolEvent) -> Value {
        serde_json::from_str(&event.to_json()).unwrap()
    }

    #[test]
    fn status_event_shape() {
        let v = as_value(&ProtocolEvent::status(STATUS_PROCESSING));
        assert_eq!(v, json!({ "status": "Processing your message" }));
    }

    #[test]
    fn token_event_shape() {
        let v = as_value(&ProtocolEvent::token("Organic"));
        assert_eq!(v, json!({ "status": "Received new token", "token": "Organic" }));
    }

    #[test]
    fn result_event_shape_preserves_metadata_order() {
        let metadata = vec![
            DocumentMetadata { source: "a.pdf".into(), page: 3 },
            DocumentMetadata { source: "b.pdf".into(), page: 1 },
        ];
        let v = as_value(&ProtocolEvent::result("Organic cotton is...", metadata));
        assert_eq!(v["data"]["text"], "Organic cotton is...");
        assert_eq!(v["metadata"][0]["source"], "a.pdf");
        assert_eq!(v["metadata"][0]["page"], 3);
        assert_eq!(v["metadata"][1]["source"], "b.pdf");
        assert_eq!(v["metadata"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn error_event_shape_for_context_length() {
        let v = as_value(&ProtocolEvent::error(&GatewayError::ContextLengthExceeded));
        assert_eq!(v["data"]["type"], "error");
        assert_eq!(v["metadata"], json!([{ "error": "context_length_exceeded" }]));
        assert!(v["data"]["message"]
            .as_str()
            .unwrap()
            .contains("reduce the length"));
    }

    #[test]
    fn error_event_shape_for_generic_failure() {
        let v = as_value(&ProtocolEvent::error(&GatewayError::Retrieval("down".into())));
        assert_eq!(v["metadata"], json!([{ "error": "unexpected_error" }]));
        assert_eq!(v["data"]["message"], "An unexpected error occurred. Please try again.");
    }

    #[test]
    fn inbound_message_requires_question_field() {
        assert!(serde_json::from_str::<QuestionMessage>(r#"{"question":"hi"}"#).is_ok());
        assert!(serde_json::from_str::<QuestionMessage>(r#"{"question":""}"#).is_ok());
        assert!(serde_json::from_str::<QuestionMessage>(r#"{"q":"hi"}"#).is_err());
        assert!(serde_json::from_str::<QuestionMessage>("not json").is_err());
    }
}
