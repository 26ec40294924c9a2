pub mod chat;
pub mod protocol;

pub use chat::ChatMessage;
pub use protocol::{ErrorBody, ErrorTag, GenerationResult, ProtocolEvent, QuestionMessage};
