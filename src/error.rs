//! Error types for the conversation sync engine.

use crate::chat::ChatId;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat not found: {0}")]
    ChatNotFound(ChatId),

    #[error("chat {0} is archived and cannot receive new messages")]
    ChatArchived(ChatId),

    #[error("a message for chat {0} is still awaiting confirmation")]
    SendInFlight(ChatId),

    #[error("cannot send an empty message")]
    EmptyMessage,

    #[error(transparent)]
    Net(#[from] reqwest::Error),

    #[error("backend rejected the request ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("malformed backend response: {0}")]
    InvalidResponse(String),
}

impl serde::Serialize for ChatError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
