//! Message types and data structures.
//!
//! A message is either **pending** (created locally at send time, placeholder
//! id, ordered by its local creation clock) or **confirmed** (returned by the
//! server with the canonical id and `sent_at`). A pending entry is replaced,
//! never duplicated, once its confirmed counterpart arrives.

use crate::chat::ChatId;
use crate::util;

/// Author identification signals attached to a message.
///
/// No single field is guaranteed present upstream, so all of them are
/// optional and the resolver walks them in priority order.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SenderSignal {
    /// Compact role code from the backend, e.g. `"e"` / `"c"`.
    pub code: Option<String>,
    /// Numeric account id of the author.
    pub user_id: Option<u64>,
    /// Textual role, e.g. `"employer"` / `"cleaner"`.
    pub role: Option<String>,
}

impl SenderSignal {
    pub fn from_code(code: &str) -> Self {
        Self {
            code: Some(code.to_string()),
            user_id: None,
            role: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.user_id.is_none() && self.role.is_none()
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub id: String,
    pub chat_id: ChatId,
    pub content: String,
    /// Server-confirmed timestamp (epoch ms). `None` while pending.
    pub sent_at: Option<u64>,
    /// Local creation/merge clock (epoch ms): the ordering fallback.
    pub local_at: u64,
    pub sender: SenderSignal,
    /// Authoritative when present; absent on pending messages.
    pub is_read: Option<bool>,
    pub pending: bool,
    pub failed: bool,
}

impl Message {
    /// Create a locally-originated message awaiting server confirmation.
    pub fn new_pending(chat_id: ChatId, content: &str, sender: SenderSignal) -> Self {
        Self {
            id: util::pending_id(),
            chat_id,
            content: content.to_string(),
            sent_at: None,
            local_at: util::now_ms(),
            sender,
            is_read: None,
            pending: true,
            failed: false,
        }
    }

    /// The timestamp used for ordering: confirmed `sent_at` when available,
    /// otherwise the local creation time.
    pub fn effective_at(&self) -> u64 {
        self.sent_at.unwrap_or(self.local_at)
    }

    pub fn is_confirmed(&self) -> bool {
        !self.pending && self.sent_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_message_defaults() {
        let msg = Message::new_pending(7, "hello", SenderSignal::from_code("e"));
        assert!(msg.pending);
        assert!(!msg.failed);
        assert!(msg.id.starts_with("pending-"));
        assert_eq!(msg.sent_at, None);
        assert_eq!(msg.is_read, None);
        assert_eq!(msg.effective_at(), msg.local_at);
    }

    #[test]
    fn test_effective_at_prefers_confirmed_timestamp() {
        let mut msg = Message::new_pending(7, "hello", SenderSignal::default());
        msg.sent_at = Some(1_000);
        msg.pending = false;
        assert_eq!(msg.effective_at(), 1_000);
    }
}
