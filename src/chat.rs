//! Chat (conversation) entity and its message cache.
//!
//! A chat is a persistent thread between exactly two participants: the
//! employer who books cleaning work and the cleaner who provides it. The
//! message cache is kept ordered by effective timestamp and never evicted
//! within a session.

use crate::message::Message;
use crate::state::ReadPhase;

pub type ChatId = u64;

/// Reference to the account behind a participant.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UserRef {
    pub id: Option<u64>,
    pub name: Option<String>,
}

/// One side of a conversation. Carries the marketplace profile id and,
/// where the backend includes it, the underlying account reference: a
/// message author may be identified by either id.
#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Participant {
    pub id: Option<u64>,
    pub user: Option<UserRef>,
}

impl Participant {
    /// All ids this participant is known by, stringified for comparison
    /// against the loosely-typed author id on messages.
    pub fn id_strings(&self) -> Vec<String> {
        let mut ids = Vec::with_capacity(2);
        if let Some(user) = &self.user {
            if let Some(id) = user.id {
                ids.push(id.to_string());
            }
        }
        if let Some(id) = self.id {
            ids.push(id.to_string());
        }
        ids
    }

    pub fn display_name(&self) -> Option<&str> {
        self.user.as_ref().and_then(|u| u.name.as_deref())
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone, Debug, PartialEq)]
pub struct Chat {
    pub id: ChatId,
    pub employer: Participant,
    pub cleaner: Participant,
    /// False once archived: archived chats reject new sends.
    pub is_active: bool,
    /// Server-attached summary of the newest message; updates independently
    /// of the local cache and is never inserted into it.
    pub last_message: Option<Message>,
    /// Server unread counters. The backend has used several field names for
    /// this concept over time; all are kept and probed in a fixed order.
    pub unread_messages_count: Option<u32>,
    pub unread_count: Option<u32>,
    pub unread: Option<u32>,
    pub unread_for_employer: Option<u32>,
    pub unread_for_cleaner: Option<u32>,
    pub created_at: Option<u64>,
    pub updated_at: Option<u64>,
    /// Ordered message cache, merged from fetches and optimistic sends.
    pub messages: Vec<Message>,
    /// Read-transition state, local only.
    #[serde(skip, default)]
    pub read_phase: ReadPhase,
}

impl Chat {
    pub fn new(id: ChatId, employer: Participant, cleaner: Participant) -> Self {
        Self {
            id,
            employer,
            cleaner,
            is_active: true,
            last_message: None,
            unread_messages_count: None,
            unread_count: None,
            unread: None,
            unread_for_employer: None,
            unread_for_cleaner: None,
            created_at: None,
            updated_at: None,
            messages: Vec::new(),
            read_phase: ReadPhase::Unopened,
        }
    }

    /// Effective timestamp of the newest locally cached message.
    pub fn newest_message_time(&self) -> Option<u64> {
        self.messages.last().map(|msg| msg.effective_at())
    }

    /// Timestamp of the server's last-message summary.
    pub fn server_last_message_time(&self) -> Option<u64> {
        self.last_message.as_ref().map(|msg| msg.effective_at())
    }

    /// First present value among the server unread counter fields.
    pub fn server_unread(&self) -> Option<u32> {
        self.unread_messages_count
            .or(self.unread_count)
            .or(self.unread)
            .or(self.unread_for_employer)
            .or(self.unread_for_cleaner)
    }

    /// Get a mutable message by ID
    pub fn get_message_mut(&mut self, id: &str) -> Option<&mut Message> {
        self.messages.iter_mut().find(|msg| msg.id == id)
    }

    /// The newest message still awaiting server confirmation, if any.
    pub fn newest_pending(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.pending && !m.failed)
    }

    /// Add a message to this chat's cache.
    ///
    /// Dedups by id, replaces a matching pending entry in place when a
    /// confirmed counterpart arrives, and otherwise inserts at the position
    /// given by the effective timestamp (ties keep insertion order).
    ///
    /// Returns true when the cache changed.
    pub fn internal_add_message(&mut self, message: Message) -> bool {
        // Make sure we don't add the same message twice
        if self.messages.iter().any(|m| m.id == message.id) {
            return false;
        }

        // A confirmed message matching the newest pending entry by content is
        // that entry's server echo: replace it instead of appending. Sends
        // are single-flight per chat, so the content match is unambiguous.
        if message.is_confirmed() {
            if let Some(pending_id) = self
                .newest_pending()
                .filter(|p| p.content == message.content)
                .map(|p| p.id.clone())
            {
                self.messages.retain(|m| m.id != pending_id);
                self.insert_ordered(message);
                return true;
            }
        }

        self.insert_ordered(message);
        true
    }

    /// Ordered insert with fast paths for the common append/prepend cases.
    fn insert_ordered(&mut self, message: Message) {
        let at = message.effective_at();
        if self.messages.is_empty() {
            self.messages.push(message);
        } else if at >= self.messages.last().map(|m| m.effective_at()).unwrap_or(0) {
            // Common case 1: Latest message (append to end)
            self.messages.push(message);
        } else if at < self.messages.first().map(|m| m.effective_at()).unwrap_or(0) {
            // Common case 2: Oldest message (insert at beginning)
            self.messages.insert(0, message);
        } else {
            // Less common case: Message belongs somewhere in the middle.
            // partition_point keeps equal timestamps in insertion order.
            let idx = self.messages.partition_point(|m| m.effective_at() <= at);
            self.messages.insert(idx, message);
        }
    }

    /// Replace a pending entry with its confirmed counterpart.
    ///
    /// Falls back to a plain merge if the pending entry is already gone
    /// (a poll fetch can deliver the confirmation first).
    pub fn confirm_pending(&mut self, pending_id: &str, confirmed: Message) -> bool {
        self.messages.retain(|m| m.id != pending_id);
        self.internal_add_message(confirmed)
    }

    /// Mark a pending entry as failed to send. The entry is retained so the
    /// user's composed text is not silently lost; it is never auto-retried.
    pub fn mark_send_failed(&mut self, pending_id: &str) -> bool {
        if let Some(msg) = self.get_message_mut(pending_id) {
            msg.failed = true;
            msg.pending = false;
            true
        } else {
            false
        }
    }

    /// The participant across from the viewer: the name shown in list rows
    /// and the conversation header.
    pub fn get_other_participant(&self, viewer: crate::resolver::ChatParty) -> &Participant {
        match viewer {
            crate::resolver::ChatParty::Employer => &self.cleaner,
            crate::resolver::ChatParty::Cleaner => &self.employer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SenderSignal;

    fn confirmed(id: &str, at: u64) -> Message {
        Message {
            id: id.to_string(),
            chat_id: 1,
            content: format!("msg {}", id),
            sent_at: Some(at),
            local_at: at,
            sender: SenderSignal::default(),
            is_read: Some(false),
            pending: false,
            failed: false,
        }
    }

    #[test]
    fn test_add_message_keeps_order() {
        let mut chat = Chat::new(1, Participant::default(), Participant::default());
        assert!(chat.internal_add_message(confirmed("b", 200)));
        assert!(chat.internal_add_message(confirmed("a", 100)));
        assert!(chat.internal_add_message(confirmed("d", 400)));
        assert!(chat.internal_add_message(confirmed("c", 300)));

        let ids: Vec<&str> = chat.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_add_message_is_idempotent() {
        let mut chat = Chat::new(1, Participant::default(), Participant::default());
        assert!(chat.internal_add_message(confirmed("a", 100)));
        assert!(!chat.internal_add_message(confirmed("a", 100)));
        assert_eq!(chat.messages.len(), 1);
    }

    #[test]
    fn test_equal_timestamps_keep_insertion_order() {
        let mut chat = Chat::new(1, Participant::default(), Participant::default());
        chat.internal_add_message(confirmed("first", 100));
        chat.internal_add_message(confirmed("second", 100));
        let ids: Vec<&str> = chat.messages.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_confirmed_replaces_matching_pending() {
        let mut chat = Chat::new(1, Participant::default(), Participant::default());
        let pending = Message::new_pending(1, "hello", SenderSignal::from_code("e"));
        let pending_id = pending.id.clone();
        chat.internal_add_message(pending);

        let mut echo = confirmed("42", 500);
        echo.content = "hello".to_string();
        assert!(chat.internal_add_message(echo));

        assert_eq!(chat.messages.len(), 1);
        assert_eq!(chat.messages[0].id, "42");
        assert!(chat.messages.iter().all(|m| m.id != pending_id));
    }

    #[test]
    fn test_confirm_pending_with_clock_skew() {
        let mut chat = Chat::new(1, Participant::default(), Participant::default());
        chat.internal_add_message(confirmed("old", 100));

        let pending = Message::new_pending(1, "hello", SenderSignal::from_code("e"));
        let pending_id = pending.id.clone();
        chat.internal_add_message(pending);

        // Server clock is behind the local clock: the confirmed timestamp
        // sorts before the existing message.
        let mut echo = confirmed("42", 50);
        echo.content = "hello".to_string();
        assert!(chat.confirm_pending(&pending_id, echo));

        assert_eq!(chat.messages.len(), 2);
        assert_eq!(chat.messages[0].id, "42");
        assert_eq!(chat.messages[1].id, "old");
    }

    #[test]
    fn test_mark_send_failed_retains_entry() {
        let mut chat = Chat::new(1, Participant::default(), Participant::default());
        let pending = Message::new_pending(1, "hello", SenderSignal::from_code("e"));
        let pending_id = pending.id.clone();
        chat.internal_add_message(pending);

        assert!(chat.mark_send_failed(&pending_id));
        let msg = &chat.messages[0];
        assert!(msg.failed);
        assert!(!msg.pending);
        assert_eq!(msg.content, "hello");
    }

    #[test]
    fn test_server_unread_probes_fields_in_order() {
        let mut chat = Chat::new(1, Participant::default(), Participant::default());
        assert_eq!(chat.server_unread(), None);

        chat.unread_for_cleaner = Some(5);
        assert_eq!(chat.server_unread(), Some(5));

        chat.unread_count = Some(2);
        assert_eq!(chat.server_unread(), Some(2));

        chat.unread_messages_count = Some(9);
        assert_eq!(chat.server_unread(), Some(9));
    }
}
