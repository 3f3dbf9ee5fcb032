//! ChatState struct and methods for managing conversation state.
//!
//! This module contains the core state for the messaging views: the chat
//! list, the per-chat message caches, unread derivation, and recency
//! ordering. All mutation is a targeted merge keyed by chat and message
//! identity: no writer ever wholesale-replaces another's data.

use crate::chat::{Chat, ChatId, Participant};
use crate::error::ChatError;
use crate::message::{Message, SenderSignal};
use crate::resolver::{resolve_side, ChatParty, SenderSide};
use crate::state::ReadPhase;

/// Core conversation state for one signed-in viewer.
#[derive(serde::Serialize, Clone, Debug)]
pub struct ChatState {
    pub(crate) viewer: ChatParty,
    pub(crate) chats: Vec<Chat>,
    pub(crate) open_chat_id: Option<ChatId>,
    /// Server-reported global unread badge count.
    pub(crate) unread_total: u32,
}

fn last_activity_at(chat: &Chat) -> u64 {
    // The local cache and the server summary update independently; take the
    // freshest so a just-sent message reorders immediately and a pushed
    // message is not masked by a stale local value.
    let newest = chat
        .newest_message_time()
        .into_iter()
        .chain(chat.server_last_message_time())
        .max();
    newest
        .or(chat.updated_at)
        .or(chat.created_at)
        .unwrap_or(0)
}

impl ChatState {
    pub fn new(viewer: ChatParty) -> Self {
        Self {
            viewer,
            chats: Vec::new(),
            open_chat_id: None,
            unread_total: 0,
        }
    }

    pub fn viewer(&self) -> ChatParty {
        self.viewer
    }

    /// Get a chat by ID
    pub fn get_chat(&self, id: ChatId) -> Option<&Chat> {
        self.chats.iter().find(|c| c.id == id)
    }

    /// Get a mutable chat by ID
    pub fn get_chat_mut(&mut self, id: ChatId) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|c| c.id == id)
    }

    /// Merge a fresh chat-list snapshot from the server.
    ///
    /// Known chats are updated in place: server-owned fields refresh while
    /// the local message cache and read phase survive. Chats absent from the
    /// snapshot are kept; conversations are never deleted client-side.
    pub fn merge_chat_list(&mut self, incoming: Vec<Chat>) {
        for snapshot in incoming {
            match self.get_chat_mut(snapshot.id) {
                Some(chat) => {
                    chat.employer = snapshot.employer;
                    chat.cleaner = snapshot.cleaner;
                    chat.is_active = snapshot.is_active;
                    chat.last_message = snapshot.last_message;
                    chat.unread_messages_count = snapshot.unread_messages_count;
                    chat.unread_count = snapshot.unread_count;
                    chat.unread = snapshot.unread;
                    chat.unread_for_employer = snapshot.unread_for_employer;
                    chat.unread_for_cleaner = snapshot.unread_for_cleaner;
                    chat.created_at = snapshot.created_at;
                    chat.updated_at = snapshot.updated_at;
                }
                None => self.chats.push(snapshot),
            }
        }
    }

    /// Merge fetched messages into a chat's cache. Creates a stub chat when
    /// the list snapshot hasn't caught up yet (a push refetch can win that
    /// race). Returns how many entries changed.
    pub fn merge_messages(&mut self, chat_id: ChatId, messages: Vec<Message>) -> usize {
        if self.get_chat(chat_id).is_none() {
            self.chats
                .push(Chat::new(chat_id, Participant::default(), Participant::default()));
        }
        let chat = self
            .get_chat_mut(chat_id)
            .expect("chat exists after stub insert");

        let mut changed = 0;
        for message in messages {
            if chat.internal_add_message(message) {
                changed += 1;
            }
        }
        changed
    }

    /// Derive the unread count for a chat.
    ///
    /// The open chat is always 0. Local read flags are preferred once any
    /// message carries one: they update instantly on read without a server
    /// round trip. Otherwise the server counter fields are probed, else 0.
    /// Unresolved authorship counts toward unread (never hides a message as
    /// the viewer's own).
    pub fn unread_for(&self, chat: &Chat) -> u32 {
        if self.open_chat_id == Some(chat.id) {
            return 0;
        }

        let has_read_flag = chat.messages.iter().any(|m| m.is_read.is_some());
        if has_read_flag {
            return chat
                .messages
                .iter()
                .filter(|m| {
                    m.is_read != Some(true)
                        && resolve_side(m, chat, self.viewer) != SenderSide::Mine
                })
                .count() as u32;
        }

        chat.server_unread().unwrap_or(0)
    }

    /// Sum of per-chat unread counts: the instant local counterpart to the
    /// server's global badge value.
    pub fn local_unread_total(&self) -> u32 {
        self.chats.iter().map(|chat| self.unread_for(chat)).sum()
    }

    /// The chat list ordered by most recent activity, newest first.
    /// The sort is stable: chats with equal activity keep their list order.
    pub fn sorted_chats(&self) -> Vec<Chat> {
        let mut chats = self.chats.clone();
        chats.sort_by(|a, b| last_activity_at(b).cmp(&last_activity_at(a)));
        chats
    }

    /// Preview line for the chat list: the freshest of the local cache and
    /// the server's last-message summary, "You: "-prefixed for own messages.
    pub fn preview_for(&self, chat: &Chat) -> String {
        let local = chat.messages.last();
        let server = chat.last_message.as_ref();
        let last = match (local, server) {
            (Some(l), Some(s)) => Some(if l.effective_at() >= s.effective_at() { l } else { s }),
            (Some(l), None) => Some(l),
            (None, s) => s,
        };

        match last {
            Some(msg) if !msg.content.is_empty() => {
                if resolve_side(msg, chat, self.viewer) == SenderSide::Mine {
                    format!("You: {}", msg.content)
                } else {
                    msg.content.clone()
                }
            }
            _ => "No messages yet.".to_string(),
        }
    }

    /// Begin the open/read transition: select the chat, zero its unread
    /// optimistically and mark every cached message from the other party
    /// as read. Leaves the chat in `PendingConfirm` awaiting the server.
    pub fn open_chat(&mut self, chat_id: ChatId) -> Result<(), ChatError> {
        let viewer = self.viewer;
        let chat = self
            .get_chat_mut(chat_id)
            .ok_or(ChatError::ChatNotFound(chat_id))?;

        chat.read_phase = ReadPhase::Opening;
        chat.unread_messages_count = Some(0);

        let snapshot = chat.clone();
        for msg in chat.messages.iter_mut() {
            if resolve_side(msg, &snapshot, viewer) != SenderSide::Mine {
                msg.is_read = Some(true);
            }
        }

        chat.read_phase = ReadPhase::PendingConfirm;
        self.open_chat_id = Some(chat_id);
        Ok(())
    }

    /// Conclude the read transition. Called whether or not the server
    /// confirmed: the optimistic state is never rolled back.
    pub fn finish_read(&mut self, chat_id: ChatId) {
        if let Some(chat) = self.get_chat_mut(chat_id) {
            chat.read_phase = ReadPhase::Read;
        }
    }

    /// Create a pending message for a send in progress.
    pub fn add_pending(&mut self, chat_id: ChatId, content: &str) -> Result<Message, ChatError> {
        let viewer = self.viewer;
        let chat = self
            .get_chat_mut(chat_id)
            .ok_or(ChatError::ChatNotFound(chat_id))?;
        if !chat.is_active {
            return Err(ChatError::ChatArchived(chat_id));
        }
        // Sends are single-flight per chat; this is also what makes the
        // pending/confirmed content match unambiguous on merge.
        if chat.newest_pending().is_some() {
            return Err(ChatError::SendInFlight(chat_id));
        }

        let code = match viewer {
            ChatParty::Employer => "e",
            ChatParty::Cleaner => "c",
        };
        let message = Message::new_pending(chat_id, content, SenderSignal::from_code(code));
        chat.internal_add_message(message.clone());
        Ok(message)
    }
}
