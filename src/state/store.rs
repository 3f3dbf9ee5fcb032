//! The owned conversation store shared by every view.
//!
//! One `ChatStore` per session replaces ambient module-level state: it owns
//! the `ChatState` behind an async mutex and broadcasts a typed update event
//! for every mutation, so independent views (contact list, content pane,
//! badge counters) subscribe and re-read the snapshots they care about.
//! All writers (driver merges, optimistic sends, read transitions) go
//! through the targeted merge methods here; none can clobber another's
//! update wholesale.

use tokio::sync::{broadcast, Mutex};

use crate::chat::{Chat, ChatId};
use crate::error::ChatError;
use crate::message::Message;
use crate::resolver::ChatParty;
use crate::state::ChatState;

/// Update notifications emitted to subscribers after each mutation.
#[derive(serde::Serialize, Clone, Debug, PartialEq)]
pub enum StoreUpdate {
    ChatsRefreshed,
    MessagesMerged { chat_id: ChatId },
    MessageUpdated { chat_id: ChatId },
    UnreadChanged,
    ChatOpened { chat_id: ChatId },
}

pub struct ChatStore {
    viewer: ChatParty,
    state: Mutex<ChatState>,
    updates: broadcast::Sender<StoreUpdate>,
}

impl ChatStore {
    pub fn new(viewer: ChatParty) -> Self {
        let (updates, _) = broadcast::channel(64);
        Self {
            viewer,
            state: Mutex::new(ChatState::new(viewer)),
            updates,
        }
    }

    pub fn viewer(&self) -> ChatParty {
        self.viewer
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreUpdate> {
        self.updates.subscribe()
    }

    fn emit(&self, update: StoreUpdate) {
        // No receivers is fine; views may not have mounted yet.
        let _ = self.updates.send(update);
    }

    // ------------------------------------------------------------------
    // Writers
    // ------------------------------------------------------------------

    pub async fn merge_chat_list(&self, chats: Vec<Chat>) {
        self.state.lock().await.merge_chat_list(chats);
        self.emit(StoreUpdate::ChatsRefreshed);
    }

    pub async fn merge_messages(&self, chat_id: ChatId, messages: Vec<Message>) -> usize {
        let changed = self.state.lock().await.merge_messages(chat_id, messages);
        if changed > 0 {
            self.emit(StoreUpdate::MessagesMerged { chat_id });
        }
        changed
    }

    pub async fn add_pending(&self, chat_id: ChatId, content: &str) -> Result<Message, ChatError> {
        let message = self.state.lock().await.add_pending(chat_id, content)?;
        self.emit(StoreUpdate::MessageUpdated { chat_id });
        Ok(message)
    }

    pub async fn confirm_pending(&self, chat_id: ChatId, pending_id: &str, confirmed: Message) {
        {
            let mut state = self.state.lock().await;
            if let Some(chat) = state.get_chat_mut(chat_id) {
                chat.confirm_pending(pending_id, confirmed);
            }
        }
        self.emit(StoreUpdate::MessageUpdated { chat_id });
    }

    pub async fn mark_send_failed(&self, chat_id: ChatId, pending_id: &str) {
        {
            let mut state = self.state.lock().await;
            if let Some(chat) = state.get_chat_mut(chat_id) {
                chat.mark_send_failed(pending_id);
            }
        }
        self.emit(StoreUpdate::MessageUpdated { chat_id });
    }

    pub async fn open_chat(&self, chat_id: ChatId) -> Result<(), ChatError> {
        self.state.lock().await.open_chat(chat_id)?;
        self.emit(StoreUpdate::ChatOpened { chat_id });
        self.emit(StoreUpdate::UnreadChanged);
        Ok(())
    }

    pub async fn finish_read(&self, chat_id: ChatId) {
        self.state.lock().await.finish_read(chat_id);
    }

    pub async fn set_unread_total(&self, total: u32) {
        {
            let mut state = self.state.lock().await;
            if state.unread_total == total {
                return;
            }
            state.unread_total = total;
        }
        self.emit(StoreUpdate::UnreadChanged);
    }

    pub async fn set_archived(&self, chat_id: ChatId) {
        {
            let mut state = self.state.lock().await;
            if let Some(chat) = state.get_chat_mut(chat_id) {
                chat.is_active = false;
            }
        }
        self.emit(StoreUpdate::ChatsRefreshed);
    }

    /// Insert a freshly created chat, or return the one already known.
    pub async fn insert_chat(&self, chat: Chat) -> Chat {
        let inserted = {
            let mut state = self.state.lock().await;
            match state.get_chat(chat.id) {
                Some(existing) => existing.clone(),
                None => {
                    state.chats.push(chat.clone());
                    chat
                }
            }
        };
        self.emit(StoreUpdate::ChatsRefreshed);
        inserted
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    pub async fn sorted_chats(&self) -> Vec<Chat> {
        self.state.lock().await.sorted_chats()
    }

    pub async fn chat(&self, chat_id: ChatId) -> Option<Chat> {
        self.state.lock().await.get_chat(chat_id).cloned()
    }

    pub async fn messages(&self, chat_id: ChatId) -> Vec<Message> {
        self.state
            .lock()
            .await
            .get_chat(chat_id)
            .map(|chat| chat.messages.clone())
            .unwrap_or_default()
    }

    pub async fn knows_chat(&self, chat_id: ChatId) -> bool {
        self.state.lock().await.get_chat(chat_id).is_some()
    }

    pub async fn open_chat_id(&self) -> Option<ChatId> {
        self.state.lock().await.open_chat_id
    }

    pub async fn unread_for(&self, chat_id: ChatId) -> u32 {
        let state = self.state.lock().await;
        state
            .get_chat(chat_id)
            .map(|chat| state.unread_for(chat))
            .unwrap_or(0)
    }

    pub async fn unread_total(&self) -> u32 {
        self.state.lock().await.unread_total
    }

    pub async fn local_unread_total(&self) -> u32 {
        self.state.lock().await.local_unread_total()
    }

    pub async fn preview_for(&self, chat_id: ChatId) -> Option<String> {
        let state = self.state.lock().await;
        state.get_chat(chat_id).map(|chat| state.preview_for(chat))
    }

    /// Chats the poll loop should refetch this tick: the open chat plus
    /// every chat currently showing unread activity.
    pub async fn refetch_targets(&self) -> Vec<ChatId> {
        let state = self.state.lock().await;
        let mut targets: Vec<ChatId> = Vec::new();
        if let Some(open) = state.open_chat_id {
            targets.push(open);
        }
        for chat in &state.chats {
            if state.unread_for(chat) > 0 && !targets.contains(&chat.id) {
                targets.push(chat.id);
            }
        }
        targets
    }

    /// Chats with no last-message summary and an empty local cache: their
    /// previews need a one-shot background fetch.
    pub async fn chats_missing_preview(&self) -> Vec<ChatId> {
        let state = self.state.lock().await;
        state
            .chats
            .iter()
            .filter(|chat| chat.last_message.is_none() && chat.messages.is_empty())
            .map(|chat| chat.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::Participant;
    use crate::message::SenderSignal;

    fn chat(id: ChatId) -> Chat {
        Chat::new(id, Participant::default(), Participant::default())
    }

    fn message(id: &str, chat_id: ChatId, at: u64) -> Message {
        Message {
            id: id.to_string(),
            chat_id,
            content: format!("msg {}", id),
            sent_at: Some(at),
            local_at: at,
            sender: SenderSignal::from_code("c"),
            is_read: Some(false),
            pending: false,
            failed: false,
        }
    }

    #[tokio::test]
    async fn test_merge_emits_updates() {
        let store = ChatStore::new(ChatParty::Employer);
        let mut rx = store.subscribe();

        store.merge_chat_list(vec![chat(1)]).await;
        assert_eq!(rx.recv().await.unwrap(), StoreUpdate::ChatsRefreshed);

        store.merge_messages(1, vec![message("a", 1, 100)]).await;
        assert_eq!(
            rx.recv().await.unwrap(),
            StoreUpdate::MessagesMerged { chat_id: 1 }
        );
    }

    #[tokio::test]
    async fn test_no_op_merge_emits_nothing() {
        let store = ChatStore::new(ChatParty::Employer);
        store.merge_chat_list(vec![chat(1)]).await;
        store.merge_messages(1, vec![message("a", 1, 100)]).await;

        let mut rx = store.subscribe();
        let changed = store.merge_messages(1, vec![message("a", 1, 100)]).await;
        assert_eq!(changed, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unread_total_dedups_emissions() {
        let store = ChatStore::new(ChatParty::Employer);
        store.set_unread_total(4).await;

        let mut rx = store.subscribe();
        store.set_unread_total(4).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(store.unread_total().await, 4);
    }

    #[tokio::test]
    async fn test_refetch_targets_open_chat_first() {
        let store = ChatStore::new(ChatParty::Employer);
        let mut unread = chat(2);
        unread.unread_count = Some(1);
        store.merge_chat_list(vec![chat(1), unread]).await;
        store.open_chat(1).await.unwrap();

        assert_eq!(store.refetch_targets().await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_insert_chat_returns_existing() {
        let store = ChatStore::new(ChatParty::Employer);
        let mut known = chat(3);
        known.unread_count = Some(7);
        store.merge_chat_list(vec![known]).await;

        let inserted = store.insert_chat(chat(3)).await;
        assert_eq!(inserted.unread_count, Some(7));
    }

    #[tokio::test]
    async fn test_chats_missing_preview() {
        let store = ChatStore::new(ChatParty::Employer);
        let mut with_summary = chat(1);
        with_summary.last_message = Some(message("s", 1, 50));
        store.merge_chat_list(vec![with_summary, chat(2)]).await;
        store.merge_messages(3, vec![message("a", 3, 100)]).await;

        assert_eq!(store.chats_missing_preview().await, vec![2]);
    }
}
