//! Pull/poll/push synchronization driver.
//!
//! This module owns the orchestration around the store:
//! - initial bulk load of chats and the global unread counter
//! - a fixed-interval background refresh of the list, the open chat, and
//!   every chat showing unread activity
//! - push-event-triggered targeted refetches, bypassing the next poll tick
//! - the at-most-one-in-flight-fetch-per-chat discipline
//! - the optimistic send and open/mark-read transitions
//!
//! Background failures are logged and retried on the next scheduled tick -
//! the interval itself is the throttle, so there is no backoff. Only the
//! user-initiated send surfaces an error.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};

use crate::chat::{Chat, ChatId};
use crate::error::ChatError;
use crate::message::Message;
use crate::net::ChatBackend;
use crate::push::PushEvent;
use crate::state::ChatStore;

#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// Cadence of the background refresh.
    pub poll_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
        }
    }
}

pub struct SyncDriver {
    store: Arc<ChatStore>,
    backend: Arc<dyn ChatBackend>,
    config: SyncConfig,
    /// Chats with an outstanding message fetch. A refetch for a chat already
    /// here is dropped, relying on the in-flight request's response.
    in_flight: Mutex<HashSet<ChatId>>,
    /// Chats whose preview has already been backfilled this session.
    prefetched: Mutex<HashSet<ChatId>>,
    closed: AtomicBool,
}

impl SyncDriver {
    pub fn new(store: Arc<ChatStore>, backend: Arc<dyn ChatBackend>, config: SyncConfig) -> Self {
        Self {
            store,
            backend,
            config,
            in_flight: Mutex::new(HashSet::new()),
            prefetched: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &Arc<ChatStore> {
        &self.store
    }

    /// Stop applying responses and let `run` exit. There is no cancellation
    /// of in-flight requests; their late responses are simply discarded.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    /// Initial bulk load on view mount.
    pub async fn init(&self) {
        self.refresh_chat_list().await;
        self.refresh_unread_total().await;
    }

    /// Drive the sync loop until shutdown or until the push transport closes.
    pub async fn run(&self, mut push_rx: mpsc::UnboundedReceiver<PushEvent>) {
        self.init().await;

        let start = tokio::time::Instant::now() + self.config.poll_interval;
        let mut ticker = tokio::time::interval_at(start, self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if self.is_closed() {
                break;
            }
            tokio::select! {
                _ = ticker.tick() => self.poll_tick().await,
                event = push_rx.recv() => match event {
                    Some(event) => self.handle_push(event).await,
                    // Transport gone: the session is tearing down.
                    None => break,
                },
            }
        }
    }

    /// One background refresh pass.
    pub async fn poll_tick(&self) {
        self.refresh_chat_list().await;
        self.refresh_unread_total().await;

        for chat_id in self.store.refetch_targets().await {
            self.refresh_chat(chat_id).await;
        }

        // One-shot backfill so previews show without the user clicking.
        for chat_id in self.store.chats_missing_preview().await {
            let first_time = self.prefetched.lock().await.insert(chat_id);
            if first_time {
                self.refresh_chat(chat_id).await;
            }
        }
    }

    /// React to a push event. The event payload is never merged as data -
    /// a relevant event only triggers an immediate refetch.
    pub async fn handle_push(&self, event: PushEvent) {
        if !event.is_chat_relevant() {
            log::debug!("ignoring push event type '{}'", event.event_type);
            return;
        }
        if let Some(chat_id) = event.chat_id {
            self.refresh_chat(chat_id).await;
        }
        self.refresh_chat_list().await;
        self.refresh_unread_total().await;
    }

    pub async fn refresh_chat_list(&self) {
        match self.backend.list_chats().await {
            Ok(chats) => {
                if !self.is_closed() {
                    self.store.merge_chat_list(chats).await;
                }
            }
            Err(e) => log::warn!("chat list refresh failed: {}", e),
        }
    }

    pub async fn refresh_unread_total(&self) {
        match self.backend.unread_total().await {
            Ok(total) => {
                if !self.is_closed() {
                    self.store.set_unread_total(total).await;
                }
            }
            Err(e) => log::warn!("unread count refresh failed: {}", e),
        }
    }

    /// Fetch a chat's messages and merge them, unless a fetch for the same
    /// chat is already outstanding.
    pub async fn refresh_chat(&self, chat_id: ChatId) {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(chat_id) {
                log::debug!("coalescing refetch for chat {}", chat_id);
                return;
            }
        }

        let result = self.backend.list_messages(chat_id).await;
        self.in_flight.lock().await.remove(&chat_id);

        match result {
            Ok(messages) => {
                // A response landing after teardown is discarded, not
                // applied: it could regress the cache.
                if self.is_closed() {
                    return;
                }
                self.store.merge_messages(chat_id, messages).await;
            }
            Err(e) => log::warn!("message fetch for chat {} failed: {}", chat_id, e),
        }
    }

    /// Open a chat: optimistic local read state first, server confirmation
    /// after. A failed confirmation keeps the optimistic state: a stale
    /// unread badge the user already dismissed must not come back.
    pub async fn open_chat(&self, chat_id: ChatId) -> Result<(), ChatError> {
        self.store.open_chat(chat_id).await?;
        self.refresh_chat(chat_id).await;

        match self.backend.mark_chat_read(chat_id).await {
            Ok(()) => {
                self.store.finish_read(chat_id).await;
                // Badge counts elsewhere in the UI reflect the change.
                self.refresh_unread_total().await;
            }
            Err(e) => {
                log::warn!(
                    "mark-read for chat {} failed: {}; keeping optimistic read state",
                    chat_id,
                    e
                );
                self.store.finish_read(chat_id).await;
            }
        }
        Ok(())
    }

    /// Send a message: the pending entry lands in the cache immediately, the
    /// confirmed record replaces it when the server answers. On failure the
    /// entry is retained as failed and the error is returned to the caller.
    pub async fn send_message(&self, chat_id: ChatId, content: &str) -> Result<Message, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }

        let pending = self.store.add_pending(chat_id, content).await?;
        match self.backend.send_message(chat_id, content).await {
            Ok(confirmed) => {
                self.store
                    .confirm_pending(chat_id, &pending.id, confirmed.clone())
                    .await;
                // Keep list previews fresh after a send.
                self.refresh_chat_list().await;
                Ok(confirmed)
            }
            Err(e) => {
                self.store.mark_send_failed(chat_id, &pending.id).await;
                Err(e)
            }
        }
    }

    /// First-contact bootstrap: create (or fetch) the chat with the given
    /// participants and select it.
    pub async fn create_chat(&self, employer: u64, cleaner: u64) -> Result<Chat, ChatError> {
        let chat = self.backend.create_chat(employer, cleaner).await?;
        let chat = self.store.insert_chat(chat).await;
        self.open_chat(chat.id).await?;
        Ok(chat)
    }

    /// Archive a chat. Archived chats stay listed but refuse new sends.
    pub async fn archive_chat(&self, chat_id: ChatId, reason: &str) -> Result<(), ChatError> {
        self.backend.archive_chat(chat_id, reason).await?;
        self.store.set_archived(chat_id).await;
        Ok(())
    }
}
