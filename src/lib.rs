//! Conversation synchronization engine for the FindCleaner marketplace.
//!
//! Keeps the chat threads between employers and cleaners, their message
//! histories, and their unread indicators consistent across three
//! eventually-consistent sources: the pull API, a low-frequency poll, and a
//! push-event channel that only signals "something changed". Locally
//! optimistic state (a message just sent, a chat just opened) is reconciled
//! against server-confirmed state as it arrives.
//!
//! The engine is a pure in-process state layer: construct a [`ChatStore`],
//! hand it to a [`SyncDriver`] together with a [`ChatBackend`]
//! implementation (HTTP in production), feed push events into `run`, and
//! subscribe views to [`StoreUpdate`] notifications.

mod chat;
mod error;
mod message;
mod net;
mod push;
mod resolver;
mod state;
mod sync;
mod util;

pub use chat::{Chat, ChatId, Participant, UserRef};
pub use error::ChatError;
pub use message::{Message, SenderSignal};
pub use net::{
    ChatBackend, ChatSnapshot, HttpBackend, ListEnvelope, MessageRecord, ParticipantRecord,
    SenderField, WireId, WireTimestamp, WireUser,
};
pub use push::PushEvent;
pub use resolver::{resolve_party, resolve_side, ChatParty, SenderSide};
pub use state::{ChatState, ChatStore, ReadPhase, StoreUpdate};
pub use sync::{SyncConfig, SyncDriver};
