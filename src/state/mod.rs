//! State management for the conversation sync engine.
//!
//! This module contains:
//! - `chat_state`: the ChatState struct and its merge/derivation methods
//! - `store`: the owned, subscribable store wrapping ChatState
//! - `read`: ReadPhase enum for per-chat read transitions

mod chat_state;
mod read;
mod store;

pub use chat_state::ChatState;
pub use read::ReadPhase;
pub use store::{ChatStore, StoreUpdate};
