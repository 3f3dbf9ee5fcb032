//! Message author resolution.
//!
//! Decides whether a message was authored by the employer or the cleaner of
//! its conversation, using a prioritized chain of weak signals: no single
//! reliable field is guaranteed present upstream:
//!
//! 1. compact role code on the message (cheapest and most reliable when set),
//! 2. numeric author id compared, as a string, against every id either
//!    participant is known by (account id or profile id),
//! 3. textual role field (last resort: observed inconsistently populated).
//!
//! An unresolved message is `Unknown`, never the viewer's own: it still
//! counts toward unread and renders as the other party.

use crate::chat::Chat;
use crate::message::Message;

/// The two roles a conversation participant can have.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatParty {
    Employer,
    Cleaner,
}

/// Which side of the conversation a message belongs to, from the viewer's
/// perspective.
#[derive(serde::Serialize, serde::Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenderSide {
    Mine,
    Theirs,
    Unknown,
}

fn party_from_vocabulary(word: &str) -> Option<ChatParty> {
    match word {
        "e" | "employer" => Some(ChatParty::Employer),
        "c" | "cleaner" | "worker" => Some(ChatParty::Cleaner),
        _ => None,
    }
}

/// Resolve which participant authored the message, or `None` when every
/// signal is absent or inconclusive.
pub fn resolve_party(message: &Message, chat: &Chat) -> Option<ChatParty> {
    // 1. Compact sender code from the backend, e.g. 'e' / 'c'
    if let Some(code) = message.sender.code.as_deref() {
        if let Some(party) = party_from_vocabulary(&code.to_lowercase()) {
            return Some(party);
        }
    }

    // 2. Author id against each participant's known ids (account or profile)
    if let Some(author_id) = message.sender.user_id {
        let author = author_id.to_string();
        if chat.employer.id_strings().contains(&author) {
            return Some(ChatParty::Employer);
        }
        if chat.cleaner.id_strings().contains(&author) {
            return Some(ChatParty::Cleaner);
        }
    }

    // 3. Role-based fallback when id matching fails
    if let Some(role) = message.sender.role.as_deref() {
        if let Some(party) = party_from_vocabulary(&role.to_lowercase()) {
            return Some(party);
        }
    }

    None
}

/// Resolve a message to the viewer's side. Fails closed: an unresolvable
/// author is `Unknown`, which no caller may treat as `Mine`.
pub fn resolve_side(message: &Message, chat: &Chat, viewer: ChatParty) -> SenderSide {
    match resolve_party(message, chat) {
        Some(party) if party == viewer => SenderSide::Mine,
        Some(_) => SenderSide::Theirs,
        None => SenderSide::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Participant, UserRef};
    use crate::message::SenderSignal;

    fn chat_with_ids(employer_user: u64, employer_profile: u64, cleaner_user: u64, cleaner_profile: u64) -> Chat {
        Chat::new(
            1,
            Participant {
                id: Some(employer_profile),
                user: Some(UserRef { id: Some(employer_user), name: Some("Dana".into()) }),
            },
            Participant {
                id: Some(cleaner_profile),
                user: Some(UserRef { id: Some(cleaner_user), name: Some("Kim".into()) }),
            },
        )
    }

    fn message_with(sender: SenderSignal) -> Message {
        Message {
            id: "m1".to_string(),
            chat_id: 1,
            content: "hi".to_string(),
            sent_at: Some(1_000),
            local_at: 1_000,
            sender,
            is_read: None,
            pending: false,
            failed: false,
        }
    }

    #[test]
    fn test_compact_code_wins() {
        let chat = chat_with_ids(10, 11, 20, 21);
        // The code says employer even though the id belongs to the cleaner;
        // the code is checked first.
        let msg = message_with(SenderSignal {
            code: Some("E".into()),
            user_id: Some(20),
            role: Some("cleaner".into()),
        });
        assert_eq!(resolve_party(&msg, &chat), Some(ChatParty::Employer));
    }

    #[test]
    fn test_id_matches_account_or_profile() {
        let chat = chat_with_ids(10, 11, 20, 21);

        let by_account = message_with(SenderSignal { code: None, user_id: Some(20), role: None });
        assert_eq!(resolve_party(&by_account, &chat), Some(ChatParty::Cleaner));

        let by_profile = message_with(SenderSignal { code: None, user_id: Some(11), role: None });
        assert_eq!(resolve_party(&by_profile, &chat), Some(ChatParty::Employer));
    }

    #[test]
    fn test_role_fallback_when_id_matches_nothing() {
        let chat = chat_with_ids(10, 11, 20, 21);
        let msg = message_with(SenderSignal {
            code: None,
            user_id: Some(999),
            role: Some("Worker".into()),
        });
        assert_eq!(resolve_party(&msg, &chat), Some(ChatParty::Cleaner));
    }

    #[test]
    fn test_no_signals_is_unknown() {
        let chat = chat_with_ids(10, 11, 20, 21);
        let msg = message_with(SenderSignal::default());
        assert_eq!(resolve_party(&msg, &chat), None);
        assert_eq!(resolve_side(&msg, &chat, ChatParty::Employer), SenderSide::Unknown);
    }

    #[test]
    fn test_side_depends_on_viewer() {
        let chat = chat_with_ids(10, 11, 20, 21);
        let msg = message_with(SenderSignal { code: None, user_id: Some(20), role: None });

        assert_eq!(resolve_side(&msg, &chat, ChatParty::Employer), SenderSide::Theirs);
        assert_eq!(resolve_side(&msg, &chat, ChatParty::Cleaner), SenderSide::Mine);
    }

    #[test]
    fn test_unresolvable_code_falls_through_to_id() {
        let chat = chat_with_ids(10, 11, 20, 21);
        let msg = message_with(SenderSignal {
            code: Some("x".into()),
            user_id: Some(10),
            role: None,
        });
        assert_eq!(resolve_party(&msg, &chat), Some(ChatParty::Employer));
    }
}
