//! REST boundary: wire records, the backend trait, and the HTTP client.
//!
//! The marketplace API has drifted over time: ids arrive as numbers or
//! numeric strings, timestamps as RFC 3339 or epoch millis, list responses
//! as bare arrays or `{results: [...]}` envelopes, and author fields under
//! several names. The wire types here absorb all of that so the rest of the
//! engine only sees normalized domain values.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use url::Url;

use crate::chat::{Chat, ChatId, Participant, UserRef};
use crate::error::ChatError;
use crate::message::{Message, SenderSignal};
use crate::util;

// ============================================================================
// Loosely-typed wire scalars
// ============================================================================

/// An id that may arrive as a JSON number or a numeric string.
#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum WireId {
    Num(u64),
    Text(String),
}

impl WireId {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            WireId::Num(n) => Some(*n),
            WireId::Text(s) => s.parse().ok(),
        }
    }

    /// Textual form, preserving non-numeric server ids as-is.
    pub fn into_string(self) -> String {
        match self {
            WireId::Num(n) => n.to_string(),
            WireId::Text(s) => s,
        }
    }
}

/// A timestamp that may arrive as epoch milliseconds or an RFC 3339 string.
#[derive(serde::Deserialize, Clone, Debug, PartialEq)]
#[serde(untagged)]
pub enum WireTimestamp {
    Millis(u64),
    Text(String),
}

impl WireTimestamp {
    pub fn as_millis(&self) -> Option<u64> {
        match self {
            WireTimestamp::Millis(ms) => Some(*ms),
            WireTimestamp::Text(s) => chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis().max(0) as u64),
        }
    }
}

/// List responses come either as a bare array or wrapped in `{results}`.
#[derive(serde::Deserialize, Debug)]
#[serde(untagged)]
pub enum ListEnvelope<T> {
    Plain(Vec<T>),
    Paged { results: Vec<T> },
}

impl<T> ListEnvelope<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            ListEnvelope::Plain(items) => items,
            ListEnvelope::Paged { results } => results,
        }
    }
}

// ============================================================================
// Wire records
// ============================================================================

#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct WireUser {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub name: Option<String>,
}

/// The sender field is either a compact role code (`"e"` / `"c"`) or a
/// nested author object.
#[derive(serde::Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum SenderField {
    Code(String),
    Ref {
        #[serde(default)]
        id: Option<WireId>,
        #[serde(default)]
        user: Option<WireUser>,
    },
}

#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct MessageRecord {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub pk: Option<WireId>,
    #[serde(default)]
    pub message_id: Option<WireId>,

    #[serde(default)]
    pub chat: Option<WireId>,
    #[serde(default)]
    pub chat_id: Option<WireId>,

    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub text: Option<String>,

    #[serde(default)]
    pub sent_at: Option<WireTimestamp>,
    #[serde(default, rename = "nxSentAt")]
    pub nx_sent_at: Option<WireTimestamp>,
    #[serde(default)]
    pub created_at: Option<WireTimestamp>,
    #[serde(default)]
    pub timestamp: Option<WireTimestamp>,

    #[serde(default)]
    pub sender: Option<SenderField>,
    #[serde(default, rename = "nxSenderCode")]
    pub nx_sender_code: Option<String>,
    #[serde(default, rename = "nxSenderId")]
    pub nx_sender_id: Option<WireId>,
    #[serde(default)]
    pub sender_user_id: Option<WireId>,
    #[serde(default)]
    pub sender_id: Option<WireId>,
    #[serde(default)]
    pub sender_role: Option<String>,
    #[serde(default, rename = "nxSenderRole")]
    pub nx_sender_role: Option<String>,

    #[serde(default)]
    pub is_read: Option<bool>,
}

impl MessageRecord {
    fn canonical_id(&self) -> Option<WireId> {
        self.id.clone().or_else(|| self.pk.clone()).or_else(|| self.message_id.clone())
    }

    fn sent_at_ms(&self) -> Option<u64> {
        self.nx_sent_at
            .as_ref()
            .or(self.sent_at.as_ref())
            .or(self.created_at.as_ref())
            .or(self.timestamp.as_ref())
            .and_then(|ts| ts.as_millis())
    }

    /// Collapse the drifted author fields into one signal bundle, keeping
    /// the resolver's priority order intact.
    fn sender_signal(&self) -> SenderSignal {
        let mut code = self.nx_sender_code.clone();
        let mut user_id = self
            .nx_sender_id
            .as_ref()
            .or(self.sender_user_id.as_ref())
            .or(self.sender_id.as_ref())
            .and_then(|id| id.as_u64());

        match &self.sender {
            Some(SenderField::Code(flag)) => {
                code = code.or_else(|| Some(flag.clone()));
            }
            Some(SenderField::Ref { id, user }) => {
                user_id = user_id
                    .or_else(|| user.as_ref().and_then(|u| u.id.as_ref()).and_then(|id| id.as_u64()))
                    .or_else(|| id.as_ref().and_then(|id| id.as_u64()));
            }
            None => {}
        }

        SenderSignal {
            code,
            user_id,
            role: self.nx_sender_role.clone().or_else(|| self.sender_role.clone()),
        }
    }

    /// Convert to a domain message. Records with no usable id cannot be
    /// deduplicated and are dropped by the caller.
    pub fn into_message(self, fallback_chat: Option<ChatId>) -> Option<Message> {
        let id = self.canonical_id()?.into_string();
        let chat_id = self
            .chat
            .as_ref()
            .or(self.chat_id.as_ref())
            .and_then(|c| c.as_u64())
            .or(fallback_chat)?;
        let sent_at = self.sent_at_ms();
        let sender = self.sender_signal();
        let content = self
            .content
            .as_deref()
            .or(self.message.as_deref())
            .or(self.text.as_deref())
            .unwrap_or("")
            .to_string();

        Some(Message {
            id,
            chat_id,
            content,
            sent_at,
            local_at: util::now_ms(),
            sender,
            is_read: self.is_read,
            pending: false,
            failed: false,
        })
    }
}

#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct ParticipantRecord {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub user: Option<WireUser>,
}

impl ParticipantRecord {
    fn into_participant(self) -> Participant {
        Participant {
            id: self.id.and_then(|id| id.as_u64()),
            user: self.user.map(|u| UserRef {
                id: u.id.and_then(|id| id.as_u64()),
                name: u.name,
            }),
        }
    }
}

#[derive(serde::Deserialize, Clone, Debug, Default)]
pub struct ChatSnapshot {
    #[serde(default)]
    pub id: Option<WireId>,
    #[serde(default)]
    pub employer: Option<ParticipantRecord>,
    #[serde(default)]
    pub cleaner: Option<ParticipantRecord>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub last_message: Option<MessageRecord>,
    #[serde(default)]
    pub unread_messages_count: Option<u32>,
    #[serde(default)]
    pub unread_count: Option<u32>,
    #[serde(default)]
    pub unread: Option<u32>,
    #[serde(default)]
    pub unread_for_employer: Option<u32>,
    #[serde(default)]
    pub unread_for_cleaner: Option<u32>,
    #[serde(default)]
    pub created_at: Option<WireTimestamp>,
    #[serde(default)]
    pub updated_at: Option<WireTimestamp>,
}

impl ChatSnapshot {
    /// Convert to a domain chat. Snapshots with no usable id are dropped.
    pub fn into_chat(self) -> Option<Chat> {
        let id = self.id.as_ref().and_then(|id| id.as_u64())?;
        let mut chat = Chat::new(
            id,
            self.employer.map(|p| p.into_participant()).unwrap_or_default(),
            self.cleaner.map(|p| p.into_participant()).unwrap_or_default(),
        );
        chat.is_active = self.is_active.unwrap_or(true);
        chat.last_message = self.last_message.and_then(|record| record.into_message(Some(id)));
        chat.unread_messages_count = self.unread_messages_count;
        chat.unread_count = self.unread_count;
        chat.unread = self.unread;
        chat.unread_for_employer = self.unread_for_employer;
        chat.unread_for_cleaner = self.unread_for_cleaner;
        chat.created_at = self.created_at.as_ref().and_then(|ts| ts.as_millis());
        chat.updated_at = self.updated_at.as_ref().and_then(|ts| ts.as_millis());
        Some(chat)
    }
}

#[derive(serde::Deserialize, Debug, Default)]
struct UnreadCountBody {
    #[serde(default)]
    unread_count: Option<u32>,
}

// ============================================================================
// Backend trait
// ============================================================================

/// The server operations this engine consumes. Implemented over HTTP in
/// production and scripted in-memory in tests.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    async fn list_chats(&self) -> Result<Vec<Chat>, ChatError>;
    async fn list_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, ChatError>;
    /// Must fail distinctly (not silently succeed) for archived chats.
    async fn send_message(&self, chat_id: ChatId, content: &str) -> Result<Message, ChatError>;
    async fn mark_chat_read(&self, chat_id: ChatId) -> Result<(), ChatError>;
    async fn unread_total(&self) -> Result<u32, ChatError>;
    async fn create_chat(&self, employer: u64, cleaner: u64) -> Result<Chat, ChatError>;
    async fn archive_chat(&self, chat_id: ChatId, reason: &str) -> Result<(), ChatError>;
}

// ============================================================================
// HTTP implementation
// ============================================================================

pub struct HttpBackend {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base: Url) -> Self {
        Self {
            client: Client::new(),
            base,
            token: None,
        }
    }

    /// Attach the session's bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, ChatError> {
        self.base
            .join(path)
            .map_err(|e| ChatError::InvalidResponse(format!("bad endpoint {}: {}", path, e)))
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn check(res: reqwest::Response) -> Result<reqwest::Response, ChatError> {
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let message = res.text().await.unwrap_or_default();
        let mut message = message.trim().to_string();
        message.truncate(200);
        Err(ChatError::Backend {
            status: status.as_u16(),
            message,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChatError> {
        let res = self.authed(self.client.get(self.endpoint(path)?)).send().await?;
        let res = Self::check(res).await?;
        res.json().await.map_err(ChatError::from)
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, ChatError> {
        let res = self
            .authed(self.client.post(self.endpoint(path)?))
            .json(body)
            .send()
            .await?;
        let res = Self::check(res).await?;
        res.json().await.map_err(ChatError::from)
    }

    async fn post_and_check(&self, path: &str, body: &serde_json::Value) -> Result<(), ChatError> {
        let res = self
            .authed(self.client.post(self.endpoint(path)?))
            .json(body)
            .send()
            .await?;
        Self::check(res).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatBackend for HttpBackend {
    async fn list_chats(&self) -> Result<Vec<Chat>, ChatError> {
        let envelope: ListEnvelope<ChatSnapshot> = self.get_json("api/chats/").await?;
        Ok(envelope
            .into_vec()
            .into_iter()
            .filter_map(|snapshot| snapshot.into_chat())
            .collect())
    }

    async fn list_messages(&self, chat_id: ChatId) -> Result<Vec<Message>, ChatError> {
        let path = format!("api/messages/chat/{}/messages", chat_id);
        let envelope: ListEnvelope<MessageRecord> = self.get_json(&path).await?;
        Ok(envelope
            .into_vec()
            .into_iter()
            .filter_map(|record| record.into_message(Some(chat_id)))
            .collect())
    }

    async fn send_message(&self, chat_id: ChatId, content: &str) -> Result<Message, ChatError> {
        let body = serde_json::json!({ "chat": chat_id, "content": content });
        let record: MessageRecord = self.post_json("api/messages/", &body).await?;
        record
            .into_message(Some(chat_id))
            .ok_or_else(|| ChatError::InvalidResponse("send response had no message id".into()))
    }

    async fn mark_chat_read(&self, chat_id: ChatId) -> Result<(), ChatError> {
        let path = format!("api/messages/chat/{}/mark-all-read/", chat_id);
        self.post_and_check(&path, &serde_json::json!({})).await
    }

    async fn unread_total(&self) -> Result<u32, ChatError> {
        let body: UnreadCountBody = self.get_json("api/messages/unread-count").await?;
        Ok(body.unread_count.unwrap_or(0))
    }

    async fn create_chat(&self, employer: u64, cleaner: u64) -> Result<Chat, ChatError> {
        let body = serde_json::json!({ "employer": employer, "cleaner": cleaner });
        let snapshot: ChatSnapshot = self.post_json("api/chats/", &body).await?;
        snapshot
            .into_chat()
            .ok_or_else(|| ChatError::InvalidResponse("create response had no chat id".into()))
    }

    async fn archive_chat(&self, chat_id: ChatId, reason: &str) -> Result<(), ChatError> {
        let path = format!("api/chats/{}/archive/", chat_id);
        self.post_and_check(&path, &serde_json::json!({ "reason": reason })).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_envelope_both_shapes() {
        let plain: ListEnvelope<u32> = serde_json::from_value(json!([1, 2, 3])).unwrap();
        assert_eq!(plain.into_vec(), vec![1, 2, 3]);

        let paged: ListEnvelope<u32> = serde_json::from_value(json!({"results": [4, 5]})).unwrap();
        assert_eq!(paged.into_vec(), vec![4, 5]);
    }

    #[test]
    fn test_wire_timestamp_both_shapes() {
        let millis: WireTimestamp = serde_json::from_value(json!(1700000000000u64)).unwrap();
        assert_eq!(millis.as_millis(), Some(1_700_000_000_000));

        let text: WireTimestamp = serde_json::from_value(json!("2023-11-14T22:13:20Z")).unwrap();
        assert_eq!(text.as_millis(), Some(1_700_000_000_000));

        let garbage: WireTimestamp = serde_json::from_value(json!("not a date")).unwrap();
        assert_eq!(garbage.as_millis(), None);
    }

    #[test]
    fn test_message_record_with_compact_sender() {
        let record: MessageRecord = serde_json::from_value(json!({
            "id": 91,
            "chat": "4",
            "content": "on my way",
            "sent_at": "2023-11-14T22:13:20+00:00",
            "sender": "e",
            "is_read": false
        }))
        .unwrap();

        let msg = record.into_message(None).unwrap();
        assert_eq!(msg.id, "91");
        assert_eq!(msg.chat_id, 4);
        assert_eq!(msg.sent_at, Some(1_700_000_000_000));
        assert_eq!(msg.sender.code.as_deref(), Some("e"));
        assert_eq!(msg.is_read, Some(false));
        assert!(!msg.pending);
    }

    #[test]
    fn test_message_record_with_nested_sender() {
        let record: MessageRecord = serde_json::from_value(json!({
            "pk": "m-17",
            "content": "done for today",
            "created_at": 1700000005000u64,
            "sender": { "id": 21, "user": { "id": 20, "name": "Kim" } },
            "sender_role": "cleaner"
        }))
        .unwrap();

        let msg = record.into_message(Some(4)).unwrap();
        assert_eq!(msg.id, "m-17");
        assert_eq!(msg.chat_id, 4);
        // The nested user account id wins over the profile id.
        assert_eq!(msg.sender.user_id, Some(20));
        assert_eq!(msg.sender.role.as_deref(), Some("cleaner"));
    }

    #[test]
    fn test_message_record_without_id_is_dropped() {
        let record: MessageRecord =
            serde_json::from_value(json!({ "content": "orphan", "chat": 4 })).unwrap();
        assert!(record.into_message(None).is_none());
    }

    #[test]
    fn test_chat_snapshot_conversion() {
        let snapshot: ChatSnapshot = serde_json::from_value(json!({
            "id": "12",
            "employer": { "id": 11, "user": { "id": 10, "name": "Dana" } },
            "cleaner": { "id": 21, "user": { "id": 20, "name": "Kim" } },
            "is_active": false,
            "unread_count": 3,
            "last_message": { "id": 91, "content": "hi", "sent_at": 1700000000000u64, "sender": "c" },
            "updated_at": "2023-11-14T22:13:20Z"
        }))
        .unwrap();

        let chat = snapshot.into_chat().unwrap();
        assert_eq!(chat.id, 12);
        assert!(!chat.is_active);
        assert_eq!(chat.server_unread(), Some(3));
        assert_eq!(chat.employer.id_strings(), vec!["10", "11"]);
        assert_eq!(chat.server_last_message_time(), Some(1_700_000_000_000));
        assert_eq!(chat.updated_at, Some(1_700_000_000_000));
        assert!(chat.messages.is_empty());
    }

    #[test]
    fn test_chat_snapshot_defaults_to_active() {
        let snapshot: ChatSnapshot = serde_json::from_value(json!({ "id": 1 })).unwrap();
        let chat = snapshot.into_chat().unwrap();
        assert!(chat.is_active);
        assert_eq!(chat.server_unread(), None);
    }
}
