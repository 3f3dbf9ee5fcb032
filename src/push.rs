//! Push-event classification.
//!
//! Push events arrive over an opaque channel and are schema-loose: the
//! backend has used several field names for both the event type and the
//! chat reference. They are used strictly as refresh triggers: the engine
//! refetches the affected chat through the pull API and never merges event
//! payload data directly.

use crate::chat::ChatId;

#[derive(Clone, Debug, PartialEq)]
pub struct PushEvent {
    pub event_type: String,
    pub chat_id: Option<ChatId>,
}

fn id_from_value(value: &serde_json::Value) -> Option<ChatId> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

impl PushEvent {
    pub fn new(event_type: &str, chat_id: Option<ChatId>) -> Self {
        Self {
            event_type: event_type.to_string(),
            chat_id,
        }
    }

    /// Extract the type and chat reference from a raw event payload,
    /// tolerating the field-name drift observed upstream.
    pub fn parse(raw: &serde_json::Value) -> Self {
        let event_type = ["type", "category", "kind", "verb"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(|v| v.as_str()))
            .unwrap_or("")
            .to_lowercase();

        let chat_id = ["chat_id", "conversation_id", "chat"]
            .iter()
            .find_map(|key| raw.get(*key).and_then(id_from_value))
            .or_else(|| {
                // Nested target shape: { target: { type: "chat", id: .. } }
                let target = raw.get("target")?;
                let target_type = target.get("type")?.as_str()?;
                if target_type.eq_ignore_ascii_case("chat") {
                    target.get("id").and_then(id_from_value)
                } else {
                    None
                }
            });

        Self { event_type, chat_id }
    }

    /// Whether this event concerns the messaging subsystem. Everything else
    /// belongs to other notification categories and is ignored here.
    pub fn is_chat_relevant(&self) -> bool {
        self.event_type.contains("message") || self.event_type.contains("chat") || self.chat_id.is_some()
    }
}
