//! Wire types of the assistant service.
//!
//! These mirror the service's JSON bodies. Conversion into domain
//! [`Message`]s happens here so both the history and streaming paths share
//! the same role normalization.

use serde::{Deserialize, Serialize};

use crate::conversation::{Message, Role};

/// `GET /conversations`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ThreadList {
    #[serde(default)]
    pub threads: Vec<String>,
}

/// `GET /conversations/{id}` and `POST /chat` responses.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageList {
    #[serde(default)]
    pub messages: Vec<RemoteMessage>,
}

/// Body of `POST /chat` and `POST /chat/stream`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub thread_id: String,
    pub messages: Vec<String>,
}

/// Data payload of one stream event: the next increment of assistant output.
///
/// `messages` is required; a payload without it is malformed.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamBatch {
    pub messages: Vec<RemoteMessage>,
}

impl StreamBatch {
    /// Parse one event's data payload.
    pub fn parse(data: &str) -> serde_json::Result<Self> {
        serde_json::from_str(data)
    }
}

/// A message as the service represents it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub role: String,
    pub content: String,
}

impl RemoteMessage {
    /// Convert a persisted message, keeping the server id when present.
    #[must_use]
    pub fn into_history_message(self) -> Message {
        Message::new(Role::from_remote(&self.role), self.content).with_remote_id(self.id)
    }

    /// Convert a streamed message. Always gets a fresh local id and the
    /// arrival timestamp; server ids are not reconciled.
    #[must_use]
    pub fn into_streamed_message(self) -> Message {
        Message::new(Role::from_remote(&self.role), self.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_batch_parse() {
        let batch =
            StreamBatch::parse(r#"{"messages":[{"role":"assistant","content":"hello"}]}"#).unwrap();
        assert_eq!(batch.messages.len(), 1);
        assert_eq!(batch.messages[0].content, "hello");
        assert!(batch.messages[0].id.is_none());
    }

    #[test]
    fn test_stream_batch_may_be_empty() {
        let batch = StreamBatch::parse(r#"{"messages":[]}"#).unwrap();
        assert!(batch.messages.is_empty());
    }

    #[test]
    fn test_stream_batch_rejects_wrong_shape() {
        assert!(StreamBatch::parse("not json").is_err());
        assert!(StreamBatch::parse(r#"{"text":"hi"}"#).is_err());
        assert!(StreamBatch::parse(r#"{"messages":"hi"}"#).is_err());
        assert!(StreamBatch::parse(r#"{"messages":[{"role":"assistant"}]}"#).is_err());
    }

    #[test]
    fn test_missing_role_is_assistant() {
        let batch = StreamBatch::parse(r#"{"messages":[{"content":"x"}]}"#).unwrap();
        let message = batch.messages[0].clone().into_streamed_message();
        assert_eq!(message.role, Role::Assistant);
    }

    #[test]
    fn test_history_conversion_keeps_server_id() {
        let remote = RemoteMessage {
            id: Some("42".into()),
            role: "tool".into(),
            content: "result".into(),
        };
        let message = remote.into_history_message();
        assert_eq!(message.id, "42");
        assert_eq!(message.role, Role::Assistant);
    }

    #[test]
    fn test_streamed_conversion_ignores_server_id() {
        let remote = RemoteMessage {
            id: Some("42".into()),
            role: "user".into(),
            content: "echo".into(),
        };
        let message = remote.into_streamed_message();
        assert_ne!(message.id, "42");
        assert_eq!(message.role, Role::User);
    }

    #[test]
    fn test_chat_request_body() {
        let body = serde_json::to_value(ChatRequest {
            thread_id: "t1".into(),
            messages: vec!["hi".into()],
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "thread_id": "t1", "messages": ["hi"] }));
    }
}
