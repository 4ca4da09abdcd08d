//! Message domain types.
//!
//! Messages are the value objects that flow through a conversation:
//! the user submits one, the orchestrator turns it into a generation request,
//! and the decoded answer comes back as another. They are never mutated after
//! creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Conversation-scoped message identifier. Ordering by id equals chronological order.
pub type MessageId = u64;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The end user
    User,
    /// The generation backend
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A plain-text attachment produced by an ingestion pipeline (document, audio
/// transcript, fetched URL).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Source kind, e.g. "document", "transcript", "url".
    pub kind: String,
    pub name: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_hint: Option<String>,
}

impl Attachment {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            content: content.into(),
            mime_hint: None,
        }
    }
}

/// An encoded image (base64 payload plus media type).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBlob {
    pub media_type: String,
    pub data_base64: String,
}

impl ImageBlob {
    /// Render as a `data:` URL for backends that accept inline images.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data_base64)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,

    pub role: Role,

    /// The text content
    pub content: String,

    /// Generated code attached to an assistant turn (builder mode).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageBlob>,

    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new user message.
    pub fn user(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(id: MessageId, content: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant, content)
    }

    fn new(id: MessageId, role: Role, content: impl Into<String>) -> Self {
        Self {
            id,
            role,
            content: content.into(),
            code: None,
            attachments: Vec::new(),
            images: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn with_images(mut self, images: Vec<ImageBlob>) -> Self {
        self.images = images;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_user_message() {
        let msg = Message::user(1, "Hello!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello!");
        assert!(msg.code.is_none());
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn builder_methods_attach_payloads() {
        let msg = Message::assistant(2, "Here is your page")
            .with_code("<html></html>")
            .with_attachments(vec![Attachment::new("document", "brief.txt", "brief text")]);
        assert_eq!(msg.code.as_deref(), Some("<html></html>"));
        assert_eq!(msg.attachments[0].name, "brief.txt");
    }

    #[test]
    fn optional_fields_are_skipped_when_empty() {
        let json = serde_json::to_string(&Message::user(3, "hi")).unwrap();
        assert!(!json.contains("code"));
        assert!(!json.contains("attachments"));
        assert!(json.contains(r#""role":"user""#));
    }

    #[test]
    fn image_data_url() {
        let img = ImageBlob {
            media_type: "image/png".into(),
            data_base64: "AAAA".into(),
        };
        assert_eq!(img.data_url(), "data:image/png;base64,AAAA");
    }
}
