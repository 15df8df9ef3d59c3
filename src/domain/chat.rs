//! Conversation, message and user entities used by the chat gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The slice of a user record this core needs for authorization and delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub wallet_id: Uuid,
    pub push_token: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub participants: [Uuid; 2],
    pub messaging_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// True when the participant set is exactly `{a, b}`.
    pub fn is_between(&self, a: Uuid, b: Uuid) -> bool {
        let [x, y] = self.participants;
        (x == a && y == b) || (x == b && y == a)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
    Announcement,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
            MessageKind::Announcement => "announcement",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageKind::Text),
            "file" => Ok(MessageKind::File),
            "announcement" => Ok(MessageKind::Announcement),
            other => Err(format!("unknown message kind: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// `None` for system announcements.
    pub sender_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: Uuid,
    pub sender_id: Option<Uuid>,
    pub kind: MessageKind,
    pub content: Option<String>,
    pub attachment_id: Option<Uuid>,
}

impl NewMessage {
    /// A user-authored message; the kind follows from whether a file is attached.
    pub fn from_user(
        conversation_id: Uuid,
        sender_id: Uuid,
        content: Option<String>,
        attachment_id: Option<Uuid>,
    ) -> Self {
        let kind = if attachment_id.is_some() {
            MessageKind::File
        } else {
            MessageKind::Text
        };
        Self {
            conversation_id,
            sender_id: Some(sender_id),
            kind,
            content,
            attachment_id,
        }
    }

    pub fn announcement(conversation_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            conversation_id,
            sender_id: None,
            kind: MessageKind::Announcement,
            content: Some(content.into()),
            attachment_id: None,
        }
    }

    pub fn into_message(self, created_at: DateTime<Utc>) -> Message {
        Message {
            id: Uuid::new_v4(),
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            kind: self.kind,
            content: self.content,
            attachment_id: self.attachment_id,
            created_at,
        }
    }
}

/// File metadata resolved after a message commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Uuid,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gift {
    pub id: Uuid,
    pub name: String,
    pub points: bigdecimal::BigDecimal,
    pub image_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_participant_set_is_unordered() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = Utc::now();
        let conversation = Conversation {
            id: Uuid::new_v4(),
            participants: [a, b],
            messaging_enabled: true,
            created_at: now,
            updated_at: now,
        };
        assert!(conversation.is_between(a, b));
        assert!(conversation.is_between(b, a));
        assert!(!conversation.is_between(a, Uuid::new_v4()));
    }

    #[test]
    fn test_kind_follows_attachment() {
        let text = NewMessage::from_user(Uuid::new_v4(), Uuid::new_v4(), Some("hi".into()), None);
        assert_eq!(text.kind, MessageKind::Text);

        let file = NewMessage::from_user(Uuid::new_v4(), Uuid::new_v4(), None, Some(Uuid::new_v4()));
        assert_eq!(file.kind, MessageKind::File);

        let note = NewMessage::announcement(Uuid::new_v4(), "You are now friends");
        assert_eq!(note.kind, MessageKind::Announcement);
        assert!(note.sender_id.is_none());
    }
}
