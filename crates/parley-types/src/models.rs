use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to the container a message lives in: a direct conversation
/// (exactly two members) or a named group chat. All delivery and read-cursor
/// logic dispatches on this tag only where the underlying query differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ChatRef {
    Direct(i64),
    Group(i64),
}

impl ChatRef {
    pub fn id(&self) -> i64 {
        match self {
            Self::Direct(id) | Self::Group(id) => *id,
        }
    }
}

/// Public user snapshot embedded in message payloads and member lists.
/// Never carries credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

/// Group chat membership role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "member" => Some(Self::Member),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Attachment metadata. URLs are opaque strings pointing at external blob
/// storage; the server passes them through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    pub size: u64,
}

/// Snapshot of a replied-to message, embedded in the reply's payload so
/// clients can render context without an extra fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplySnapshot {
    pub id: i64,
    pub content: String,
    pub sender: UserSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: i64,
    pub message_id: i64,
    pub emoji: String,
    pub user: UserSnapshot,
}

/// A message as delivered to clients. `id` is server-assigned at persistence
/// and is the definitive ordering key within a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub chat: ChatRef,
    pub sender: UserSnapshot,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplySnapshot>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<Reaction>,
    #[serde(default)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

/// Group chat profile (mutable by admins).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub user: UserSnapshot,
    pub role: Role,
}

/// List-view entry for a direct conversation: members, the most recent
/// message, and the caller's derived unread count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: i64,
    pub members: Vec<UserSnapshot>,
    pub last_message: Option<Message>,
    pub unread_count: i64,
    pub updated_at: DateTime<Utc>,
}

/// List-view entry for a group chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupSummary {
    #[serde(flatten)]
    pub group: GroupProfile,
    pub members: Vec<GroupMember>,
    pub last_message: Option<Message>,
    pub unread_count: i64,
}
