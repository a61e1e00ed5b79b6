use serde::{Deserialize, Serialize};

use crate::models::{ChatRef, GroupProfile, Message, Reaction};

/// Events pushed to connected clients over the gateway.
///
/// These are ephemeral envelopes: never persisted, never retried. A recipient
/// that is not connected at publish time simply misses the push and recovers
/// state from its next bulk fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DeliveryEvent {
    /// Server confirms successful gateway authentication
    Ready { user_id: i64, username: String },

    /// A new message was posted in a chat the recipient belongs to
    Message { chat: ChatRef, message: Message },

    /// A user started or stopped typing. Not persisted; receivers expire the
    /// indicator on their own after a fixed timeout.
    Typing {
        chat: ChatRef,
        user_id: i64,
        username: String,
        is_typing: bool,
    },

    /// A reaction was added to or removed from a message
    Reaction {
        chat: ChatRef,
        message_id: i64,
        action: ReactionAction,
        user_id: i64,
        emoji: String,
        /// Present when `action` is `Added`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reaction: Option<Reaction>,
    },

    /// A message was soft-deleted by its sender
    MessageDeleted { chat: ChatRef, message_id: i64 },

    /// A member's read cursor advanced in a direct conversation
    ConversationUpdate { conversation_id: i64, read_by: i64 },

    /// A member's read cursor advanced in a group chat
    GroupUpdate { group_chat_id: i64, read_by: i64 },

    /// A direct conversation was deleted
    ConversationDeleted { conversation_id: i64 },

    /// A group chat was deleted
    GroupDeleted { group_chat_id: i64 },

    /// A group chat's profile (name/description/avatar) changed
    GroupUpdated { group: GroupProfile },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReactionAction {
    Added,
    Removed,
}

/// Commands sent FROM client TO server over the gateway socket.
///
/// Everything that persists state goes through the REST surface; the socket
/// only carries the authentication handshake and ephemeral typing signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Authenticate the socket connection
    Identify { token: String },

    /// Announce typing state in a chat. Senders are expected to re-announce
    /// at a steady interval while typing and to send `is_typing: false` on send.
    Typing { chat: ChatRef, is_typing: bool },
}
