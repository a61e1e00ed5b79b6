/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
    pub password: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: i64,
    pub conversation_id: Option<i64>,
    pub group_chat_id: Option<i64>,
    pub sender_id: i64,
    pub content: String,
    /// JSON-encoded attachment list, if any
    pub attachments: Option<String>,
    pub reply_to_id: Option<i64>,
    pub deleted: bool,
    pub created_at: String,
    // Sender snapshot from the users join
    pub sender_username: String,
    pub sender_nickname: Option<String>,
    pub sender_avatar: Option<String>,
}

pub struct ReactionRow {
    pub id: i64,
    pub message_id: i64,
    pub user_id: i64,
    pub emoji: String,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

/// Join row of (chat, user). `role` is NULL for conversation members.
pub struct MemberRow {
    pub user_id: i64,
    pub role: Option<String>,
    pub last_read_message_id: Option<i64>,
    pub username: String,
    pub nickname: Option<String>,
    pub avatar: Option<String>,
}

pub struct ConversationRow {
    pub id: i64,
    pub created_at: String,
    pub updated_at: String,
}

pub struct GroupRow {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub avatar: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}
