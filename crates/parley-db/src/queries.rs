use anyhow::Result;
use rusqlite::{Connection, params};

use parley_types::models::ChatRef;

use crate::Database;
use crate::models::{ConversationRow, GroupRow, MemberRow, MessageRow, ReactionRow, UserRow};

/// (member table, chat id column) for a chat reference.
fn member_table(chat: &ChatRef) -> (&'static str, &'static str) {
    match chat {
        ChatRef::Direct(_) => ("conversation_members", "conversation_id"),
        ChatRef::Group(_) => ("group_chat_members", "group_chat_id"),
    }
}

/// messages column holding the container id for a chat reference.
fn message_col(chat: &ChatRef) -> &'static str {
    match chat {
        ChatRef::Direct(_) => "conversation_id",
        ChatRef::Group(_) => "group_chat_id",
    }
}

/// container table for a chat reference.
fn container_table(chat: &ChatRef) -> &'static str {
    match chat {
        ChatRef::Direct(_) => "conversations",
        ChatRef::Group(_) => "group_chats",
    }
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        username: &str,
        nickname: Option<&str>,
        password_hash: &str,
    ) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, nickname, password) VALUES (?1, ?2, ?3)",
                params![username, nickname, password_hash],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "username = ?1", &[&username]))
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "id = ?1", &[&id]))
    }

    // -- Conversations --

    /// The direct conversation shared by exactly these two users, if one exists.
    pub fn find_direct_conversation(&self, user_a: i64, user_b: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let id = conn
                .query_row(
                    "SELECT m1.conversation_id
                     FROM conversation_members m1
                     JOIN conversation_members m2
                       ON m1.conversation_id = m2.conversation_id
                     WHERE m1.user_id = ?1 AND m2.user_id = ?2",
                    params![user_a, user_b],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id)
        })
    }

    pub fn create_conversation(&self, user_a: i64, user_b: i64) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("INSERT INTO conversations DEFAULT VALUES", [])?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO conversation_members (conversation_id, user_id) VALUES (?1, ?2), (?1, ?3)",
                params![id, user_a, user_b],
            )?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// Conversations the user belongs to, most recently active first.
    pub fn list_conversations(&self, user_id: i64) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.created_at, c.updated_at
                 FROM conversations c
                 JOIN conversation_members m ON m.conversation_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY c.updated_at DESC, c.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok(ConversationRow {
                        id: row.get(0)?,
                        created_at: row.get(1)?,
                        updated_at: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_conversation(&self, id: i64) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, created_at, updated_at FROM conversations WHERE id = ?1",
                    [id],
                    |row| {
                        Ok(ConversationRow {
                            id: row.get(0)?,
                            created_at: row.get(1)?,
                            updated_at: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Members, messages and reactions go with it via ON DELETE CASCADE.
    pub fn delete_conversation(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM conversations WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Group chats --

    /// Creates the group with `creator_id` as admin and `member_ids` as members.
    pub fn create_group(
        &self,
        name: &str,
        description: Option<&str>,
        creator_id: i64,
        member_ids: &[i64],
    ) -> Result<i64> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO group_chats (name, description) VALUES (?1, ?2)",
                params![name, description],
            )?;
            let id = tx.last_insert_rowid();
            tx.execute(
                "INSERT INTO group_chat_members (group_chat_id, user_id, role) VALUES (?1, ?2, 'admin')",
                params![id, creator_id],
            )?;
            for &uid in member_ids {
                if uid == creator_id {
                    continue;
                }
                tx.execute(
                    "INSERT OR IGNORE INTO group_chat_members (group_chat_id, user_id, role) VALUES (?1, ?2, 'member')",
                    params![id, uid],
                )?;
            }
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn get_group(&self, id: i64) -> Result<Option<GroupRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, description, avatar, created_at, updated_at
                     FROM group_chats WHERE id = ?1",
                    [id],
                    map_group_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Partial update: absent fields keep their current value.
    pub fn update_group(
        &self,
        id: i64,
        name: Option<&str>,
        description: Option<&str>,
        avatar: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE group_chats
                 SET name        = COALESCE(?2, name),
                     description = COALESCE(?3, description),
                     avatar      = COALESCE(?4, avatar),
                     updated_at  = datetime('now')
                 WHERE id = ?1",
                params![id, name, description, avatar],
            )?;
            Ok(n > 0)
        })
    }

    pub fn delete_group(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM group_chats WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    pub fn list_groups(&self, user_id: i64) -> Result<Vec<GroupRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT g.id, g.name, g.description, g.avatar, g.created_at, g.updated_at
                 FROM group_chats g
                 JOIN group_chat_members m ON m.group_chat_id = g.id
                 WHERE m.user_id = ?1
                 ORDER BY g.updated_at DESC, g.id DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_group_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Membership --

    pub fn membership(&self, chat: &ChatRef, user_id: i64) -> Result<Option<MemberRow>> {
        let (table, col) = member_table(chat);
        let role_col = match chat {
            ChatRef::Direct(_) => "NULL",
            ChatRef::Group(_) => "m.role",
        };
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT m.user_id, {role_col}, m.last_read_message_id,
                        u.username, u.nickname, u.avatar
                 FROM {table} m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.{col} = ?1 AND m.user_id = ?2"
            );
            let row = conn
                .query_row(&sql, params![chat.id(), user_id], map_member_row)
                .optional()?;
            Ok(row)
        })
    }

    /// All members of the chat, in join order.
    pub fn members_of(&self, chat: &ChatRef) -> Result<Vec<MemberRow>> {
        let (table, col) = member_table(chat);
        let role_col = match chat {
            ChatRef::Direct(_) => "NULL",
            ChatRef::Group(_) => "m.role",
        };
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT m.user_id, {role_col}, m.last_read_message_id,
                        u.username, u.nickname, u.avatar
                 FROM {table} m
                 JOIN users u ON u.id = m.user_id
                 WHERE m.{col} = ?1
                 ORDER BY m.id ASC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([chat.id()], map_member_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Inserts the message and bumps the container's recency timestamp in one
    /// transaction. Returns the server-assigned id (the ordering key).
    pub fn insert_message(
        &self,
        chat: &ChatRef,
        sender_id: i64,
        content: &str,
        attachments: Option<&str>,
        reply_to_id: Option<i64>,
    ) -> Result<i64> {
        let col = message_col(chat);
        let container = container_table(chat);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let sql = format!(
                "INSERT INTO messages ({col}, sender_id, content, attachments, reply_to_id)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            );
            tx.execute(
                &sql,
                params![chat.id(), sender_id, content, attachments, reply_to_id],
            )?;
            let id = tx.last_insert_rowid();
            let bump = format!("UPDATE {container} SET updated_at = datetime('now') WHERE id = ?1");
            tx.execute(&bump, [chat.id()])?;
            tx.commit()?;
            Ok(id)
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("{MESSAGE_SELECT} WHERE m.id = ?1"),
                    [id],
                    map_message_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Full message history of a chat, strictly ascending by id.
    pub fn get_messages(&self, chat: &ChatRef) -> Result<Vec<MessageRow>> {
        let col = message_col(chat);
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.{col} = ?1 ORDER BY m.id ASC");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([chat.id()], map_message_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Newest message of the chat, if any.
    pub fn last_message(&self, chat: &ChatRef) -> Result<Option<MessageRow>> {
        let col = message_col(chat);
        self.with_conn(|conn| {
            let sql = format!("{MESSAGE_SELECT} WHERE m.{col} = ?1 ORDER BY m.id DESC LIMIT 1");
            let row = conn
                .query_row(&sql, [chat.id()], map_message_row)
                .optional()?;
            Ok(row)
        })
    }

    /// Newest message id in the chat, the target for a mark-read call.
    pub fn latest_message_id(&self, chat: &ChatRef) -> Result<Option<i64>> {
        let col = message_col(chat);
        self.with_conn(|conn| {
            let sql = format!("SELECT MAX(id) FROM messages WHERE {col} = ?1");
            let id: Option<i64> = conn.query_row(&sql, [chat.id()], |row| row.get(0))?;
            Ok(id)
        })
    }

    pub fn soft_delete_message(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("UPDATE messages SET deleted = 1 WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    // -- Read cursors --

    /// Advances the member's read cursor to `message_id`. The guard makes the
    /// update monotonic: a stale caller can never move the cursor backwards.
    /// Returns false when the cursor was already at or past `message_id`.
    pub fn mark_read(&self, chat: &ChatRef, user_id: i64, message_id: i64) -> Result<bool> {
        let (table, col) = member_table(chat);
        self.with_conn(|conn| {
            let sql = format!(
                "UPDATE {table}
                 SET last_read_message_id = ?3
                 WHERE {col} = ?1 AND user_id = ?2
                   AND (last_read_message_id IS NULL OR last_read_message_id < ?3)"
            );
            let n = conn.execute(&sql, params![chat.id(), user_id, message_id])?;
            Ok(n > 0)
        })
    }

    pub fn last_read(&self, chat: &ChatRef, user_id: i64) -> Result<Option<i64>> {
        let (table, col) = member_table(chat);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT last_read_message_id FROM {table} WHERE {col} = ?1 AND user_id = ?2"
            );
            let id: Option<i64> = conn
                .query_row(&sql, params![chat.id(), user_id], |row| row.get(0))
                .optional()?
                .flatten();
            Ok(id)
        })
    }

    /// Derived, never stored: messages past the member's cursor, excluding the
    /// member's own messages and soft-deleted ones.
    pub fn unread_count(&self, chat: &ChatRef, user_id: i64) -> Result<i64> {
        let (table, member_col) = member_table(chat);
        let col = message_col(chat);
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT COUNT(*) FROM messages
                 WHERE {col} = ?1 AND deleted = 0 AND sender_id != ?2
                   AND id > COALESCE(
                       (SELECT last_read_message_id FROM {table}
                        WHERE {member_col} = ?1 AND user_id = ?2), 0)"
            );
            let count = conn.query_row(&sql, params![chat.id(), user_id], |row| row.get(0))?;
            Ok(count)
        })
    }

    // -- Reactions --

    /// Returns the new reaction id, or None if this (user, emoji) pair already
    /// reacted to the message (unique constraint, insert is a no-op).
    pub fn add_reaction(&self, message_id: i64, user_id: i64, emoji: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO reactions (message_id, user_id, emoji) VALUES (?1, ?2, ?3)",
                params![message_id, user_id, emoji],
            )?;
            if n == 0 {
                Ok(None)
            } else {
                Ok(Some(conn.last_insert_rowid()))
            }
        })
    }

    /// Returns false if there was nothing to remove.
    pub fn remove_reaction(&self, message_id: i64, user_id: i64, emoji: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM reactions WHERE message_id = ?1 AND user_id = ?2 AND emoji = ?3",
                params![message_id, user_id, emoji],
            )?;
            Ok(n > 0)
        })
    }

    pub fn get_reaction(&self, id: i64) -> Result<Option<ReactionRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT r.id, r.message_id, r.user_id, r.emoji, u.username, u.nickname, u.avatar
                     FROM reactions r
                     JOIN users u ON u.id = r.user_id
                     WHERE r.id = ?1",
                    [id],
                    map_reaction_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Batch-fetch reactions for a set of message IDs (avoids N+1 in list views).
    pub fn reactions_for_messages(&self, message_ids: &[i64]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT r.id, r.message_id, r.user_id, r.emoji, u.username, u.nickname, u.avatar
                 FROM reactions r
                 JOIN users u ON u.id = r.user_id
                 WHERE r.message_id IN ({})
                 ORDER BY r.id ASC",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let bound: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(bound.as_slice(), map_reaction_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

const MESSAGE_SELECT: &str = "SELECT m.id, m.conversation_id, m.group_chat_id, m.sender_id,
        m.content, m.attachments, m.reply_to_id, m.deleted, m.created_at,
        u.username, u.nickname, u.avatar
 FROM messages m
 JOIN users u ON u.id = m.sender_id";

fn map_message_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        group_chat_id: row.get(2)?,
        sender_id: row.get(3)?,
        content: row.get(4)?,
        attachments: row.get(5)?,
        reply_to_id: row.get(6)?,
        deleted: row.get::<_, i64>(7)? != 0,
        created_at: row.get(8)?,
        sender_username: row.get(9)?,
        sender_nickname: row.get(10)?,
        sender_avatar: row.get(11)?,
    })
}

fn map_member_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemberRow> {
    Ok(MemberRow {
        user_id: row.get(0)?,
        role: row.get(1)?,
        last_read_message_id: row.get(2)?,
        username: row.get(3)?,
        nickname: row.get(4)?,
        avatar: row.get(5)?,
    })
}

fn map_reaction_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        user_id: row.get(2)?,
        emoji: row.get(3)?,
        username: row.get(4)?,
        nickname: row.get(5)?,
        avatar: row.get(6)?,
    })
}

fn map_group_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupRow> {
    Ok(GroupRow {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        avatar: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

fn query_user(
    conn: &Connection,
    filter: &str,
    bound: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, nickname, avatar, password, created_at FROM users WHERE {filter}"
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row(bound, |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                nickname: row.get(2)?,
                avatar: row.get(3)?,
                password: row.get(4)?,
                created_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db_with_users(names: &[&str]) -> (Database, Vec<i64>) {
        let db = Database::open_in_memory().unwrap();
        let ids = names
            .iter()
            .map(|n| db.create_user(n, None, "hash").unwrap())
            .collect();
        (db, ids)
    }

    #[test]
    fn message_ids_are_strictly_ascending() {
        let (db, ids) = db_with_users(&["ann", "ben"]);
        let conv = db.create_conversation(ids[0], ids[1]).unwrap();
        let chat = ChatRef::Direct(conv);

        for i in 0..5 {
            db.insert_message(&chat, ids[i % 2], &format!("m{i}"), None, None)
                .unwrap();
        }

        let rows = db.get_messages(&chat).unwrap();
        assert_eq!(rows.len(), 5);
        for pair in rows.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[test]
    fn mark_read_is_monotonic() {
        let (db, ids) = db_with_users(&["ann", "ben"]);
        let conv = db.create_conversation(ids[0], ids[1]).unwrap();
        let chat = ChatRef::Direct(conv);

        let m1 = db.insert_message(&chat, ids[0], "one", None, None).unwrap();
        let m2 = db.insert_message(&chat, ids[0], "two", None, None).unwrap();

        assert!(db.mark_read(&chat, ids[1], m2).unwrap());
        assert_eq!(db.last_read(&chat, ids[1]).unwrap(), Some(m2));

        // Stale update cannot regress the cursor
        assert!(!db.mark_read(&chat, ids[1], m1).unwrap());
        assert_eq!(db.last_read(&chat, ids[1]).unwrap(), Some(m2));

        // Re-marking the same id is a no-op
        assert!(!db.mark_read(&chat, ids[1], m2).unwrap());
    }

    #[test]
    fn unread_count_is_derived_from_cursor() {
        let (db, ids) = db_with_users(&["ann", "ben"]);
        let conv = db.create_conversation(ids[0], ids[1]).unwrap();
        let chat = ChatRef::Direct(conv);

        // Own messages never count as unread
        db.insert_message(&chat, ids[1], "mine", None, None).unwrap();
        assert_eq!(db.unread_count(&chat, ids[1]).unwrap(), 0);

        let m2 = db.insert_message(&chat, ids[0], "hi", None, None).unwrap();
        db.insert_message(&chat, ids[0], "there", None, None).unwrap();
        assert_eq!(db.unread_count(&chat, ids[1]).unwrap(), 2);

        db.mark_read(&chat, ids[1], m2).unwrap();
        assert_eq!(db.unread_count(&chat, ids[1]).unwrap(), 1);

        let latest = db.latest_message_id(&chat).unwrap().unwrap();
        db.mark_read(&chat, ids[1], latest).unwrap();
        assert_eq!(db.unread_count(&chat, ids[1]).unwrap(), 0);

        // The other member's cursor is untouched
        assert_eq!(db.last_read(&chat, ids[0]).unwrap(), None);
    }

    #[test]
    fn duplicate_reaction_is_ignored() {
        let (db, ids) = db_with_users(&["ann", "ben"]);
        let conv = db.create_conversation(ids[0], ids[1]).unwrap();
        let chat = ChatRef::Direct(conv);
        let mid = db.insert_message(&chat, ids[0], "hi", None, None).unwrap();

        assert!(db.add_reaction(mid, ids[1], "🔥").unwrap().is_some());
        assert!(db.add_reaction(mid, ids[1], "🔥").unwrap().is_none());
        assert_eq!(db.reactions_for_messages(&[mid]).unwrap().len(), 1);

        assert!(db.remove_reaction(mid, ids[1], "🔥").unwrap());
        assert!(!db.remove_reaction(mid, ids[1], "🔥").unwrap());
        assert!(db.reactions_for_messages(&[mid]).unwrap().is_empty());
    }

    #[test]
    fn group_membership_and_roles() {
        let (db, ids) = db_with_users(&["ann", "ben", "cam"]);
        let gid = db
            .create_group("plans", Some("weekend"), ids[0], &[ids[1], ids[2]])
            .unwrap();
        let chat = ChatRef::Group(gid);

        let members = db.members_of(&chat).unwrap();
        assert_eq!(members.len(), 3);
        assert_eq!(members[0].role.as_deref(), Some("admin"));
        assert_eq!(members[1].role.as_deref(), Some("member"));

        assert!(db.membership(&chat, ids[2]).unwrap().is_some());
        let outsider = db.create_user("dee", None, "hash").unwrap();
        assert!(db.membership(&chat, outsider).unwrap().is_none());
    }

    #[test]
    fn conversation_delete_cascades() {
        let (db, ids) = db_with_users(&["ann", "ben"]);
        let conv = db.create_conversation(ids[0], ids[1]).unwrap();
        let chat = ChatRef::Direct(conv);
        let mid = db.insert_message(&chat, ids[0], "hi", None, None).unwrap();
        db.add_reaction(mid, ids[1], "👍").unwrap();

        assert!(db.delete_conversation(conv).unwrap());
        assert!(db.get_message(mid).unwrap().is_none());
        assert!(db.members_of(&chat).unwrap().is_empty());
    }
}
