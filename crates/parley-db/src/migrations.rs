use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE,
            nickname    TEXT,
            avatar      TEXT,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS conversations (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS group_chats (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            description TEXT,
            avatar      TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Message id is the ordering key within a chat: assigned at insert,
        -- strictly ascending, never reordered by wall clock.
        CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id INTEGER REFERENCES conversations(id) ON DELETE CASCADE,
            group_chat_id   INTEGER REFERENCES group_chats(id) ON DELETE CASCADE,
            sender_id       INTEGER NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            attachments     TEXT,
            reply_to_id     INTEGER REFERENCES messages(id),
            deleted         INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            CHECK ((conversation_id IS NULL) != (group_chat_id IS NULL))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, id);
        CREATE INDEX IF NOT EXISTS idx_messages_group
            ON messages(group_chat_id, id);

        CREATE TABLE IF NOT EXISTS conversation_members (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            conversation_id      INTEGER NOT NULL REFERENCES conversations(id) ON DELETE CASCADE,
            user_id              INTEGER NOT NULL REFERENCES users(id),
            last_read_message_id INTEGER REFERENCES messages(id) ON DELETE SET NULL,
            UNIQUE(conversation_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS group_chat_members (
            id                   INTEGER PRIMARY KEY AUTOINCREMENT,
            group_chat_id        INTEGER NOT NULL REFERENCES group_chats(id) ON DELETE CASCADE,
            user_id              INTEGER NOT NULL REFERENCES users(id),
            role                 TEXT NOT NULL DEFAULT 'member',
            last_read_message_id INTEGER REFERENCES messages(id) ON DELETE SET NULL,
            UNIQUE(group_chat_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS reactions (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id  INTEGER NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     INTEGER NOT NULL REFERENCES users(id),
            emoji       TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(message_id, user_id, emoji)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
