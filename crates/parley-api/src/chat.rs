//! Core chat operations: message delivery, reactions, soft deletion, and the
//! per-member read cursor. Every mutation follows the same shape: validate
//! membership, persist, resolve the member set at action time, then publish
//! one event per member over the bus.
//!
//! HTTP handlers stay thin; everything here is callable (and tested) without
//! any request framing.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tokio::task::spawn_blocking;
use tracing::{debug, warn};

use parley_db::Database;
use parley_db::models::{MessageRow, ReactionRow};
use parley_gateway::bus::EventBus;
use parley_types::events::{DeliveryEvent, ReactionAction};
use parley_types::models::{
    Attachment, ChatRef, Message, Reaction, ReplySnapshot, UserSnapshot,
};

use crate::error::ApiError;

/// Persist a new message and push it to every member of the chat, the sender
/// included (the sender's other connected sessions need the echo too).
///
/// The server-assigned row id is the definitive ordering key; recipients and
/// fetches both order strictly by it, never by wall clock.
pub async fn send_message(
    db: &Arc<Database>,
    bus: &EventBus,
    sender_id: i64,
    chat: ChatRef,
    content: String,
    attachments: Option<Vec<Attachment>>,
    reply_to_id: Option<i64>,
) -> Result<Message, ApiError> {
    let content = content.trim().to_string();
    let attachments = attachments.unwrap_or_default();
    if content.is_empty() && attachments.is_empty() {
        return Err(ApiError::Validation(
            "message content or attachments required".into(),
        ));
    }

    let (message, member_ids) = run_blocking({
        let db = db.clone();
        move || -> Result<(Message, Vec<i64>), ApiError> {
            if db.membership(&chat, sender_id)?.is_none() {
                return Err(ApiError::Forbidden);
            }

            // A reply must target a message in the same chat; anything else
            // rejects the whole send, nothing is persisted.
            let reply_row = match reply_to_id {
                Some(rid) => {
                    let row = db
                        .get_message(rid)?
                        .filter(|r| row_chat(r) == chat)
                        .ok_or(ApiError::NotFound("reply target"))?;
                    Some(row)
                }
                None => None,
            };

            let attachments_json = if attachments.is_empty() {
                None
            } else {
                Some(serde_json::to_string(&attachments).map_err(anyhow::Error::from)?)
            };

            let id = db.insert_message(
                &chat,
                sender_id,
                &content,
                attachments_json.as_deref(),
                reply_to_id,
            )?;
            let row = db
                .get_message(id)?
                .ok_or_else(|| anyhow!("message {} missing right after insert", id))?;

            let reply = reply_row.as_ref().map(reply_snapshot);
            let message = message_from_row(row, vec![], reply);
            let member_ids = db.members_of(&chat)?.into_iter().map(|m| m.user_id).collect();
            Ok((message, member_ids))
        }
    })
    .await?;

    for &uid in &member_ids {
        bus.publish(
            uid,
            DeliveryEvent::Message {
                chat,
                message: message.clone(),
            },
        )
        .await;
    }

    Ok(message)
}

/// Full history of a chat, strictly ascending by id, with reactions grouped
/// per message and reply snapshots resolved from the same fetch (no N+1).
pub async fn get_messages(
    db: &Arc<Database>,
    user_id: i64,
    chat: ChatRef,
) -> Result<Vec<Message>, ApiError> {
    run_blocking({
        let db = db.clone();
        move || -> Result<Vec<Message>, ApiError> {
            if db.membership(&chat, user_id)?.is_none() {
                return Err(ApiError::Forbidden);
            }

            let rows = db.get_messages(&chat)?;
            let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
            let reaction_rows = db.reactions_for_messages(&ids)?;

            let mut reactions_by_message: HashMap<i64, Vec<ReactionRow>> = HashMap::new();
            for r in reaction_rows {
                reactions_by_message.entry(r.message_id).or_default().push(r);
            }

            // Reply targets live in the same chat, so the full fetch already
            // contains them.
            let snapshots: HashMap<i64, ReplySnapshot> =
                rows.iter().map(|r| (r.id, reply_snapshot(r))).collect();

            let messages = rows
                .into_iter()
                .map(|row| {
                    let reactions = reactions_by_message.remove(&row.id).unwrap_or_default();
                    let reply = row.reply_to_id.and_then(|rid| snapshots.get(&rid).cloned());
                    message_from_row(row, reactions, reply)
                })
                .collect();
            Ok(messages)
        }
    })
    .await
}

/// Add a reaction and push it to the chat's current member set (recomputed at
/// action time, so late-joining members receive it too). A duplicate
/// (user, emoji) pair is a no-op and publishes nothing.
pub async fn add_reaction(
    db: &Arc<Database>,
    bus: &EventBus,
    user_id: i64,
    message_id: i64,
    emoji: String,
) -> Result<Option<Reaction>, ApiError> {
    let event_emoji = emoji.clone();
    let (chat, reaction, member_ids) = run_blocking({
        let db = db.clone();
        move || -> Result<(ChatRef, Option<Reaction>, Vec<i64>), ApiError> {
            let row = db
                .get_message(message_id)?
                .ok_or(ApiError::NotFound("message"))?;
            let chat = row_chat(&row);
            if db.membership(&chat, user_id)?.is_none() {
                return Err(ApiError::Forbidden);
            }

            let Some(rid) = db.add_reaction(message_id, user_id, &emoji)? else {
                return Ok((chat, None, vec![]));
            };
            let rrow = db
                .get_reaction(rid)?
                .ok_or_else(|| anyhow!("reaction {} missing right after insert", rid))?;
            let member_ids = db.members_of(&chat)?.into_iter().map(|m| m.user_id).collect();
            Ok((chat, Some(reaction_from_row(rrow)), member_ids))
        }
    })
    .await?;

    if let Some(reaction) = &reaction {
        let event = DeliveryEvent::Reaction {
            chat,
            message_id,
            action: ReactionAction::Added,
            user_id,
            emoji: event_emoji,
            reaction: Some(reaction.clone()),
        };
        for &uid in &member_ids {
            bus.publish(uid, event.clone()).await;
        }
    }

    Ok(reaction)
}

/// Remove the caller's reaction. Removing an absent reaction is a no-op and
/// publishes nothing. Returns whether anything was removed.
pub async fn remove_reaction(
    db: &Arc<Database>,
    bus: &EventBus,
    user_id: i64,
    message_id: i64,
    emoji: String,
) -> Result<bool, ApiError> {
    let event_emoji = emoji.clone();
    let (chat, removed, member_ids) = run_blocking({
        let db = db.clone();
        move || -> Result<(ChatRef, bool, Vec<i64>), ApiError> {
            let row = db
                .get_message(message_id)?
                .ok_or(ApiError::NotFound("message"))?;
            let chat = row_chat(&row);
            if db.membership(&chat, user_id)?.is_none() {
                return Err(ApiError::Forbidden);
            }

            if !db.remove_reaction(message_id, user_id, &emoji)? {
                return Ok((chat, false, vec![]));
            }
            let member_ids = db.members_of(&chat)?.into_iter().map(|m| m.user_id).collect();
            Ok((chat, true, member_ids))
        }
    })
    .await?;

    if removed {
        let event = DeliveryEvent::Reaction {
            chat,
            message_id,
            action: ReactionAction::Removed,
            user_id,
            emoji: event_emoji,
            reaction: None,
        };
        for &uid in &member_ids {
            bus.publish(uid, event.clone()).await;
        }
    }

    Ok(removed)
}

/// Soft-delete a message. Only its sender may do this.
pub async fn delete_message(
    db: &Arc<Database>,
    bus: &EventBus,
    user_id: i64,
    message_id: i64,
) -> Result<(), ApiError> {
    let (chat, member_ids) = run_blocking({
        let db = db.clone();
        move || -> Result<(ChatRef, Vec<i64>), ApiError> {
            let row = db
                .get_message(message_id)?
                .ok_or(ApiError::NotFound("message"))?;
            if row.sender_id != user_id {
                return Err(ApiError::Forbidden);
            }
            let chat = row_chat(&row);
            db.soft_delete_message(message_id)?;
            let member_ids = db.members_of(&chat)?.into_iter().map(|m| m.user_id).collect();
            Ok((chat, member_ids))
        }
    })
    .await?;

    for &uid in &member_ids {
        bus.publish(uid, DeliveryEvent::MessageDeleted { chat, message_id })
            .await;
    }

    Ok(())
}

/// Advance the calling member's read cursor to the chat's newest message and
/// notify every member (reader included) so connected clients can update
/// unread badges without polling.
///
/// Idempotent: with no new messages in between, a second call leaves the
/// cursor untouched. The cursor never regresses; unread counts are always
/// derived from it, never stored.
pub async fn mark_read(
    db: &Arc<Database>,
    bus: &EventBus,
    user_id: i64,
    chat: ChatRef,
) -> Result<(), ApiError> {
    let member_ids = run_blocking({
        let db = db.clone();
        move || -> Result<Vec<i64>, ApiError> {
            if db.membership(&chat, user_id)?.is_none() {
                return Err(ApiError::Forbidden);
            }

            let Some(latest) = db.latest_message_id(&chat)? else {
                // Nothing to read yet
                return Ok(vec![]);
            };

            if !db.mark_read(&chat, user_id, latest)? {
                // Cursor already at or past the newest message. Re-publishing
                // the no-op update is harmless, so fall through.
                debug!(
                    "mark_read for user {} on {:?} did not move the cursor",
                    user_id, chat
                );
            }
            let member_ids = db.members_of(&chat)?.into_iter().map(|m| m.user_id).collect();
            Ok(member_ids)
        }
    })
    .await?;

    let event = match chat {
        ChatRef::Direct(conversation_id) => DeliveryEvent::ConversationUpdate {
            conversation_id,
            read_by: user_id,
        },
        ChatRef::Group(group_chat_id) => DeliveryEvent::GroupUpdate {
            group_chat_id,
            read_by: user_id,
        },
    };
    for &uid in &member_ids {
        bus.publish(uid, event.clone()).await;
    }

    Ok(())
}

/// Run blocking rusqlite work off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(anyhow!("blocking task join error: {}", e)))?
}

// -- Row conversions --

pub(crate) fn row_chat(row: &MessageRow) -> ChatRef {
    match (row.conversation_id, row.group_chat_id) {
        (Some(id), _) => ChatRef::Direct(id),
        (_, Some(id)) => ChatRef::Group(id),
        // Unreachable per the messages table CHECK constraint
        (None, None) => ChatRef::Direct(0),
    }
}

/// Deleted rows keep their place in the sequence but come out blanked:
/// fetches and previews never show the original text or attachments again.
pub(crate) fn message_from_row(
    row: MessageRow,
    reactions: Vec<ReactionRow>,
    reply_to: Option<ReplySnapshot>,
) -> Message {
    let attachments = if row.deleted {
        vec![]
    } else {
        row.attachments
            .as_deref()
            .map(|json| {
                serde_json::from_str::<Vec<Attachment>>(json).unwrap_or_else(|e| {
                    warn!("corrupt attachments on message {}: {}", row.id, e);
                    vec![]
                })
            })
            .unwrap_or_default()
    };

    Message {
        id: row.id,
        chat: row_chat(&row),
        sender: UserSnapshot {
            id: row.sender_id,
            username: row.sender_username,
            nickname: row.sender_nickname,
            avatar: row.sender_avatar,
        },
        content: if row.deleted {
            String::new()
        } else {
            row.content
        },
        attachments,
        reply_to,
        reactions: reactions.into_iter().map(reaction_from_row).collect(),
        deleted: row.deleted,
        created_at: parse_ts(&row.created_at),
    }
}

pub(crate) fn reaction_from_row(row: ReactionRow) -> Reaction {
    Reaction {
        id: row.id,
        message_id: row.message_id,
        emoji: row.emoji,
        user: UserSnapshot {
            id: row.user_id,
            username: row.username,
            nickname: row.nickname,
            avatar: row.avatar,
        },
    }
}

fn reply_snapshot(row: &MessageRow) -> ReplySnapshot {
    ReplySnapshot {
        id: row.id,
        content: if row.deleted {
            String::new()
        } else {
            row.content.clone()
        },
        sender: UserSnapshot {
            id: row.sender_id,
            username: row.sender_username.clone(),
            nickname: row.sender_nickname.clone(),
            avatar: row.sender_avatar.clone(),
        },
    }
}

/// SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
/// Parse as naive UTC and convert, falling back through RFC 3339.
pub(crate) fn parse_ts(s: &str) -> DateTime<Utc> {
    s.parse::<DateTime<Utc>>()
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("corrupt timestamp '{}': {}", s, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        db: Arc<Database>,
        bus: EventBus,
        ann: i64,
        ben: i64,
        chat: ChatRef,
    }

    fn direct_fixture() -> Fixture {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ann = db.create_user("ann", Some("Ann"), "hash").unwrap();
        let ben = db.create_user("ben", None, "hash").unwrap();
        let conv = db.create_conversation(ann, ben).unwrap();
        Fixture {
            db,
            bus: EventBus::new(),
            ann,
            ben,
            chat: ChatRef::Direct(conv),
        }
    }

    fn drain(rx: &mut UnboundedReceiver<DeliveryEvent>) -> Vec<DeliveryEvent> {
        let mut out = vec![];
        while let Ok(event) = rx.try_recv() {
            out.push(event);
        }
        out
    }

    async fn send(f: &Fixture, sender: i64, content: &str) -> Result<Message, ApiError> {
        send_message(&f.db, &f.bus, sender, f.chat, content.into(), None, None).await
    }

    #[tokio::test]
    async fn connected_members_receive_exactly_one_message_event() {
        let f = direct_fixture();
        let (_ta, mut ann_rx) = f.bus.subscribe(f.ann).await;
        let (_tb1, mut ben_rx1) = f.bus.subscribe(f.ben).await;
        let (_tb2, mut ben_rx2) = f.bus.subscribe(f.ben).await;

        let sent = send(&f, f.ann, "hi").await.unwrap();

        for rx in [&mut ann_rx, &mut ben_rx1, &mut ben_rx2] {
            let events = drain(rx);
            assert_eq!(events.len(), 1);
            match &events[0] {
                DeliveryEvent::Message { message, .. } => {
                    assert_eq!(message.id, sent.id);
                    assert_eq!(message.content, "hi");
                }
                other => panic!("expected message event, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn fetch_returns_messages_even_without_subscribers() {
        let f = direct_fixture();
        // Nobody connected: the push is skipped, persistence is not
        let sent = send(&f, f.ann, "offline send").await.unwrap();

        let fetched = get_messages(&f.db, f.ben, f.chat).await.unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, sent.id);
        assert_eq!(fetched[0].sender.username, "ann");
    }

    #[tokio::test]
    async fn fetch_is_strictly_ascending_by_id() {
        let f = direct_fixture();
        for i in 0..6 {
            let who = if i % 2 == 0 { f.ann } else { f.ben };
            send(&f, who, &format!("m{i}")).await.unwrap();
        }
        let fetched = get_messages(&f.db, f.ann, f.chat).await.unwrap();
        assert_eq!(fetched.len(), 6);
        for pair in fetched.windows(2) {
            assert!(pair[0].id < pair[1].id);
        }
    }

    #[tokio::test]
    async fn empty_content_without_attachments_is_rejected() {
        let f = direct_fixture();
        let err = send(&f, f.ann, "   ").await.unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        // Attachment-only sends are fine
        let att = Attachment {
            url: "https://blobs.example/cat.png".into(),
            kind: "image/png".into(),
            name: "cat.png".into(),
            size: 1024,
        };
        let sent = send_message(
            &f.db,
            &f.bus,
            f.ann,
            f.chat,
            "".into(),
            Some(vec![att.clone()]),
            None,
        )
        .await
        .unwrap();
        assert_eq!(sent.attachments, vec![att]);
    }

    #[tokio::test]
    async fn non_members_are_rejected_without_leaking() {
        let f = direct_fixture();
        let eve = f.db.create_user("eve", None, "hash").unwrap();

        let err = send(&f, eve, "let me in").await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
        let err = get_messages(&f.db, eve, f.chat).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        // A nonexistent chat looks identical to one the caller may not see
        let err = get_messages(&f.db, eve, ChatRef::Direct(9999)).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));
    }

    #[tokio::test]
    async fn reply_embeds_a_snapshot_of_the_target() {
        let f = direct_fixture();
        let first = send(&f, f.ann, "original").await.unwrap();

        let reply = send_message(
            &f.db,
            &f.bus,
            f.ben,
            f.chat,
            "reply".into(),
            None,
            Some(first.id),
        )
        .await
        .unwrap();

        let snapshot = reply.reply_to.expect("reply snapshot");
        assert_eq!(snapshot.id, first.id);
        assert_eq!(snapshot.content, "original");
        assert_eq!(snapshot.sender.username, "ann");

        // The fetch path resolves the same snapshot
        let fetched = get_messages(&f.db, f.ann, f.chat).await.unwrap();
        assert_eq!(fetched[1].reply_to.as_ref().unwrap().id, first.id);
    }

    #[tokio::test]
    async fn reply_into_another_chat_is_rejected_and_not_persisted() {
        let f = direct_fixture();
        let cam = f.db.create_user("cam", None, "hash").unwrap();
        let other = ChatRef::Direct(f.db.create_conversation(f.ann, cam).unwrap());
        let elsewhere = send_message(&f.db, &f.bus, f.ann, other, "over here".into(), None, None)
            .await
            .unwrap();

        let err = send_message(
            &f.db,
            &f.bus,
            f.ben,
            f.chat,
            "cross reply".into(),
            None,
            Some(elsewhere.id),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));

        assert!(get_messages(&f.db, f.ben, f.chat).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn mark_read_zeroes_unread_and_notifies_everyone() {
        let f = direct_fixture();
        send(&f, f.ann, "one").await.unwrap();
        send(&f, f.ann, "two").await.unwrap();
        assert_eq!(f.db.unread_count(&f.chat, f.ben).unwrap(), 2);

        let (_ta, mut ann_rx) = f.bus.subscribe(f.ann).await;
        let (_tb, mut ben_rx) = f.bus.subscribe(f.ben).await;

        mark_read(&f.db, &f.bus, f.ben, f.chat).await.unwrap();
        assert_eq!(f.db.unread_count(&f.chat, f.ben).unwrap(), 0);

        // Every member hears about it, the reader included
        for rx in [&mut ann_rx, &mut ben_rx] {
            match drain(rx).as_slice() {
                [DeliveryEvent::ConversationUpdate { read_by, .. }] => {
                    assert_eq!(*read_by, f.ben);
                }
                other => panic!("expected one conversation update, got {:?}", other),
            }
        }

        // Ann's own cursor is independent of Ben's
        assert_eq!(f.db.last_read(&f.chat, f.ann).unwrap(), None);
        assert_eq!(f.db.unread_count(&f.chat, f.ann).unwrap(), 2);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_until_a_new_send() {
        let f = direct_fixture();
        send(&f, f.ann, "one").await.unwrap();

        mark_read(&f.db, &f.bus, f.ben, f.chat).await.unwrap();
        let cursor = f.db.last_read(&f.chat, f.ben).unwrap();
        mark_read(&f.db, &f.bus, f.ben, f.chat).await.unwrap();
        assert_eq!(f.db.last_read(&f.chat, f.ben).unwrap(), cursor);
        assert_eq!(f.db.unread_count(&f.chat, f.ben).unwrap(), 0);

        let newer = send(&f, f.ann, "two").await.unwrap();
        assert_eq!(f.db.unread_count(&f.chat, f.ben).unwrap(), 1);
        mark_read(&f.db, &f.bus, f.ben, f.chat).await.unwrap();
        assert_eq!(f.db.last_read(&f.chat, f.ben).unwrap(), Some(newer.id));
    }

    #[tokio::test]
    async fn mark_read_on_empty_chat_is_a_silent_noop() {
        let f = direct_fixture();
        let (_tb, mut ben_rx) = f.bus.subscribe(f.ben).await;

        mark_read(&f.db, &f.bus, f.ben, f.chat).await.unwrap();
        assert_eq!(f.db.last_read(&f.chat, f.ben).unwrap(), None);
        assert!(drain(&mut ben_rx).is_empty());
    }

    #[tokio::test]
    async fn reactions_publish_to_members_resolved_at_action_time() {
        let f = direct_fixture();
        let sent = send(&f, f.ann, "react to me").await.unwrap();

        // Subscribe only after the send: reaction events still arrive
        let (_tb, mut ben_rx) = f.bus.subscribe(f.ben).await;

        let added = add_reaction(&f.db, &f.bus, f.ben, sent.id, "🔥".into())
            .await
            .unwrap();
        assert!(added.is_some());

        // Duplicate add: no-op, no event
        let dup = add_reaction(&f.db, &f.bus, f.ben, sent.id, "🔥".into())
            .await
            .unwrap();
        assert!(dup.is_none());

        let events = drain(&mut ben_rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DeliveryEvent::Reaction {
                action: ReactionAction::Added,
                ..
            }
        ));

        assert!(
            remove_reaction(&f.db, &f.bus, f.ben, sent.id, "🔥".into())
                .await
                .unwrap()
        );
        // Removing again: no-op, no event
        assert!(
            !remove_reaction(&f.db, &f.bus, f.ben, sent.id, "🔥".into())
                .await
                .unwrap()
        );
        let events = drain(&mut ben_rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            DeliveryEvent::Reaction {
                action: ReactionAction::Removed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn only_the_sender_may_delete_a_message() {
        let f = direct_fixture();
        let sent = send(&f, f.ann, "oops").await.unwrap();

        let err = delete_message(&f.db, &f.bus, f.ben, sent.id).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden));

        let (_tb, mut ben_rx) = f.bus.subscribe(f.ben).await;
        delete_message(&f.db, &f.bus, f.ann, sent.id).await.unwrap();

        match drain(&mut ben_rx).as_slice() {
            [DeliveryEvent::MessageDeleted { message_id, .. }] => {
                assert_eq!(*message_id, sent.id);
            }
            other => panic!("expected one delete event, got {:?}", other),
        }

        let fetched = get_messages(&f.db, f.ann, f.chat).await.unwrap();
        assert!(fetched[0].deleted);
        // Soft-deleted messages stop counting as unread
        assert_eq!(f.db.unread_count(&f.chat, f.ben).unwrap(), 0);
    }

    #[tokio::test]
    async fn deleted_messages_come_back_blanked() {
        let f = direct_fixture();
        let att = Attachment {
            url: "https://blobs.example/doc.pdf".into(),
            kind: "application/pdf".into(),
            name: "doc.pdf".into(),
            size: 2048,
        };
        let sent = send_message(
            &f.db,
            &f.bus,
            f.ann,
            f.chat,
            "secret".into(),
            Some(vec![att]),
            None,
        )
        .await
        .unwrap();
        let reply = send_message(
            &f.db,
            &f.bus,
            f.ben,
            f.chat,
            "quoting you".into(),
            None,
            Some(sent.id),
        )
        .await
        .unwrap();
        assert_eq!(reply.reply_to.as_ref().unwrap().content, "secret");

        delete_message(&f.db, &f.bus, f.ann, sent.id).await.unwrap();

        // Fetch keeps the row in sequence but hides text and attachments,
        // including through the reply snapshot
        let fetched = get_messages(&f.db, f.ben, f.chat).await.unwrap();
        assert!(fetched[0].deleted);
        assert_eq!(fetched[0].content, "");
        assert!(fetched[0].attachments.is_empty());
        assert_eq!(fetched[1].reply_to.as_ref().unwrap().content, "");

        // The list-view preview is blanked the same way
        let preview = f.db.last_message(&f.chat).unwrap().unwrap();
        let preview = message_from_row(preview, vec![], None);
        assert_eq!(preview.content, "quoting you");
        delete_message(&f.db, &f.bus, f.ben, reply.id).await.unwrap();
        let preview = f.db.last_message(&f.chat).unwrap().unwrap();
        let preview = message_from_row(preview, vec![], None);
        assert_eq!(preview.content, "");
    }

    #[tokio::test]
    async fn direct_conversation_walkthrough() {
        // Two members, no prior messages. Ann sends "hi", Ben reads it.
        let f = direct_fixture();
        let (_ta, mut ann_rx) = f.bus.subscribe(f.ann).await;
        let (_tb, mut ben_rx) = f.bus.subscribe(f.ben).await;

        send(&f, f.ann, "hi").await.unwrap();
        match drain(&mut ben_rx).as_slice() {
            [DeliveryEvent::Message { message, .. }] => assert_eq!(message.content, "hi"),
            other => panic!("expected one message event, got {:?}", other),
        }
        drain(&mut ann_rx);

        let fetched = get_messages(&f.db, f.ben, f.chat).await.unwrap();
        assert_eq!(fetched.len(), 1);

        mark_read(&f.db, &f.bus, f.ben, f.chat).await.unwrap();
        match drain(&mut ann_rx).as_slice() {
            [DeliveryEvent::ConversationUpdate { read_by, .. }] => assert_eq!(*read_by, f.ben),
            other => panic!("expected one conversation update, got {:?}", other),
        }

        // Ann's unread state is computed from her own cursor, not Ben's
        assert_eq!(f.db.unread_count(&f.chat, f.ann).unwrap(), 0);
        assert_eq!(f.db.last_read(&f.chat, f.ann).unwrap(), None);
    }
}
