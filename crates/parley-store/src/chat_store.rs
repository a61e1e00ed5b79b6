use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::debug;

use parley_types::events::{DeliveryEvent, ReactionAction};
use parley_types::models::{ChatRef, GroupProfile, Message, Reaction};

/// How long a "user is typing" indicator stays alive without a re-announce.
/// Senders re-announce at a steady interval while typing, so an expired
/// deadline means they stopped.
pub const TYPING_TTL: Duration = Duration::from_secs(5);

/// Lifecycle of one message entry. A pending entry either becomes confirmed
/// (send acknowledged) or is removed (send failed); confirmed entries are
/// removed on delete events. Removal is final — there is no way back into
/// the list, later events for a removed id are discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Confirmed,
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub state: EntryState,
    /// Client-only identifier for optimistic entries, distinct from the
    /// server id space. Cleared on confirmation.
    pub temp_id: Option<String>,
    pub message: Message,
}

#[derive(Default)]
struct ChatView {
    /// Ordered message entries; position is the stable local index.
    entries: Vec<Entry>,
    /// temp_id -> position, for O(1) replacement on confirmation.
    temp_index: HashMap<String, usize>,
    /// user_id -> typing deadline.
    typing: HashMap<i64, (String, Instant)>,
    /// Members known to have read up to the latest message; cleared whenever
    /// a newer message arrives.
    read_by: HashSet<i64>,
}

/// Client-side view of all open chats: merges bulk fetches, locally-created
/// optimistic entries, and live pushed events into one ordered, de-duplicated
/// message list per chat.
#[derive(Default)]
pub struct ChatStore {
    chats: HashMap<ChatRef, ChatView>,
    groups: HashMap<i64, GroupProfile>,
}

impl ChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn view_mut(&mut self, chat: ChatRef) -> &mut ChatView {
        self.chats.entry(chat).or_default()
    }

    /// Replace a chat's history with the result of a bulk fetch. Pending
    /// entries (not yet on the server) are carried over at the tail.
    pub fn set_messages(&mut self, chat: ChatRef, messages: Vec<Message>) {
        let view = self.view_mut(chat);
        let pending: Vec<Entry> = view
            .entries
            .drain(..)
            .filter(|e| e.state == EntryState::Pending)
            .collect();

        view.entries = messages
            .into_iter()
            .map(|message| Entry {
                state: EntryState::Confirmed,
                temp_id: None,
                message,
            })
            .collect();
        view.entries.extend(pending);
        rebuild_temp_index(view);
    }

    /// Add a locally-created message before the server has acknowledged it.
    /// The message's `id` field is meaningless at this point; `temp_id` is
    /// the only key for the entry.
    pub fn add_pending(&mut self, chat: ChatRef, temp_id: &str, message: Message) {
        let view = self.view_mut(chat);
        view.entries.push(Entry {
            state: EntryState::Pending,
            temp_id: Some(temp_id.to_string()),
            message,
        });
        view.temp_index
            .insert(temp_id.to_string(), view.entries.len() - 1);
    }

    /// Replace the pending entry keyed by `temp_id` with the server-confirmed
    /// message, preserving its position. If the pushed copy of the same
    /// message already arrived (dedup by server id), the pending entry is
    /// dropped instead so exactly one entry remains. Returns false when no
    /// such pending entry exists.
    pub fn confirm_send(&mut self, chat: ChatRef, temp_id: &str, message: Message) -> bool {
        let view = self.view_mut(chat);
        let Some(&pos) = view.temp_index.get(temp_id) else {
            return false;
        };

        let echo_already_present = view
            .entries
            .iter()
            .any(|e| e.state == EntryState::Confirmed && e.message.id == message.id);

        if echo_already_present {
            remove_at(view, pos);
        } else {
            let entry = &mut view.entries[pos];
            entry.state = EntryState::Confirmed;
            entry.temp_id = None;
            entry.message = message;
            view.temp_index.remove(temp_id);
        }
        true
    }

    /// Drop the pending entry for a failed send. The error itself is the
    /// caller's to surface; the store does not retry.
    pub fn fail_send(&mut self, chat: ChatRef, temp_id: &str) -> bool {
        let view = self.view_mut(chat);
        match view.temp_index.get(temp_id).copied() {
            Some(pos) => {
                remove_at(view, pos);
                true
            }
            None => false,
        }
    }

    /// Merge one pushed event into local state. Patches targeting messages
    /// that are not in the local list (out-of-order arrival) are discarded,
    /// never an error.
    pub fn apply_event(&mut self, event: DeliveryEvent) {
        match event {
            DeliveryEvent::Message { chat, message } => {
                let view = self.view_mut(chat);
                let duplicate = view
                    .entries
                    .iter()
                    .any(|e| e.state == EntryState::Confirmed && e.message.id == message.id);
                if duplicate {
                    debug!("dropping duplicate push for message {}", message.id);
                    return;
                }
                // Sender stopped typing by sending; a new message also
                // invalidates everyone's latest-read state.
                view.typing.remove(&message.sender.id);
                view.read_by.clear();
                view.entries.push(Entry {
                    state: EntryState::Confirmed,
                    temp_id: None,
                    message,
                });
            }

            DeliveryEvent::Reaction {
                chat,
                message_id,
                action,
                user_id,
                emoji,
                reaction,
            } => {
                let view = self.view_mut(chat);
                let Some(entry) = view
                    .entries
                    .iter_mut()
                    .find(|e| e.state == EntryState::Confirmed && e.message.id == message_id)
                else {
                    debug!("dropping reaction patch for unknown message {}", message_id);
                    return;
                };
                match action {
                    ReactionAction::Added => {
                        if let Some(reaction) = reaction {
                            apply_reaction_add(&mut entry.message, reaction);
                        }
                    }
                    ReactionAction::Removed => {
                        entry
                            .message
                            .reactions
                            .retain(|r| !(r.user.id == user_id && r.emoji == emoji));
                    }
                }
            }

            DeliveryEvent::MessageDeleted { chat, message_id } => {
                let view = self.view_mut(chat);
                match view
                    .entries
                    .iter()
                    .position(|e| e.state == EntryState::Confirmed && e.message.id == message_id)
                {
                    Some(pos) => remove_at(view, pos),
                    None => debug!("dropping delete for unknown message {}", message_id),
                }
            }

            DeliveryEvent::Typing {
                chat,
                user_id,
                username,
                is_typing,
            } => {
                let view = self.view_mut(chat);
                if is_typing {
                    view.typing
                        .insert(user_id, (username, Instant::now() + TYPING_TTL));
                } else {
                    view.typing.remove(&user_id);
                }
            }

            DeliveryEvent::ConversationUpdate {
                conversation_id,
                read_by,
            } => {
                self.view_mut(ChatRef::Direct(conversation_id))
                    .read_by
                    .insert(read_by);
            }

            DeliveryEvent::GroupUpdate {
                group_chat_id,
                read_by,
            } => {
                self.view_mut(ChatRef::Group(group_chat_id))
                    .read_by
                    .insert(read_by);
            }

            DeliveryEvent::ConversationDeleted { conversation_id } => {
                self.chats.remove(&ChatRef::Direct(conversation_id));
            }

            DeliveryEvent::GroupDeleted { group_chat_id } => {
                self.chats.remove(&ChatRef::Group(group_chat_id));
                self.groups.remove(&group_chat_id);
            }

            DeliveryEvent::GroupUpdated { group } => {
                self.groups.insert(group.id, group);
            }

            DeliveryEvent::Ready { .. } => {}
        }
    }

    /// Ordered entries for a chat; pending entries sit at their insertion
    /// position.
    pub fn entries(&self, chat: ChatRef) -> &[Entry] {
        self.chats.get(&chat).map_or(&[], |v| v.entries.as_slice())
    }

    pub fn messages(&self, chat: ChatRef) -> impl Iterator<Item = &Message> {
        self.entries(chat).iter().map(|e| &e.message)
    }

    /// Users currently typing in the chat, skipping expired deadlines.
    pub fn typing_users(&self, chat: ChatRef, now: Instant) -> Vec<&str> {
        self.chats.get(&chat).map_or_else(Vec::new, |v| {
            v.typing
                .values()
                .filter(|(_, deadline)| *deadline > now)
                .map(|(name, _)| name.as_str())
                .collect()
        })
    }

    /// Drop typing indicators whose deadline has passed.
    pub fn expire_typing(&mut self, now: Instant) {
        for view in self.chats.values_mut() {
            view.typing.retain(|_, (_, deadline)| *deadline > now);
        }
    }

    /// Members known to have read up to the chat's latest message.
    pub fn read_by(&self, chat: ChatRef) -> Vec<i64> {
        self.chats.get(&chat).map_or_else(Vec::new, |v| {
            let mut ids: Vec<i64> = v.read_by.iter().copied().collect();
            ids.sort_unstable();
            ids
        })
    }

    pub fn group(&self, id: i64) -> Option<&GroupProfile> {
        self.groups.get(&id)
    }

    pub fn contains_chat(&self, chat: ChatRef) -> bool {
        self.chats.contains_key(&chat)
    }
}

fn apply_reaction_add(message: &mut Message, reaction: Reaction) {
    let exists = message
        .reactions
        .iter()
        .any(|r| r.user.id == reaction.user.id && r.emoji == reaction.emoji);
    if !exists {
        message.reactions.push(reaction);
    }
}

/// Remove the entry at `pos` and shift the temp index entries that pointed
/// past it.
fn remove_at(view: &mut ChatView, pos: usize) {
    let removed = view.entries.remove(pos);
    if let Some(temp_id) = removed.temp_id {
        view.temp_index.remove(&temp_id);
    }
    for idx in view.temp_index.values_mut() {
        if *idx > pos {
            *idx -= 1;
        }
    }
}

fn rebuild_temp_index(view: &mut ChatView) {
    view.temp_index.clear();
    for (pos, entry) in view.entries.iter().enumerate() {
        if let Some(temp_id) = &entry.temp_id {
            view.temp_index.insert(temp_id.clone(), pos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::models::UserSnapshot;

    fn user(id: i64) -> UserSnapshot {
        UserSnapshot {
            id,
            username: format!("user{id}"),
            nickname: None,
            avatar: None,
        }
    }

    fn msg(id: i64, chat: ChatRef, sender: i64, content: &str) -> Message {
        Message {
            id,
            chat,
            sender: user(sender),
            content: content.to_string(),
            attachments: vec![],
            reply_to: None,
            reactions: vec![],
            deleted: false,
            created_at: chrono::Utc::now(),
        }
    }

    fn reaction(id: i64, message_id: i64, user_id: i64, emoji: &str) -> Reaction {
        Reaction {
            id,
            message_id,
            emoji: emoji.to_string(),
            user: user(user_id),
        }
    }

    const CHAT: ChatRef = ChatRef::Direct(1);

    #[test]
    fn pending_then_confirm_keeps_position() {
        let mut store = ChatStore::new();
        store.set_messages(CHAT, vec![msg(1, CHAT, 2, "hello")]);
        store.add_pending(CHAT, "tmp-1", msg(0, CHAT, 1, "reply"));
        store.add_pending(CHAT, "tmp-2", msg(0, CHAT, 1, "again"));

        assert!(store.confirm_send(CHAT, "tmp-1", msg(5, CHAT, 1, "reply")));

        let entries = store.entries(CHAT);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].message.id, 5);
        assert_eq!(entries[1].state, EntryState::Confirmed);
        assert_eq!(entries[1].temp_id, None);
        assert_eq!(entries[2].state, EntryState::Pending);
    }

    #[test]
    fn push_echo_then_confirm_leaves_one_entry() {
        let mut store = ChatStore::new();
        store.add_pending(CHAT, "tmp-1", msg(0, CHAT, 1, "hi"));

        // The bus echo for our own send arrives before the REST ack
        store.apply_event(DeliveryEvent::Message {
            chat: CHAT,
            message: msg(7, CHAT, 1, "hi"),
        });
        assert!(store.confirm_send(CHAT, "tmp-1", msg(7, CHAT, 1, "hi")));

        let ids: Vec<i64> = store.messages(CHAT).map(|m| m.id).collect();
        assert_eq!(ids, vec![7]);
    }

    #[test]
    fn confirm_then_push_echo_is_deduplicated() {
        let mut store = ChatStore::new();
        store.add_pending(CHAT, "tmp-1", msg(0, CHAT, 1, "hi"));
        assert!(store.confirm_send(CHAT, "tmp-1", msg(7, CHAT, 1, "hi")));

        store.apply_event(DeliveryEvent::Message {
            chat: CHAT,
            message: msg(7, CHAT, 1, "hi"),
        });

        assert_eq!(store.entries(CHAT).len(), 1);
    }

    #[test]
    fn failed_send_is_removed_for_good() {
        let mut store = ChatStore::new();
        store.add_pending(CHAT, "tmp-1", msg(0, CHAT, 1, "hi"));
        store.add_pending(CHAT, "tmp-2", msg(0, CHAT, 1, "next"));

        assert!(store.fail_send(CHAT, "tmp-1"));
        assert!(!store.fail_send(CHAT, "tmp-1"));

        // The surviving pending entry is still reachable by temp id
        assert!(store.confirm_send(CHAT, "tmp-2", msg(3, CHAT, 1, "next")));
        let ids: Vec<i64> = store.messages(CHAT).map(|m| m.id).collect();
        assert_eq!(ids, vec![3]);
    }

    #[test]
    fn reaction_patch_applies_by_id_and_tolerates_unknown_targets() {
        let mut store = ChatStore::new();
        store.set_messages(CHAT, vec![msg(1, CHAT, 2, "hello")]);

        store.apply_event(DeliveryEvent::Reaction {
            chat: CHAT,
            message_id: 1,
            action: ReactionAction::Added,
            user_id: 3,
            emoji: "🔥".into(),
            reaction: Some(reaction(10, 1, 3, "🔥")),
        });
        // Duplicate add is ignored
        store.apply_event(DeliveryEvent::Reaction {
            chat: CHAT,
            message_id: 1,
            action: ReactionAction::Added,
            user_id: 3,
            emoji: "🔥".into(),
            reaction: Some(reaction(11, 1, 3, "🔥")),
        });
        // Out-of-order patch for a message we never fetched: discarded
        store.apply_event(DeliveryEvent::Reaction {
            chat: CHAT,
            message_id: 99,
            action: ReactionAction::Added,
            user_id: 3,
            emoji: "🔥".into(),
            reaction: Some(reaction(12, 99, 3, "🔥")),
        });

        let m = store.messages(CHAT).next().unwrap();
        assert_eq!(m.reactions.len(), 1);

        store.apply_event(DeliveryEvent::Reaction {
            chat: CHAT,
            message_id: 1,
            action: ReactionAction::Removed,
            user_id: 3,
            emoji: "🔥".into(),
            reaction: None,
        });
        let m = store.messages(CHAT).next().unwrap();
        assert!(m.reactions.is_empty());
    }

    #[test]
    fn delete_event_removes_the_message() {
        let mut store = ChatStore::new();
        store.set_messages(CHAT, vec![msg(1, CHAT, 2, "a"), msg(2, CHAT, 2, "b")]);

        store.apply_event(DeliveryEvent::MessageDeleted {
            chat: CHAT,
            message_id: 1,
        });
        let ids: Vec<i64> = store.messages(CHAT).map(|m| m.id).collect();
        assert_eq!(ids, vec![2]);

        // Unknown id: discarded
        store.apply_event(DeliveryEvent::MessageDeleted {
            chat: CHAT,
            message_id: 1,
        });
        assert_eq!(store.entries(CHAT).len(), 1);
    }

    #[test]
    fn bulk_fetch_keeps_pending_entries() {
        let mut store = ChatStore::new();
        store.add_pending(CHAT, "tmp-1", msg(0, CHAT, 1, "unacked"));
        store.set_messages(CHAT, vec![msg(1, CHAT, 2, "a"), msg(2, CHAT, 2, "b")]);

        let entries = store.entries(CHAT);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].state, EntryState::Pending);
        assert!(store.confirm_send(CHAT, "tmp-1", msg(3, CHAT, 1, "unacked")));
    }

    #[test]
    fn typing_expires_after_ttl() {
        let mut store = ChatStore::new();
        store.apply_event(DeliveryEvent::Typing {
            chat: CHAT,
            user_id: 2,
            username: "ben".into(),
            is_typing: true,
        });

        let now = Instant::now();
        assert_eq!(store.typing_users(CHAT, now), vec!["ben"]);

        let later = now + TYPING_TTL + Duration::from_millis(10);
        assert!(store.typing_users(CHAT, later).is_empty());
        store.expire_typing(later);

        // Explicit stop also clears it
        store.apply_event(DeliveryEvent::Typing {
            chat: CHAT,
            user_id: 2,
            username: "ben".into(),
            is_typing: true,
        });
        store.apply_event(DeliveryEvent::Typing {
            chat: CHAT,
            user_id: 2,
            username: "ben".into(),
            is_typing: false,
        });
        assert!(store.typing_users(CHAT, Instant::now()).is_empty());
    }

    #[test]
    fn read_receipts_reset_on_new_message() {
        let mut store = ChatStore::new();
        store.apply_event(DeliveryEvent::ConversationUpdate {
            conversation_id: 1,
            read_by: 2,
        });
        assert_eq!(store.read_by(CHAT), vec![2]);

        store.apply_event(DeliveryEvent::Message {
            chat: CHAT,
            message: msg(9, CHAT, 3, "new"),
        });
        assert!(store.read_by(CHAT).is_empty());
    }

    #[test]
    fn container_deletion_drops_the_view() {
        let mut store = ChatStore::new();
        store.set_messages(CHAT, vec![msg(1, CHAT, 2, "a")]);
        store.apply_event(DeliveryEvent::ConversationDeleted { conversation_id: 1 });
        assert!(!store.contains_chat(CHAT));
        assert!(store.messages(CHAT).next().is_none());
    }
}
