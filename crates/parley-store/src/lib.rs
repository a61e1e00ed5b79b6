mod chat_store;

pub use chat_store::{ChatStore, Entry, EntryState, TYPING_TTL};
