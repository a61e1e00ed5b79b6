pub mod auth;
pub mod chat;
pub mod conversations;
pub mod error;
pub mod groups;
pub mod messages;
pub mod middleware;
pub mod reactions;
pub mod read;
