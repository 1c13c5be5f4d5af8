//! Route handler modules for the rapport-web REST API.

pub mod chats;
pub mod friends;
pub mod groups;
pub mod health;
pub mod profiles;
pub mod websocket;
