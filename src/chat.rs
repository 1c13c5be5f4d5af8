//! Creation of chat aggregates for new friendships and new groups.

use std::sync::Arc;

use crate::error::GraphError;
use crate::model::{new_id, now_secs, Chat, ChatMessage, LastMessage, MessageKind, Profile};
use crate::store::ProfileStore;

/// System message seeded into the chat of two profiles that just became friends.
pub const FRIENDSHIP_MESSAGE: &str = "Hai bạn đã trở thành bạn bè";
/// System message seeded into a newly created group chat.
pub const GROUP_CREATED_MESSAGE: &str = "Nhóm đã được tạo";

pub struct ChatProvisioner {
    store: Arc<dyn ProfileStore>,
}

impl ChatProvisioner {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Create the direct chat for `a` and `b`.
    ///
    /// `existing` holds whatever chat references the two edges carry right
    /// now. Any reference at all means the pair was already provisioned, and
    /// the call is refused instead of replacing it.
    pub fn provision_direct(
        &self,
        a: &Profile,
        b: &Profile,
        existing: [Option<&str>; 2],
    ) -> Result<Chat, GraphError> {
        if let Some(chat_id) = existing.into_iter().flatten().next() {
            return Err(GraphError::conflict(format!(
                "chat {chat_id} already exists for this pair"
            )));
        }
        self.create(false, None, vec![a.id.clone(), b.id.clone()], FRIENDSHIP_MESSAGE)
    }

    /// Create the chat of a new group.
    pub fn provision_group(
        &self,
        group_id: &str,
        member_ids: Vec<String>,
    ) -> Result<Chat, GraphError> {
        self.create(
            true,
            Some(group_id.to_string()),
            member_ids,
            GROUP_CREATED_MESSAGE,
        )
    }

    /// Remove a chat created by this provisioner whose owning write failed.
    pub fn discard(&self, chat_id: &str) {
        if let Err(e) = self.store.delete_chat(chat_id) {
            crate::rlog!("chat: failed to discard orphaned chat {chat_id}: {e}");
        }
    }

    fn create(
        &self,
        is_group: bool,
        group_id: Option<String>,
        members: Vec<String>,
        announcement: &str,
    ) -> Result<Chat, GraphError> {
        let now = now_secs();
        let chat = Chat {
            id: new_id(),
            is_group,
            group_id,
            members,
            last_message: Some(LastMessage {
                content: announcement.to_string(),
                created_at: now,
            }),
            created_at: now,
        };
        let first = ChatMessage {
            message_id: new_id(),
            chat_id: chat.id.clone(),
            sender_id: None,
            kind: MessageKind::Event,
            content: announcement.to_string(),
            created_at: now,
        };
        self.store.insert_chat(&chat, &first)?;
        Ok(chat)
    }
}
