//! Domain types shared by the relationship graph, the group manager and the
//! storage layer.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Status of one profile's directed edge towards another.
///
/// A missing edge is read as [`RelationshipStatus::Stranger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipStatus {
    Stranger,
    /// The owner sent a request that is still open.
    FriendRequest,
    /// The owner received a request that is still open.
    Pending,
    Friend,
    /// The owner blocked the target.
    Block,
    /// The owner was blocked by the target.
    Blocked,
}

impl RelationshipStatus {
    pub const ALL: [RelationshipStatus; 6] = [
        RelationshipStatus::Stranger,
        RelationshipStatus::FriendRequest,
        RelationshipStatus::Pending,
        RelationshipStatus::Friend,
        RelationshipStatus::Block,
        RelationshipStatus::Blocked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStatus::Stranger => "STRANGER",
            RelationshipStatus::FriendRequest => "FRIEND_REQUEST",
            RelationshipStatus::Pending => "PENDING",
            RelationshipStatus::Friend => "FRIEND",
            RelationshipStatus::Block => "BLOCK",
            RelationshipStatus::Blocked => "BLOCKED",
        }
    }

    /// The status the opposite edge must carry for the pair to be valid.
    pub fn mirror(&self) -> RelationshipStatus {
        match self {
            RelationshipStatus::Stranger => RelationshipStatus::Stranger,
            RelationshipStatus::FriendRequest => RelationshipStatus::Pending,
            RelationshipStatus::Pending => RelationshipStatus::FriendRequest,
            RelationshipStatus::Friend => RelationshipStatus::Friend,
            RelationshipStatus::Block => RelationshipStatus::Blocked,
            RelationshipStatus::Blocked => RelationshipStatus::Block,
        }
    }
}

impl fmt::Display for RelationshipStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RelationshipStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown relationship status: {s}"))
    }
}

/// Whether `(local, remote)` is one of the complementary pairs allowed at rest.
pub fn is_valid_pair(local: RelationshipStatus, remote: RelationshipStatus) -> bool {
    local.mirror() == remote
}

/// One profile's directed view of its relationship with another profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub owner_id: String,
    pub target_id: String,
    /// Owner-local name for the target; survives every status change.
    pub display_name: String,
    pub status: RelationshipStatus,
    pub chat_id: Option<String>,
    pub is_best_friend: bool,
    /// Bumped on both edges by every paired write; the higher side wins
    /// when a half-applied pair is reconciled.
    pub revision: u64,
    pub updated_at: u64,
}

impl Edge {
    pub fn new(owner_id: &str, target_id: &str, display_name: String, now: u64) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            target_id: target_id.to_string(),
            display_name,
            status: RelationshipStatus::Stranger,
            chat_id: None,
            is_best_friend: false,
            revision: 0,
            updated_at: now,
        }
    }
}

/// A user profile together with its outgoing edges and chat memberships.
///
/// Group membership is not stored here; it is derived from the group
/// member table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    /// Identity issued by the external credential service.
    pub user_id: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub chats: Vec<ChatMembership>,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn edge_to(&self, target_id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.target_id == target_id)
    }

    /// Status of this profile's edge to `target_id`, `Stranger` if absent.
    pub fn status_towards(&self, target_id: &str) -> RelationshipStatus {
        self.edge_to(target_id)
            .map(|e| e.status)
            .unwrap_or(RelationshipStatus::Stranger)
    }
}

/// Link between a profile and a chat it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMembership {
    pub chat_id: String,
    pub profile_id: String,
    pub join_time: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GroupRole {
    Leader,
    Member,
}

impl GroupRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GroupRole::Leader => "LEADER",
            GroupRole::Member => "MEMBER",
        }
    }

    pub fn parse(s: &str) -> Option<GroupRole> {
        match s {
            "LEADER" => Some(GroupRole::Leader),
            "MEMBER" => Some(GroupRole::Member),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    pub profile_id: String,
    pub role: GroupRole,
    /// Free text describing how the member joined, e.g. who added them.
    pub join_method: String,
    pub joined_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub avatar: Option<String>,
    pub chat_id: Option<String>,
    pub members: Vec<GroupMember>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Group {
    pub fn member(&self, profile_id: &str) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.profile_id == profile_id)
    }

    pub fn is_member(&self, profile_id: &str) -> bool {
        self.member(profile_id).is_some()
    }

    pub fn is_leader(&self, profile_id: &str) -> bool {
        self.member(profile_id)
            .map(|m| m.role == GroupRole::Leader)
            .unwrap_or(false)
    }

    pub fn leader_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.role == GroupRole::Leader)
            .count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Written by a participant.
    Message,
    /// Written by the system to announce something that happened.
    Event,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Message => "MESSAGE",
            MessageKind::Event => "EVENT",
        }
    }

    pub fn parse(s: &str) -> Option<MessageKind> {
        match s {
            "MESSAGE" => Some(MessageKind::Message),
            "EVENT" => Some(MessageKind::Event),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub message_id: String,
    pub chat_id: String,
    pub sender_id: Option<String>,
    pub kind: MessageKind,
    pub content: String,
    pub created_at: u64,
}

/// Denormalised copy of the newest message, used to render chat lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    pub content: String,
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub is_group: bool,
    pub group_id: Option<String>,
    pub members: Vec<String>,
    pub last_message: Option<LastMessage>,
    pub created_at: u64,
}

/// Generate a random 24-hex-character identifier.
pub fn new_id() -> String {
    let mut bytes = [0u8; 12];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    hex::encode(bytes)
}

/// Current time as seconds since UNIX epoch.
pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
