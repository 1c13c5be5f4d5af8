//! The friendship transition table.
//!
//! Every relationship operation is looked up here with the caller's current
//! status (and the mirror status held by the target). The result is either
//! the pair of statuses to write plus what else has to happen, or the error
//! to report. Nothing in this module touches storage.

use crate::error::GraphError;
use crate::model::RelationshipStatus;
use crate::model::RelationshipStatus::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FriendOp {
    SendRequest,
    AcceptRequest,
    DeclineRequest,
    Block,
    Unblock,
    RemoveFriend,
}

impl FriendOp {
    pub const ALL: [FriendOp; 6] = [
        FriendOp::SendRequest,
        FriendOp::AcceptRequest,
        FriendOp::DeclineRequest,
        FriendOp::Block,
        FriendOp::Unblock,
        FriendOp::RemoveFriend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FriendOp::SendRequest => "send-request",
            FriendOp::AcceptRequest => "accept",
            FriendOp::DeclineRequest => "decline",
            FriendOp::Block => "block",
            FriendOp::Unblock => "unblock",
            FriendOp::RemoveFriend => "remove",
        }
    }
}

/// What happens to the chat reference carried by both edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRef {
    Keep,
    Clear,
    /// Create a chat and store its id on both edges.
    Provision,
}

/// Which notification, if any, the target receives once the pair is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    None,
    RequestReceived,
    RequestAccepted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub local: RelationshipStatus,
    pub remote: RelationshipStatus,
    pub chat: ChatRef,
    pub notify: Notify,
}

const fn to(
    local: RelationshipStatus,
    remote: RelationshipStatus,
    chat: ChatRef,
    notify: Notify,
) -> Transition {
    Transition {
        local,
        remote,
        chat,
        notify,
    }
}

/// Look up `op` applied by the owner of an edge in state `local` whose
/// mirror is in state `remote`.
///
/// `(local, remote)` is expected to be a valid pair; callers reconcile the
/// pair before asking.
pub fn transition(
    op: FriendOp,
    local: RelationshipStatus,
    remote: RelationshipStatus,
) -> Result<Transition, GraphError> {
    match (op, local) {
        (FriendOp::SendRequest, Stranger) => Ok(to(
            FriendRequest,
            Pending,
            ChatRef::Keep,
            Notify::RequestReceived,
        )),
        (FriendOp::SendRequest, FriendRequest) => Err(GraphError::conflict(
            "a friend request was already sent to this profile",
        )),
        (FriendOp::SendRequest, Pending) => Err(GraphError::conflict(
            "this profile already sent you a request; accept or decline it instead",
        )),
        (FriendOp::SendRequest, Friend) => Err(GraphError::conflict("already friends")),
        (FriendOp::SendRequest, Block) => Err(GraphError::conflict(
            "you blocked this profile; unblock it before sending a request",
        )),
        (FriendOp::SendRequest, Blocked) => {
            Err(GraphError::conflict("you have been blocked by this profile"))
        }

        (FriendOp::AcceptRequest, Pending) if remote == FriendRequest => Ok(to(
            Friend,
            Friend,
            ChatRef::Provision,
            Notify::RequestAccepted,
        )),
        (FriendOp::AcceptRequest, _) => Err(GraphError::conflict("no friend request found")),

        (FriendOp::DeclineRequest, Pending) => {
            Ok(to(Stranger, Stranger, ChatRef::Clear, Notify::None))
        }
        (FriendOp::DeclineRequest, Block | Blocked) => Err(GraphError::conflict(
            "resolve the block before handling requests",
        )),
        (FriendOp::DeclineRequest, _) => Err(GraphError::conflict("no friend request found")),

        (FriendOp::Block, Block) => Err(GraphError::conflict("already blocked")),
        (FriendOp::Block, _) => Ok(to(Block, Blocked, ChatRef::Keep, Notify::None)),

        (FriendOp::Unblock, Block) => Ok(to(Stranger, Stranger, ChatRef::Clear, Notify::None)),
        (FriendOp::Unblock, _) => Err(GraphError::conflict("this profile is not blocked")),

        (FriendOp::RemoveFriend, Friend) => {
            Ok(to(Stranger, Stranger, ChatRef::Clear, Notify::None))
        }
        (FriendOp::RemoveFriend, Block | Blocked) => Err(GraphError::conflict(
            "resolve the block before removing the friendship",
        )),
        (FriendOp::RemoveFriend, _) => Err(GraphError::conflict("not friends")),
    }
}
