//! The relationship graph.
//!
//! Every relationship between two profiles is stored as two mirrored edges,
//! one owned by each side. [`FriendshipStateMachine`] is the only writer of
//! edge statuses: it takes the pair lock, reads both edges, repairs a pair
//! left half-written by an earlier failure, looks the operation up in the
//! transition table and then writes both edges.
//!
//! The store only guarantees single-edge atomicity. If the second write of a
//! pair keeps failing, the first write is undone and the caller receives
//! [`GraphError::PartialFailure`]. Should the undo fail as well, the edge
//! with the higher revision is mirrored onto the other one by the next
//! operation touching the pair.

use std::sync::Arc;

use crate::chat::ChatProvisioner;
use crate::error::GraphError;
use crate::locks::{pair_key, KeyedLocks};
use crate::logging;
use crate::model::{is_valid_pair, now_secs, Edge, Profile, RelationshipStatus};
use crate::notify::{dispatch, Notification, NotificationDispatcher, NotificationKind};
use crate::profiles::ProfileDirectory;
use crate::store::ProfileStore;
use crate::transition::{transition, ChatRef, FriendOp, Notify};

/// Owner-local annotations of an edge. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct EdgePatch {
    pub display_name: Option<String>,
    pub is_best_friend: Option<bool>,
}

pub struct FriendshipStateMachine {
    store: Arc<dyn ProfileStore>,
    profiles: Arc<ProfileDirectory>,
    locks: Arc<KeyedLocks>,
    chats: Arc<ChatProvisioner>,
    notifier: Arc<dyn NotificationDispatcher>,
    write_retries: u32,
}

/// Both edges of a pair as read from the store.
struct Pair {
    local: Option<Edge>,
    remote: Option<Edge>,
}

impl Pair {
    fn statuses(&self) -> (RelationshipStatus, RelationshipStatus) {
        (status_of(&self.local), status_of(&self.remote))
    }

    fn is_consistent(&self) -> bool {
        let (l, r) = self.statuses();
        is_valid_pair(l, r) && chat_of(&self.local) == chat_of(&self.remote)
    }
}

fn status_of(edge: &Option<Edge>) -> RelationshipStatus {
    edge.as_ref()
        .map(|e| e.status)
        .unwrap_or(RelationshipStatus::Stranger)
}

fn chat_of(edge: &Option<Edge>) -> Option<&str> {
    edge.as_ref().and_then(|e| e.chat_id.as_deref())
}

fn revision_of(edge: &Option<Edge>) -> (u64, u64) {
    edge.as_ref()
        .map(|e| (e.revision, e.updated_at))
        .unwrap_or((0, 0))
}

impl FriendshipStateMachine {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        profiles: Arc<ProfileDirectory>,
        locks: Arc<KeyedLocks>,
        chats: Arc<ChatProvisioner>,
        notifier: Arc<dyn NotificationDispatcher>,
        write_retries: u32,
    ) -> Self {
        Self {
            store,
            profiles,
            locks,
            chats,
            notifier,
            write_retries,
        }
    }

    pub fn send_request(&self, self_id: &str, target_id: &str) -> Result<Edge, GraphError> {
        self.apply(FriendOp::SendRequest, self_id, target_id)
    }

    /// Send a request to whoever owns `phone`.
    pub fn send_request_by_phone(&self, self_id: &str, phone: &str) -> Result<Edge, GraphError> {
        let target = self.profiles.find_by_phone(phone)?;
        self.apply(FriendOp::SendRequest, self_id, &target.id)
    }

    pub fn accept_request(&self, self_id: &str, friend_id: &str) -> Result<Edge, GraphError> {
        self.apply(FriendOp::AcceptRequest, self_id, friend_id)
    }

    pub fn decline_request(&self, self_id: &str, friend_id: &str) -> Result<Edge, GraphError> {
        self.apply(FriendOp::DeclineRequest, self_id, friend_id)
    }

    pub fn block(&self, self_id: &str, friend_id: &str) -> Result<Edge, GraphError> {
        self.apply(FriendOp::Block, self_id, friend_id)
    }

    pub fn unblock(&self, self_id: &str, friend_id: &str) -> Result<Edge, GraphError> {
        self.apply(FriendOp::Unblock, self_id, friend_id)
    }

    pub fn remove_friend(&self, self_id: &str, friend_id: &str) -> Result<Edge, GraphError> {
        self.apply(FriendOp::RemoveFriend, self_id, friend_id)
    }

    /// Run one relationship operation and return the caller's edge after it.
    pub fn apply(&self, op: FriendOp, self_id: &str, target_id: &str) -> Result<Edge, GraphError> {
        if self_id == target_id {
            return Err(GraphError::invalid(format!(
                "cannot {} yourself",
                op.as_str()
            )));
        }

        let (edge, notice) = {
            let _guard = self.locks.lock(pair_key(self_id, target_id));
            let me = self.profiles.get(self_id)?;
            let them = self.profiles.get(target_id)?;
            let pair = self.read_pair(&me, &them)?;

            let (local_status, remote_status) = pair.statuses();
            let step = transition(op, local_status, remote_status)?;

            let now = now_secs();
            let revision = revision_of(&pair.local).0.max(revision_of(&pair.remote).0) + 1;
            let mut local = pair
                .local
                .clone()
                .unwrap_or_else(|| Edge::new(&me.id, &them.id, them.full_name(), now));
            let mut remote = pair
                .remote
                .clone()
                .unwrap_or_else(|| Edge::new(&them.id, &me.id, me.full_name(), now));

            let mut provisioned = None;
            match step.chat {
                ChatRef::Keep => {}
                ChatRef::Clear => {
                    local.chat_id = None;
                    remote.chat_id = None;
                }
                ChatRef::Provision => {
                    let chat = self.chats.provision_direct(
                        &me,
                        &them,
                        [local.chat_id.as_deref(), remote.chat_id.as_deref()],
                    )?;
                    local.chat_id = Some(chat.id.clone());
                    remote.chat_id = Some(chat.id.clone());
                    provisioned = Some(chat.id);
                }
            }

            for (edge, status) in [(&mut local, step.local), (&mut remote, step.remote)] {
                edge.status = status;
                edge.revision = revision;
                edge.updated_at = now;
            }

            let written = self.write_pair(
                pair.local.as_ref(),
                &local,
                &remote,
                provisioned.as_deref(),
            );
            self.profiles.invalidate([me.id.as_str(), them.id.as_str()]);
            written?;

            crate::rlog!(
                "friendship: {} {} {} ({} / {})",
                logging::profile_id(&me.id),
                op.as_str(),
                logging::profile_id(&them.id),
                local.status,
                remote.status
            );

            let notice = match step.notify {
                Notify::None => None,
                Notify::RequestReceived => Some(Notification {
                    message: format!("{} vừa gửi lời mời kết bạn", me.last_name),
                    kind: NotificationKind::FriendRequest,
                    actor_id: Some(me.id.clone()),
                    timestamp: now,
                }),
                Notify::RequestAccepted => Some(Notification {
                    message: format!("{} vừa chấp nhận lời mời kết bạn", me.last_name),
                    kind: NotificationKind::NewMessage,
                    actor_id: Some(me.id.clone()),
                    timestamp: now,
                }),
            };
            (local, notice)
        };

        if let Some(n) = notice {
            dispatch(self.notifier.as_ref(), target_id, &n);
        }
        Ok(edge)
    }

    /// Read both edges of the pair, repairing them first if an earlier
    /// paired write was left half-applied.
    fn read_pair(&self, me: &Profile, them: &Profile) -> Result<Pair, GraphError> {
        let pair = Pair {
            local: self.store.get_edge(&me.id, &them.id)?,
            remote: self.store.get_edge(&them.id, &me.id)?,
        };
        if pair.is_consistent() {
            return Ok(pair);
        }

        // The side written last carries the higher revision.
        let local_wins = revision_of(&pair.local) >= revision_of(&pair.remote);
        let (winner, loser, loser_owner, loser_target) = if local_wins {
            (&pair.local, &pair.remote, them, me)
        } else {
            (&pair.remote, &pair.local, me, them)
        };

        let now = now_secs();
        let mut repaired = loser.clone().unwrap_or_else(|| {
            Edge::new(&loser_owner.id, &loser_target.id, loser_target.full_name(), now)
        });
        let (status, chat_id, revision) = match winner {
            Some(w) => (w.status.mirror(), w.chat_id.clone(), w.revision),
            None => (RelationshipStatus::Stranger, None, repaired.revision),
        };
        repaired.status = status;
        repaired.chat_id = chat_id;
        repaired.revision = revision;
        repaired.updated_at = now;

        let result = self.store.put_edge(&repaired);
        self.profiles.invalidate([me.id.as_str(), them.id.as_str()]);
        result?;

        crate::rlog!(
            "friendship: repaired edge {} -> {} to {}",
            logging::profile_id(&repaired.owner_id),
            logging::profile_id(&repaired.target_id),
            repaired.status
        );

        Ok(if local_wins {
            Pair {
                local: pair.local,
                remote: Some(repaired),
            }
        } else {
            Pair {
                local: Some(repaired),
                remote: pair.remote,
            }
        })
    }

    /// Write `local` then `remote`. `previous` is the local edge as it was
    /// before, used to undo the first write when the second cannot be made.
    fn write_pair(
        &self,
        previous: Option<&Edge>,
        local: &Edge,
        remote: &Edge,
        new_chat: Option<&str>,
    ) -> Result<(), GraphError> {
        if let Err(e) = self.store.put_edge(local) {
            if let Some(chat_id) = new_chat {
                self.chats.discard(chat_id);
            }
            return Err(e.into());
        }

        let mut attempt = 0;
        let failure = loop {
            match self.store.put_edge(remote) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.write_retries => {
                    attempt += 1;
                    crate::rlog!(
                        "friendship: retrying edge {} -> {} (attempt {}): {}",
                        logging::profile_id(&remote.owner_id),
                        logging::profile_id(&remote.target_id),
                        attempt,
                        e
                    );
                }
                Err(e) => break e,
            }
        };

        let undo = match previous {
            Some(prev) => self.store.put_edge(prev),
            None => self
                .store
                .delete_edge(&local.owner_id, &local.target_id)
                .map(|_| ()),
        };
        let compensated = match undo {
            Ok(()) => {
                if let Some(chat_id) = new_chat {
                    self.chats.discard(chat_id);
                }
                true
            }
            Err(e) => {
                crate::rlog!(
                    "friendship: could not undo edge {} -> {}: {}",
                    logging::profile_id(&local.owner_id),
                    logging::profile_id(&local.target_id),
                    e
                );
                false
            }
        };

        Err(GraphError::PartialFailure {
            message: format!(
                "edge {} -> {} not written: {}",
                remote.owner_id, remote.target_id, failure
            ),
            compensated,
        })
    }

    /// Status of the pair as seen from `self_id`, after any pending repair.
    pub fn pair_status(
        &self,
        self_id: &str,
        target_id: &str,
    ) -> Result<(RelationshipStatus, RelationshipStatus), GraphError> {
        if self_id == target_id {
            return Err(GraphError::invalid("a profile has no relationship with itself"));
        }
        let _guard = self.locks.lock(pair_key(self_id, target_id));
        let me = self.profiles.get(self_id)?;
        let them = self.profiles.get(target_id)?;
        Ok(self.read_pair(&me, &them)?.statuses())
    }

    /// The caller's edges, optionally only those in `status`.
    pub fn list_edges(
        &self,
        self_id: &str,
        status: Option<RelationshipStatus>,
    ) -> Result<Vec<Edge>, GraphError> {
        self.profiles.get(self_id)?;
        Ok(self.store.list_edges(self_id, status)?)
    }

    /// Change the owner-local fields of an edge. The status and the mirror
    /// edge are never touched.
    pub fn update_edge(
        &self,
        self_id: &str,
        target_id: &str,
        patch: EdgePatch,
    ) -> Result<Edge, GraphError> {
        if self_id == target_id {
            return Err(GraphError::invalid("cannot annotate yourself"));
        }
        if let Some(name) = &patch.display_name {
            if name.trim().is_empty() {
                return Err(GraphError::invalid("display name cannot be empty"));
            }
        }

        let _guard = self.locks.lock(pair_key(self_id, target_id));
        let mut edge = self
            .store
            .get_edge(self_id, target_id)?
            .ok_or_else(|| GraphError::not_found(format!("no edge from {self_id} to {target_id}")))?;

        if let Some(name) = patch.display_name {
            edge.display_name = name.trim().to_string();
        }
        if let Some(best) = patch.is_best_friend {
            edge.is_best_friend = best;
        }
        edge.updated_at = now_secs();

        let result = self.store.put_edge(&edge);
        self.profiles.invalidate([self_id]);
        result?;
        Ok(edge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ProfileCache;
    use crate::notify::NullDispatcher;
    use crate::profiles::NewProfile;
    use crate::storage::Storage;
    use RelationshipStatus::*;

    struct Fixture {
        store: Arc<Storage>,
        profiles: Arc<ProfileDirectory>,
        graph: FriendshipStateMachine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Storage::open_in_memory().unwrap());
        let profiles = Arc::new(ProfileDirectory::new(store.clone(), ProfileCache::new(64)));
        let graph = FriendshipStateMachine::new(
            store.clone(),
            profiles.clone(),
            Arc::new(KeyedLocks::new()),
            Arc::new(ChatProvisioner::new(store.clone())),
            Arc::new(NullDispatcher),
            2,
        );
        Fixture {
            store,
            profiles,
            graph,
        }
    }

    fn person(f: &Fixture, phone: &str, last: &str) -> Profile {
        f.profiles
            .create(NewProfile {
                user_id: format!("user-{phone}"),
                phone: phone.to_string(),
                first_name: "Tran".to_string(),
                last_name: last.to_string(),
                ..Default::default()
            })
            .unwrap()
    }

    #[test]
    fn request_creates_both_edges_with_default_names() {
        let f = fixture();
        let a = person(&f, "1", "An");
        let b = person(&f, "2", "Binh");

        let edge = f.graph.send_request(&a.id, &b.id).unwrap();
        assert_eq!(edge.status, FriendRequest);
        assert_eq!(edge.display_name, "Tran Binh");

        let mirror = f.store.get_edge(&b.id, &a.id).unwrap().unwrap();
        assert_eq!(mirror.status, Pending);
        assert_eq!(mirror.display_name, "Tran An");
        assert_eq!(mirror.revision, edge.revision);
    }

    #[test]
    fn unknown_target_is_not_found() {
        let f = fixture();
        let a = person(&f, "1", "An");
        let err = f.graph.send_request(&a.id, "missing").unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
        assert!(f.store.list_edges(&a.id, None).unwrap().is_empty());
    }

    #[test]
    fn request_by_phone() {
        let f = fixture();
        let a = person(&f, "1", "An");
        let b = person(&f, "2", "Binh");
        let edge = f.graph.send_request_by_phone(&a.id, "2").unwrap();
        assert_eq!(edge.target_id, b.id);
        assert!(matches!(
            f.graph.send_request_by_phone(&a.id, "1"),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn half_written_pair_is_completed_by_the_next_operation() {
        let f = fixture();
        let a = person(&f, "1", "An");
        let b = person(&f, "2", "Binh");
        f.graph.send_request(&a.id, &b.id).unwrap();

        // Simulate an accept whose second write never landed.
        let mut local = f.store.get_edge(&b.id, &a.id).unwrap().unwrap();
        local.status = Friend;
        local.revision += 1;
        f.store.put_edge(&local).unwrap();

        assert_eq!(f.graph.pair_status(&a.id, &b.id).unwrap(), (Friend, Friend));
    }

    #[test]
    fn update_edge_only_touches_the_owner_side() {
        let f = fixture();
        let a = person(&f, "1", "An");
        let b = person(&f, "2", "Binh");
        f.graph.send_request(&a.id, &b.id).unwrap();

        let patch = EdgePatch {
            display_name: Some("Bình ơi".to_string()),
            is_best_friend: Some(true),
        };
        let edge = f.graph.update_edge(&a.id, &b.id, patch).unwrap();
        assert_eq!(edge.display_name, "Bình ơi");
        assert!(edge.is_best_friend);
        assert_eq!(edge.status, FriendRequest);

        let mirror = f.store.get_edge(&b.id, &a.id).unwrap().unwrap();
        assert_eq!(mirror.display_name, "Tran An");
        assert!(!mirror.is_best_friend);

        let blank = EdgePatch {
            display_name: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            f.graph.update_edge(&a.id, &b.id, blank),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn update_edge_without_edge_is_not_found() {
        let f = fixture();
        let a = person(&f, "1", "An");
        let b = person(&f, "2", "Binh");
        assert!(matches!(
            f.graph.update_edge(&a.id, &b.id, EdgePatch::default()),
            Err(GraphError::NotFound(_))
        ));
    }

    #[test]
    fn list_edges_filters_by_status() {
        let f = fixture();
        let a = person(&f, "1", "An");
        let b = person(&f, "2", "Binh");
        let c = person(&f, "3", "Cuong");
        f.graph.send_request(&a.id, &b.id).unwrap();
        f.graph.block(&a.id, &c.id).unwrap();

        assert_eq!(f.graph.list_edges(&a.id, None).unwrap().len(), 2);
        let blocked = f.graph.list_edges(&a.id, Some(Block)).unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].target_id, c.id);
    }

    #[test]
    fn profile_cache_sees_the_new_edges() {
        let f = fixture();
        let a = person(&f, "1", "An");
        let b = person(&f, "2", "Binh");
        assert!(f.profiles.get(&a.id).unwrap().edges.is_empty());

        f.graph.send_request(&a.id, &b.id).unwrap();
        assert_eq!(f.profiles.get(&a.id).unwrap().status_towards(&b.id), FriendRequest);
        assert_eq!(f.profiles.get(&b.id).unwrap().status_towards(&a.id), Pending);
    }
}
