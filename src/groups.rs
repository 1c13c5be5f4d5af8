//! Group management.
//!
//! A group owns its member list and a group chat. Exactly one member holds
//! [`GroupRole::Leader`]; the role only moves through
//! [`GroupMembershipManager::transfer_leadership`]. Which groups a profile
//! belongs to is answered from the member table, never from the profile.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;

use crate::chat::ChatProvisioner;
use crate::error::GraphError;
use crate::locks::{group_key, KeyedLocks};
use crate::logging;
use crate::model::{new_id, now_secs, Group, GroupMember, GroupRole, Profile};
use crate::notify::{dispatch, Notification, NotificationDispatcher, NotificationKind};
use crate::profiles::ProfileDirectory;
use crate::store::ProfileStore;

/// Join method recorded for the creator of a group.
pub const LEADER_JOIN_METHOD: &str = "Trưởng nhóm";
/// Join method recorded for members listed at creation time.
pub const ADDED_BY_LEADER: &str = "Thêm bởi nhóm trưởng";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewGroup {
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub member_ids: Vec<String>,
}

pub struct GroupMembershipManager {
    store: Arc<dyn ProfileStore>,
    profiles: Arc<ProfileDirectory>,
    locks: Arc<KeyedLocks>,
    chats: Arc<ChatProvisioner>,
    notifier: Arc<dyn NotificationDispatcher>,
}

fn added_by(profile: &Profile) -> String {
    format!("Thêm bởi {}", profile.last_name)
}

fn added_notice(actor: &Profile, group: &Group) -> Notification {
    Notification {
        message: format!("{} đã thêm bạn vào nhóm {}", actor.last_name, group.name),
        kind: NotificationKind::GroupMemberAdded,
        actor_id: Some(actor.id.clone()),
        timestamp: group.updated_at,
    }
}

/// Drop repeated ids and `skip`, keeping first-seen order.
fn distinct<'a>(ids: &'a [String], skip: &str) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    ids.iter()
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && *id != skip && seen.insert(*id))
        .collect()
}

impl GroupMembershipManager {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        profiles: Arc<ProfileDirectory>,
        locks: Arc<KeyedLocks>,
        chats: Arc<ChatProvisioner>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            profiles,
            locks,
            chats,
            notifier,
        }
    }

    fn load(&self, group_id: &str) -> Result<Group, GraphError> {
        self.store
            .get_group(group_id)?
            .ok_or_else(|| GraphError::not_found(format!("group {group_id}")))
    }

    /// Create a group led by `creator_id` together with its chat.
    ///
    /// Every listed member must exist. Duplicates and the creator's own id
    /// in the member list are ignored.
    pub fn create_group(&self, creator_id: &str, req: NewGroup) -> Result<Group, GraphError> {
        let name = req.name.trim();
        if name.is_empty() {
            return Err(GraphError::invalid("group name cannot be empty"));
        }
        let creator = self.profiles.get(creator_id)?;
        let invited = distinct(&req.member_ids, &creator.id)
            .into_iter()
            .map(|id| self.profiles.get(id))
            .collect::<Result<Vec<_>, _>>()?;

        let now = now_secs();
        let mut members = vec![GroupMember {
            profile_id: creator.id.clone(),
            role: GroupRole::Leader,
            join_method: LEADER_JOIN_METHOD.to_string(),
            joined_at: now,
        }];
        members.extend(invited.iter().map(|p| GroupMember {
            profile_id: p.id.clone(),
            role: GroupRole::Member,
            join_method: ADDED_BY_LEADER.to_string(),
            joined_at: now,
        }));

        let id = new_id();
        let chat = self.chats.provision_group(
            &id,
            members.iter().map(|m| m.profile_id.clone()).collect(),
        )?;
        let group = Group {
            id,
            name: name.to_string(),
            avatar: req.avatar,
            chat_id: Some(chat.id.clone()),
            members,
            created_at: now,
            updated_at: now,
        };
        if let Err(e) = self.store.insert_group(&group) {
            self.chats.discard(&chat.id);
            return Err(e.into());
        }
        self.profiles
            .invalidate(group.members.iter().map(|m| m.profile_id.as_str()));

        crate::rlog!(
            "groups: {} created {} with {} members",
            logging::profile_id(&creator.id),
            logging::group_id(&group.id),
            group.members.len()
        );

        let notice = added_notice(&creator, &group);
        for p in &invited {
            dispatch(self.notifier.as_ref(), &p.id, &notice);
        }
        Ok(group)
    }

    /// Add profiles to a group. Any current member may do this.
    ///
    /// Ids that are already members, or that match no profile, are skipped.
    pub fn add_members(
        &self,
        group_id: &str,
        requester_id: &str,
        member_ids: &[String],
    ) -> Result<Group, GraphError> {
        let (group, requester, added) = {
            let _guard = self.locks.lock(group_key(group_id));
            let mut group = self.load(group_id)?;
            let requester = self.profiles.get(requester_id)?;
            if !group.is_member(&requester.id) {
                return Err(GraphError::unauthorized(
                    "only members of the group can add members",
                ));
            }

            let now = now_secs();
            let mut added = Vec::new();
            for id in distinct(member_ids, &requester.id) {
                if group.is_member(id) {
                    continue;
                }
                let profile = match self.profiles.get(id) {
                    Ok(p) => p,
                    Err(GraphError::NotFound(_)) => continue,
                    Err(e) => return Err(e),
                };
                group.members.push(GroupMember {
                    profile_id: profile.id.clone(),
                    role: GroupRole::Member,
                    join_method: added_by(&requester),
                    joined_at: now,
                });
                added.push(profile.id);
            }
            if added.is_empty() {
                return Ok(group);
            }

            group.updated_at = now;
            let joined = self.join_chat(&group, &added, now);
            self.profiles.invalidate(added.iter().map(String::as_str));
            joined?;

            crate::rlog!(
                "groups: {} added {} members to {}",
                logging::profile_id(&requester.id),
                added.len(),
                logging::group_id(&group.id)
            );
            (group, requester, added)
        };

        let notice = added_notice(&requester, &group);
        for id in &added {
            dispatch(self.notifier.as_ref(), id, &notice);
        }
        Ok(group)
    }

    /// Remove `member_id` from a group.
    ///
    /// The leader may remove anyone else and any member may leave on their
    /// own. The leader cannot leave while still holding the role.
    pub fn remove_member(
        &self,
        group_id: &str,
        requester_id: &str,
        member_id: &str,
    ) -> Result<Group, GraphError> {
        let _guard = self.locks.lock(group_key(group_id));
        let mut group = self.load(group_id)?;
        let Some(member) = group.member(member_id).cloned() else {
            return Err(GraphError::not_found(format!(
                "{member_id} is not a member of group {group_id}"
            )));
        };

        if requester_id == member_id {
            if member.role == GroupRole::Leader {
                return Err(GraphError::conflict(
                    "the leader must transfer leadership or delete the group before leaving",
                ));
            }
        } else if !group.is_leader(requester_id) {
            return Err(GraphError::unauthorized(
                "only the group leader can remove other members",
            ));
        }

        group.members.retain(|m| m.profile_id != member_id);
        group.updated_at = now_secs();
        let left = self.leave_chat(&group, member_id);
        self.profiles.invalidate([member_id]);
        left?;

        crate::rlog!(
            "groups: {} removed {} from {}",
            logging::profile_id(requester_id),
            logging::profile_id(member_id),
            logging::group_id(&group.id)
        );
        Ok(group)
    }

    /// Delete a group and its chat. Leader only.
    pub fn delete_group(&self, group_id: &str, requester_id: &str) -> Result<(), GraphError> {
        let _guard = self.locks.lock(group_key(group_id));
        let group = self.load(group_id)?;
        if !group.is_leader(requester_id) {
            return Err(GraphError::unauthorized(
                "only the group leader can delete the group",
            ));
        }

        // Chat first: if the group row survives a failure the call can be
        // repeated, and deleting an already deleted chat is a no-op.
        let deleted = match &group.chat_id {
            Some(chat_id) => self.store.delete_chat(chat_id).map(|_| ()),
            None => Ok(()),
        }
        .and_then(|()| self.store.delete_group(&group.id).map(|_| ()));
        self.profiles
            .invalidate(group.members.iter().map(|m| m.profile_id.as_str()));
        deleted?;

        crate::rlog!(
            "groups: {} deleted {}",
            logging::profile_id(requester_id),
            logging::group_id(&group.id)
        );
        Ok(())
    }

    /// Hand the leader role to another current member.
    pub fn transfer_leadership(
        &self,
        group_id: &str,
        requester_id: &str,
        new_leader_id: &str,
    ) -> Result<Group, GraphError> {
        let _guard = self.locks.lock(group_key(group_id));
        let mut group = self.load(group_id)?;
        if !group.is_leader(requester_id) {
            return Err(GraphError::unauthorized(
                "only the group leader can transfer leadership",
            ));
        }
        if requester_id == new_leader_id {
            return Err(GraphError::invalid("you already lead this group"));
        }
        if !group.is_member(new_leader_id) {
            return Err(GraphError::not_found(format!(
                "{new_leader_id} is not a member of group {group_id}"
            )));
        }

        for m in &mut group.members {
            if m.profile_id == requester_id {
                m.role = GroupRole::Member;
            } else if m.profile_id == new_leader_id {
                m.role = GroupRole::Leader;
            }
        }
        group.updated_at = now_secs();
        self.store.save_group(&group)?;

        crate::rlog!(
            "groups: {} handed {} to {}",
            logging::profile_id(requester_id),
            logging::group_id(&group.id),
            logging::profile_id(new_leader_id)
        );
        Ok(group)
    }

    pub fn get_group(&self, group_id: &str) -> Result<Group, GraphError> {
        self.load(group_id)
    }

    pub fn list_groups_for(&self, profile_id: &str) -> Result<Vec<Group>, GraphError> {
        self.profiles.get(profile_id)?;
        Ok(self.store.list_groups_for(profile_id)?)
    }

    /// Put `added` into the group chat, then save `group`. Chat seats taken
    /// here are given back if the save fails, so a failed call leaves group
    /// and chat as they were and can simply be repeated.
    fn join_chat(&self, group: &Group, added: &[String], now: u64) -> Result<(), GraphError> {
        let Some(chat_id) = group.chat_id.as_deref() else {
            return Ok(self.store.save_group(group)?);
        };
        let mut seated: Vec<&str> = Vec::with_capacity(added.len());
        let outcome = added
            .iter()
            .try_for_each(|id| {
                self.store
                    .add_chat_member(chat_id, id, now)
                    .map(|()| seated.push(id.as_str()))
            })
            .and_then(|()| self.store.save_group(group));
        if let Err(e) = outcome {
            for id in seated {
                if let Err(undo) = self.store.remove_chat_member(chat_id, id) {
                    crate::rlog!(
                        "groups: could not take {} back out of chat {}: {}",
                        logging::profile_id(id),
                        chat_id,
                        undo
                    );
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Take `member_id` out of the group chat, then save `group` without
    /// them. The chat seat is restored if the save fails.
    fn leave_chat(&self, group: &Group, member_id: &str) -> Result<(), GraphError> {
        let Some(chat_id) = group.chat_id.as_deref() else {
            return Ok(self.store.save_group(group)?);
        };
        let was_seated = self.store.remove_chat_member(chat_id, member_id)?;
        if let Err(e) = self.store.save_group(group) {
            if was_seated {
                if let Err(undo) = self.store.add_chat_member(chat_id, member_id, now_secs()) {
                    crate::rlog!(
                        "groups: could not give {} back a seat in chat {}: {}",
                        logging::profile_id(member_id),
                        chat_id,
                        undo
                    );
                }
            }
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ProfileCache;
    use crate::notify::NullDispatcher;
    use crate::profiles::NewProfile;
    use crate::storage::Storage;

    struct Fixture {
        store: Arc<Storage>,
        profiles: Arc<ProfileDirectory>,
        groups: GroupMembershipManager,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(Storage::open_in_memory().unwrap());
        let profiles = Arc::new(ProfileDirectory::new(store.clone(), ProfileCache::new(64)));
        let groups = GroupMembershipManager::new(
            store.clone(),
            profiles.clone(),
            Arc::new(KeyedLocks::new()),
            Arc::new(ChatProvisioner::new(store.clone())),
            Arc::new(NullDispatcher),
        );
        Fixture {
            store,
            profiles,
            groups,
        }
    }

    fn person(f: &Fixture, phone: &str, last: &str) -> String {
        f.profiles
            .create(NewProfile {
                user_id: format!("user-{phone}"),
                phone: phone.to_string(),
                first_name: "Le".to_string(),
                last_name: last.to_string(),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    fn new_group(name: &str, members: &[&str]) -> NewGroup {
        NewGroup {
            name: name.to_string(),
            avatar: None,
            member_ids: members.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn test_create_group() {
        let f = fixture();
        let leader = person(&f, "1", "Lan");
        let member = person(&f, "2", "Minh");

        let group = f
            .groups
            .create_group(
                &leader,
                new_group("Lớp 12A", &[member.as_str(), member.as_str(), leader.as_str()]),
            )
            .unwrap();
        assert_eq!(group.members.len(), 2);
        assert!(group.is_leader(&leader));
        assert_eq!(group.leader_count(), 1);
        assert_eq!(group.member(&member).unwrap().join_method, ADDED_BY_LEADER);
        assert_eq!(group.member(&leader).unwrap().join_method, LEADER_JOIN_METHOD);

        let chat = f
            .store
            .get_chat(group.chat_id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert!(chat.is_group);
        assert_eq!(chat.group_id.as_deref(), Some(group.id.as_str()));
        assert_eq!(chat.members.len(), 2);
    }

    #[test]
    fn test_create_group_unknown_member() {
        let f = fixture();
        let leader = person(&f, "1", "Lan");
        let err = f
            .groups
            .create_group(&leader, new_group("g", &["ghost"]))
            .unwrap_err();
        assert!(matches!(err, GraphError::NotFound(_)));
        assert!(f.groups.list_groups_for(&leader).unwrap().is_empty());
    }

    #[test]
    fn test_create_group_requires_name() {
        let f = fixture();
        let leader = person(&f, "1", "Lan");
        assert!(matches!(
            f.groups.create_group(&leader, new_group("   ", &[])),
            Err(GraphError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_add_members() {
        let f = fixture();
        let leader = person(&f, "1", "Lan");
        let a = person(&f, "2", "Minh");
        let b = person(&f, "3", "Hoa");
        let group = f.groups.create_group(&leader, new_group("g", &[a.as_str()])).unwrap();

        let ids = vec![b.clone(), a.clone(), "ghost".to_string()];
        let group = f.groups.add_members(&group.id, &a, &ids).unwrap();
        assert_eq!(group.members.len(), 3);
        assert_eq!(group.member(&b).unwrap().join_method, "Thêm bởi Minh");

        let again = f.groups.add_members(&group.id, &a, &ids).unwrap();
        assert_eq!(again.members.len(), 3);

        let chat = f
            .store
            .get_chat(group.chat_id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert!(chat.members.contains(&b));
    }

    #[test]
    fn test_add_members_outsider() {
        let f = fixture();
        let leader = person(&f, "1", "Lan");
        let outsider = person(&f, "2", "Minh");
        let group = f.groups.create_group(&leader, new_group("g", &[])).unwrap();
        let err = f
            .groups
            .add_members(&group.id, &outsider, &[outsider.clone()])
            .unwrap_err();
        assert!(matches!(err, GraphError::Unauthorized(_)));
    }

    #[test]
    fn test_remove_member_rules() {
        let f = fixture();
        let leader = person(&f, "1", "Lan");
        let a = person(&f, "2", "Minh");
        let b = person(&f, "3", "Hoa");
        let group = f
            .groups
            .create_group(&leader, new_group("g", &[a.as_str(), b.as_str()]))
            .unwrap();

        assert!(matches!(
            f.groups.remove_member(&group.id, &a, &b),
            Err(GraphError::Unauthorized(_))
        ));
        assert!(matches!(
            f.groups.remove_member(&group.id, &leader, &leader),
            Err(GraphError::Conflict(_))
        ));
        assert!(matches!(
            f.groups.remove_member(&group.id, &leader, "ghost"),
            Err(GraphError::NotFound(_))
        ));

        let group = f.groups.remove_member(&group.id, &a, &a).unwrap();
        assert!(!group.is_member(&a));
        let group = f.groups.remove_member(&group.id, &leader, &b).unwrap();
        assert_eq!(group.members.len(), 1);

        let chat = f
            .store
            .get_chat(group.chat_id.as_deref().unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(chat.members, vec![leader]);
    }

    #[test]
    fn test_transfer_leadership() {
        let f = fixture();
        let leader = person(&f, "1", "Lan");
        let a = person(&f, "2", "Minh");
        let group = f.groups.create_group(&leader, new_group("g", &[a.as_str()])).unwrap();

        assert!(matches!(
            f.groups.transfer_leadership(&group.id, &a, &a),
            Err(GraphError::Unauthorized(_))
        ));
        let group = f.groups.transfer_leadership(&group.id, &leader, &a).unwrap();
        assert!(group.is_leader(&a));
        assert!(!group.is_leader(&leader));
        assert_eq!(group.leader_count(), 1);

        f.groups.remove_member(&group.id, &leader, &leader).unwrap();
    }

    #[test]
    fn test_delete_group() {
        let f = fixture();
        let leader = person(&f, "1", "Lan");
        let a = person(&f, "2", "Minh");
        let group = f.groups.create_group(&leader, new_group("g", &[a.as_str()])).unwrap();
        let chat_id = group.chat_id.clone().unwrap();

        assert!(matches!(
            f.groups.delete_group(&group.id, &a),
            Err(GraphError::Unauthorized(_))
        ));
        f.groups.delete_group(&group.id, &leader).unwrap();
        assert!(matches!(
            f.groups.get_group(&group.id),
            Err(GraphError::NotFound(_))
        ));
        assert!(f.store.get_chat(&chat_id).unwrap().is_none());
        assert!(f.groups.list_groups_for(&a).unwrap().is_empty());
        assert!(f.profiles.get(&a).unwrap().chats.is_empty());
    }
}
