//! Profile directory: creation, lookup (through the profile cache), updates
//! and the chat list of a profile.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::ProfileCache;
use crate::error::GraphError;
use crate::model::{new_id, now_secs, LastMessage, Profile};
use crate::store::ProfileStore;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewProfile {
    pub user_id: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

/// Fields left as `None` are not changed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub phone: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
    pub cover_image: Option<String>,
}

/// One row of a profile's chat list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRoom {
    pub id: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub is_group: bool,
    pub join_time: u64,
    pub last_message: Option<LastMessage>,
}

pub struct ProfileDirectory {
    store: Arc<dyn ProfileStore>,
    cache: ProfileCache,
}

fn require(field: &str, value: &str) -> Result<(), GraphError> {
    if value.trim().is_empty() {
        return Err(GraphError::invalid(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl ProfileDirectory {
    pub fn new(store: Arc<dyn ProfileStore>, cache: ProfileCache) -> Self {
        Self { store, cache }
    }

    pub fn create(&self, req: NewProfile) -> Result<Profile, GraphError> {
        require("user_id", &req.user_id)?;
        require("phone", &req.phone)?;
        require("first_name", &req.first_name)?;
        require("last_name", &req.last_name)?;

        let now = now_secs();
        let profile = Profile {
            id: new_id(),
            user_id: req.user_id.trim().to_string(),
            phone: req.phone.trim().to_string(),
            first_name: req.first_name.trim().to_string(),
            last_name: req.last_name.trim().to_string(),
            bio: req.bio,
            avatar: req.avatar,
            cover_image: req.cover_image,
            created_at: now,
            updated_at: now,
            edges: Vec::new(),
            chats: Vec::new(),
        };
        self.store.insert_profile(&profile)?;
        crate::rlog!(
            "profiles: created {} for user {}",
            crate::logging::profile_id(&profile.id),
            profile.user_id
        );
        Ok(profile)
    }

    /// Look up a profile by id, serving from the cache when possible.
    pub fn get(&self, id: &str) -> Result<Profile, GraphError> {
        if let Some(p) = self.cache.get(id) {
            return Ok(p);
        }
        let ticket = self.cache.generation(id);
        let profile = self
            .store
            .find_profile(id)?
            .ok_or_else(|| GraphError::not_found(format!("profile {id}")))?;
        self.cache.insert_if_current(profile.clone(), ticket);
        Ok(profile)
    }

    pub fn find_by_phone(&self, phone: &str) -> Result<Profile, GraphError> {
        self.store
            .find_profile_by_phone(phone.trim())?
            .ok_or_else(|| GraphError::not_found(format!("no profile with phone {phone}")))
    }

    /// Resolve the profile belonging to an external (credential service) identity.
    pub fn find_by_user(&self, user_id: &str) -> Result<Profile, GraphError> {
        self.store
            .find_profile_by_user(user_id)?
            .ok_or_else(|| GraphError::not_found(format!("no profile for user {user_id}")))
    }

    pub fn update(&self, id: &str, patch: ProfilePatch) -> Result<Profile, GraphError> {
        let mut profile = self
            .store
            .find_profile(id)?
            .ok_or_else(|| GraphError::not_found(format!("profile {id}")))?;

        if let Some(phone) = patch.phone {
            require("phone", &phone)?;
            profile.phone = phone.trim().to_string();
        }
        if let Some(first) = patch.first_name {
            require("first_name", &first)?;
            profile.first_name = first.trim().to_string();
        }
        if let Some(last) = patch.last_name {
            require("last_name", &last)?;
            profile.last_name = last.trim().to_string();
        }
        if patch.bio.is_some() {
            profile.bio = patch.bio;
        }
        if patch.avatar.is_some() {
            profile.avatar = patch.avatar;
        }
        if patch.cover_image.is_some() {
            profile.cover_image = patch.cover_image;
        }
        profile.updated_at = now_secs();

        let result = self.store.save_profile(&profile);
        self.cache.invalidate(id);
        result?;
        Ok(profile)
    }

    /// Drop cached copies of the given profiles after their records changed.
    pub fn invalidate<'a>(&self, ids: impl IntoIterator<Item = &'a str>) {
        self.cache.invalidate_all(ids);
    }

    pub fn cache(&self) -> &ProfileCache {
        &self.cache
    }

    /// Chats the profile belongs to, newest activity first.
    pub fn list_chats(&self, id: &str) -> Result<Vec<ChatRoom>, GraphError> {
        let profile = self.get(id)?;
        let mut rooms = Vec::with_capacity(profile.chats.len());

        for membership in &profile.chats {
            let Some(chat) = self.store.get_chat(&membership.chat_id)? else {
                continue;
            };
            let (name, avatar) = if chat.is_group {
                match chat.group_id.as_deref() {
                    Some(gid) => match self.store.get_group(gid)? {
                        Some(g) => (Some(g.name), g.avatar),
                        None => (None, None),
                    },
                    None => (None, None),
                }
            } else {
                match chat.members.iter().find(|m| m.as_str() != id) {
                    Some(other) => match self.get(other) {
                        Ok(p) => (Some(p.full_name()), p.avatar),
                        Err(GraphError::NotFound(_)) => (None, None),
                        Err(e) => return Err(e),
                    },
                    None => (None, None),
                }
            };
            rooms.push(ChatRoom {
                id: chat.id,
                name,
                avatar,
                is_group: chat.is_group,
                join_time: membership.join_time,
                last_message: chat.last_message,
            });
        }

        rooms.sort_by(|a, b| {
            let at = |r: &ChatRoom| r.last_message.as_ref().map(|m| m.created_at).unwrap_or(0);
            at(b).cmp(&at(a))
        });
        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn directory() -> ProfileDirectory {
        let store = Arc::new(Storage::open_in_memory().unwrap());
        ProfileDirectory::new(store, ProfileCache::new(16))
    }

    fn new_profile(user: &str, phone: &str) -> NewProfile {
        NewProfile {
            user_id: user.to_string(),
            phone: phone.to_string(),
            first_name: "Nguyen".to_string(),
            last_name: "An".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn create_and_get() {
        let dir = directory();
        let p = dir.create(new_profile("u1", "0901")).unwrap();
        assert_eq!(dir.get(&p.id).unwrap().phone, "0901");
        assert_eq!(dir.find_by_phone("0901").unwrap().id, p.id);
        assert_eq!(dir.find_by_user("u1").unwrap().id, p.id);
        assert_eq!(dir.cache().len(), 1);
    }

    #[test]
    fn blank_fields_are_rejected() {
        let dir = directory();
        let err = dir.create(new_profile("u1", "  ")).unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument(_)));
    }

    #[test]
    fn duplicate_phone_is_a_conflict() {
        let dir = directory();
        dir.create(new_profile("u1", "0901")).unwrap();
        let err = dir.create(new_profile("u2", "0901")).unwrap_err();
        assert!(matches!(err, GraphError::Conflict(_)));
    }

    #[test]
    fn update_invalidates_the_cache() {
        let dir = directory();
        let p = dir.create(new_profile("u1", "0901")).unwrap();
        dir.get(&p.id).unwrap();

        let patch = ProfilePatch {
            bio: Some("xin chào".to_string()),
            ..Default::default()
        };
        dir.update(&p.id, patch).unwrap();
        assert_eq!(dir.get(&p.id).unwrap().bio.as_deref(), Some("xin chào"));
    }

    #[test]
    fn unknown_profile_is_not_found() {
        let dir = directory();
        assert!(matches!(dir.get("nope"), Err(GraphError::NotFound(_))));
        assert!(matches!(
            dir.update("nope", ProfilePatch::default()),
            Err(GraphError::NotFound(_))
        ));
    }
}
