#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

use rapport::model::{Chat, ChatMessage, Edge, Group, Profile, RelationshipStatus};
use rapport::notify::{DispatchError, Notification, NotificationDispatcher};
use rapport::profiles::NewProfile;
use rapport::storage::{Storage, StorageError};
use rapport::store::ProfileStore;
use rapport::{Options, Rapport};

/// Keeps every notification it is handed.
#[derive(Default)]
pub struct RecordingDispatcher {
    pub sent: Mutex<Vec<(String, Notification)>>,
}

impl RecordingDispatcher {
    pub fn sent(&self) -> Vec<(String, Notification)> {
        self.sent.lock().unwrap().clone()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn send(&self, target_id: &str, notification: &Notification) -> Result<(), DispatchError> {
        self.sent
            .lock()
            .unwrap()
            .push((target_id.to_string(), notification.clone()));
        Ok(())
    }
}

/// Fails every delivery.
pub struct FailingDispatcher;

impl NotificationDispatcher for FailingDispatcher {
    fn send(&self, _target_id: &str, _notification: &Notification) -> Result<(), DispatchError> {
        Err(DispatchError("transport down".to_string()))
    }
}

/// A profile read that stops after loading, until released.
struct HeldRead {
    profile_id: String,
    loaded: Sender<()>,
    release: Receiver<()>,
}

/// SQLite store whose writes can be made to fail on demand.
///
/// `script_puts` queues outcomes for the next `put_edge` calls in order
/// (`true` fails the call); once the queue is empty every call succeeds.
/// `fail_next` fails the next `times` calls of one named method.
pub struct FlakyStore {
    inner: Storage,
    put_script: Mutex<VecDeque<bool>>,
    fail_deletes: AtomicBool,
    failures: Mutex<HashMap<&'static str, u32>>,
    held_read: Mutex<Option<HeldRead>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: Storage::open_in_memory().unwrap(),
            put_script: Mutex::new(VecDeque::new()),
            fail_deletes: AtomicBool::new(false),
            failures: Mutex::new(HashMap::new()),
            held_read: Mutex::new(None),
        }
    }

    /// Fail the next `times` calls of `method` (`add_chat_member`,
    /// `remove_chat_member`, `save_group`, `delete_group`).
    pub fn fail_next(&self, method: &'static str, times: u32) {
        self.failures.lock().unwrap().insert(method, times);
    }

    fn should_fail(&self, method: &'static str) -> bool {
        let mut failures = self.failures.lock().unwrap();
        match failures.get_mut(method) {
            Some(n) if *n > 0 => {
                *n -= 1;
                true
            }
            _ => false,
        }
    }

    /// Make the next `find_profile(profile_id)` stop right after it has read
    /// the row. The first receiver fires once the row is loaded; sending on
    /// the returned sender lets the read finish.
    pub fn hold_next_read(&self, profile_id: &str) -> (Receiver<()>, Sender<()>) {
        let (loaded_tx, loaded_rx) = channel();
        let (release_tx, release_rx) = channel();
        *self.held_read.lock().unwrap() = Some(HeldRead {
            profile_id: profile_id.to_string(),
            loaded: loaded_tx,
            release: release_rx,
        });
        (loaded_rx, release_tx)
    }

    pub fn script_puts(&self, outcomes: &[bool]) {
        let mut script = self.put_script.lock().unwrap();
        script.clear();
        script.extend(outcomes.iter().copied());
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &Storage {
        &self.inner
    }

    fn injected(what: &str) -> StorageError {
        StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            format!("injected failure: {what}"),
        ))
    }
}

impl ProfileStore for FlakyStore {
    fn find_profile(&self, id: &str) -> Result<Option<Profile>, StorageError> {
        let found = self.inner.find_profile(id);
        let held = {
            let mut slot = self.held_read.lock().unwrap();
            match slot.as_ref() {
                Some(h) if h.profile_id == id => slot.take(),
                _ => None,
            }
        };
        if let Some(h) = held {
            let _ = h.loaded.send(());
            let _ = h.release.recv();
        }
        found
    }
    fn find_profile_by_user(&self, user_id: &str) -> Result<Option<Profile>, StorageError> {
        self.inner.find_profile_by_user(user_id)
    }
    fn find_profile_by_phone(&self, phone: &str) -> Result<Option<Profile>, StorageError> {
        self.inner.find_profile_by_phone(phone)
    }
    fn insert_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        self.inner.insert_profile(profile)
    }
    fn save_profile(&self, profile: &Profile) -> Result<(), StorageError> {
        self.inner.save_profile(profile)
    }
    fn save_profiles(&self, profiles: &[Profile]) -> Result<(), StorageError> {
        self.inner.save_profiles(profiles)
    }
    fn get_edge(&self, owner_id: &str, target_id: &str) -> Result<Option<Edge>, StorageError> {
        self.inner.get_edge(owner_id, target_id)
    }
    fn put_edge(&self, edge: &Edge) -> Result<(), StorageError> {
        let fail = self.put_script.lock().unwrap().pop_front().unwrap_or(false);
        if fail {
            return Err(Self::injected("put_edge"));
        }
        self.inner.put_edge(edge)
    }
    fn delete_edge(&self, owner_id: &str, target_id: &str) -> Result<bool, StorageError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(Self::injected("delete_edge"));
        }
        self.inner.delete_edge(owner_id, target_id)
    }
    fn list_edges(
        &self,
        owner_id: &str,
        status: Option<RelationshipStatus>,
    ) -> Result<Vec<Edge>, StorageError> {
        self.inner.list_edges(owner_id, status)
    }
    fn insert_chat(&self, chat: &Chat, first_message: &ChatMessage) -> Result<(), StorageError> {
        self.inner.insert_chat(chat, first_message)
    }
    fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>, StorageError> {
        self.inner.get_chat(chat_id)
    }
    fn delete_chat(&self, chat_id: &str) -> Result<bool, StorageError> {
        self.inner.delete_chat(chat_id)
    }
    fn add_chat_member(
        &self,
        chat_id: &str,
        profile_id: &str,
        join_time: u64,
    ) -> Result<(), StorageError> {
        if self.should_fail("add_chat_member") {
            return Err(Self::injected("add_chat_member"));
        }
        self.inner.add_chat_member(chat_id, profile_id, join_time)
    }
    fn remove_chat_member(&self, chat_id: &str, profile_id: &str) -> Result<bool, StorageError> {
        if self.should_fail("remove_chat_member") {
            return Err(Self::injected("remove_chat_member"));
        }
        self.inner.remove_chat_member(chat_id, profile_id)
    }
    fn insert_group(&self, group: &Group) -> Result<(), StorageError> {
        self.inner.insert_group(group)
    }
    fn get_group(&self, group_id: &str) -> Result<Option<Group>, StorageError> {
        self.inner.get_group(group_id)
    }
    fn save_group(&self, group: &Group) -> Result<(), StorageError> {
        if self.should_fail("save_group") {
            return Err(Self::injected("save_group"));
        }
        self.inner.save_group(group)
    }
    fn delete_group(&self, group_id: &str) -> Result<bool, StorageError> {
        if self.should_fail("delete_group") {
            return Err(Self::injected("delete_group"));
        }
        self.inner.delete_group(group_id)
    }
    fn list_groups_for(&self, profile_id: &str) -> Result<Vec<Group>, StorageError> {
        self.inner.list_groups_for(profile_id)
    }
}

/// A service over an in-memory database with a recording dispatcher.
pub fn service() -> (Arc<Rapport>, Arc<Storage>, Arc<RecordingDispatcher>) {
    let store = Arc::new(Storage::open_in_memory().unwrap());
    let notifier = Arc::new(RecordingDispatcher::default());
    let rapport = Rapport::new(store.clone(), notifier.clone(), Options::default());
    (Arc::new(rapport), store, notifier)
}

/// A service over a [`FlakyStore`].
pub fn flaky_service(write_retries: u32) -> (Rapport, Arc<FlakyStore>, Arc<RecordingDispatcher>) {
    let store = Arc::new(FlakyStore::new());
    let notes = Arc::new(RecordingDispatcher::default());
    let options = Options {
        write_retries,
        ..Options::default()
    };
    let rapport = Rapport::new(store.clone(), notes.clone(), options);
    (rapport, store, notes)
}

pub fn new_profile(phone: &str, first: &str, last: &str) -> NewProfile {
    NewProfile {
        user_id: format!("user-{phone}"),
        phone: phone.to_string(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        ..Default::default()
    }
}

pub fn person(rapport: &Rapport, phone: &str, first: &str, last: &str) -> Profile {
    rapport
        .profiles
        .create(new_profile(phone, first, last))
        .unwrap()
}

/// Both directed statuses straight from the store.
pub fn stored_pair(
    store: &dyn ProfileStore,
    a: &str,
    b: &str,
) -> (RelationshipStatus, RelationshipStatus) {
    let status = |x: &str, y: &str| {
        store
            .get_edge(x, y)
            .unwrap()
            .map(|e| e.status)
            .unwrap_or(RelationshipStatus::Stranger)
    };
    (status(a, b), status(b, a))
}
