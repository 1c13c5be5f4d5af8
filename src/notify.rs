//! Best-effort delivery of relationship and group events.
//!
//! Dispatch happens after the state change is committed. A failed dispatch
//! is logged and dropped; it never fails the operation that caused it.

use serde::Serialize;
use tokio::sync::broadcast;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    FriendRequest,
    NewMessage,
    GroupMemberAdded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub actor_id: Option<String>,
    pub timestamp: u64,
}

/// A notification together with the profile it is addressed to.
#[derive(Clone, Debug, Serialize)]
pub struct Addressed {
    pub target_id: String,
    #[serde(flatten)]
    pub notification: Notification,
}

#[derive(Debug)]
pub struct DispatchError(pub String);

impl std::fmt::Display for DispatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification not delivered: {}", self.0)
    }
}

impl std::error::Error for DispatchError {}

pub trait NotificationDispatcher: Send + Sync {
    fn send(&self, target_id: &str, notification: &Notification) -> Result<(), DispatchError>;
}

/// Send and swallow the error, leaving a log line behind.
pub fn dispatch(dispatcher: &dyn NotificationDispatcher, target_id: &str, n: &Notification) {
    if let Err(e) = dispatcher.send(target_id, n) {
        crate::rlog!(
            "notify: dropped {:?} for {}: {}",
            n.kind,
            crate::logging::profile_id(target_id),
            e
        );
    }
}

/// Fans notifications out to every live websocket subscriber; each
/// subscriber filters for its own profile.
pub struct BroadcastDispatcher {
    tx: broadcast::Sender<Addressed>,
}

impl BroadcastDispatcher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Addressed> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl NotificationDispatcher for BroadcastDispatcher {
    fn send(&self, target_id: &str, notification: &Notification) -> Result<(), DispatchError> {
        self.tx
            .send(Addressed {
                target_id: target_id.to_string(),
                notification: notification.clone(),
            })
            .map(|_| ())
            .map_err(|_| DispatchError("no live subscribers".to_string()))
    }
}

/// Dispatcher that drops everything; for tools and tests that do not care.
pub struct NullDispatcher;

impl NotificationDispatcher for NullDispatcher {
    fn send(&self, _target_id: &str, _notification: &Notification) -> Result<(), DispatchError> {
        Ok(())
    }
}
