//! Shared application state.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::notify::BroadcastDispatcher;
use crate::service::Rapport;

pub struct AppState {
    pub rapport: Rapport,
    /// Same dispatcher the service sends through; websocket connections
    /// subscribe to it.
    pub notifier: Arc<BroadcastDispatcher>,
    pub ws_connection_count: Arc<AtomicUsize>,
}

pub type SharedState = Arc<AppState>;
