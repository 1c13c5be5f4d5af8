//! rapport-web: HTTP and WebSocket front end for the profile, friendship
//! and group service, persisting state in SQLite.

pub mod config;
pub mod handlers;
pub mod router;
pub mod state;
pub mod utils;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use clap::Parser;

use crate::notify::BroadcastDispatcher;
use crate::service::{Options, Rapport};
use crate::storage::{db_path, Storage};
use crate::store::ProfileStore;

use config::{Cli, Config, WS_CHANNEL_CAPACITY};
use state::{AppState, SharedState};

/// Assemble the server state around `store`. Notifications go out through a
/// broadcast dispatcher that websocket connections subscribe to.
pub fn build_state(store: Arc<dyn ProfileStore>, options: Options) -> SharedState {
    let notifier = Arc::new(BroadcastDispatcher::new(WS_CHANNEL_CAPACITY));
    let rapport = Rapport::new(store, notifier.clone(), options);
    Arc::new(AppState {
        rapport,
        notifier,
        ws_connection_count: Arc::new(AtomicUsize::new(0)),
    })
}

/// Entry point: parse CLI, open the database, start server.
pub async fn run() {
    let cli = Cli::parse();
    let config = Config::from_cli_and_env(cli);

    crate::logging::init();

    crate::rlog!("rapport-web starting");
    crate::rlog!("  data directory: {}", config.data_dir.display());

    let path = db_path(&config.data_dir);
    let storage = Storage::open(&path).expect("failed to open database");
    crate::rlog!("  database: {}", path.display());
    crate::rlog!("  paired write retries: {}", config.write_retries);

    let options = Options {
        write_retries: config.write_retries,
        ..Options::default()
    };
    let state = build_state(Arc::new(storage), options);

    let app = router::build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind");
    crate::rlog!("rapport-web listening on http://{}", config.bind_addr);

    axum::serve(listener, app).await.expect("server error");
}
