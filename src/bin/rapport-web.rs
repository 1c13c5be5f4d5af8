//! rapport-web: HTTP and WebSocket server for profiles, friendships and
//! groups, persisting state in SQLite.

#[tokio::main]
async fn main() {
    rapport::web::run().await;
}
