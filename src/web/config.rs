//! Configuration types and constants for the rapport-web server.

use std::path::PathBuf;

use clap::Parser;

use crate::service::DEFAULT_WRITE_RETRIES;

pub(crate) const WS_CHANNEL_CAPACITY: usize = 256;
pub(crate) const MAX_WS_CONNECTIONS: usize = 64;
/// Header carrying the caller's profile id, set by the session layer in
/// front of this server.
pub const PROFILE_HEADER: &str = "x-profile-id";

/// Profile, friendship and group service for the chat application.
///
/// Configuration can be set via CLI arguments or environment variables.
/// CLI arguments take precedence over environment variables.
#[derive(Parser, Debug)]
#[command(name = "rapport-web", version, about)]
pub struct Cli {
    /// HTTP server bind address [env: RAPPORT_BIND] [default: 127.0.0.1:3100]
    #[arg(long, short = 'b')]
    pub bind: Option<String>,

    /// Data directory for the database [env: RAPPORT_HOME] [default: ~/.rapport]
    #[arg(long, short = 'd')]
    pub data_dir: Option<PathBuf>,

    /// Extra attempts for the second write of an edge pair [env: RAPPORT_WRITE_RETRIES] [default: 2]
    #[arg(long)]
    pub write_retries: Option<u32>,
}

pub struct Config {
    pub bind_addr: String,
    pub data_dir: PathBuf,
    pub write_retries: u32,
}

impl Config {
    pub fn from_cli_and_env(cli: Cli) -> Self {
        let data_dir = cli
            .data_dir
            .or_else(|| std::env::var("RAPPORT_HOME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                std::env::var("HOME")
                    .map(|h| PathBuf::from(h).join(".rapport"))
                    .unwrap_or_else(|_| PathBuf::from(".rapport"))
            });

        let bind_addr = cli
            .bind
            .or_else(|| std::env::var("RAPPORT_BIND").ok())
            .unwrap_or_else(|| "127.0.0.1:3100".to_string());

        let write_retries = cli
            .write_retries
            .or_else(|| {
                std::env::var("RAPPORT_WRITE_RETRIES")
                    .ok()
                    .and_then(|v| v.trim().parse().ok())
            })
            .unwrap_or(DEFAULT_WRITE_RETRIES);

        Self {
            bind_addr,
            data_dir,
            write_retries,
        }
    }
}
