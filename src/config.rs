//! Server configuration
//!
//! Command line flags with environment fallbacks. `main` loads a `.env`
//! file first, so every option can also live there.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

/// Multi-room chat server
#[derive(Debug, Clone, Parser)]
#[command(name = "room_chat_server", version, about, long_about = None)]
pub struct Config {
    /// Address of the HTTP API
    #[arg(long, env = "CHAT_HTTP_ADDR", default_value = "127.0.0.1:3001")]
    pub http_addr: SocketAddr,

    /// Address of the realtime WebSocket listener
    #[arg(long, env = "CHAT_WS_ADDR", default_value = "127.0.0.1:3002")]
    pub ws_addr: SocketAddr,

    /// SQLite database URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://chat.db")]
    pub database_url: String,

    /// Seconds without a typing signal before the flag is cleared (0 disables)
    #[arg(long, env = "CHAT_TYPING_TIMEOUT_SECS", default_value_t = 5)]
    pub typing_timeout_secs: u64,

    /// Channel buffer size for server commands
    #[arg(long, env = "CHAT_COMMAND_BUFFER", default_value_t = 256)]
    pub command_buffer: usize,
}

impl Config {
    pub fn typing_timeout(&self) -> Option<Duration> {
        (self.typing_timeout_secs > 0).then(|| Duration::from_secs(self.typing_timeout_secs))
    }
}
