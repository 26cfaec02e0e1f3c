use std::num::NonZeroUsize;

use clap::Parser;
use tracing::Level;

pub const DEFAULT_ADDR: &str = "127.0.0.1:4321";
pub const BOUNDED_CHANNEL_SIZE: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(size) => size,
    None => panic!("outbound capacity must be non-zero"),
};

/// Presence and private-message relay server
#[derive(Debug, Clone, Parser)]
#[command(name = "relay-server", version, about)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Messages buffered per connection before further deliveries are dropped
    #[arg(long, default_value_t = BOUNDED_CHANNEL_SIZE)]
    pub outbound_capacity: NonZeroUsize,

    /// Names no connection may register under
    #[arg(long, value_delimiter = ',')]
    pub reserved: Vec<String>,

    #[arg(long, default_value = "info")]
    pub log_level: Level,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: DEFAULT_ADDR.to_owned(),
            outbound_capacity: BOUNDED_CHANNEL_SIZE,
            reserved: vec![],
            log_level: Level::INFO,
        }
    }
}

impl ServerConfig {
    /// Same defaults, listening on an ephemeral local port
    pub fn ephemeral() -> Self {
        ServerConfig {
            addr: "127.0.0.1:0".to_owned(),
            ..Default::default()
        }
    }
}
