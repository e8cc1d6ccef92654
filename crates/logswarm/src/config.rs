//! Configuration for logswarm

use clap::Parser;
use logswarm_core::types::{Bytes32, Topic};
use std::net::SocketAddr;

/// Default discovery topic phrase
pub const DEFAULT_TOPIC: &str = "logswarm peer discovery";
/// Default name of the node's own writable log
pub const DEFAULT_LOG_NAME: &str = "my_messages";

/// logswarm - gossip chat over discovered append-only logs
#[derive(Parser, Debug, Clone)]
#[command(name = "logswarm")]
#[command(about = "Discover, replicate and tail append-only logs over a gossip mesh")]
pub struct Config {
    /// Listen address for peer connections
    #[arg(short, long, default_value = "0.0.0.0:9200")]
    pub listen: SocketAddr,

    /// Peers to dial at startup (comma-separated addresses)
    #[arg(long, value_delimiter = ',')]
    pub peers: Vec<SocketAddr>,

    /// Discovery topic: a 64 character hex key or a phrase
    #[arg(long, env = "LOGSWARM_TOPIC", default_value = DEFAULT_TOPIC)]
    pub topic: String,

    /// Name of our writable log
    #[arg(long, default_value = DEFAULT_LOG_NAME)]
    pub log_name: String,

    /// Identity seed (64 hex characters); random when absent
    #[arg(long, env = "LOGSWARM_SEED")]
    pub seed: Option<String>,

    /// Maximum entries per replication response
    #[arg(long, default_value = "1000")]
    pub max_sync_entries: u32,

    /// Capacity of the application event queue
    #[arg(long, default_value = "256")]
    pub event_buffer: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log format (json or pretty)
    #[arg(long, default_value = "pretty")]
    pub log_format: String,
}

impl Config {
    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.topic.trim().is_empty() {
            anyhow::bail!("Topic cannot be empty");
        }
        if self.log_name.trim().is_empty() {
            anyhow::bail!("Log name cannot be empty");
        }
        if self.max_sync_entries == 0 {
            anyhow::bail!("max-sync-entries must be at least 1");
        }
        if self.event_buffer == 0 {
            anyhow::bail!("event-buffer must be at least 1");
        }
        if !matches!(self.log_format.as_str(), "pretty" | "json") {
            anyhow::bail!("Log format must be 'pretty' or 'json', got '{}'", self.log_format);
        }
        self.seed_bytes()?;
        Ok(())
    }

    /// Parsed discovery topic
    pub fn topic(&self) -> anyhow::Result<Topic> {
        Ok(self.topic.parse::<Topic>()?)
    }

    /// Parsed identity seed, if one was given
    pub fn seed_bytes(&self) -> anyhow::Result<Option<Bytes32>> {
        let Some(seed) = &self.seed else {
            return Ok(None);
        };
        let bytes = hex::decode(seed.trim())?;
        let seed: Bytes32 = bytes
            .as_slice()
            .try_into()
            .map_err(|_| anyhow::anyhow!("Seed must be 32 bytes, got {}", bytes.len()))?;
        Ok(Some(seed))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9200)),
            peers: Vec::new(),
            topic: DEFAULT_TOPIC.to_string(),
            log_name: DEFAULT_LOG_NAME.to_string(),
            seed: None,
            max_sync_entries: 1000,
            event_buffer: 256,
            verbose: false,
            log_format: "pretty".to_string(),
        }
    }
}
