//! logswarm - discovery and replication of append-only logs
//!
//! Every node owns one writable, signed log and learns about everyone
//! else's through a gossip of log identifiers. This crate provides:
//! - In-memory signed logs and the store that opens them
//! - A deduplicating registry of known logs
//! - One watcher task per log, republishing records as application events
//! - The discovery gossiper and the pull-based replicator
//! - The [`Node`] facade tying them to the transport
//! - Line input forwarding for the chat client

pub mod config;
pub mod discovery;
pub mod events;
pub mod input;
pub mod log;
pub mod node;
pub mod outbound;
pub mod registry;
pub mod replication;
pub mod store;
pub mod watcher;

pub use config::Config;
pub use discovery::{DiscoveryError, DiscoveryGossiper, DISCOVERY_CHANNEL};
pub use events::{render_event, AppEvent, EventReceiver};
pub use input::forward_lines;
pub use log::{LogCursor, LogError, LogHandle};
pub use node::{Node, NodeError, NodeStats};
pub use registry::LogRegistry;
pub use replication::Replicator;
pub use store::LogStore;
