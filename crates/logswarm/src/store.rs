//! In-memory log store
//!
//! Opens logs by name (our own, writable) or by identifier (replicas).
//! Nothing is persisted; all logs are discarded when the store is dropped.

use crate::log::{LogError, LogHandle};
use logswarm_core::crypto::{derive_log_seed, validate_log_id, KeyPair};
use logswarm_core::types::{Bytes32, LogId};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Storage backend for logswarm
pub struct LogStore {
    /// Seed all of our named logs are derived from
    master_seed: Bytes32,
    /// Open logs: log id -> handle
    logs: RwLock<HashMap<LogId, LogHandle>>,
}

impl LogStore {
    pub fn new(master_seed: Bytes32) -> Self {
        Self {
            master_seed,
            logs: RwLock::new(HashMap::new()),
        }
    }

    /// Open (or create) one of our own logs by name.
    ///
    /// The writer key is derived from the master seed, so the same name
    /// always opens the same log.
    pub fn open_named(&self, name: &str) -> LogHandle {
        let writer = KeyPair::from_seed(&derive_log_seed(&self.master_seed, name));
        let id = LogId(writer.public_key());

        let mut logs = self.logs.write();
        logs.entry(id)
            .or_insert_with(|| {
                debug!("Opened writable log '{}' as {}", name, id);
                LogHandle::writable(writer)
            })
            .clone()
    }

    /// Open a log by identifier.
    ///
    /// Returns the already open handle when there is one (our own logs
    /// included); otherwise a new read-only replica.
    pub fn open(&self, id: LogId) -> Result<LogHandle, LogError> {
        if let Some(handle) = self.logs.read().get(&id) {
            return Ok(handle.clone());
        }

        validate_log_id(&id).map_err(|e| LogError::InvalidLogId {
            id,
            reason: e.to_string(),
        })?;

        let mut logs = self.logs.write();
        Ok(logs
            .entry(id)
            .or_insert_with(|| {
                debug!("Opened replica of {}", id);
                LogHandle::replica(id)
            })
            .clone())
    }

    /// Close every open log, waking all pending waits
    pub fn close_all(&self) {
        for log in self.logs.read().values() {
            log.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logswarm_core::types::Record;

    #[test]
    fn test_named_log_is_stable() {
        let store = LogStore::new([7; 32]);
        let first = store.open_named("my_messages");
        let second = store.open_named("my_messages");
        assert_eq!(first.id(), second.id());
        assert!(first.is_writable());

        first.append(&Record::message("hi", 1)).unwrap();
        assert_eq!(second.len(), 1);

        let other_node = LogStore::new([8; 32]);
        assert_ne!(other_node.open_named("my_messages").id(), first.id());
    }

    #[test]
    fn test_open_by_id() {
        let owner = LogStore::new([1; 32]);
        let id = owner.open_named("my_messages").id();

        let store = LogStore::new([2; 32]);
        let replica = store.open(id).unwrap();
        assert!(!replica.is_writable());
        assert_eq!(store.open(id).unwrap().id(), id);

        // Opening our own log by id returns the writable handle
        let own = owner.open(id).unwrap();
        assert!(own.is_writable());
    }

    #[test]
    fn test_close_all() {
        let store = LogStore::new([3; 32]);
        let log = store.open_named("my_messages");
        store.close_all();
        assert!(log.is_closed());
    }
}
