//! Registry of known logs
//!
//! The registry is the single answer to "are we already watching this log?".
//! It only grows: a log that was registered once stays registered for the
//! life of the node.

use crate::log::{LogError, LogHandle};
use logswarm_core::types::LogId;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Default)]
struct RegistryState {
    /// Known log set: log id -> handle
    logs: HashMap<LogId, LogHandle>,
    /// Registration order, for stable announcements
    order: Vec<LogId>,
}

/// Deduplicated set of watched logs
#[derive(Default)]
pub struct LogRegistry {
    state: Mutex<RegistryState>,
}

impl LogRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` unless it is already known.
    ///
    /// The membership test, the call to `factory` and the insert happen
    /// under one lock, so concurrent registrations of the same id open at
    /// most one log. A failing factory leaves the registry untouched.
    pub fn register_if_new<F>(&self, id: LogId, factory: F) -> Result<(LogHandle, bool), LogError>
    where
        F: FnOnce() -> Result<LogHandle, LogError>,
    {
        let mut state = self.state.lock();
        if let Some(handle) = state.logs.get(&id) {
            return Ok((handle.clone(), false));
        }

        let handle = factory()?;
        state.logs.insert(id, handle.clone());
        state.order.push(id);
        Ok((handle, true))
    }

    pub fn contains(&self, id: &LogId) -> bool {
        self.state.lock().logs.contains_key(id)
    }

    /// Get a registered log
    pub fn get(&self, id: &LogId) -> Option<LogHandle> {
        self.state.lock().logs.get(id).cloned()
    }

    /// Snapshot of known ids in registration order
    pub fn known_ids(&self) -> Vec<LogId> {
        self.state.lock().order.clone()
    }

    /// Snapshot of registered handles in registration order
    pub fn handles(&self) -> Vec<LogHandle> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.logs.get(id).cloned())
            .collect()
    }

    /// Keep only the ids that are not registered yet
    pub fn unknown<'a>(&self, ids: impl IntoIterator<Item = &'a LogId>) -> Vec<LogId> {
        let state = self.state.lock();
        ids.into_iter()
            .filter(|id| !state.logs.contains_key(id))
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every registered log
    pub fn close_all(&self) {
        for handle in self.state.lock().logs.values() {
            handle.close();
        }
    }
}
