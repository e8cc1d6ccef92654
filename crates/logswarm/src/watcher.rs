//! Log watchers
//!
//! One task per registered log. Each task waits for the next record of its
//! log and republishes `message` records as [`AppEvent::Message`]. The
//! awaited send on the bounded event queue is the only back pressure; no
//! record is ever dropped or reordered within a log.

use crate::events::{AppEvent, EventSender};
use crate::log::{LogError, LogHandle};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Running watcher tasks
#[derive(Default)]
pub struct Watchers {
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Watchers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tailing `log`. Callers guarantee one call per log.
    pub fn spawn(&self, log: LogHandle, events: EventSender) {
        let handle = tokio::spawn(watch_log(log, events));
        self.tasks.lock().push(handle);
    }

    /// Number of watchers still running
    pub fn running(&self) -> usize {
        self.tasks
            .lock()
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }

    /// Stop every watcher
    pub fn abort_all(&self) {
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

async fn watch_log(log: LogHandle, events: EventSender) {
    let id = log.id();
    let mut cursor = log.cursor();
    debug!("Watching log {}", id);

    loop {
        match cursor.next().await {
            Ok((index, record)) => {
                if !record.is_message() {
                    trace!("Skipping '{}' record {} of {}", record.kind, index, id);
                    continue;
                }
                let event = AppEvent::Message {
                    log: id,
                    index,
                    record,
                };
                if events.send(event).await.is_err() {
                    debug!("Event receiver dropped, stopping watcher for {}", id);
                    break;
                }
            }
            Err(LogError::Closed(_)) => {
                debug!("Log {} closed, stopping watcher", id);
                break;
            }
            Err(e) => {
                warn!("Unreadable record in {}: {}", id, e);
                let event = AppEvent::Error {
                    message: e.to_string(),
                };
                if events.send(event).await.is_err() {
                    break;
                }
            }
        }
    }
}
