//! Application events
//!
//! Everything the node reports to the application goes through one
//! [`AppEvent`] queue: newly discovered logs, observed messages and
//! non-fatal errors.

use chrono::{DateTime, Local, Utc};
use logswarm_core::types::{LogId, Record};
use tokio::sync::mpsc;

/// Sender half of the application event queue
pub type EventSender = mpsc::Sender<AppEvent>;
/// Receiver half of the application event queue
pub type EventReceiver = mpsc::Receiver<AppEvent>;

/// Event delivered to the application
#[derive(Clone, Debug, PartialEq)]
pub enum AppEvent {
    /// A log was registered for the first time (our own log included)
    Discovered { log: LogId },
    /// A watcher observed a `message` record
    Message {
        log: LogId,
        index: u64,
        record: Record,
    },
    /// A non-fatal error (bad control message, unreadable record)
    Error { message: String },
}

/// Render an event the way the chat client prints it
pub fn render_event(event: &AppEvent) -> String {
    match event {
        AppEvent::Discovered { log } => format!("New peer: {}", log.short()),
        AppEvent::Message { log, record, .. } => {
            let when = DateTime::<Utc>::from_timestamp_millis(record.timestamp as i64)
                .map(|t| t.with_timezone(&Local).format("%H:%M:%S").to_string())
                .unwrap_or_else(|| record.timestamp.to_string());
            let text = record.message_text().unwrap_or_default();
            format!("{}:\t{}\n\t{}", log.short(), when, text)
        }
        AppEvent::Error { message } => format!("error: {}", message),
    }
}
