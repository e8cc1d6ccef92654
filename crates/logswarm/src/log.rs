//! Append-only signed logs
//!
//! A [`LogHandle`] is a cheap, shared handle to one log. Only the node that
//! holds the writer key can append; every other copy is a replica that grows
//! through [`LogHandle::merge`] as signed entries arrive from peers.

use logswarm_core::crypto::{sign_entry, verify_entry, KeyPair};
use logswarm_core::encoding::{decode_record, encode_record};
use logswarm_core::types::*;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Log errors
#[derive(Debug, Error)]
pub enum LogError {
    #[error("Log {0} is not writable")]
    NotWritable(LogId),
    #[error("Entry {index} of log {log} is not available")]
    NotAvailable { log: LogId, index: u64 },
    #[error("Log {0} is closed")]
    Closed(LogId),
    #[error("Invalid log id {id}: {reason}")]
    InvalidLogId { id: LogId, reason: String },
    #[error("Invalid entry {index} for log {log}: {reason}")]
    InvalidEntry { log: LogId, index: u64, reason: String },
    #[error("Gap in log {log}: expected entry {expected}, got {got}")]
    Gap { log: LogId, expected: u64, got: u64 },
    #[error("Encoding error: {0}")]
    Encoding(#[from] logswarm_core::Error),
}

struct LogInner {
    id: LogId,
    /// Present only on the node that owns the log
    writer: Option<KeyPair>,
    entries: RwLock<Vec<SignedEntry>>,
    /// Current length; receivers are woken on every append and on close
    length: watch::Sender<u64>,
    closed: AtomicBool,
}

/// Shared handle to one append-only log
#[derive(Clone)]
pub struct LogHandle {
    inner: Arc<LogInner>,
}

impl LogHandle {
    fn with_writer(id: LogId, writer: Option<KeyPair>) -> Self {
        let (length, _) = watch::channel(0);
        Self {
            inner: Arc::new(LogInner {
                id,
                writer,
                entries: RwLock::new(Vec::new()),
                length,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Open a log we own and can append to
    pub fn writable(writer: KeyPair) -> Self {
        Self::with_writer(LogId(writer.public_key()), Some(writer))
    }

    /// Open a read-only replica of someone else's log
    pub fn replica(id: LogId) -> Self {
        Self::with_writer(id, None)
    }

    pub fn id(&self) -> LogId {
        self.inner.id
    }

    pub fn is_writable(&self) -> bool {
        self.inner.writer.is_some()
    }

    /// Number of entries held locally
    pub fn len(&self) -> u64 {
        self.inner.entries.read().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Append a record; returns its index
    pub fn append(&self, record: &Record) -> Result<u64, LogError> {
        let writer = self
            .inner
            .writer
            .as_ref()
            .ok_or(LogError::NotWritable(self.id()))?;
        if self.is_closed() {
            return Err(LogError::Closed(self.id()));
        }

        let payload = encode_record(record)?;

        let mut entries = self.inner.entries.write();
        let index = entries.len() as u64;
        entries.push(sign_entry(writer, index, payload));
        self.inner.length.send_replace(index + 1);

        Ok(index)
    }

    /// Read the record at `index`
    pub fn get(&self, index: u64) -> Result<Record, LogError> {
        let entries = self.inner.entries.read();
        let entry = entries
            .get(index as usize)
            .ok_or(LogError::NotAvailable { log: self.id(), index })?;
        Ok(decode_record(&entry.payload)?)
    }

    /// Up to `max` signed entries starting at `start`
    pub fn entries(&self, start: u64, max: usize) -> Vec<SignedEntry> {
        let entries = self.inner.entries.read();
        entries
            .iter()
            .skip(start as usize)
            .take(max)
            .cloned()
            .collect()
    }

    /// Merge a replicated entry.
    ///
    /// Returns `Ok(false)` for entries we already hold. Entries must arrive
    /// contiguously; anything past the current end is a gap.
    pub fn merge(&self, entry: SignedEntry) -> Result<bool, LogError> {
        let log = self.id();
        if self.is_closed() {
            return Err(LogError::Closed(log));
        }

        verify_entry(&log, &entry).map_err(|e| LogError::InvalidEntry {
            log,
            index: entry.index,
            reason: e.to_string(),
        })?;
        decode_record(&entry.payload).map_err(|e| LogError::InvalidEntry {
            log,
            index: entry.index,
            reason: e.to_string(),
        })?;

        let mut entries = self.inner.entries.write();
        let expected = entries.len() as u64;
        if entry.index < expected {
            return Ok(false);
        }
        if entry.index > expected {
            return Err(LogError::Gap {
                log,
                expected,
                got: entry.index,
            });
        }
        entries.push(entry);
        self.inner.length.send_replace(expected + 1);

        Ok(true)
    }

    /// Wait until the record at `index` is available, then read it.
    ///
    /// Suspends indefinitely; resolves with [`LogError::Closed`] on close.
    pub async fn wait_for(&self, index: u64) -> Result<Record, LogError> {
        let mut length = self.inner.length.subscribe();
        loop {
            if self.is_closed() {
                return Err(LogError::Closed(self.id()));
            }
            let available = *length.borrow_and_update();
            if available > index {
                return self.get(index);
            }
            length
                .changed()
                .await
                .map_err(|_| LogError::Closed(self.id()))?;
        }
    }

    /// Cursor over this log starting at the first entry
    pub fn cursor(&self) -> LogCursor {
        LogCursor {
            log: self.clone(),
            position: 0,
        }
    }

    /// Close the log and wake every pending wait
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.length.send_modify(|_| {});
    }
}

impl std::fmt::Debug for LogHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogHandle")
            .field("id", &self.id())
            .field("writable", &self.is_writable())
            .field("len", &self.len())
            .finish()
    }
}

/// Private read position into one log
pub struct LogCursor {
    log: LogHandle,
    position: u64,
}

impl LogCursor {
    /// Index of the next record this cursor will yield
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Wait for the next record and advance past it.
    ///
    /// An undecodable record is still consumed so the cursor never stalls;
    /// only [`LogError::Closed`] leaves the position unchanged.
    pub async fn next(&mut self) -> Result<(u64, Record), LogError> {
        let index = self.position;
        match self.log.wait_for(index).await {
            Err(e @ LogError::Closed(_)) => Err(e),
            result => {
                self.position += 1;
                result.map(|record| (index, record))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn writer() -> LogHandle {
        LogHandle::writable(KeyPair::from_seed(&[1; 32]))
    }

    #[test]
    fn test_append_and_get() {
        let log = writer();
        assert!(log.is_writable());

        let index = log.append(&Record::message("one", 1)).unwrap();
        assert_eq!(index, 0);
        assert_eq!(log.append(&Record::message("two", 2)).unwrap(), 1);

        assert_eq!(log.len(), 2);
        assert_eq!(log.get(1).unwrap().message_text(), Some("two"));
    }

    #[test]
    fn test_replica_not_writable() {
        let replica = LogHandle::replica(writer().id());
        assert!(matches!(
            replica.append(&Record::message("nope", 1)),
            Err(LogError::NotWritable(_))
        ));
    }

    #[test]
    fn test_get_not_available() {
        let log = writer();
        assert!(matches!(
            log.get(0),
            Err(LogError::NotAvailable { index: 0, .. })
        ));
    }

    #[test]
    fn test_merge_replicated_entries() {
        let source = writer();
        source.append(&Record::message("a", 1)).unwrap();
        source.append(&Record::message("b", 2)).unwrap();
        let entries = source.entries(0, 10);

        let replica = LogHandle::replica(source.id());
        assert!(replica.merge(entries[0].clone()).unwrap());
        assert!(!replica.merge(entries[0].clone()).unwrap());
        assert!(replica.merge(entries[1].clone()).unwrap());
        assert_eq!(replica.len(), 2);
        assert_eq!(replica.get(1).unwrap(), source.get(1).unwrap());
    }

    #[test]
    fn test_merge_rejects_gap_and_forgery() {
        let source = writer();
        source.append(&Record::message("a", 1)).unwrap();
        source.append(&Record::message("b", 2)).unwrap();
        let entries = source.entries(0, 10);

        let replica = LogHandle::replica(source.id());
        assert!(matches!(
            replica.merge(entries[1].clone()),
            Err(LogError::Gap { expected: 0, got: 1, .. })
        ));

        let mut forged = entries[0].clone();
        forged.payload = br#"{"type":"message","timestamp":1,"message":"evil"}"#.to_vec();
        assert!(matches!(
            replica.merge(forged),
            Err(LogError::InvalidEntry { .. })
        ));
        assert!(replica.is_empty());
    }

    #[tokio::test]
    async fn test_cursor_waits_for_append() {
        let log = writer();
        let mut cursor = log.cursor();

        let appender = log.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            for text in ["r1", "r2", "r3"] {
                appender.append(&Record::message(text, 0)).unwrap();
            }
        });

        let mut seen = Vec::new();
        for _ in 0..3 {
            let (index, record) = timeout(Duration::from_secs(2), cursor.next())
                .await
                .unwrap()
                .unwrap();
            seen.push((index, record.message_text().unwrap().to_string()));
        }
        assert_eq!(
            seen,
            vec![(0, "r1".to_string()), (1, "r2".to_string()), (2, "r3".to_string())]
        );
        assert_eq!(cursor.position(), 3);
    }

    #[tokio::test]
    async fn test_close_wakes_pending_wait() {
        let log = writer();
        let waiter = log.clone();
        let pending = tokio::spawn(async move { waiter.wait_for(0).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        log.close();

        let result = timeout(Duration::from_secs(2), pending).await.unwrap().unwrap();
        assert!(matches!(result, Err(LogError::Closed(_))));
        assert!(matches!(
            log.append(&Record::message("late", 0)),
            Err(LogError::Closed(_))
        ));
    }
}
