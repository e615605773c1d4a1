//! Append-only audit log of ledger mutations.

use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One audit record: a wall-clock timestamp (second resolution when
/// rendered) and a human-readable message. Immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl AuditEntry {
    fn new(message: String) -> Self {
        Self {
            timestamp: Utc::now(),
            message,
        }
    }
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.message
        )
    }
}

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

/// Append-only, timestamped record of every ledger mutation. Entries are
/// stored in insertion order and never reordered or truncated; the log is
/// bounded only by process memory.
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp `message` with the current wall-clock time and append it.
    pub fn append(&self, message: impl Into<String>) {
        let entry = AuditEntry::new(message.into());
        tracing::info!(audit = %entry.message, "audit");
        self.entries.lock().unwrap().push(entry);
    }

    /// Append a whole batch of messages under a single lock acquisition,
    /// so one batch's entries are never interleaved with another's.
    pub fn append_batch(&self, messages: impl IntoIterator<Item = String>) {
        let mut entries = self.entries.lock().unwrap();
        for message in messages {
            let entry = AuditEntry::new(message);
            tracing::info!(audit = %entry.message, "audit");
            entries.push(entry);
        }
    }

    /// Copy of all entries in insertion order. The lock is held only for
    /// the duration of the clone, so readers never hold writers off for
    /// longer than the copy.
    pub fn snapshot(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InventoryLedger;
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_append_preserves_order() {
        let log = AuditLog::new();
        log.append("first");
        log.append("second");
        log.append("third");

        let entries = log.snapshot();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "first");
        assert_eq!(entries[1].message, "second");
        assert_eq!(entries[2].message, "third");
    }

    #[test]
    fn test_display_format() {
        let log = AuditLog::new();
        log.append("Sold 1 apple(s): updated from 100 to 99.");
        let rendered = log.snapshot()[0].to_string();
        // "[YYYY-MM-DD HH:MM:SS] message"
        assert!(rendered.starts_with('['), "{rendered}");
        assert_eq!(&rendered[11..12], " ");
        assert!(rendered.ends_with("] Sold 1 apple(s): updated from 100 to 99."));
    }

    #[test]
    fn test_serialized_timestamp_is_second_resolution() {
        let log = AuditLog::new();
        log.append("hello");
        let json = serde_json::to_value(&log.snapshot()[0]).unwrap();
        let ts = json["timestamp"].as_str().unwrap();
        // 19 chars: "YYYY-MM-DD HH:MM:SS" — no sub-second part.
        assert_eq!(ts.len(), 19, "{ts}");
        assert_eq!(json["message"], "hello");
    }

    #[test]
    fn test_append_batch_is_contiguous_under_contention() {
        // Writers race whole batches; every batch must land contiguously
        // and in order within itself.
        let log = Arc::new(AuditLog::new());
        let mut handles = Vec::new();

        for writer in 0..8 {
            let log = Arc::clone(&log);
            handles.push(std::thread::spawn(move || {
                for batch in 0..20 {
                    log.append_batch((0..3).map(|i| format!("w{writer} b{batch} e{i}")));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let entries = log.snapshot();
        assert_eq!(entries.len(), 8 * 20 * 3);
        for chunk in entries.chunks(3) {
            let prefix = chunk[0]
                .message
                .rsplit_once(' ')
                .map(|(head, _)| head.to_string())
                .unwrap();
            for (i, entry) in chunk.iter().enumerate() {
                assert_eq!(entry.message, format!("{prefix} e{i}"));
            }
        }
    }

    // The service-level discipline: decrement under the ledger lock,
    // release, then append the batch. Concurrent disjoint-SKU batches must
    // all be applied (no lost update) and the log must contain exactly one
    // entry per request, batches unbroken.
    #[test]
    fn test_concurrent_batches_no_lost_update() {
        let ledger = Arc::new(Mutex::new(InventoryLedger::new(BTreeMap::from([
            ("left".to_string(), 1000),
            ("right".to_string(), 1000),
        ]))));
        let log = Arc::new(AuditLog::new());

        let mut handles = Vec::new();
        for (sku, calls) in [("left", 50), ("right", 50)] {
            let ledger = Arc::clone(&ledger);
            let log = Arc::clone(&log);
            handles.push(std::thread::spawn(move || {
                for _ in 0..calls {
                    let requests = BTreeMap::from([(sku.to_string(), 2i64)]);
                    let outcome = ledger.lock().unwrap().decrement_batch(&requests);
                    log.append_batch(outcome.events);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let ledger = ledger.lock().unwrap();
        assert_eq!(ledger.quantity("left"), Some(900));
        assert_eq!(ledger.quantity("right"), Some(900));
        assert_eq!(log.len(), 100);
    }
}
