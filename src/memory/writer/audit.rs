//! Append-only audit trail of write attempts

use crate::core::types::Address;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

/// One write attempt, successful or not
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRecord {
    /// Target address of the write
    pub address: Address,
    /// Bytes at the address just before the attempt; empty if they could not be read
    pub old_value: Vec<u8>,
    /// Bytes the caller asked to write
    pub new_value: Vec<u8>,
    /// When the attempt finished
    pub timestamp: SystemTime,
    /// Whether the bytes were written
    pub success: bool,
    /// Why the attempt failed
    pub error: Option<String>,
}

/// Append-only sequence of [`WriteRecord`]s.
///
/// Records are never changed or removed once appended. Readers get whole
/// copies, so the log can be inspected while writes continue on other threads.
#[derive(Debug, Default)]
pub struct AuditLog {
    records: Mutex<Vec<WriteRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, record: WriteRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Copy of every record, oldest first
    pub fn snapshot(&self) -> Vec<WriteRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent record
    pub fn last(&self) -> Option<WriteRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn record(address: u64, success: bool) -> WriteRecord {
        WriteRecord {
            address: Address::new(address),
            old_value: vec![0; 4],
            new_value: vec![1; 4],
            timestamp: SystemTime::now(),
            success,
            error: (!success).then(|| "refused".to_string()),
        }
    }

    #[test]
    fn test_append_and_snapshot() {
        let log = AuditLog::new();
        assert!(log.is_empty());
        log.append(record(0x10, true));
        log.append(record(0x20, false));

        let snapshot = log.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].address, Address::new(0x10));
        assert_eq!(log.last().unwrap().error.as_deref(), Some("refused"));
    }

    #[test]
    fn test_concurrent_appends() {
        let log = Arc::new(AuditLog::new());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    for i in 0..25 {
                        log.append(record(t * 100 + i, true));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(log.len(), 100);
    }

    #[test]
    fn test_record_serializes() {
        let json = serde_json::to_string(&record(0x40, false)).unwrap();
        assert!(json.contains("\"success\":false"));
        let back: WriteRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.address, Address::new(0x40));
    }
}
