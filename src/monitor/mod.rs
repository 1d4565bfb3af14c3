//! Change tracking for a set of addresses
//!
//! A [`ValueMonitor`] owns a table of tracked addresses behind one mutex.
//! Each [`ValueMonitor::poll`] re-reads every entry in insertion order and
//! reports the ones whose bytes changed since the previous poll. Any number
//! of threads may track, untrack, poll and snapshot concurrently; the table
//! is never observed half-updated.

use crate::core::types::{Address, MemoryError, MemoryResult, Value};
use crate::memory::reader::read_chunk;
use crate::process::ProcessMemory;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::debug;

/// An address registered for repeated re-reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedAddress {
    pub address: Address,
    pub value_size: usize,
    /// Bytes seen by the last successful poll; empty until then
    pub last_value: Vec<u8>,
    /// When `last_value` last changed
    pub last_update: Option<Instant>,
}

/// A tracked value that changed between two polls
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueChange {
    pub address: Address,
    pub old_value: Vec<u8>,
    pub new_value: Vec<u8>,
    pub timestamp: Instant,
}

/// Thread-safe table of tracked addresses
#[derive(Debug, Default)]
pub struct ValueMonitor {
    tracked: Mutex<Vec<TrackedAddress>>,
}

impl ValueMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, Vec<TrackedAddress>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts tracking `size` bytes at `address`. Tracking an address again
    /// replaces its entry, resetting the last seen value.
    pub fn track(&self, address: Address, size: usize) -> MemoryResult<()> {
        self.insert(TrackedAddress {
            address,
            value_size: size,
            last_value: Vec::new(),
            last_update: None,
        })
    }

    /// Starts tracking `value.len()` bytes at `address`, taking `value` as
    /// the last seen bytes so only real departures from it are reported
    pub fn track_value(&self, address: Address, value: &Value) -> MemoryResult<()> {
        self.insert(TrackedAddress {
            address,
            value_size: value.len(),
            last_value: value.bytes().to_vec(),
            last_update: None,
        })
    }

    fn insert(&self, entry: TrackedAddress) -> MemoryResult<()> {
        if entry.value_size == 0 {
            return Err(MemoryError::InvalidParameter(
                "Tracked size cannot be zero".to_string(),
            ));
        }

        let mut table = self.table();
        match table.iter_mut().find(|t| t.address == entry.address) {
            Some(existing) => *existing = entry,
            None => table.push(entry),
        }
        Ok(())
    }

    /// Stops tracking `address`; does nothing if it is not tracked
    pub fn untrack(&self, address: Address) {
        self.table().retain(|t| t.address != address);
    }

    pub fn clear(&self) {
        self.table().clear();
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    pub fn is_tracked(&self, address: Address) -> bool {
        self.table().iter().any(|t| t.address == address)
    }

    /// Re-reads every tracked address and returns the changes.
    ///
    /// An entry whose read fails or comes back short keeps its old value and
    /// produces no change. The lock is held for the whole pass.
    pub fn poll<P: ProcessMemory + ?Sized>(&self, handle: &P) -> Vec<ValueChange> {
        let mut changes = Vec::new();
        if !handle.is_valid() {
            return changes;
        }

        let mut table = self.table();
        for entry in table.iter_mut() {
            let bytes = match read_chunk(handle, entry.address, entry.value_size) {
                Ok(bytes) if bytes.len() == entry.value_size => bytes,
                Ok(bytes) => {
                    debug!(address = %entry.address, got = bytes.len(), "Short read while polling");
                    continue;
                }
                Err(e) => {
                    debug!(address = %entry.address, error = %e, "Read failed while polling");
                    continue;
                }
            };

            if bytes == entry.last_value {
                continue;
            }

            let now = Instant::now();
            let old_value = std::mem::replace(&mut entry.last_value, bytes.clone());
            entry.last_update = Some(now);
            changes.push(ValueChange {
                address: entry.address,
                old_value,
                new_value: bytes,
                timestamp: now,
            });
        }

        changes
    }

    /// Copy of the whole table at one instant
    pub fn snapshot(&self) -> Vec<TrackedAddress> {
        self.table().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{MappingSpec, VirtualProcess};

    fn process() -> VirtualProcess {
        VirtualProcess::with_mappings([MappingSpec::zeroed(0x1000u64, 0x100)]).unwrap()
    }

    #[test]
    fn test_track_replaces_entry() {
        let monitor = ValueMonitor::new();
        monitor.track(Address::new(0x1000), 4).unwrap();
        monitor.track(Address::new(0x1010), 4).unwrap();
        monitor.track(Address::new(0x1000), 8).unwrap();

        let snapshot = monitor.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].address, Address::new(0x1000));
        assert_eq!(snapshot[0].value_size, 8);
        assert!(snapshot[0].last_value.is_empty());
        assert!(snapshot[0].last_update.is_none());
    }

    #[test]
    fn test_track_zero_size() {
        let monitor = ValueMonitor::new();
        assert!(monitor.track(Address::new(0x1000), 0).is_err());
        assert!(monitor.is_empty());
    }

    #[test]
    fn test_untrack_missing_is_noop() {
        let monitor = ValueMonitor::new();
        monitor.track(Address::new(0x1000), 4).unwrap();
        monitor.untrack(Address::new(0x2000));
        assert_eq!(monitor.len(), 1);
        monitor.untrack(Address::new(0x1000));
        assert!(!monitor.is_tracked(Address::new(0x1000)));
    }

    #[test]
    fn test_poll_reports_first_value_and_changes() {
        let process = process();
        let monitor = ValueMonitor::new();
        monitor.track(Address::new(0x1000), 4).unwrap();

        let first = monitor.poll(&process);
        assert_eq!(first.len(), 1);
        assert!(first[0].old_value.is_empty());
        assert_eq!(first[0].new_value, vec![0; 4]);

        assert!(monitor.poll(&process).is_empty());

        process.poke(0x1000u64, &[1, 0, 0, 0]).unwrap();
        let changes = monitor.poll(&process);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_value, vec![0; 4]);
        assert_eq!(changes[0].new_value, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_poll_keeps_value_on_failed_read() {
        let process = process();
        let monitor = ValueMonitor::new();
        monitor.track(Address::new(0x10FE), 4).unwrap();
        monitor
            .track_value(Address::new(0x1000), &Value::from_i32(0))
            .unwrap();

        // 0x10FE reads short, 0x1000 still holds the seeded value
        assert!(monitor.poll(&process).is_empty());
        assert!(monitor.snapshot()[0].last_value.is_empty());
        assert!(monitor.poll(&VirtualProcess::invalid()).is_empty());
    }
}
