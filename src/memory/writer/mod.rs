//! Audited memory writes
//!
//! Every call to [`MemoryWriter::write`] checks that the target range may be
//! written, raises protection where the current one forbids writing, writes
//! the bytes, optionally reads them back, restores the original protection
//! and appends exactly one [`WriteRecord`] to the writer's history, whether
//! the attempt succeeded or not. Failed writes are never retried.

pub mod audit;

pub use audit::{AuditLog, WriteRecord};

use super::reader::read_chunk;
use super::regions::{region_at, ProtectionManager};
use crate::core::types::{Address, MemoryError, MemoryResult, Region, Value};
use crate::process::ProcessMemory;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Options controlling the write sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Read the bytes back after writing and fail on mismatch
    pub verify_writes: bool,
    /// Put raised protections back after the write
    pub restore_protection: bool,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            verify_writes: true,
            restore_protection: true,
        }
    }
}

/// Leaf regions covering `[start, end)` without gaps
fn covering_regions<P: ProcessMemory + ?Sized>(
    handle: &P,
    start: Address,
    end: Address,
) -> MemoryResult<Vec<Region>> {
    let mut regions = Vec::new();
    let mut cursor = start;

    while cursor < end {
        let region = region_at(handle, cursor)?;
        let next = region.end();
        if next <= cursor {
            return Err(MemoryError::RegionNotFound(cursor.to_string()));
        }
        regions.push(region);
        cursor = next;
    }

    Ok(regions)
}

fn may_write(region: &Region) -> bool {
    region.is_writable() || region.can_become_writable()
}

/// Writes memory and keeps an audit history of every attempt.
///
/// The writer holds no handle; the same writer (and history) can be used
/// with any handle, from any number of threads. Writes through one writer
/// run their protect/write/restore sequence one at a time, so a restore
/// never pulls write access from under another write of the same writer.
/// Separate writers on the same target are not coordinated.
#[derive(Debug, Default)]
pub struct MemoryWriter {
    history: AuditLog,
    options: WriterOptions,
    sequence: Mutex<()>,
}

impl MemoryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: WriterOptions) -> Self {
        MemoryWriter {
            history: AuditLog::new(),
            options,
            sequence: Mutex::new(()),
        }
    }

    pub fn options(&self) -> WriterOptions {
        self.options
    }

    /// Whether every byte of `[address, address + size)` lies in a mapped
    /// region that is writable or may be made writable. Changes nothing.
    pub fn can_write<P: ProcessMemory + ?Sized>(
        &self,
        handle: &P,
        address: Address,
        size: usize,
    ) -> bool {
        if !handle.is_valid() || size == 0 {
            return false;
        }
        let Some(end) = address.checked_add(size as u64) else {
            return false;
        };

        match covering_regions(handle, address, end) {
            Ok(regions) => regions.iter().all(may_write),
            Err(e) => {
                debug!(%address, size, error = %e, "Range is not fully mapped");
                false
            }
        }
    }

    /// Writes `data` at `address` and reports whether it succeeded.
    /// The attempt is recorded either way.
    pub fn write<P: ProcessMemory + ?Sized>(&self, handle: &P, address: Address, data: &[u8]) -> bool {
        self.try_write(handle, address, data).is_ok()
    }

    /// Writes the encoded bytes of `value`
    pub fn write_value<P: ProcessMemory + ?Sized>(
        &self,
        handle: &P,
        address: Address,
        value: &Value,
    ) -> bool {
        self.write(handle, address, value.bytes())
    }

    /// Like [`MemoryWriter::write`], returning the reason for a failure
    pub fn try_write<P: ProcessMemory + ?Sized>(
        &self,
        handle: &P,
        address: Address,
        data: &[u8],
    ) -> MemoryResult<()> {
        let old_value = self.read_previous(handle, address, data.len());
        let outcome = self.perform(handle, address, data);

        match &outcome {
            Ok(()) => info!(%address, size = data.len(), "Write succeeded"),
            Err(e) => warn!(%address, size = data.len(), error = %e, "Write failed"),
        }

        self.history.append(WriteRecord {
            address,
            old_value,
            new_value: data.to_vec(),
            timestamp: SystemTime::now(),
            success: outcome.is_ok(),
            error: outcome.as_ref().err().map(ToString::to_string),
        });

        outcome
    }

    /// Copy of the audit history, oldest first
    pub fn history(&self) -> Vec<WriteRecord> {
        self.history.snapshot()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Bytes currently at the target, or empty if they cannot all be read
    fn read_previous<P: ProcessMemory + ?Sized>(
        &self,
        handle: &P,
        address: Address,
        size: usize,
    ) -> Vec<u8> {
        if size == 0 || !handle.is_valid() {
            return Vec::new();
        }
        match read_chunk(handle, address, size) {
            Ok(bytes) if bytes.len() == size => bytes,
            _ => Vec::new(),
        }
    }

    fn perform<P: ProcessMemory + ?Sized>(
        &self,
        handle: &P,
        address: Address,
        data: &[u8],
    ) -> MemoryResult<()> {
        if data.is_empty() {
            return Err(MemoryError::InvalidParameter(
                "Write data cannot be empty".to_string(),
            ));
        }
        if !handle.is_valid() {
            return Err(MemoryError::null_handle());
        }

        let end = address.checked_add(data.len() as u64).ok_or_else(|| {
            MemoryError::InvalidParameter(format!("write at {} overflows", address))
        })?;
        let _sequence = self.sequence.lock().unwrap_or_else(PoisonError::into_inner);
        let regions = covering_regions(handle, address, end)
            .map_err(|e| MemoryError::write_failed(address, format!("range is not mapped: {}", e)))?;
        if !regions.iter().all(may_write) {
            return Err(MemoryError::write_failed(address, "region is not writable"));
        }

        let manager = ProtectionManager::new(handle);
        let changes = manager.make_writable(&regions, address, end)?;

        let result = self.write_and_verify(handle, address, data, &regions);

        if self.options.restore_protection && manager.restore(&changes).is_err() {
            warn!(%address, "Original protection could not be fully restored");
        }

        result
    }

    fn write_and_verify<P: ProcessMemory + ?Sized>(
        &self,
        handle: &P,
        address: Address,
        data: &[u8],
        regions: &[Region],
    ) -> MemoryResult<()> {
        let written = handle.write_memory(address, data)?;
        if written != data.len() {
            return Err(MemoryError::write_failed(
                address,
                format!("partial write: {} of {} bytes", written, data.len()),
            ));
        }

        // Execute-only ranges cannot be read back
        if self.options.verify_writes && regions.iter().all(Region::is_readable) {
            let back = read_chunk(handle, address, data.len())?;
            if back != data {
                return Err(MemoryError::write_failed(
                    address,
                    "read-back does not match the written bytes",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Protection;
    use crate::process::{MappingSpec, VirtualProcess};

    fn process() -> VirtualProcess {
        VirtualProcess::with_mappings([
            MappingSpec::zeroed(0x1000u64, 0x1000),
            MappingSpec::zeroed(0x2000u64, 0x1000).protection(Protection::READ),
            MappingSpec::zeroed(0x3000u64, 0x1000)
                .protection(Protection::READ)
                .max_protection(Protection::READ),
        ])
        .unwrap()
    }

    #[test]
    fn test_writer_options_default() {
        let options = WriterOptions::default();
        assert!(options.verify_writes);
        assert!(options.restore_protection);
    }

    #[test]
    fn test_can_write() {
        let process = process();
        let writer = MemoryWriter::new();

        assert!(writer.can_write(&process, Address::new(0x1000), 4));
        // read-only now, but may be raised
        assert!(writer.can_write(&process, Address::new(0x2000), 4));
        assert!(writer.can_write(&process, Address::new(0x1FFE), 4));
        assert!(!writer.can_write(&process, Address::new(0x3000), 4));
        assert!(!writer.can_write(&process, Address::new(0x2FFE), 4));
        assert!(!writer.can_write(&process, Address::new(0x4000), 4));
        assert!(!writer.can_write(&process, Address::new(0x1000), 0));
        assert!(!writer.can_write(&process, Address::new(u64::MAX - 1), 4));
        assert!(!writer.can_write(&VirtualProcess::invalid(), Address::new(0x1000), 4));
        assert_eq!(writer.history_len(), 0);
    }

    #[test]
    fn test_write_elevates_and_restores() {
        let process = process();
        let writer = MemoryWriter::new();

        assert!(writer.write(&process, Address::new(0x2010), &[1, 2, 3, 4]));
        assert_eq!(process.peek(0x2010u64, 4).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(process.protection_at(0x2010u64), Some(Protection::READ));

        let record = writer.history().pop().unwrap();
        assert!(record.success);
        assert_eq!(record.old_value, vec![0; 4]);
        assert!(record.error.is_none());
    }

    #[test]
    fn test_write_without_restore_keeps_elevation() {
        let process = process();
        let writer = MemoryWriter::with_options(WriterOptions {
            verify_writes: false,
            restore_protection: false,
        });

        assert!(writer.write(&process, Address::new(0x2000), &[9]));
        assert_eq!(process.protection_at(0x2000u64), Some(Protection::READ_WRITE));
    }

    #[test]
    fn test_refused_writes_are_recorded() {
        let process = process();
        let writer = MemoryWriter::new();

        assert!(!writer.write(&process, Address::new(0x3000), &[1]));
        assert!(!writer.write(&process, Address::new(0x1000), &[]));
        assert!(!writer.write(&VirtualProcess::invalid(), Address::new(0x1000), &[1]));

        let history = writer.history();
        assert_eq!(history.len(), 3);
        assert!(history.iter().all(|r| !r.success && r.error.is_some()));
        assert_eq!(history[0].old_value, vec![0]);
        assert!(history[2].old_value.is_empty());
    }

    #[test]
    fn test_failed_write_restores_protection() {
        let process = process();
        process.set_fail_writes(true);
        let writer = MemoryWriter::new();

        let err = writer
            .try_write(&process, Address::new(0x2000), &[1, 2])
            .unwrap_err();
        assert!(matches!(err, MemoryError::WriteFailed { .. }));
        assert_eq!(process.protection_at(0x2000u64), Some(Protection::READ));
        assert_eq!(writer.history_len(), 1);
    }
}
