//! Handle to a live process with RAII semantics

use super::ProcessMemory;
use crate::core::types::{
    Address, MemoryError, MemoryResult, NativeProtection, ProcessId, RegionQuery,
};
use crate::os::RawProcess;
use std::fmt;
use tracing::debug;

/// Handle to another (or the current) process.
///
/// A handle is either open, owning the OS resources needed to access the
/// target, or the null sentinel returned by [`ProcessHandle::null`]. Every
/// operation on the null handle fails with [`MemoryError::InvalidHandle`].
/// OS resources are released when the handle is dropped.
pub struct ProcessHandle {
    pid: ProcessId,
    raw: Option<RawProcess>,
}

impl ProcessHandle {
    /// The "no handle" sentinel
    pub fn null() -> Self {
        ProcessHandle { pid: 0, raw: None }
    }

    /// Opens a process for reading, writing and querying its memory
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        let raw = RawProcess::open(pid)?;
        debug!(pid, backend = crate::os::BACKEND, "Opened process");
        Ok(ProcessHandle { pid, raw: Some(raw) })
    }

    /// Opens the calling process
    pub fn current() -> MemoryResult<Self> {
        Self::open(std::process::id())
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    fn raw(&self) -> MemoryResult<&RawProcess> {
        self.raw.as_ref().ok_or_else(MemoryError::null_handle)
    }
}

impl ProcessMemory for ProcessHandle {
    fn is_valid(&self) -> bool {
        self.raw.is_some()
    }

    fn read_memory(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        self.raw()?.read(address, buffer)
    }

    fn write_memory(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        self.raw()?.write(address, data)
    }

    fn protect_memory(
        &self,
        address: Address,
        size: u64,
        protection: NativeProtection,
    ) -> MemoryResult<Option<NativeProtection>> {
        self.raw()?.protect(address, size, protection)
    }

    fn query_region(&self, address: Address, depth: u32) -> MemoryResult<RegionQuery> {
        self.raw()?.query(address, depth)
    }
}

impl Default for ProcessHandle {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("valid", &self.is_valid())
            .field("backend", &crate::os::BACKEND)
            .finish()
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProcessHandle(pid={}, valid={})",
            self.pid,
            self.is_valid()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Protection;

    #[test]
    fn test_null_handle() {
        let handle = ProcessHandle::null();
        assert_eq!(handle.pid(), 0);
        assert!(!handle.is_valid());
    }

    #[test]
    fn test_process_handle_display() {
        let display = format!("{}", ProcessHandle::null());
        assert!(display.contains("pid=0"));
        assert!(display.contains("valid=false"));
    }

    #[test]
    fn test_process_handle_debug() {
        let debug = format!("{:?}", ProcessHandle::default());
        assert!(debug.contains("ProcessHandle"));
        assert!(debug.contains("valid: false"));
    }

    #[test]
    fn test_invalid_handle_operations() {
        let handle = ProcessHandle::null();

        let mut buffer = vec![0u8; 4];
        match handle.read_memory(Address::new(0x1000), &mut buffer) {
            Err(MemoryError::InvalidHandle(msg)) => assert!(msg.contains("null")),
            other => panic!("Expected InvalidHandle error, got {:?}", other),
        }

        match handle.write_memory(Address::new(0x1000), &buffer) {
            Err(MemoryError::InvalidHandle(msg)) => assert!(msg.contains("null")),
            other => panic!("Expected InvalidHandle error, got {:?}", other),
        }

        assert!(handle
            .protect_memory(Address::new(0x1000), 4, Protection::READ_WRITE.into())
            .is_err());
        assert!(handle.query_region(Address::MIN, 0).is_err());
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_open_invalid_process() {
        assert!(ProcessHandle::open(0).is_err());
    }

    #[test]
    #[cfg(any(target_os = "linux", windows))]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_open_current_process() {
        let handle = ProcessHandle::current().unwrap();
        assert_eq!(handle.pid(), std::process::id());
        assert!(handle.is_valid());
    }
}
