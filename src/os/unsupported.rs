//! Backend for platforms without remote memory access

use crate::core::types::{
    Address, MemoryError, MemoryResult, NativeProtection, ProcessId, RegionQuery,
};

/// Cannot be constructed: `open` always fails on this platform
#[derive(Debug)]
pub enum RawProcess {}

impl RawProcess {
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        Err(MemoryError::UnsupportedOperation(format!(
            "cannot open process {} on this platform",
            pid
        )))
    }

    pub fn read(&self, _address: Address, _buffer: &mut [u8]) -> MemoryResult<usize> {
        match *self {}
    }

    pub fn write(&self, _address: Address, _data: &[u8]) -> MemoryResult<usize> {
        match *self {}
    }

    pub fn protect(
        &self,
        _address: Address,
        _size: u64,
        _protection: NativeProtection,
    ) -> MemoryResult<Option<NativeProtection>> {
        match *self {}
    }

    pub fn query(&self, _address: Address, _depth: u32) -> MemoryResult<RegionQuery> {
        match *self {}
    }
}
