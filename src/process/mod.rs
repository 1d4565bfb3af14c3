//! Access to a target process's address space
//!
//! The scanner, monitor and writer never talk to the operating system
//! directly. They go through [`ProcessMemory`], the narrow set of raw
//! primitives a live process handle provides: read, write, protection change
//! and region query. [`ProcessHandle`] implements it for real processes and
//! [`VirtualProcess`] for an in-memory address space.

pub mod handle;
pub mod virtual_process;

pub use handle::ProcessHandle;
pub use virtual_process::{MappingSpec, VirtualProcess};

use crate::core::types::{Address, MemoryResult, NativeProtection, RegionQuery};

/// Raw memory primitives of a live process handle.
///
/// Implementations are shared between threads: a background poller and a UI
/// thread issuing writes may hold the same handle.
pub trait ProcessMemory: Send + Sync {
    /// `false` for the "no handle" sentinel. Callers then operate on nothing.
    fn is_valid(&self) -> bool;

    /// Reads up to `buffer.len()` bytes at `address` and returns how many
    /// bytes were actually read, which may be fewer than requested.
    fn read_memory(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize>;

    /// Writes `data` at `address` and returns the number of bytes written.
    fn write_memory(&self, address: Address, data: &[u8]) -> MemoryResult<usize>;

    /// Sets the protection of `[address, address + size)`. Returns the
    /// protection replaced at `address` when the platform reports it, in a
    /// form that restores it exactly.
    fn protect_memory(
        &self,
        address: Address,
        size: u64,
        protection: NativeProtection,
    ) -> MemoryResult<Option<NativeProtection>>;

    /// Describes the first mapped region at or above `address`, looking
    /// `depth` submap levels deep. Fails when no further region exists.
    fn query_region(&self, address: Address, depth: u32) -> MemoryResult<RegionQuery>;
}

impl<T: ProcessMemory + ?Sized> ProcessMemory for &T {
    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn read_memory(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        (**self).read_memory(address, buffer)
    }

    fn write_memory(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        (**self).write_memory(address, data)
    }

    fn protect_memory(
        &self,
        address: Address,
        size: u64,
        protection: NativeProtection,
    ) -> MemoryResult<Option<NativeProtection>> {
        (**self).protect_memory(address, size, protection)
    }

    fn query_region(&self, address: Address, depth: u32) -> MemoryResult<RegionQuery> {
        (**self).query_region(address, depth)
    }
}

impl<T: ProcessMemory + ?Sized> ProcessMemory for std::sync::Arc<T> {
    fn is_valid(&self) -> bool {
        (**self).is_valid()
    }

    fn read_memory(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        (**self).read_memory(address, buffer)
    }

    fn write_memory(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        (**self).write_memory(address, data)
    }

    fn protect_memory(
        &self,
        address: Address,
        size: u64,
        protection: NativeProtection,
    ) -> MemoryResult<Option<NativeProtection>> {
        (**self).protect_memory(address, size, protection)
    }

    fn query_region(&self, address: Address, depth: u32) -> MemoryResult<RegionQuery> {
        (**self).query_region(address, depth)
    }
}
