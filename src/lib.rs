//! memory-inspector: inspect and modify the memory of another process
//!
//! Enumerates and classifies the mapped regions of a target, searches them
//! for byte patterns, watches addresses for changes and performs audited
//! writes. Every operation goes through [`process::ProcessMemory`], which
//! live process handles and the in-memory [`process::VirtualProcess`] both
//! implement.

pub mod config;
pub mod core;
pub mod memory;
pub mod monitor;
pub mod os;
pub mod process;

// Re-export main types from core module
pub use core::types::{
    Address, ErrorKind, MemoryError, MemoryResult, ProcessId, Protection, Region, RegionCategory,
    SearchResult, Value, ValueKind,
};

pub use memory::{CancellationToken, MemoryScanner, MemoryWriter, RegionFilter, ScanOptions, WriteRecord};
pub use monitor::{TrackedAddress, ValueChange, ValueMonitor};
pub use process::{ProcessHandle, ProcessMemory, VirtualProcess};

pub use core::{AUTHORS, VERSION};
