//! Core module containing fundamental types
//!
//! This module provides the foundational building blocks used throughout
//! the crate: target addresses, values, regions, search results and errors.

pub mod types;

pub use types::{
    Address, ErrorKind, MemoryError, MemoryResult, ProcessId, Protection, Region, RegionCategory,
    SearchResult, Value, ValueKind,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
