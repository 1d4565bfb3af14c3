//! Core type definitions
//!
//! Address wrappers, the value model, region descriptions, search results
//! and the error taxonomy shared by the scanner, monitor and writer.

mod address;
mod error;
mod region;
mod search_result;
mod value;

pub use address::Address;
pub use error::{format_os_error, ErrorKind, MemoryError, MemoryResult};
pub use region::{NativeProtection, Protection, Region, RegionCategory, RegionQuery, ShareMode, UserTag};
pub use search_result::SearchResult;
pub use value::{hex_string, Value, ValueKind};

// Common type aliases
pub type ProcessId = u32;
