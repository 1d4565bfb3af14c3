//! Target-process address wrapper with hex parsing
//!
//! Addresses name bytes in *another* process. They are plain 64-bit integers
//! and are never turned into local pointers.

use super::error::{MemoryError, MemoryResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An address in a target process's virtual address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Address(pub u64);

impl Address {
    /// Lowest address a region walk starts from
    pub const MIN: Address = Address(0);

    /// Creates a new address from a raw value
    pub const fn new(value: u64) -> Self {
        Address(value)
    }

    /// Creates a null address (0x0)
    pub const fn null() -> Self {
        Address(0)
    }

    /// Checks if the address is null
    pub const fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Returns the raw value
    pub const fn as_u64(&self) -> u64 {
        self.0
    }

    /// Adds a byte offset, returning `None` on overflow
    pub const fn checked_add(&self, offset: u64) -> Option<Self> {
        match self.0.checked_add(offset) {
            Some(value) => Some(Address(value)),
            None => None,
        }
    }

    /// Adds a byte offset, clamping at the top of the address space
    pub const fn saturating_add(&self, offset: u64) -> Self {
        Address(self.0.saturating_add(offset))
    }

    /// Distance in bytes from `base` to this address, if this address is not below it
    pub const fn offset_from(&self, base: Address) -> Option<u64> {
        self.0.checked_sub(base.0)
    }
}

impl FromStr for Address {
    type Err = MemoryError;

    fn from_str(s: &str) -> MemoryResult<Self> {
        let s = s.trim();

        let value = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u64::from_str_radix(hex, 16)
        } else if let Some(hex) = s.strip_prefix('$') {
            u64::from_str_radix(hex, 16)
        } else if s.chars().any(|c| c.is_ascii_alphabetic()) {
            u64::from_str_radix(s, 16)
        } else {
            s.parse::<u64>()
        };

        value
            .map(Address::new)
            .map_err(|_| MemoryError::InvalidParameter(format!("invalid address: {}", s)))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016X}", self.0)
    }
}

impl fmt::LowerHex for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(value: u64) -> Self {
        Address::new(value)
    }
}

impl From<Address> for u64 {
    fn from(address: Address) -> Self {
        address.0
    }
}
