//! Error types for memory inspection operations

use std::fmt;
use thiserror::Error;

/// Broad failure classes every [`MemoryError`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The process handle is invalid or access to the process was denied
    ProcessAccess,
    /// A read, write or protection change failed at a specific address
    MemoryOperation,
    /// A caller-supplied argument was rejected before any work was done
    InvalidParameter,
    /// The host could not provide a resource (buffers, OS queries, files)
    SystemResource,
}

/// Main error type for memory operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Access denied to process {pid}: {reason}")]
    AccessDenied { pid: u32, reason: String },

    #[error("Failed to read memory at {address}: {reason}")]
    ReadFailed { address: String, reason: String },

    #[error("Failed to write memory at {address}: {reason}")]
    WriteFailed { address: String, reason: String },

    #[error("Failed to change protection at {address}: {reason}")]
    ProtectionFailed { address: String, reason: String },

    #[error("No mapped region at or above {0}")]
    RegionNotFound(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid value encoding: {0}")]
    InvalidValue(String),

    #[error("System resource unavailable: {0}")]
    SystemResource(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type alias for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

impl MemoryError {
    /// Returns the failure class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MemoryError::InvalidHandle(_)
            | MemoryError::ProcessNotFound(_)
            | MemoryError::AccessDenied { .. } => ErrorKind::ProcessAccess,
            MemoryError::ReadFailed { .. }
            | MemoryError::WriteFailed { .. }
            | MemoryError::ProtectionFailed { .. }
            | MemoryError::RegionNotFound(_) => ErrorKind::MemoryOperation,
            MemoryError::InvalidParameter(_) | MemoryError::InvalidValue(_) => {
                ErrorKind::InvalidParameter
            }
            MemoryError::SystemResource(_)
            | MemoryError::UnsupportedOperation(_)
            | MemoryError::IoError(_) => ErrorKind::SystemResource,
        }
    }

    /// Creates an access denied error for a process
    pub fn access_denied(pid: u32, reason: impl Into<String>) -> Self {
        MemoryError::AccessDenied {
            pid,
            reason: reason.into(),
        }
    }

    /// Creates a read failed error
    pub fn read_failed(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::ReadFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a write failed error
    pub fn write_failed(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::WriteFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a protection change error
    pub fn protection_failed(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::ProtectionFailed {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid handle error for the "no handle" sentinel
    pub fn null_handle() -> Self {
        MemoryError::InvalidHandle("Process handle is null".to_string())
    }
}

/// Formats a failed system call the same way on every platform:
/// `"<call> failed with error <code> (<message>)"`.
pub fn format_os_error(call: &str, code: i32) -> String {
    let message = std::io::Error::from_raw_os_error(code).to_string();
    if message.is_empty() {
        format!("{} failed with error {}", call, code)
    } else {
        format!("{} failed with error {} ({})", call, code, message)
    }
}
