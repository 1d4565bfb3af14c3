//! Bounded reads from a target process

use crate::core::types::{Address, MemoryError, MemoryResult, Value, ValueKind};
use crate::process::ProcessMemory;

/// Reads up to `size` bytes at `address`.
///
/// A short read is returned truncated to the bytes actually obtained, never
/// padded. A failing read, or one that obtained nothing, is reported as
/// `ReadFailed` so callers can skip the chunk and carry on.
pub fn read_chunk<P: ProcessMemory + ?Sized>(
    handle: &P,
    address: Address,
    size: usize,
) -> MemoryResult<Vec<u8>> {
    if !handle.is_valid() {
        return Err(MemoryError::null_handle());
    }
    if size == 0 {
        return Err(MemoryError::InvalidParameter(
            "Read size cannot be zero".to_string(),
        ));
    }

    let mut buffer = vec![0u8; size];
    let read = handle.read_memory(address, &mut buffer)?;
    if read == 0 {
        return Err(MemoryError::read_failed(address, "no bytes could be read"));
    }

    buffer.truncate(read.min(size));
    Ok(buffer)
}

/// Reads exactly `size` bytes; a short read is an error
pub fn read_exact<P: ProcessMemory + ?Sized>(
    handle: &P,
    address: Address,
    size: usize,
) -> MemoryResult<Vec<u8>> {
    let bytes = read_chunk(handle, address, size)?;
    if bytes.len() != size {
        return Err(MemoryError::read_failed(
            address,
            format!("partial read: expected {} bytes, got {}", size, bytes.len()),
        ));
    }
    Ok(bytes)
}

/// Reads a value of a fixed-size kind. `Bytes` has no size and is rejected.
pub fn read_value<P: ProcessMemory + ?Sized>(
    handle: &P,
    address: Address,
    kind: ValueKind,
) -> MemoryResult<Value> {
    let size = kind.size().ok_or_else(|| {
        MemoryError::InvalidParameter(format!("{} values have no fixed size", kind))
    })?;
    let bytes = read_exact(handle, address, size)?;
    Value::decode(kind, &bytes)
}

/// Memory reader bound to one process handle
pub struct MemoryReader<'a, P: ProcessMemory + ?Sized> {
    handle: &'a P,
}

impl<'a, P: ProcessMemory + ?Sized> MemoryReader<'a, P> {
    pub fn new(handle: &'a P) -> Self {
        MemoryReader { handle }
    }

    pub fn read_chunk(&self, address: Address, size: usize) -> MemoryResult<Vec<u8>> {
        read_chunk(self.handle, address, size)
    }

    pub fn read_exact(&self, address: Address, size: usize) -> MemoryResult<Vec<u8>> {
        read_exact(self.handle, address, size)
    }

    pub fn read_value(&self, address: Address, kind: ValueKind) -> MemoryResult<Value> {
        read_value(self.handle, address, kind)
    }

    pub fn read_i32(&self, address: Address) -> MemoryResult<i32> {
        self.read_value(address, ValueKind::I32)?
            .as_i32()
            .ok_or_else(|| MemoryError::InvalidValue("not an i32".to_string()))
    }
}
