//! Windows backend: kernel32 process and virtual memory calls

use crate::core::types::{
    format_os_error, Address, MemoryError, MemoryResult, NativeProtection, ProcessId, Protection,
    RegionQuery, ShareMode, UserTag,
};
use std::{fmt, mem};
use winapi::shared::minwindef::{DWORD, FALSE, LPCVOID, LPVOID};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::handleapi::CloseHandle;
use winapi::um::memoryapi::{ReadProcessMemory, VirtualProtectEx, VirtualQueryEx, WriteProcessMemory};
use winapi::um::processthreadsapi::OpenProcess;
use winapi::um::winnt::{
    HANDLE, MEMORY_BASIC_INFORMATION, MEM_COMMIT, MEM_IMAGE, MEM_MAPPED, MEM_PRIVATE, PAGE_EXECUTE,
    PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_GUARD,
    PAGE_NOACCESS, PAGE_READONLY, PAGE_READWRITE, PAGE_WRITECOPY, PROCESS_QUERY_INFORMATION,
    PROCESS_VM_OPERATION, PROCESS_VM_READ, PROCESS_VM_WRITE,
};

const ERROR_ACCESS_DENIED: DWORD = 5;
const ERROR_PARTIAL_COPY: DWORD = 299;

/// Owned kernel handle, closed on drop
struct Handle(HANDLE);

impl Drop for Handle {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // Nothing useful to do if closing fails
            unsafe {
                CloseHandle(self.0);
            }
        }
    }
}

// Kernel handles may be used from any thread
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

fn last_error() -> DWORD {
    unsafe { GetLastError() }
}

/// Maps `PAGE_*` constants onto portable protection bits.
/// Guard and no-access pages read as unreadable.
fn protection_from_page(protect: DWORD) -> Protection {
    if protect & PAGE_GUARD != 0 {
        return Protection::NONE;
    }
    match protect & 0xFF {
        PAGE_READONLY => Protection::READ,
        PAGE_READWRITE | PAGE_WRITECOPY => Protection::READ_WRITE,
        PAGE_EXECUTE => Protection::EXECUTE,
        PAGE_EXECUTE_READ => Protection::READ_EXECUTE,
        PAGE_EXECUTE_READWRITE | PAGE_EXECUTE_WRITECOPY => Protection::ALL,
        PAGE_NOACCESS => Protection::NONE,
        _ => Protection::NONE,
    }
}

fn page_from_protection(protection: Protection) -> DWORD {
    match (
        protection.is_readable(),
        protection.is_writable(),
        protection.is_executable(),
    ) {
        (_, true, true) => PAGE_EXECUTE_READWRITE,
        (_, true, false) => PAGE_READWRITE,
        (true, false, true) => PAGE_EXECUTE_READ,
        (false, false, true) => PAGE_EXECUTE,
        (true, false, false) => PAGE_READONLY,
        (false, false, false) => PAGE_NOACCESS,
    }
}

fn page_from_native(protection: NativeProtection) -> DWORD {
    match protection {
        NativeProtection::Portable(protection) => page_from_protection(protection),
        NativeProtection::Raw(raw) => raw,
    }
}

/// An opened Windows process
pub struct RawProcess {
    handle: Handle,
    pid: ProcessId,
}

impl RawProcess {
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        let access =
            PROCESS_QUERY_INFORMATION | PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION;
        let raw = unsafe { OpenProcess(access, FALSE, pid) };
        if raw.is_null() {
            let code = last_error();
            return Err(if code == ERROR_ACCESS_DENIED {
                MemoryError::access_denied(pid, format_os_error("OpenProcess", code as i32))
            } else {
                MemoryError::ProcessNotFound(format!("PID: {}", pid))
            });
        }

        Ok(RawProcess {
            handle: Handle(raw),
            pid,
        })
    }

    pub fn read(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        let mut bytes_read = 0;
        let result = unsafe {
            ReadProcessMemory(
                self.handle.0,
                address.as_u64() as usize as LPCVOID,
                buffer.as_mut_ptr() as LPVOID,
                buffer.len(),
                &mut bytes_read,
            )
        };

        if result == FALSE {
            let code = last_error();
            // A read running into an unreadable page still reports what it copied
            if code == ERROR_PARTIAL_COPY && bytes_read > 0 {
                return Ok(bytes_read);
            }
            return Err(MemoryError::read_failed(
                address,
                format_os_error("ReadProcessMemory", code as i32),
            ));
        }
        Ok(bytes_read)
    }

    pub fn write(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        let mut bytes_written = 0;
        let result = unsafe {
            WriteProcessMemory(
                self.handle.0,
                address.as_u64() as usize as LPVOID,
                data.as_ptr() as LPCVOID,
                data.len(),
                &mut bytes_written,
            )
        };

        if result == FALSE {
            return Err(MemoryError::write_failed(
                address,
                format_os_error("WriteProcessMemory", last_error() as i32),
            ));
        }
        Ok(bytes_written)
    }

    /// Returns the raw `PAGE_*` value the call replaced, modifiers included
    pub fn protect(
        &self,
        address: Address,
        size: u64,
        protection: NativeProtection,
    ) -> MemoryResult<Option<NativeProtection>> {
        let mut old: DWORD = 0;
        let result = unsafe {
            VirtualProtectEx(
                self.handle.0,
                address.as_u64() as usize as LPVOID,
                size as usize,
                page_from_native(protection),
                &mut old,
            )
        };

        if result == FALSE {
            return Err(MemoryError::protection_failed(
                address,
                format_os_error("VirtualProtectEx", last_error() as i32),
            ));
        }
        Ok(Some(NativeProtection::Raw(old)))
    }

    /// Windows has no submaps; free and reserved ranges are skipped so the
    /// answer is always the next committed region.
    pub fn query(&self, address: Address, _depth: u32) -> MemoryResult<RegionQuery> {
        let mut cursor = address.as_u64();
        loop {
            let mbi = self.virtual_query(Address::new(cursor))?;
            let base = mbi.BaseAddress as u64;
            let size = mbi.RegionSize as u64;

            if mbi.State == MEM_COMMIT {
                return Ok(Self::to_query(&mbi, base, size));
            }

            cursor = match base.checked_add(size) {
                Some(next) if next > cursor => next,
                _ => return Err(MemoryError::RegionNotFound(address.to_string())),
            };
        }
    }

    fn virtual_query(&self, address: Address) -> MemoryResult<MEMORY_BASIC_INFORMATION> {
        let mut mbi: MEMORY_BASIC_INFORMATION = unsafe { mem::zeroed() };
        let written = unsafe {
            VirtualQueryEx(
                self.handle.0,
                address.as_u64() as usize as LPCVOID,
                &mut mbi,
                mem::size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };

        if written == 0 {
            return Err(MemoryError::RegionNotFound(address.to_string()));
        }
        Ok(mbi)
    }

    fn to_query(mbi: &MEMORY_BASIC_INFORMATION, base: u64, size: u64) -> RegionQuery {
        let protection = protection_from_page(mbi.Protect);
        let (user_tag, share_mode, mut max_protection) = match mbi.Type {
            MEM_IMAGE => (UserTag::DYLIB, ShareMode::CopyOnWrite, Protection::ALL),
            // A view can never be raised above the protection it was mapped with
            MEM_MAPPED => (
                UserTag::NONE,
                ShareMode::Shared,
                protection_from_page(mbi.AllocationProtect).union(protection),
            ),
            _ => (UserTag::NONE, ShareMode::Private, Protection::ALL),
        };
        // Guard pages belong to the target's stack growth and are never written
        if mbi.Protect & PAGE_GUARD != 0 {
            max_protection = Protection::NONE;
        }

        RegionQuery {
            base: Address::new(base),
            size,
            depth: 0,
            is_submap: false,
            user_tag,
            protection,
            max_protection,
            share_mode,
        }
    }
}

impl fmt::Debug for RawProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawProcess")
            .field("pid", &self.pid)
            .field("valid", &!self.handle.0.is_null())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr;

    #[test]
    fn test_page_protection_mapping() {
        assert_eq!(protection_from_page(PAGE_READWRITE), Protection::READ_WRITE);
        assert_eq!(protection_from_page(PAGE_READONLY | PAGE_GUARD), Protection::NONE);
        assert_eq!(protection_from_page(PAGE_EXECUTE_READ), Protection::READ_EXECUTE);
        assert_eq!(page_from_protection(Protection::READ_WRITE), PAGE_READWRITE);
        assert_eq!(page_from_protection(Protection::ALL), PAGE_EXECUTE_READWRITE);
        assert_eq!(page_from_protection(Protection::NONE), PAGE_NOACCESS);
    }

    #[test]
    fn test_native_protection_kept_verbatim() {
        let guarded = PAGE_READWRITE | PAGE_GUARD;
        assert_eq!(page_from_native(NativeProtection::Raw(guarded)), guarded);
        assert_eq!(page_from_native(NativeProtection::Raw(PAGE_WRITECOPY)), PAGE_WRITECOPY);
        assert_eq!(
            page_from_native(NativeProtection::Portable(Protection::READ_WRITE)),
            PAGE_READWRITE
        );
    }

    #[test]
    fn test_guard_page_cannot_become_writable() {
        let mut mbi: MEMORY_BASIC_INFORMATION = unsafe { mem::zeroed() };
        mbi.State = MEM_COMMIT;
        mbi.Type = MEM_PRIVATE;
        mbi.Protect = PAGE_READWRITE | PAGE_GUARD;
        let query = RawProcess::to_query(&mbi, 0x1000, 0x1000);
        assert_eq!(query.protection, Protection::NONE);
        assert_eq!(query.max_protection, Protection::NONE);

        mbi.Protect = PAGE_READONLY;
        let query = RawProcess::to_query(&mbi, 0x1000, 0x1000);
        assert_eq!(query.max_protection, Protection::ALL);
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_open_invalid_process() {
        assert!(RawProcess::open(0).is_err());
    }

    #[test]
    fn test_null_handle_drop() {
        let _handle = Handle(ptr::null_mut());
    }
}
