//! Linux backend: `process_vm_readv`/`process_vm_writev` plus `/proc/<pid>/maps`

use crate::core::types::{
    format_os_error, Address, MemoryError, MemoryResult, NativeProtection, ProcessId, Protection,
    RegionQuery,
    ShareMode, UserTag,
};
use nix::sys::uio::{process_vm_readv, process_vm_writev, RemoteIoVec};
use nix::unistd::Pid;
use std::fs;
use std::io::{IoSlice, IoSliceMut};
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// One line of `/proc/<pid>/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MapsEntry {
    pub start: u64,
    pub end: u64,
    pub protection: Protection,
    pub shared: bool,
    pub path: String,
}

impl MapsEntry {
    fn user_tag(&self) -> UserTag {
        let path = self.path.as_str();
        if path == "[stack]" || path.starts_with("[stack:") {
            UserTag::STACK
        } else if path == "[heap]" {
            UserTag::MALLOC
        } else if path == "[vdso]" || path.ends_with(".so") || path.contains(".so.") {
            UserTag::DYLIB
        } else {
            UserTag::NONE
        }
    }

    fn to_query(&self) -> RegionQuery {
        RegionQuery {
            base: Address::new(self.start),
            size: self.end - self.start,
            depth: 0,
            is_submap: false,
            user_tag: self.user_tag(),
            protection: self.protection,
            // The kernel cannot be asked to re-protect another process's pages
            max_protection: self.protection,
            share_mode: if self.shared {
                ShareMode::Shared
            } else {
                ShareMode::Private
            },
        }
    }
}

/// Parses `start-end perms offset dev inode [path]`
pub(crate) fn parse_maps_line(line: &str) -> Option<MapsEntry> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let perms = fields.next()?.as_bytes();

    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;
    if end <= start || perms.len() < 4 {
        return None;
    }

    // offset, dev, inode
    let path = fields.skip(3).collect::<Vec<_>>().join(" ");

    Some(MapsEntry {
        start,
        end,
        protection: Protection::from_flags(perms[0] == b'r', perms[1] == b'w', perms[2] == b'x'),
        shared: perms[3] == b's',
        path,
    })
}

#[derive(Debug, Default)]
struct MapsCache {
    entries: Vec<MapsEntry>,
    last_query: Option<u64>,
}

/// An opened Linux process
#[derive(Debug)]
pub struct RawProcess {
    pid: Pid,
    maps: Mutex<MapsCache>,
}

impl RawProcess {
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        let raw = i32::try_from(pid)
            .map_err(|_| MemoryError::InvalidParameter(format!("PID out of range: {}", pid)))?;
        if pid == 0 || !PathBuf::from(format!("/proc/{}", pid)).exists() {
            return Err(MemoryError::ProcessNotFound(format!("PID: {}", pid)));
        }

        Ok(RawProcess {
            pid: Pid::from_raw(raw),
            maps: Mutex::new(MapsCache::default()),
        })
    }

    pub fn read(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        if buffer.is_empty() {
            return Ok(0);
        }

        let len = buffer.len();
        let mut local_iov = [IoSliceMut::new(buffer)];
        let remote_iov = [RemoteIoVec {
            base: to_usize(address)?,
            len,
        }];

        process_vm_readv(self.pid, &mut local_iov, &remote_iov)
            .map_err(|e| MemoryError::read_failed(address, format_os_error("process_vm_readv", e as i32)))
    }

    pub fn write(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let local_iov = [IoSlice::new(data)];
        let remote_iov = [RemoteIoVec {
            base: to_usize(address)?,
            len: data.len(),
        }];

        process_vm_writev(self.pid, &local_iov, &remote_iov)
            .map_err(|e| MemoryError::write_failed(address, format_os_error("process_vm_writev", e as i32)))
    }

    pub fn protect(
        &self,
        address: Address,
        _size: u64,
        _protection: NativeProtection,
    ) -> MemoryResult<Option<NativeProtection>> {
        Err(MemoryError::UnsupportedOperation(format!(
            "changing protection at {} of process {} requires code running inside it",
            address, self.pid
        )))
    }

    /// Looks the address up in a cached copy of the maps file. The cache is
    /// re-read whenever the queried address does not move strictly upward,
    /// which is the case at the start of every walk.
    pub fn query(&self, address: Address, _depth: u32) -> MemoryResult<RegionQuery> {
        let mut cache = self.maps.lock().unwrap_or_else(PoisonError::into_inner);
        let stale = match cache.last_query {
            Some(last) => address.as_u64() <= last,
            None => true,
        };
        if stale || cache.entries.is_empty() {
            cache.entries = self.read_maps()?;
        }
        cache.last_query = Some(address.as_u64());

        cache
            .entries
            .iter()
            .find(|entry| entry.end > address.as_u64())
            .map(MapsEntry::to_query)
            .ok_or_else(|| MemoryError::RegionNotFound(address.to_string()))
    }

    fn read_maps(&self) -> MemoryResult<Vec<MapsEntry>> {
        let path = format!("/proc/{}/maps", self.pid);
        let text = fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                MemoryError::access_denied(self.pid.as_raw() as u32, format!("cannot read {}", path))
            } else {
                MemoryError::IoError(e)
            }
        })?;

        let entries: Vec<MapsEntry> = text.lines().filter_map(parse_maps_line).collect();
        debug!(pid = %self.pid, mappings = entries.len(), "Loaded process maps");
        Ok(entries)
    }
}

fn to_usize(address: Address) -> MemoryResult<usize> {
    usize::try_from(address.as_u64())
        .map_err(|_| MemoryError::InvalidParameter(format!("address {} exceeds pointer width", address)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_maps_line() {
        let entry = parse_maps_line(
            "7f2c4a000000-7f2c4a021000 r-xp 00000000 08:01 1835013    /usr/lib/x86_64-linux-gnu/libc.so.6",
        )
        .unwrap();
        assert_eq!(entry.start, 0x7f2c4a000000);
        assert_eq!(entry.end, 0x7f2c4a021000);
        assert_eq!(entry.protection, Protection::READ_EXECUTE);
        assert!(!entry.shared);
        assert_eq!(entry.user_tag(), UserTag::DYLIB);

        let anon = parse_maps_line("00400000-00452000 rw-s 00000000 00:00 0").unwrap();
        assert!(anon.shared);
        assert!(anon.path.is_empty());
        assert_eq!(anon.to_query().share_mode, ShareMode::Shared);

        assert!(parse_maps_line("garbage").is_none());
        assert!(parse_maps_line("2000-1000 rw-p 0 0:0 0").is_none());
    }

    #[test]
    fn test_maps_tags() {
        let stack = parse_maps_line("7ffd1000-7ffd2000 rw-p 00000000 00:00 0 [stack]").unwrap();
        assert_eq!(stack.user_tag(), UserTag::STACK);
        let heap = parse_maps_line("01000000-01021000 rw-p 00000000 00:00 0 [heap]").unwrap();
        assert_eq!(heap.user_tag(), UserTag::MALLOC);
        let query = heap.to_query();
        assert_eq!(query.size, 0x21000);
        assert_eq!(query.max_protection, query.protection);
    }

    #[test]
    fn test_open_missing_process() {
        assert!(matches!(
            RawProcess::open(0),
            Err(MemoryError::ProcessNotFound(_))
        ));
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_read_own_memory() {
        let process = RawProcess::open(std::process::id()).unwrap();
        let local = 0x1234_5678_u32.to_ne_bytes();
        let mut buffer = [0u8; 4];
        let address = Address::new(local.as_ptr() as u64);
        if let Ok(read) = process.read(address, &mut buffer) {
            assert_eq!(read, 4);
            assert_eq!(buffer, local);
        }
        let region = process.query(address, 0).unwrap();
        assert!(region.base <= address);
    }
}
