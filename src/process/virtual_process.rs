//! In-memory address space implementing [`ProcessMemory`]
//!
//! A `VirtualProcess` behaves like a live target with a fixed layout: mapped
//! regions with their own bytes and protections, optional submap containers,
//! and ranges that fault on read. It lets scans, monitors and audited writes
//! run deterministically without touching a real process.

use super::ProcessMemory;
use crate::core::types::{
    Address, MemoryError, MemoryResult, NativeProtection, Protection, RegionQuery, ShareMode,
    UserTag,
};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Description of one region to map into a [`VirtualProcess`]
#[derive(Debug, Clone)]
pub struct MappingSpec {
    base: Address,
    data: Vec<u8>,
    protection: Protection,
    max_protection: Protection,
    tag: UserTag,
    share_mode: ShareMode,
    nesting: u32,
}

impl MappingSpec {
    /// A private, read-write region holding `data`. Its protection may be
    /// raised to anything unless [`MappingSpec::max_protection`] says otherwise.
    pub fn new(base: impl Into<Address>, data: impl Into<Vec<u8>>) -> Self {
        MappingSpec {
            base: base.into(),
            data: data.into(),
            protection: Protection::READ_WRITE,
            max_protection: Protection::ALL,
            tag: UserTag::NONE,
            share_mode: ShareMode::Private,
            nesting: 0,
        }
    }

    /// A region of `size` zero bytes
    pub fn zeroed(base: impl Into<Address>, size: usize) -> Self {
        Self::new(base, vec![0u8; size])
    }

    pub fn protection(mut self, protection: Protection) -> Self {
        self.protection = protection;
        self
    }

    pub fn max_protection(mut self, max_protection: Protection) -> Self {
        self.max_protection = max_protection;
        self
    }

    pub fn tag(mut self, tag: UserTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn share_mode(mut self, share_mode: ShareMode) -> Self {
        self.share_mode = share_mode;
        self
    }

    /// Places the region inside a submap: it only becomes visible to region
    /// queries made at `level` or deeper.
    pub fn nested(mut self, level: u32) -> Self {
        self.nesting = level;
        self
    }
}

#[derive(Debug, Clone)]
struct Mapping {
    base: u64,
    data: Vec<u8>,
    protection: Protection,
    max_protection: Protection,
    tag: UserTag,
    share_mode: ShareMode,
    nesting: u32,
}

impl Mapping {
    fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    fn query(&self) -> RegionQuery {
        RegionQuery {
            base: Address::new(self.base),
            size: self.data.len() as u64,
            depth: self.nesting,
            is_submap: false,
            user_tag: self.tag,
            protection: self.protection,
            max_protection: self.max_protection,
            share_mode: self.share_mode,
        }
    }

    /// Splits off everything at and above `at`, which must lie inside the mapping
    fn split_at(&mut self, at: u64) -> Mapping {
        let tail = self.data.split_off((at - self.base) as usize);
        Mapping {
            base: at,
            data: tail,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Submap {
    base: u64,
    size: u64,
    level: u32,
}

impl Submap {
    fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    fn query(&self) -> RegionQuery {
        RegionQuery {
            base: Address::new(self.base),
            size: self.size,
            depth: self.level,
            is_submap: true,
            user_tag: UserTag::NONE,
            protection: Protection::READ,
            max_protection: Protection::ALL,
            share_mode: ShareMode::Private,
        }
    }
}

#[derive(Debug, Default)]
struct Layout {
    /// Sorted by base, never overlapping
    mappings: Vec<Mapping>,
    submaps: Vec<Submap>,
    unreadable: Vec<(u64, u64)>,
    fail_writes: bool,
}

impl Layout {
    fn mapping_index(&self, address: u64) -> Option<usize> {
        let idx = self.mappings.partition_point(|m| m.end() <= address);
        (idx < self.mappings.len() && self.mappings[idx].contains(address)).then_some(idx)
    }

    /// Indices of the mappings covering `[start, end)`, if they cover it without gaps
    fn covering(&self, start: u64, end: u64) -> Option<Vec<usize>> {
        let mut indices = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let idx = self.mapping_index(cursor)?;
            indices.push(idx);
            cursor = self.mappings[idx].end();
        }
        Some(indices)
    }

    /// Start of the unreadable range containing `address` (`Err`), or where the
    /// next one begins above it (`Ok`)
    fn next_unreadable(&self, address: u64) -> Result<u64, ()> {
        let mut next = u64::MAX;
        for &(start, end) in &self.unreadable {
            if address >= start && address < end {
                return Err(());
            }
            if start > address {
                next = next.min(start);
            }
        }
        Ok(next)
    }

    fn split_at(&mut self, at: u64) {
        if let Some(idx) = self.mapping_index(at) {
            if self.mappings[idx].base != at {
                let tail = self.mappings[idx].split_at(at);
                self.mappings.insert(idx + 1, tail);
            }
        }
    }
}

/// An in-memory target process
pub struct VirtualProcess {
    layout: RwLock<Layout>,
    valid: bool,
    reads: AtomicUsize,
}

impl VirtualProcess {
    /// An empty but valid address space
    pub fn new() -> Self {
        VirtualProcess {
            layout: RwLock::new(Layout::default()),
            valid: true,
            reads: AtomicUsize::new(0),
        }
    }

    /// A process whose handle has been closed; every primitive fails
    pub fn invalid() -> Self {
        VirtualProcess {
            valid: false,
            ..Self::new()
        }
    }

    /// Builds an address space from a list of mappings
    pub fn with_mappings(specs: impl IntoIterator<Item = MappingSpec>) -> MemoryResult<Self> {
        let process = Self::new();
        for spec in specs {
            process.map(spec)?;
        }
        Ok(process)
    }

    fn layout(&self) -> RwLockReadGuard<'_, Layout> {
        self.layout.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn layout_mut(&self) -> RwLockWriteGuard<'_, Layout> {
        self.layout.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_valid(&self) -> MemoryResult<()> {
        if self.valid {
            Ok(())
        } else {
            Err(MemoryError::null_handle())
        }
    }

    /// Maps a new region. Empty, overflowing or overlapping regions are rejected.
    pub fn map(&self, spec: MappingSpec) -> MemoryResult<()> {
        if spec.data.is_empty() {
            return Err(MemoryError::InvalidParameter("empty mapping".to_string()));
        }
        let base = spec.base.as_u64();
        let end = base.checked_add(spec.data.len() as u64).ok_or_else(|| {
            MemoryError::InvalidParameter(format!("mapping at {} overflows", spec.base))
        })?;

        let mut layout = self.layout_mut();
        if layout
            .mappings
            .iter()
            .any(|m| base < m.end() && m.base < end)
        {
            return Err(MemoryError::InvalidParameter(format!(
                "mapping at {} overlaps an existing region",
                spec.base
            )));
        }

        let idx = layout.mappings.partition_point(|m| m.base < base);
        layout.mappings.insert(
            idx,
            Mapping {
                base,
                data: spec.data,
                protection: spec.protection,
                max_protection: spec.max_protection,
                tag: spec.tag,
                share_mode: spec.share_mode,
                nesting: spec.nesting,
            },
        );
        Ok(())
    }

    /// Declares a submap container seen by queries made at exactly `level`
    pub fn add_submap(&self, base: impl Into<Address>, size: u64, level: u32) {
        self.layout_mut().submaps.push(Submap {
            base: base.into().as_u64(),
            size,
            level,
        });
    }

    /// Makes reads of `[base, base + size)` fault regardless of protection
    pub fn mark_unreadable(&self, base: impl Into<Address>, size: u64) {
        let base = base.into().as_u64();
        self.layout_mut()
            .unreadable
            .push((base, base.saturating_add(size)));
    }

    /// Makes every subsequent write fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.layout_mut().fail_writes = fail;
    }

    /// Changes bytes the way the target itself would, ignoring protection
    pub fn poke(&self, address: impl Into<Address>, bytes: &[u8]) -> MemoryResult<()> {
        let address = address.into();
        let start = address.as_u64();
        let end = start
            .checked_add(bytes.len() as u64)
            .ok_or_else(|| MemoryError::write_failed(address, "range overflows"))?;

        let mut layout = self.layout_mut();
        let indices = layout
            .covering(start, end)
            .ok_or_else(|| MemoryError::write_failed(address, "range is not mapped"))?;
        copy_in(&mut layout.mappings, &indices, start, bytes);
        Ok(())
    }

    /// Reads bytes directly, ignoring protection and unreadable ranges
    pub fn peek(&self, address: impl Into<Address>, len: usize) -> Option<Vec<u8>> {
        let start = address.into().as_u64();
        let end = start.checked_add(len as u64)?;
        let layout = self.layout();
        let indices = layout.covering(start, end)?;

        let mut out = Vec::with_capacity(len);
        for idx in indices {
            let mapping = &layout.mappings[idx];
            let from = start.max(mapping.base) - mapping.base;
            let to = end.min(mapping.end()) - mapping.base;
            out.extend_from_slice(&mapping.data[from as usize..to as usize]);
        }
        Some(out)
    }

    /// Current protection of the byte at `address`
    pub fn protection_at(&self, address: impl Into<Address>) -> Option<Protection> {
        let layout = self.layout();
        layout
            .mapping_index(address.into().as_u64())
            .map(|idx| layout.mappings[idx].protection)
    }

    /// Number of `read_memory` calls served so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

fn copy_in(mappings: &mut [Mapping], indices: &[usize], start: u64, bytes: &[u8]) {
    let end = start + bytes.len() as u64;
    for &idx in indices {
        let mapping = &mut mappings[idx];
        let from = start.max(mapping.base);
        let to = end.min(mapping.end());
        let dst = &mut mapping.data[(from - mapping.base) as usize..(to - mapping.base) as usize];
        dst.copy_from_slice(&bytes[(from - start) as usize..(to - start) as usize]);
    }
}

impl Default for VirtualProcess {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessMemory for VirtualProcess {
    fn is_valid(&self) -> bool {
        self.valid
    }

    /// Copies bytes across adjacent readable regions, stopping at the first
    /// gap, unreadable region or faulting range. Fails only if nothing at all
    /// could be read.
    fn read_memory(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        self.check_valid()?;
        self.reads.fetch_add(1, Ordering::Relaxed);
        if buffer.is_empty() {
            return Ok(0);
        }

        let layout = self.layout();
        let start = address.as_u64();
        let end = start.saturating_add(buffer.len() as u64);
        let mut cursor = start;

        while cursor < end {
            let Some(idx) = layout.mapping_index(cursor) else {
                break;
            };
            let mapping = &layout.mappings[idx];
            if !mapping.protection.is_readable() {
                break;
            }
            let Ok(fault) = layout.next_unreadable(cursor) else {
                break;
            };

            let stop = end.min(mapping.end()).min(fault);
            let src = &mapping.data[(cursor - mapping.base) as usize..(stop - mapping.base) as usize];
            buffer[(cursor - start) as usize..(stop - start) as usize].copy_from_slice(src);
            cursor = stop;
        }

        let copied = (cursor - start) as usize;
        if copied == 0 {
            return Err(MemoryError::read_failed(address, "address is not readable"));
        }
        Ok(copied)
    }

    /// All-or-nothing: every byte must be mapped and currently writable
    fn write_memory(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        self.check_valid()?;
        let start = address.as_u64();
        let end = start
            .checked_add(data.len() as u64)
            .ok_or_else(|| MemoryError::write_failed(address, "range overflows"))?;

        let mut layout = self.layout_mut();
        if layout.fail_writes {
            return Err(MemoryError::write_failed(address, "write rejected by target"));
        }
        let indices = layout
            .covering(start, end)
            .ok_or_else(|| MemoryError::write_failed(address, "range is not mapped"))?;
        if indices
            .iter()
            .any(|&idx| !layout.mappings[idx].protection.is_writable())
        {
            return Err(MemoryError::write_failed(address, "range is not writable"));
        }

        copy_in(&mut layout.mappings, &indices, start, data);
        Ok(data.len())
    }

    fn protect_memory(
        &self,
        address: Address,
        size: u64,
        protection: NativeProtection,
    ) -> MemoryResult<Option<NativeProtection>> {
        self.check_valid()?;
        // raw values are plain r/w/x bits here
        let protection = match protection {
            NativeProtection::Portable(protection) => protection,
            NativeProtection::Raw(raw) => Protection::from_bits(raw as u8),
        };
        if size == 0 {
            return Err(MemoryError::InvalidParameter("zero-sized protection change".to_string()));
        }
        let start = address.as_u64();
        let end = start
            .checked_add(size)
            .ok_or_else(|| MemoryError::protection_failed(address, "range overflows"))?;

        let mut layout = self.layout_mut();
        let indices = layout
            .covering(start, end)
            .ok_or_else(|| MemoryError::protection_failed(address, "range is not mapped"))?;
        if indices
            .iter()
            .any(|&idx| !layout.mappings[idx].max_protection.contains(protection))
        {
            return Err(MemoryError::protection_failed(
                address,
                format!("{} exceeds the maximum protection", protection),
            ));
        }

        let previous = layout.mappings[indices[0]].protection;
        layout.split_at(start);
        layout.split_at(end);
        for mapping in layout
            .mappings
            .iter_mut()
            .filter(|m| m.base >= start && m.end() <= end)
        {
            mapping.protection = protection;
        }
        Ok(Some(previous.into()))
    }

    fn query_region(&self, address: Address, depth: u32) -> MemoryResult<RegionQuery> {
        self.check_valid()?;
        let at = address.as_u64();
        let layout = self.layout();

        let submap = layout
            .submaps
            .iter()
            .filter(|s| s.level == depth && s.end() > at)
            .min_by_key(|s| s.base);
        let mapping = layout
            .mappings
            .iter()
            .find(|m| m.nesting <= depth && m.end() > at);

        match (submap, mapping) {
            (Some(s), Some(m)) if m.base < s.base => Ok(m.query()),
            (Some(s), _) => Ok(s.query()),
            (None, Some(m)) => Ok(m.query()),
            (None, None) => Err(MemoryError::RegionNotFound(address.to_string())),
        }
    }
}

impl fmt::Debug for VirtualProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = self.layout();
        f.debug_struct("VirtualProcess")
            .field("valid", &self.valid)
            .field("mappings", &layout.mappings.len())
            .field("submaps", &layout.submaps.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VirtualProcess {
        VirtualProcess::with_mappings([
            MappingSpec::new(0x1000u64, vec![0xAA; 0x100]),
            MappingSpec::new(0x1100u64, vec![0xBB; 0x100]).protection(Protection::READ),
            MappingSpec::new(0x3000u64, vec![0xCC; 0x10])
                .protection(Protection::READ)
                .max_protection(Protection::READ),
        ])
        .unwrap()
    }

    #[test]
    fn test_map_rejects_overlap() {
        let process = sample();
        assert!(process.map(MappingSpec::zeroed(0x10F0u64, 0x20)).is_err());
        assert!(process.map(MappingSpec::zeroed(0x2000u64, 0)).is_err());
        assert!(process.map(MappingSpec::zeroed(0x2000u64, 0x10)).is_ok());
    }

    #[test]
    fn test_read_crosses_adjacent_regions() {
        let process = sample();
        let mut buffer = [0u8; 0x20];
        let read = process
            .read_memory(Address::new(0x10F0), &mut buffer)
            .unwrap();
        assert_eq!(read, 0x20);
        assert_eq!(&buffer[..0x10], &[0xAA; 0x10]);
        assert_eq!(&buffer[0x10..], &[0xBB; 0x10]);
        assert_eq!(process.read_count(), 1);
    }

    #[test]
    fn test_read_stops_at_gap_and_fault() {
        let process = sample();
        let mut buffer = [0u8; 0x40];
        let read = process
            .read_memory(Address::new(0x11E0), &mut buffer)
            .unwrap();
        assert_eq!(read, 0x20);

        assert!(process
            .read_memory(Address::new(0x2000), &mut buffer)
            .is_err());

        process.mark_unreadable(0x1010u64, 0x10);
        let read = process
            .read_memory(Address::new(0x1000), &mut buffer)
            .unwrap();
        assert_eq!(read, 0x10);
        assert!(process
            .read_memory(Address::new(0x1010), &mut buffer)
            .is_err());
    }

    #[test]
    fn test_write_requires_writable_protection() {
        let process = sample();
        assert_eq!(
            process
                .write_memory(Address::new(0x1000), &[1, 2, 3, 4])
                .unwrap(),
            4
        );
        assert_eq!(process.peek(0x1000u64, 4).unwrap(), vec![1, 2, 3, 4]);

        assert!(process
            .write_memory(Address::new(0x1100), &[1])
            .is_err());
        // all-or-nothing across a writable/read-only boundary
        assert!(process
            .write_memory(Address::new(0x10FE), &[9, 9, 9, 9])
            .is_err());
        assert_eq!(process.peek(0x10FEu64, 2).unwrap(), vec![0xAA, 0xAA]);

        process.set_fail_writes(true);
        assert!(process.write_memory(Address::new(0x1000), &[1]).is_err());
    }

    #[test]
    fn test_protect_splits_regions() {
        let process = sample();
        let previous = process
            .protect_memory(Address::new(0x1110), 0x10, Protection::READ_WRITE.into())
            .unwrap();
        assert_eq!(previous, Some(NativeProtection::Portable(Protection::READ)));
        assert_eq!(process.protection_at(0x1110u64), Some(Protection::READ_WRITE));
        assert_eq!(process.protection_at(0x1100u64), Some(Protection::READ));
        assert_eq!(process.protection_at(0x1120u64), Some(Protection::READ));

        let q = process.query_region(Address::new(0x1110), 0).unwrap();
        assert_eq!(q.base, Address::new(0x1110));
        assert_eq!(q.size, 0x10);

        assert!(process
            .protect_memory(Address::new(0x3000), 4, Protection::READ_WRITE.into())
            .is_err());
        assert!(process
            .protect_memory(Address::new(0x2000), 4, Protection::READ.into())
            .is_err());
    }

    #[test]
    fn test_query_with_submaps() {
        let process = VirtualProcess::with_mappings([
            MappingSpec::zeroed(0x1000u64, 0x1000),
            MappingSpec::zeroed(0x4000u64, 0x1000).nested(1),
            MappingSpec::zeroed(0x8000u64, 0x1000),
        ])
        .unwrap();
        process.add_submap(0x4000u64, 0x2000, 0);

        let q = process.query_region(Address::new(0x2000), 0).unwrap();
        assert!(q.is_submap);
        assert_eq!(q.base, Address::new(0x4000));

        let q = process.query_region(Address::new(0x4000), 1).unwrap();
        assert!(!q.is_submap);
        assert_eq!(q.depth, 1);

        let q = process.query_region(Address::new(0x5000), 1).unwrap();
        assert_eq!(q.base, Address::new(0x8000));

        assert!(process.query_region(Address::new(0x9000), 1).is_err());
    }

    #[test]
    fn test_invalid_process() {
        let process = VirtualProcess::invalid();
        assert!(!process.is_valid());
        let mut buffer = [0u8; 4];
        assert!(matches!(
            process.read_memory(Address::new(0), &mut buffer),
            Err(MemoryError::InvalidHandle(_))
        ));
        assert!(process.query_region(Address::MIN, 0).is_err());
    }
}
