//! Mapped-region descriptions produced by an address-space walk

use super::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Page protection bits of a mapped range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Protection {
    value: u8,
}

impl Protection {
    pub const NONE: Protection = Protection { value: 0 };
    pub const READ: Protection = Protection { value: 0x1 };
    pub const WRITE: Protection = Protection { value: 0x2 };
    pub const EXECUTE: Protection = Protection { value: 0x4 };
    pub const READ_WRITE: Protection = Protection { value: 0x3 };
    pub const READ_EXECUTE: Protection = Protection { value: 0x5 };
    pub const ALL: Protection = Protection { value: 0x7 };

    /// Builds protection from individual flags
    pub const fn from_flags(readable: bool, writable: bool, executable: bool) -> Self {
        let mut value = 0;
        if readable {
            value |= Self::READ.value;
        }
        if writable {
            value |= Self::WRITE.value;
        }
        if executable {
            value |= Self::EXECUTE.value;
        }
        Protection { value }
    }

    /// Builds protection from raw `r/w/x` bits, ignoring anything else
    pub const fn from_bits(bits: u8) -> Self {
        Protection {
            value: bits & Self::ALL.value,
        }
    }

    pub const fn bits(&self) -> u8 {
        self.value
    }

    pub const fn contains(&self, other: Protection) -> bool {
        self.value & other.value == other.value
    }

    pub const fn union(&self, other: Protection) -> Self {
        Protection {
            value: self.value | other.value,
        }
    }

    pub const fn is_readable(&self) -> bool {
        self.contains(Self::READ)
    }

    pub const fn is_writable(&self) -> bool {
        self.contains(Self::WRITE)
    }

    pub const fn is_executable(&self) -> bool {
        self.contains(Self::EXECUTE)
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            if self.is_readable() { 'r' } else { '-' },
            if self.is_writable() { 'w' } else { '-' },
            if self.is_executable() { 'x' } else { '-' }
        )
    }
}

/// A page protection in the form the platform itself records it.
///
/// Handing a saved value back to the platform restores modifiers that
/// [`Protection`] has no bits for, such as Windows guard and write-copy pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeProtection {
    /// Only the portable `r/w/x` bits are known
    Portable(Protection),
    /// Raw platform value, applied verbatim
    Raw(u32),
}

impl From<Protection> for NativeProtection {
    fn from(protection: Protection) -> Self {
        NativeProtection::Portable(protection)
    }
}

impl fmt::Display for NativeProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeProtection::Portable(protection) => write!(f, "{}", protection),
            NativeProtection::Raw(raw) => write!(f, "{:#x}", raw),
        }
    }
}

/// How a mapping's pages are shared with other address spaces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShareMode {
    CopyOnWrite,
    Private,
    Empty,
    Shared,
    TrueShared,
    PrivateAliased,
    SharedAliased,
    LargePage,
}

impl ShareMode {
    /// Decodes the kernel's numeric share mode; unknown values read as private
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            1 => ShareMode::CopyOnWrite,
            2 => ShareMode::Private,
            3 => ShareMode::Empty,
            4 => ShareMode::Shared,
            5 => ShareMode::TrueShared,
            6 => ShareMode::PrivateAliased,
            7 => ShareMode::SharedAliased,
            8 => ShareMode::LargePage,
            _ => ShareMode::Private,
        }
    }

    /// Any mode other than strictly private counts as shared
    pub fn is_shared(&self) -> bool {
        *self != ShareMode::Private
    }

    /// Pages genuinely mapped into more than one address space.
    /// Copy-on-write and empty mappings are not.
    pub fn is_shared_mapping(&self) -> bool {
        matches!(self, ShareMode::Shared | ShareMode::TrueShared)
    }
}

/// Allocator tag a kernel attaches to a mapping.
///
/// Numbering follows the Mach `VM_MEMORY_*` tags; the other platform
/// backends translate what they know about a mapping into these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct UserTag(pub u32);

impl UserTag {
    pub const NONE: UserTag = UserTag(0);
    pub const MALLOC: UserTag = UserTag(1);
    pub const MALLOC_SMALL: UserTag = UserTag(2);
    pub const MALLOC_LARGE: UserTag = UserTag(3);
    pub const MALLOC_TINY: UserTag = UserTag(7);
    pub const MALLOC_LARGE_REUSABLE: UserTag = UserTag(8);
    pub const ANALYSIS_TOOL: UserTag = UserTag(10);
    pub const IOKIT: UserTag = UserTag(21);
    pub const STACK: UserTag = UserTag(30);
    pub const SHARED_PMAP: UserTag = UserTag(32);
    pub const DYLIB: UserTag = UserTag(33);
    pub const OS_ALLOC_ONCE: UserTag = UserTag(73);

    pub fn is_stack(&self) -> bool {
        *self == Self::STACK
    }

    /// Heap allocator tags
    pub fn is_heap(&self) -> bool {
        matches!(
            *self,
            Self::MALLOC
                | Self::MALLOC_SMALL
                | Self::MALLOC_LARGE
                | Self::MALLOC_TINY
                | Self::MALLOC_LARGE_REUSABLE
                | Self::ANALYSIS_TOOL
        )
    }

    /// Shared-library and dynamic-linker tags
    pub fn is_shared_lib(&self) -> bool {
        matches!(
            *self,
            Self::DYLIB | Self::OS_ALLOC_ONCE | Self::SHARED_PMAP | Self::IOKIT
        )
    }
}

/// Human-meaningful category of a region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegionCategory {
    Stack,
    Heap,
    SharedLib,
    Code,
    Shared,
    Submap,
    Data,
}

impl fmt::Display for RegionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RegionCategory::Stack => "Stack",
            RegionCategory::Heap => "Heap",
            RegionCategory::SharedLib => "SharedLib",
            RegionCategory::Code => "Code",
            RegionCategory::Shared => "Shared",
            RegionCategory::Submap => "Submap",
            RegionCategory::Data => "Data",
        };
        f.pad(name)
    }
}

/// Raw answer to one region query, before classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionQuery {
    pub base: Address,
    pub size: u64,
    /// Submap nesting depth the answer was found at
    pub depth: u32,
    pub is_submap: bool,
    pub user_tag: UserTag,
    pub protection: Protection,
    /// Highest protection the range may be raised to
    pub max_protection: Protection,
    pub share_mode: ShareMode,
}

/// One contiguous mapped range of a target address space.
///
/// Regions are snapshots of a single enumeration pass; the target may remap
/// the range at any time afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub base: Address,
    pub size: u64,
    pub protection: Protection,
    pub max_protection: Protection,
    pub category: RegionCategory,
    pub is_shared: bool,
}

impl Region {
    /// One-past-the-end address, clamped to the top of the address space
    pub fn end(&self) -> Address {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, address: Address) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn is_readable(&self) -> bool {
        self.protection.is_readable()
    }

    pub fn is_writable(&self) -> bool {
        self.protection.is_writable()
    }

    pub fn is_executable(&self) -> bool {
        self.protection.is_executable()
    }

    /// Whether a protection change could make the range writable
    pub fn can_become_writable(&self) -> bool {
        self.max_protection.is_writable()
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:x}-{:x} {} {:<9} {} bytes",
            self.base,
            self.end(),
            self.protection,
            self.category,
            self.size
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(base: u64, size: u64, protection: Protection) -> Region {
        Region {
            base: Address::new(base),
            size,
            protection,
            max_protection: protection,
            category: RegionCategory::Data,
            is_shared: false,
        }
    }

    #[test]
    fn test_protection_flags() {
        let rw = Protection::from_flags(true, true, false);
        assert_eq!(rw, Protection::READ_WRITE);
        assert!(rw.is_readable());
        assert!(rw.is_writable());
        assert!(!rw.is_executable());
        assert_eq!(rw.to_string(), "rw-");
        assert_eq!(Protection::READ.union(Protection::EXECUTE), Protection::READ_EXECUTE);
        assert_eq!(Protection::from_bits(0xFF), Protection::ALL);
        assert_eq!(Protection::NONE.to_string(), "---");
    }

    #[test]
    fn test_native_protection() {
        assert_eq!(
            NativeProtection::from(Protection::READ),
            NativeProtection::Portable(Protection::READ)
        );
        assert_eq!(NativeProtection::Portable(Protection::READ_WRITE).to_string(), "rw-");
        assert_eq!(NativeProtection::Raw(0x104).to_string(), "0x104");
    }

    #[test]
    fn test_share_mode() {
        assert_eq!(ShareMode::from_raw(4), ShareMode::Shared);
        assert_eq!(ShareMode::from_raw(200), ShareMode::Private);
        assert!(!ShareMode::Private.is_shared());
        assert!(ShareMode::CopyOnWrite.is_shared());
        assert!(ShareMode::Shared.is_shared_mapping());
        assert!(ShareMode::TrueShared.is_shared_mapping());
        assert!(!ShareMode::CopyOnWrite.is_shared_mapping());
        assert!(!ShareMode::Empty.is_shared_mapping());
        assert!(!ShareMode::SharedAliased.is_shared_mapping());
    }

    #[test]
    fn test_user_tags() {
        assert!(UserTag::STACK.is_stack());
        assert!(UserTag::MALLOC_TINY.is_heap());
        assert!(!UserTag(4).is_heap());
        assert!(UserTag::DYLIB.is_shared_lib());
        assert!(!UserTag::NONE.is_shared_lib());
    }

    #[test]
    fn test_region_bounds() {
        let r = region(0x1000, 0x2000, Protection::READ_WRITE);
        assert_eq!(r.end(), Address::new(0x3000));
        assert!(r.contains(Address::new(0x1000)));
        assert!(r.contains(Address::new(0x2FFF)));
        assert!(!r.contains(Address::new(0x3000)));
        assert!(!r.contains(Address::new(0x0FFF)));

        let top = region(u64::MAX - 0xF, 0x100, Protection::READ);
        assert_eq!(top.end(), Address::new(u64::MAX));
    }

    #[test]
    fn test_region_display() {
        let r = region(0x1000, 0x1000, Protection::READ);
        let text = r.to_string();
        assert!(text.contains("r--"));
        assert!(text.contains("Data"));
    }
}
