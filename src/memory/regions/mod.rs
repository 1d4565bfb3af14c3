//! Memory region enumeration, classification and protection management
//!
//! Regions come out of the platform's region query as raw [`RegionQuery`]
//! answers. This module turns them into classified [`Region`]s, walks a whole
//! address space, filters the result and temporarily raises protections for
//! writes.

pub mod enumerator;
pub mod filter;
pub mod protection;

pub use enumerator::{enumerate_regions, region_at, MAX_SUBMAP_DEPTH};
pub use filter::{FilterCriteria, RegionFilter};
pub use protection::{ProtectionChange, ProtectionManager};

use crate::core::types::{Region, RegionCategory, RegionQuery};

/// Classifies a raw region query.
///
/// The checks run in a fixed order and the first match wins: a submap is
/// always `Submap`, allocator tags beat permission bits, and `Data` catches
/// everything left over. A stack that happens to be executable is still a
/// stack.
pub fn classify(query: &RegionQuery) -> RegionCategory {
    if query.is_submap {
        RegionCategory::Submap
    } else if query.user_tag.is_stack() {
        RegionCategory::Stack
    } else if query.user_tag.is_heap() {
        RegionCategory::Heap
    } else if query.user_tag.is_shared_lib() {
        RegionCategory::SharedLib
    } else if query.protection.is_executable() {
        RegionCategory::Code
    } else if query.share_mode.is_shared_mapping() {
        RegionCategory::Shared
    } else {
        RegionCategory::Data
    }
}

impl From<&RegionQuery> for Region {
    fn from(query: &RegionQuery) -> Self {
        Region {
            base: query.base,
            size: query.size,
            protection: query.protection,
            max_protection: query.max_protection,
            category: classify(query),
            is_shared: query.share_mode.is_shared(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{Address, Protection, ShareMode, UserTag};

    fn query(tag: UserTag, protection: Protection, share_mode: ShareMode) -> RegionQuery {
        RegionQuery {
            base: Address::new(0x1000),
            size: 0x1000,
            depth: 0,
            is_submap: false,
            user_tag: tag,
            protection,
            max_protection: Protection::ALL,
            share_mode,
        }
    }

    #[test]
    fn test_classify_order() {
        let mut q = query(UserTag::STACK, Protection::ALL, ShareMode::Shared);
        assert_eq!(classify(&q), RegionCategory::Stack);

        q.is_submap = true;
        assert_eq!(classify(&q), RegionCategory::Submap);

        let q = query(UserTag::MALLOC_SMALL, Protection::ALL, ShareMode::Private);
        assert_eq!(classify(&q), RegionCategory::Heap);

        let q = query(UserTag::DYLIB, Protection::READ_EXECUTE, ShareMode::CopyOnWrite);
        assert_eq!(classify(&q), RegionCategory::SharedLib);

        let q = query(UserTag::NONE, Protection::READ_EXECUTE, ShareMode::Shared);
        assert_eq!(classify(&q), RegionCategory::Code);

        let q = query(UserTag::NONE, Protection::READ_WRITE, ShareMode::TrueShared);
        assert_eq!(classify(&q), RegionCategory::Shared);

        let q = query(UserTag::NONE, Protection::READ_WRITE, ShareMode::Shared);
        assert_eq!(classify(&q), RegionCategory::Shared);

        let q = query(UserTag::NONE, Protection::READ_WRITE, ShareMode::Private);
        assert_eq!(classify(&q), RegionCategory::Data);
    }

    #[test]
    fn test_copy_on_write_and_empty_are_data() {
        for mode in [
            ShareMode::CopyOnWrite,
            ShareMode::Empty,
            ShareMode::PrivateAliased,
            ShareMode::SharedAliased,
            ShareMode::LargePage,
        ] {
            let q = query(UserTag::NONE, Protection::READ_WRITE, mode);
            assert_eq!(classify(&q), RegionCategory::Data, "{:?}", mode);
            // still reported as not strictly private
            assert!(Region::from(&q).is_shared);
        }
    }

    #[test]
    fn test_unknown_tag_falls_through() {
        let q = query(UserTag(250), Protection::READ, ShareMode::Private);
        assert_eq!(classify(&q), RegionCategory::Data);
    }

    #[test]
    fn test_region_from_query() {
        let q = query(UserTag::MALLOC, Protection::READ_WRITE, ShareMode::Private);
        let region = Region::from(&q);
        assert_eq!(region.base, Address::new(0x1000));
        assert_eq!(region.size, 0x1000);
        assert_eq!(region.category, RegionCategory::Heap);
        assert!(!region.is_shared);
        assert!(region.can_become_writable());
    }
}
