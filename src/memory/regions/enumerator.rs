//! Address-space walk over a target's mapped regions

use super::classify;
use crate::core::types::{Address, MemoryError, MemoryResult, Region, RegionCategory};
use crate::process::ProcessMemory;
use tracing::debug;

/// Deepest submap nesting a walk descends into. Submaps nested deeper are
/// stepped over as a whole.
pub const MAX_SUBMAP_DEPTH: u32 = 64;

/// Walks the target's address space from the bottom up.
///
/// A submap answer is a container, not a leaf: the walk re-queries the same
/// address one level deeper instead of advancing. Every leaf is classified
/// and the walk continues right after it. The walk ends at the first failing
/// query, so a revoked handle or the end of the address space simply yields
/// whatever was collected so far. The depth only ever grows during a walk.
pub fn enumerate_regions<P: ProcessMemory + ?Sized>(handle: &P) -> Vec<Region> {
    let mut regions = Vec::new();
    if !handle.is_valid() {
        return regions;
    }

    let mut address = Address::MIN;
    let mut depth = 0u32;

    loop {
        let query = match handle.query_region(address, depth) {
            Ok(query) => query,
            Err(e) => {
                debug!(%address, depth, error = %e, "Region walk finished");
                break;
            }
        };

        let next = match query.base.checked_add(query.size) {
            Some(next) if query.size > 0 => next,
            _ => break,
        };

        if query.is_submap {
            if depth < MAX_SUBMAP_DEPTH {
                depth += 1;
                address = query.base;
                continue;
            }
            debug!(base = %query.base, depth, "Submap nested too deep, skipping");
        } else {
            regions.push(Region::from(&query));
        }

        if next <= address {
            break;
        }
        address = next;
    }

    regions
}

/// Finds the leaf region containing `address`, descending through submaps
pub fn region_at<P: ProcessMemory + ?Sized>(handle: &P, address: Address) -> MemoryResult<Region> {
    if !handle.is_valid() {
        return Err(MemoryError::null_handle());
    }

    let mut depth = 0u32;
    loop {
        let query = handle.query_region(address, depth)?;
        let contains = query.base <= address
            && address.offset_from(query.base).map_or(false, |off| off < query.size);
        if !contains {
            return Err(MemoryError::RegionNotFound(address.to_string()));
        }

        if classify(&query) != RegionCategory::Submap {
            return Ok(Region::from(&query));
        }
        if depth >= MAX_SUBMAP_DEPTH {
            return Err(MemoryError::RegionNotFound(address.to_string()));
        }
        depth += 1;
    }
}
