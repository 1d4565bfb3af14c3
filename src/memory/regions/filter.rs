//! Memory region filtering functionality

use crate::core::types::{Address, Region, RegionCategory};

/// Criteria for filtering memory regions
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// Filter by minimum size
    pub min_size: Option<u64>,
    /// Filter by maximum size
    pub max_size: Option<u64>,
    /// Keep only these categories (empty keeps all)
    pub categories: Vec<RegionCategory>,
    /// Filter by readable regions only
    pub readable_only: bool,
    /// Filter by writable regions only
    pub writable_only: bool,
    /// Filter by executable regions only
    pub executable_only: bool,
    /// Keep only regions lying entirely inside `[start, end)`
    pub address_range: Option<(Address, Address)>,
    /// Exclude shared mappings
    pub exclude_shared: bool,
}

impl FilterCriteria {
    /// Create a new filter criteria builder
    pub fn new() -> Self {
        FilterCriteria::default()
    }

    /// Set minimum size filter
    pub fn with_min_size(mut self, size: u64) -> Self {
        self.min_size = Some(size);
        self
    }

    /// Set maximum size filter
    pub fn with_max_size(mut self, size: u64) -> Self {
        self.max_size = Some(size);
        self
    }

    /// Add a category to keep
    pub fn with_category(mut self, category: RegionCategory) -> Self {
        if !self.categories.contains(&category) {
            self.categories.push(category);
        }
        self
    }

    /// Filter for readable regions only
    pub fn readable(mut self) -> Self {
        self.readable_only = true;
        self
    }

    /// Filter for writable regions only
    pub fn writable(mut self) -> Self {
        self.writable_only = true;
        self
    }

    /// Filter for executable regions only
    pub fn executable(mut self) -> Self {
        self.executable_only = true;
        self
    }

    /// Set address range filter
    pub fn with_address_range(mut self, start: Address, end: Address) -> Self {
        self.address_range = Some((start, end));
        self
    }

    /// Exclude shared mappings
    pub fn private_only(mut self) -> Self {
        self.exclude_shared = true;
        self
    }
}

/// Filter for memory regions
#[derive(Debug, Clone, Default)]
pub struct RegionFilter {
    criteria: FilterCriteria,
}

impl RegionFilter {
    /// Create a new region filter with the given criteria
    pub fn new(criteria: FilterCriteria) -> Self {
        RegionFilter { criteria }
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Apply the filter to a list of regions
    pub fn apply(&self, regions: &[Region]) -> Vec<Region> {
        regions
            .iter()
            .filter(|region| self.matches(region))
            .cloned()
            .collect()
    }

    /// Check if a region matches the filter criteria
    pub fn matches(&self, region: &Region) -> bool {
        let criteria = &self.criteria;

        if criteria.min_size.map_or(false, |min| region.size < min) {
            return false;
        }
        if criteria.max_size.map_or(false, |max| region.size > max) {
            return false;
        }

        if !criteria.categories.is_empty() && !criteria.categories.contains(&region.category) {
            return false;
        }

        if criteria.readable_only && !region.is_readable() {
            return false;
        }
        if criteria.writable_only && !region.is_writable() {
            return false;
        }
        if criteria.executable_only && !region.is_executable() {
            return false;
        }

        if let Some((start, end)) = criteria.address_range {
            if region.base < start || region.end() > end {
                return false;
            }
        }

        !(criteria.exclude_shared && region.is_shared)
    }

    /// Count regions matching the filter
    pub fn count(&self, regions: &[Region]) -> usize {
        regions.iter().filter(|region| self.matches(region)).count()
    }

    /// Get total size of regions matching the filter
    pub fn total_size(&self, regions: &[Region]) -> u64 {
        regions
            .iter()
            .filter(|region| self.matches(region))
            .map(|region| region.size)
            .sum()
    }
}

impl From<FilterCriteria> for RegionFilter {
    fn from(criteria: FilterCriteria) -> Self {
        RegionFilter::new(criteria)
    }
}

/// Common filter presets
pub mod presets {
    use super::*;

    /// Readable regions a value search can look through
    pub fn searchable() -> FilterCriteria {
        FilterCriteria::new().readable()
    }

    /// Writable heap and stack regions, where game-style values usually live
    pub fn mutable_data() -> FilterCriteria {
        FilterCriteria::new()
            .with_category(RegionCategory::Heap)
            .with_category(RegionCategory::Stack)
            .with_category(RegionCategory::Data)
            .readable()
            .writable()
    }

    /// Executable code outside shared libraries
    pub fn executable_code() -> FilterCriteria {
        FilterCriteria::new()
            .with_category(RegionCategory::Code)
            .executable()
    }
}
