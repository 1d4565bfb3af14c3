//! Memory scanning: region walks and chunked pattern search

use super::reader::read_chunk;
use super::regions::{enumerate_regions, region_at, RegionFilter};
use crate::core::types::{Address, MemoryError, MemoryResult, Region, SearchResult, Value};
use crate::process::ProcessMemory;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Bytes read per chunk when searching
pub const DEFAULT_CHUNK_SIZE: usize = 4096;
/// Bytes of context captured on each side of a match
pub const DEFAULT_CONTEXT_BYTES: usize = 16;

/// Options for memory scanning
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Bytes read per chunk
    pub chunk_size: usize,
    /// Context captured before and after each match
    pub context_bytes: usize,
    /// Scan regions on a thread pool
    pub parallel: bool,
    /// Worker threads used when `parallel` is set
    pub max_threads: usize,
    /// Stop after this many matches
    pub max_results: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        ScanOptions {
            chunk_size: DEFAULT_CHUNK_SIZE,
            context_bytes: DEFAULT_CONTEXT_BYTES,
            parallel: false,
            max_threads: num_cpus::get().clamp(1, 8),
            max_results: None,
        }
    }
}

impl ScanOptions {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_context_bytes(mut self, context_bytes: usize) -> Self {
        self.context_bytes = context_bytes;
        self
    }

    pub fn with_parallel(mut self, max_threads: usize) -> Self {
        self.parallel = true;
        self.max_threads = max_threads;
        self
    }

    pub fn with_max_results(mut self, max_results: usize) -> Self {
        self.max_results = Some(max_results);
        self
    }
}

/// Cooperative cancellation flag shared between a scan and its caller.
///
/// Checked between regions and between chunks; a read already in flight
/// always completes.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Memory scanner bound to one process handle.
///
/// Scanning keeps no state between calls, so any number of scanners may run
/// next to monitors and writers on the same handle.
pub struct MemoryScanner<'a, P: ProcessMemory + ?Sized> {
    handle: &'a P,
    options: ScanOptions,
}

impl<'a, P: ProcessMemory + ?Sized> MemoryScanner<'a, P> {
    /// Create a new memory scanner with default options
    pub fn new(handle: &'a P) -> Self {
        Self::with_options(handle, ScanOptions::default())
    }

    pub fn with_options(handle: &'a P, options: ScanOptions) -> Self {
        MemoryScanner { handle, options }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// All regions of the target, in address order. Empty for an invalid handle.
    pub fn enumerate(&self) -> Vec<Region> {
        let regions = enumerate_regions(self.handle);
        debug!(count = regions.len(), "Enumerated regions");
        regions
    }

    /// Regions matching `filter`, in address order
    pub fn enumerate_filtered(&self, filter: &RegionFilter) -> Vec<Region> {
        filter.apply(&self.enumerate())
    }

    /// The leaf region containing `address`
    pub fn region_at(&self, address: Address) -> MemoryResult<Region> {
        region_at(self.handle, address)
    }

    /// Reads up to `size` bytes, truncated to what the target returned
    pub fn read_chunk(&self, address: Address, size: usize) -> MemoryResult<Vec<u8>> {
        read_chunk(self.handle, address, size)
    }

    /// Finds every occurrence of `needle` in the readable regions of the target.
    ///
    /// Results come back in address order. An empty needle or an invalid
    /// handle yields nothing; unreadable chunks are skipped.
    pub fn search(&self, needle: &[u8]) -> Vec<SearchResult> {
        self.search_with(needle, &CancellationToken::new())
    }

    /// Searches for the encoded bytes of `value`
    pub fn search_value(&self, value: &Value) -> Vec<SearchResult> {
        self.search(value.bytes())
    }

    /// Like [`MemoryScanner::search`], stopping early once `cancel` is set.
    /// A cancelled search returns the matches found so far.
    pub fn search_with(&self, needle: &[u8], cancel: &CancellationToken) -> Vec<SearchResult> {
        if needle.is_empty() || !self.handle.is_valid() {
            return Vec::new();
        }

        let regions: Vec<Region> = self
            .enumerate()
            .into_iter()
            .filter(Region::is_readable)
            .collect();

        let mut results = if self.options.parallel && regions.len() > 1 {
            match self.search_parallel(&regions, needle, cancel) {
                Ok(results) => results,
                Err(e) => {
                    warn!(error = %e, "Falling back to sequential search");
                    self.search_sequential(&regions, needle, cancel)
                }
            }
        } else {
            self.search_sequential(&regions, needle, cancel)
        };

        if let Some(max) = self.options.max_results {
            results.truncate(max);
        }

        info!(
            needle_len = needle.len(),
            regions = regions.len(),
            matches = results.len(),
            cancelled = cancel.is_cancelled(),
            "Search finished"
        );
        results
    }

    fn search_sequential(
        &self,
        regions: &[Region],
        needle: &[u8],
        cancel: &CancellationToken,
    ) -> Vec<SearchResult> {
        let mut all_results = Vec::new();

        for region in regions {
            if cancel.is_cancelled() {
                break;
            }
            all_results.extend(self.scan_region(region, needle, cancel));

            if let Some(max) = self.options.max_results {
                if all_results.len() >= max {
                    break;
                }
            }
        }

        all_results
    }

    fn search_parallel(
        &self,
        regions: &[Region],
        needle: &[u8],
        cancel: &CancellationToken,
    ) -> MemoryResult<Vec<SearchResult>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.max_threads.max(1))
            .build()
            .map_err(|e| MemoryError::SystemResource(format!("thread pool: {}", e)))?;

        // collect keeps region order, so results stay in address order
        let per_region: Vec<Vec<SearchResult>> = pool.install(|| {
            regions
                .par_iter()
                .map(|region| {
                    if cancel.is_cancelled() {
                        Vec::new()
                    } else {
                        self.scan_region(region, needle, cancel)
                    }
                })
                .collect()
        });

        Ok(per_region.into_iter().flatten().collect())
    }

    /// Reads one region chunk by chunk. Consecutive chunks overlap by
    /// `needle.len() - 1` bytes so matches straddling a chunk boundary are
    /// still seen.
    fn scan_region(
        &self,
        region: &Region,
        needle: &[u8],
        cancel: &CancellationToken,
    ) -> Vec<SearchResult> {
        let chunk_size = self.options.chunk_size.max(1);
        let step = if chunk_size > needle.len() {
            chunk_size - (needle.len() - 1)
        } else {
            chunk_size
        };

        let mut results = Vec::new();
        let mut offset: u64 = 0;

        while offset < region.size {
            if cancel.is_cancelled() {
                break;
            }

            let remaining = region.size - offset;
            let to_read = remaining.min(chunk_size as u64) as usize;
            let Some(address) = region.base.checked_add(offset) else {
                break;
            };

            match read_chunk(self.handle, address, to_read) {
                Ok(chunk) => find_matches(
                    &chunk,
                    needle,
                    address,
                    self.options.context_bytes,
                    &mut results,
                ),
                Err(e) => debug!(%address, size = to_read, error = %e, "Skipping unreadable chunk"),
            }

            if remaining <= chunk_size as u64 {
                break;
            }
            offset += step as u64;
        }

        results
    }
}

/// Appends every (possibly overlapping) occurrence of `needle` in `chunk`,
/// with up to `context` bytes captured on each side, clamped to the chunk.
pub fn find_matches(
    chunk: &[u8],
    needle: &[u8],
    chunk_address: Address,
    context: usize,
    results: &mut Vec<SearchResult>,
) {
    if needle.is_empty() || chunk.len() < needle.len() {
        return;
    }

    for (idx, window) in chunk.windows(needle.len()).enumerate() {
        if window != needle {
            continue;
        }

        let start = idx.saturating_sub(context);
        let end = (idx + needle.len() + context).min(chunk.len());
        results.push(SearchResult {
            address: chunk_address.saturating_add(idx as u64),
            context: chunk[start..end].to_vec(),
            value_size: needle.len(),
            context_offset: idx - start,
        });
    }
}
