//! Memory operations on a target process
//!
//! This module provides the engine working on top of [`ProcessMemory`]:
//! - Region enumeration, classification and filtering
//! - Bounded chunk reads
//! - Chunked pattern search with context capture
//! - Audited writes with temporary protection changes
//!
//! [`ProcessMemory`]: crate::process::ProcessMemory

pub mod reader;
pub mod regions;
pub mod scanner;
pub mod writer;

pub use reader::{read_chunk, read_exact, read_value, MemoryReader};
pub use regions::{classify, enumerate_regions, region_at, FilterCriteria, RegionFilter};
pub use scanner::{CancellationToken, MemoryScanner, ScanOptions};
pub use writer::{AuditLog, MemoryWriter, WriteRecord, WriterOptions};
