//! Default configuration values for memory-inspector

use crate::memory::scanner::{DEFAULT_CHUNK_SIZE, DEFAULT_CONTEXT_BYTES};
use serde::{Deserialize, Serialize};

/// File name looked up by [`super::load_config`]
pub const DEFAULT_CONFIG_FILE: &str = "memory-inspector.toml";

/// Default configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigDefaults {
    pub scanner: ScannerDefaults,
    pub monitor: MonitorDefaults,
    pub writer: WriterDefaults,
    pub logging: LoggingDefaults,
}

/// Default scanner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerDefaults {
    pub chunk_size: usize,
    pub context_bytes: usize,
    pub parallel: bool,
    pub max_threads: usize,
}

/// Default monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorDefaults {
    pub poll_interval_ms: u64,
}

/// Default writer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterDefaults {
    pub verify_writes: bool,
    pub restore_protection: bool,
}

/// Default logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingDefaults {
    pub level: String,
}

/// Returns the default configuration
pub fn default_config() -> ConfigDefaults {
    ConfigDefaults {
        scanner: ScannerDefaults {
            chunk_size: DEFAULT_CHUNK_SIZE,
            context_bytes: DEFAULT_CONTEXT_BYTES,
            parallel: false,
            max_threads: num_cpus::get().clamp(1, 8),
        },
        monitor: MonitorDefaults {
            poll_interval_ms: 100,
        },
        writer: WriterDefaults {
            verify_writes: true,
            restore_protection: true,
        },
        logging: LoggingDefaults {
            level: "info".to_string(),
        },
    }
}
