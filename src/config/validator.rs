//! Configuration validator for memory-inspector
//!
//! Validates configuration values to ensure they are within acceptable ranges.

use super::loader::{Config, ConfigError, LoggingConfig, MonitorConfig, ScannerConfig};

/// Smallest chunk a scan may read
pub const MIN_CHUNK_SIZE: usize = 64;
/// Largest context captured on either side of a match
pub const MAX_CONTEXT_BYTES: usize = 4096;
pub const MAX_THREADS: usize = 128;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire configuration
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        Self::validate_scanner(&config.scanner)?;
        Self::validate_monitor(&config.monitor)?;
        Self::validate_logging(&config.logging)?;
        Ok(())
    }

    /// Validates scanner configuration
    fn validate_scanner(scanner: &ScannerConfig) -> Result<(), ConfigError> {
        // Chunk size must be a power of 2 for alignment
        if !scanner.chunk_size.is_power_of_two() || scanner.chunk_size < MIN_CHUNK_SIZE {
            return Err(ConfigError::Invalid(format!(
                "Chunk size must be a power of 2 and at least {}",
                MIN_CHUNK_SIZE
            )));
        }

        if scanner.context_bytes > MAX_CONTEXT_BYTES {
            return Err(ConfigError::Invalid(format!(
                "Context bytes cannot exceed {}",
                MAX_CONTEXT_BYTES
            )));
        }

        if scanner.max_threads == 0 {
            return Err(ConfigError::Invalid(
                "Scanner threads must be at least 1".to_string(),
            ));
        }

        if scanner.max_threads > MAX_THREADS {
            return Err(ConfigError::Invalid(format!(
                "Scanner threads cannot exceed {}",
                MAX_THREADS
            )));
        }

        if scanner.max_results == Some(0) {
            return Err(ConfigError::Invalid(
                "Maximum results must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }

    fn validate_monitor(monitor: &MonitorConfig) -> Result<(), ConfigError> {
        if monitor.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "Poll interval must be at least 1 ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Validates logging configuration
    fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                logging.level, valid_levels
            )));
        }
        Ok(())
    }
}

/// Validates a configuration
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    ConfigValidator::validate(config)
}
