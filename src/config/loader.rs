//! Configuration loader for memory-inspector
//!
//! Reads TOML files; every missing table or key falls back to its default.

use super::defaults::{default_config, DEFAULT_CONFIG_FILE};
use crate::memory::{ScanOptions, WriterOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error type
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_scanner")]
    pub scanner: ScannerConfig,

    #[serde(default = "default_monitor")]
    pub monitor: MonitorConfig,

    #[serde(default = "default_writer")]
    pub writer: WriterConfig,

    #[serde(default = "default_logging")]
    pub logging: LoggingConfig,
}

/// Scanner configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_context_bytes")]
    pub context_bytes: usize,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default = "default_max_threads")]
    pub max_threads: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_results: Option<usize>,
}

/// Monitor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Writer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriterConfig {
    #[serde(default = "default_verify_writes")]
    pub verify_writes: bool,
    #[serde(default = "default_restore_protection")]
    pub restore_protection: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl From<&ScannerConfig> for ScanOptions {
    fn from(config: &ScannerConfig) -> Self {
        ScanOptions {
            chunk_size: config.chunk_size,
            context_bytes: config.context_bytes,
            parallel: config.parallel,
            max_threads: config.max_threads,
            max_results: config.max_results,
        }
    }
}

impl From<&WriterConfig> for WriterOptions {
    fn from(config: &WriterConfig) -> Self {
        WriterOptions {
            verify_writes: config.verify_writes,
            restore_protection: config.restore_protection,
        }
    }
}

/// Configuration loader
pub struct ConfigLoader {
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        ConfigLoader {
            config_path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Loads configuration from file
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.config_path.exists() {
            return Err(ConfigError::FileNotFound(
                self.config_path.display().to_string(),
            ));
        }

        let contents = fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Loads configuration, or returns defaults if the file doesn't exist.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(&self) -> Result<Config, ConfigError> {
        match self.load() {
            Err(ConfigError::FileNotFound(_)) => Ok(Config::default()),
            other => other,
        }
    }

    /// Saves configuration to file
    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, contents)?;
        Ok(())
    }
}

/// Loads configuration from `memory-inspector.toml` in the working directory
pub fn load_config() -> Result<Config, ConfigError> {
    ConfigLoader::new(DEFAULT_CONFIG_FILE).load_or_default()
}

// Default functions for serde
fn default_scanner() -> ScannerConfig {
    let defaults = default_config();
    ScannerConfig {
        chunk_size: defaults.scanner.chunk_size,
        context_bytes: defaults.scanner.context_bytes,
        parallel: defaults.scanner.parallel,
        max_threads: defaults.scanner.max_threads,
        max_results: None,
    }
}

fn default_monitor() -> MonitorConfig {
    MonitorConfig {
        poll_interval_ms: default_config().monitor.poll_interval_ms,
    }
}

fn default_writer() -> WriterConfig {
    let defaults = default_config();
    WriterConfig {
        verify_writes: defaults.writer.verify_writes,
        restore_protection: defaults.writer.restore_protection,
    }
}

fn default_logging() -> LoggingConfig {
    LoggingConfig {
        level: default_config().logging.level,
    }
}

// Individual field defaults
fn default_chunk_size() -> usize {
    default_config().scanner.chunk_size
}

fn default_context_bytes() -> usize {
    default_config().scanner.context_bytes
}

fn default_parallel() -> bool {
    default_config().scanner.parallel
}

fn default_max_threads() -> usize {
    default_config().scanner.max_threads
}

fn default_poll_interval_ms() -> u64 {
    default_config().monitor.poll_interval_ms
}

fn default_verify_writes() -> bool {
    default_config().writer.verify_writes
}

fn default_restore_protection() -> bool {
    default_config().writer.restore_protection
}

fn default_log_level() -> String {
    default_config().logging.level
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scanner: default_scanner(),
            monitor: default_monitor(),
            writer: default_writer(),
            logging: default_logging(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scanner.chunk_size, 4096);
        assert_eq!(config.scanner.max_results, None);
        assert_eq!(config.monitor.poll_interval(), Duration::from_millis(100));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let loader = ConfigLoader::new("nonexistent.toml");
        let result = loader.load();
        assert!(matches!(result.unwrap_err(), ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_or_default() {
        let loader = ConfigLoader::new("nonexistent.toml");
        let config = loader.load_or_default().unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_or_default_keeps_parse_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        fs::write(&path, "[scanner\nchunk_size = ").unwrap();

        let result = ConfigLoader::new(&path).load_or_default();
        assert!(matches!(result.unwrap_err(), ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let mut config = Config::default();
        config.scanner.max_results = Some(50);
        let loader = ConfigLoader::new(&config_path);

        loader.save(&config).unwrap();
        assert!(config_path.exists());

        let loaded = loader.load().unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_config() {
        let toml_str = r#"
            [scanner]
            chunk_size = 8192
            parallel = true

            [writer]
            verify_writes = false
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.scanner.chunk_size, 8192);
        assert!(config.scanner.parallel);
        assert!(!config.writer.verify_writes);
        // Check defaults are applied
        assert_eq!(config.scanner.context_bytes, 16);
        assert!(config.writer.restore_protection);
        assert_eq!(config.monitor.poll_interval_ms, 100);
    }

    #[test]
    fn test_into_options() {
        let mut config = Config::default();
        config.scanner.chunk_size = 1024;
        config.scanner.max_results = Some(3);
        config.writer.restore_protection = false;

        let scan = ScanOptions::from(&config.scanner);
        assert_eq!(scan.chunk_size, 1024);
        assert_eq!(scan.max_results, Some(3));

        let write = WriterOptions::from(&config.writer);
        assert!(write.verify_writes);
        assert!(!write.restore_protection);
    }
}
