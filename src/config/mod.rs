//! Configuration module for memory-inspector
//!
//! Provides configuration loading, validation, and default settings
//! for the scanner, monitor, writer and logging.

mod defaults;
mod loader;
mod validator;

pub use defaults::{default_config, ConfigDefaults, DEFAULT_CONFIG_FILE};
pub use loader::{load_config, ConfigLoader};
pub use validator::{validate_config, ConfigValidator};

// Re-export the configuration structures
pub use loader::{Config, LoggingConfig, MonitorConfig, ScannerConfig, WriterConfig};

// Configuration-related error type
pub use loader::ConfigError;

// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;
