//! Environment variable constants used throughout the application.
//!
//! Centralized definition of all `MEMWATCH_*` environment variables to ensure
//! consistency and avoid hardcoded strings.

/// Configuration file path override (CLI arg default env)
pub const MEMWATCH_CONFIG: &str = "MEMWATCH_CONFIG";

/// Log level override, takes precedence over `[logging] level`
pub const MEMWATCH_LOG: &str = "MEMWATCH_LOG";
