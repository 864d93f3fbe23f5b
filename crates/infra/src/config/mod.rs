//! Configuration loading and management
//!
//! This module provides utilities for loading aggregator configuration
//! from environment variables and files.

pub mod loader;

// Re-export commonly used items
pub use loader::{load, load_from_file, parse_timezone_map, probe_config_paths};
