//! Configuration module for Harrow
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use harrow::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Page budget: {}", config.orchestrator.max_pages_per_task);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, BackoffConfig, Config, OrchestratorConfig, OutputConfig};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
