//! Strongbox Common - configuration, errors, and logging shared by the
//! strongbox crates.
//!
//! This crate provides:
//! - The vault configuration file format and [`VaultConfig`]
//! - Per-action configuration validation
//! - Error types and context helpers
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{config_dir, config_path, set_config_value, VaultConfig};
pub use error::{Error, Result, ResultExt};
pub use logging::{init_logging, LogFormat};
pub use validation::{ActionKind, ValidationError, ValidationResult};
