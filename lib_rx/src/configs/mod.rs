//! # Configuration Modules
//!
//! Engine-wide defaults loaded from JSON, and their conversion into the option
//! structs taken by sources, operators and combinators.

/// Serde-backed engine configuration.
pub mod config_rx;

pub use config_rx::{RxConfig, RxConfigError, CONFIG_FILE_ENV};
