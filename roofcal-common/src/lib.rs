//! # RoofCal Common Library
//!
//! Shared code for the measurement engine and its operator tooling:
//! - Error type and result alias
//! - TOML bootstrap configuration and path resolution
//! - Logging initialization
//! - Timestamp and age helpers

pub mod config;
pub mod error;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
