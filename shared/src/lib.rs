//! # Shared Module for the Mise Device Directory
//!
//! This crate provides the types, errors and configuration used across
//! the config service, the device client and the benchmarks.
//!
//! ## Architecture
//!
//! A scale is known by a [`DeviceIdentity`] (`model` + `serial`). Its
//! settings live in a [`Configuration`] record that is reachable only
//! through the scale's [`DirectoryEntry`]:
//!
//! | Collection | Record | Key |
//! |------------|--------|-----|
//! | `devices` | `DirectoryEntry` | generated id, looked up by `(model, serialNumber)` |
//! | `config` | `Configuration` | generated id, referenced by the entry's `config` |

pub mod config;
pub mod constants;
pub mod duration;
pub mod error;
pub mod identity;
pub mod types;

// Re-exports for convenience
pub use config::*;
pub use constants::*;
pub use error::*;
pub use identity::*;
pub use types::*;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
