//! # Device Client for the Mise Device Directory
//!
//! This crate provides client-side functionality for scales:
//! - Registration with the config service
//! - Configuration reads with a local TTL cache
//! - Address and configuration updates
//! - Local storage of the assigned identity

pub mod registration;
pub mod service;
pub mod storage;

// Re-export commonly used types
pub use registration::DeviceRegistrar;
pub use service::ServiceClient;
pub use storage::{LocalStorage, RegisteredIdentity};
