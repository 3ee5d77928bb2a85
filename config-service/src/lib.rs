//! # Config Service for Mise Scales
//!
//! This service provides:
//! - A device directory mapping `model/serial` identities to configuration
//!   records through one level of indirection
//! - Atomic creation of devices with collision-free serials
//! - Atomic address and configuration updates
//! - A REST API with bearer token authentication
//!
//! ## Layers
//!
//! - [`store`]: transactional document store interface and the in-memory
//!   implementation
//! - [`directory`]: resolver, mutation and creation transactions
//! - [`retry`]: bounded retry of conflicted transactions
//! - [`api`]: HTTP routes

pub mod api;
pub mod directory;
pub mod retry;
pub mod store;

use std::sync::Arc;

use shared::config::ServiceConfig;

use crate::directory::DeviceDirectory;
use crate::retry::RetryPolicy;
use crate::store::DocumentStore;

/// Application state shared across handlers
pub struct AppState {
    /// Configuration
    pub config: ServiceConfig,
    /// Directory operations over the document store
    pub directory: DeviceDirectory,
    /// Retry policy for conflicted transactions
    pub retry: RetryPolicy,
}

impl AppState {
    pub fn new(config: ServiceConfig, store: Arc<dyn DocumentStore>) -> Self {
        let retry = RetryPolicy::from_config(&config.transaction);
        Self {
            config,
            directory: DeviceDirectory::new(store),
            retry,
        }
    }
}
