//! # Device Directory
//!
//! Transactional operations binding a device identity to its
//! configuration record:
//!
//! - [`resolver`]: identity → directory entry → configuration
//! - [`mutation`]: address and configuration updates
//! - [`creation`]: new devices with collision-free serials
//!
//! [`DeviceDirectory`] runs each operation in its own store transaction.
//! It never retries: a [`DirectoryError::WriteConflict`] is returned to
//! the caller, which owns the retry policy.

pub mod creation;
pub mod mutation;
pub mod resolver;

use std::sync::Arc;
use tracing::{info, warn};

use shared::{Configuration, DeviceIdentity, DeviceModel, DirectoryError, DirectoryResult};

use crate::store::DocumentStore;

/// Entry point to the directory, one transaction per call
#[derive(Clone)]
pub struct DeviceDirectory {
    store: Arc<dyn DocumentStore>,
}

fn log_failure(operation: &str, err: &DirectoryError) {
    if err.is_retryable() {
        warn!(operation, error = %err, "Transaction conflicted");
    }
}

impl DeviceDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Configuration currently bound to `identity`
    pub async fn get_configuration(&self, identity: &DeviceIdentity) -> DirectoryResult<Configuration> {
        let mut tx = self.store.begin().await?;
        let (_, config) = resolver::resolve(tx.as_mut(), identity).await?;
        tx.commit().await?;
        Ok(config)
    }

    /// Replace the configuration bound to `identity`
    pub async fn put_configuration(
        &self,
        identity: &DeviceIdentity,
        config: &Configuration,
    ) -> DirectoryResult<()> {
        let mut tx = self.store.begin().await?;
        mutation::update_configuration(tx.as_mut(), identity, config).await?;
        tx.commit()
            .await
            .map_err(DirectoryError::from)
            .inspect_err(|e| log_failure("put_configuration", e))?;

        info!(identity = %identity, "Configuration updated");
        Ok(())
    }

    /// Address recorded for `identity`
    pub async fn get_address(&self, identity: &DeviceIdentity) -> DirectoryResult<String> {
        let mut tx = self.store.begin().await?;
        let address = mutation::read_address(tx.as_mut(), identity).await?;
        tx.commit().await?;
        Ok(address)
    }

    /// Record a new address for `identity`
    pub async fn put_address(&self, identity: &DeviceIdentity, address: &str) -> DirectoryResult<()> {
        let mut tx = self.store.begin().await?;
        mutation::update_address(tx.as_mut(), identity, address).await?;
        tx.commit()
            .await
            .map_err(DirectoryError::from)
            .inspect_err(|e| log_failure("put_address", e))?;

        info!(identity = %identity, address = %address, "Address updated");
        Ok(())
    }

    /// Register a new device and return the identity it was given
    pub async fn create_device(
        &self,
        model: DeviceModel,
        config: &Configuration,
    ) -> DirectoryResult<DeviceIdentity> {
        let mut tx = self.store.begin().await?;
        let identity = creation::create(tx.as_mut(), model, config).await?;
        tx.commit()
            .await
            .map_err(DirectoryError::from)
            .inspect_err(|e| log_failure("create_device", e))?;

        info!(identity = %identity, "Device created");
        Ok(identity)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use serde_json::json;
    use shared::{
        Configuration, DeviceIdentity, DirectoryEntry, CONFIG_COLLECTION, DEVICE_COLLECTION,
    };

    use crate::store::{DocumentRef, MemoryStore};

    static NEXT_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

    pub(crate) fn sample_config() -> Configuration {
        Configuration::from_json(json!({
            "gain": 1.0,
            "ingredient": "coffee",
            "loadCellId": 12345,
            "location": "counter",
            "offset": 0.5,
            "phidgetId": 67890,
            "heartbeatPeriod": {"secs": 30, "nanos": 0},
            "phidgetSamplePeriod": {"secs": 1, "nanos": 0},
            "maxNoise": 0.01,
            "bufferLength": 10,
        }))
        .unwrap()
    }

    /// Write an entry and its configuration directly, skipping every check
    pub(crate) fn seed_device(
        store: &MemoryStore,
        identity: &DeviceIdentity,
        config: &Configuration,
    ) -> (DocumentRef, DocumentRef) {
        let n = NEXT_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let config_ref = DocumentRef::new(CONFIG_COLLECTION, format!("seedcfg{n}"));
        let entry_ref = DocumentRef::new(DEVICE_COLLECTION, format!("seeddev{n}"));

        store.seed_document(&config_ref, config.to_store_fields().unwrap());
        store.seed_document(
            &entry_ref,
            DirectoryEntry::new(identity, config_ref.id.clone())
                .to_store_fields()
                .unwrap(),
        );
        (entry_ref, config_ref)
    }
}
