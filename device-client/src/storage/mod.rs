//! # Local Storage for Device Client
//!
//! Keeps the identity the config service assigned to this scale in
//! `identity.json` under the configured data directory, so the device
//! can find its configuration again after a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use shared::{
    config::StorageConfig, constants::IDENTITY_FILE_NAME, DeviceIdentity, DirectoryResult,
};

/// Identity record as written to disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredIdentity {
    /// Identity assigned by the config service
    #[serde(flatten)]
    pub identity: DeviceIdentity,

    /// When the service assigned it
    pub registered_at: DateTime<Utc>,
}

impl RegisteredIdentity {
    pub fn new(identity: DeviceIdentity) -> Self {
        Self {
            identity,
            registered_at: Utc::now(),
        }
    }
}

/// File-backed storage for the device's registered identity
pub struct LocalStorage {
    /// Path to storage directory
    storage_path: PathBuf,

    /// Cached identity
    identity: Option<RegisteredIdentity>,
}

impl LocalStorage {
    /// Open the storage directory, creating it if needed
    pub async fn new(config: &StorageConfig) -> DirectoryResult<Self> {
        info!(path = ?config.data_path, "Initializing local storage");

        tokio::fs::create_dir_all(&config.data_path).await?;

        let mut storage = Self {
            storage_path: config.data_path.clone(),
            identity: None,
        };

        match storage.read_identity().await {
            Ok(identity) => storage.identity = identity,
            Err(e) => warn!(error = %e, "Ignoring unreadable identity file"),
        }

        Ok(storage)
    }

    fn identity_path(&self) -> PathBuf {
        self.storage_path.join(IDENTITY_FILE_NAME)
    }

    /// Directory holding the device's files
    pub fn path(&self) -> &Path {
        &self.storage_path
    }

    async fn read_identity(&self) -> DirectoryResult<Option<RegisteredIdentity>> {
        let path = self.identity_path();
        if !tokio::fs::try_exists(&path).await? {
            return Ok(None);
        }

        let json = tokio::fs::read_to_string(&path).await?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    /// Persist the identity assigned by the service
    pub async fn store_identity(&mut self, identity: DeviceIdentity) -> DirectoryResult<()> {
        let record = RegisteredIdentity::new(identity);
        let path = self.identity_path();

        let json = serde_json::to_string_pretty(&record)?;
        tokio::fs::write(&path, json).await?;

        debug!(path = ?path, identity = %record.identity, "Identity stored");
        self.identity = Some(record);
        Ok(())
    }

    /// Check if device is registered
    pub fn is_registered(&self) -> bool {
        self.identity.is_some()
    }

    /// Get the stored identity
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.identity.as_ref().map(|record| &record.identity)
    }

    /// Get the full stored record
    pub fn record(&self) -> Option<&RegisteredIdentity> {
        self.identity.as_ref()
    }

    /// Forget the stored identity
    pub async fn clear(&mut self) -> DirectoryResult<()> {
        let path = self.identity_path();
        if tokio::fs::try_exists(&path).await? {
            tokio::fs::remove_file(&path).await?;
        }

        self.identity = None;
        info!("Storage cleared");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::DeviceModel;
    use tempfile::tempdir;

    fn create_test_config(dir: &Path) -> StorageConfig {
        StorageConfig {
            data_path: dir.to_path_buf(),
        }
    }

    fn create_test_identity() -> DeviceIdentity {
        DeviceIdentity::new(DeviceModel::IchibuV1, "67890-12345")
    }

    #[tokio::test]
    async fn test_empty_storage() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::new(&create_test_config(dir.path())).await.unwrap();

        assert!(!storage.is_registered());
        assert!(storage.identity().is_none());
    }

    #[tokio::test]
    async fn test_persistence_across_instances() {
        let dir = tempdir().unwrap();
        let config = create_test_config(dir.path());

        {
            let mut storage = LocalStorage::new(&config).await.unwrap();
            storage.store_identity(create_test_identity()).await.unwrap();
        }

        let storage = LocalStorage::new(&config).await.unwrap();
        assert!(storage.is_registered());
        assert_eq!(storage.identity(), Some(&create_test_identity()));

        let json = std::fs::read_to_string(dir.path().join(IDENTITY_FILE_NAME)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["model"], "IchibuV1");
        assert_eq!(value["serialNumber"], "67890-12345");
        assert!(value.get("registered_at").is_some());
    }

    #[tokio::test]
    async fn test_clear_removes_identity_file() {
        let dir = tempdir().unwrap();
        let mut storage = LocalStorage::new(&create_test_config(dir.path())).await.unwrap();

        storage.store_identity(create_test_identity()).await.unwrap();
        storage.clear().await.unwrap();

        assert!(!storage.is_registered());
        assert!(!dir.path().join(IDENTITY_FILE_NAME).exists());
    }

    #[tokio::test]
    async fn test_corrupt_identity_file_is_ignored() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE_NAME), "{ not json").unwrap();

        let storage = LocalStorage::new(&create_test_config(dir.path())).await.unwrap();
        assert!(!storage.is_registered());
    }
}
