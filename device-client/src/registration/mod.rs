//! # Device Registration
//!
//! Handles registration of a scale with the config service:
//! 1. Send the scale's initial configuration for its model
//! 2. Receive the identity the service allocated
//! 3. Store the identity locally
//!
//! Afterwards the registrar works on the stored identity, so callers never
//! have to spell out `model/serial` themselves.

use std::sync::Arc;
use tracing::info;

use shared::{
    config::DeviceClientConfig, Configuration, DeviceIdentity, DeviceModel, DirectoryError,
    DirectoryResult,
};

use crate::service::ServiceClient;
use crate::storage::LocalStorage;

/// Registers this device and gives access to its configuration
pub struct DeviceRegistrar {
    /// Config service client
    client: ServiceClient,

    /// Local identity storage
    storage: LocalStorage,
}

impl DeviceRegistrar {
    /// Create a new DeviceRegistrar
    pub async fn new(config: &DeviceClientConfig) -> DirectoryResult<Self> {
        Ok(Self {
            client: ServiceClient::new(config)?,
            storage: LocalStorage::new(&config.storage).await?,
        })
    }

    /// Register this device with the config service
    ///
    /// Refuses to run twice; use [`DeviceRegistrar::re_register`] to
    /// replace an existing identity.
    pub async fn register(
        &mut self,
        model: DeviceModel,
        config: &Configuration,
    ) -> DirectoryResult<DeviceIdentity> {
        if let Some(existing) = self.storage.identity() {
            return Err(DirectoryError::AlreadyRegistered(existing.to_token()));
        }

        info!(
            model = %model,
            phidget_id = config.phidget_id,
            load_cell_id = config.load_cell_id,
            "Starting device registration"
        );

        let identity = self.client.create_device(model, config).await?;
        self.storage.store_identity(identity.clone()).await?;

        info!(identity = %identity, "Device registered successfully");
        Ok(identity)
    }

    /// Forget the stored identity and register again
    ///
    /// The old directory entry stays on the service.
    pub async fn re_register(
        &mut self,
        model: DeviceModel,
        config: &Configuration,
    ) -> DirectoryResult<DeviceIdentity> {
        self.storage.clear().await?;
        self.client.clear_cache();
        self.register(model, config).await
    }

    /// Check if device is already registered
    pub fn is_registered(&self) -> bool {
        self.storage.is_registered()
    }

    /// Identity stored by a previous registration
    pub fn identity(&self) -> Option<&DeviceIdentity> {
        self.storage.identity()
    }

    fn require_identity(&self) -> DirectoryResult<DeviceIdentity> {
        self.storage.identity().cloned().ok_or_else(|| {
            DirectoryError::ConfigurationError("device is not registered; run `register` first".into())
        })
    }

    /// Configuration of this device
    pub async fn configuration(&self, refresh: bool) -> DirectoryResult<Arc<Configuration>> {
        let identity = self.require_identity()?;
        if refresh {
            self.client.refresh_configuration(&identity).await
        } else {
            self.client.get_configuration(&identity).await
        }
    }

    /// Replace the configuration of this device
    pub async fn update_configuration(&self, config: &Configuration) -> DirectoryResult<String> {
        let identity = self.require_identity()?;
        self.client.put_configuration(&identity, config).await
    }

    /// Address recorded for this device
    pub async fn address(&self) -> DirectoryResult<String> {
        let identity = self.require_identity()?;
        self.client.get_address(&identity).await
    }

    /// Record a new address for this device
    pub async fn update_address(&self, address: &str) -> DirectoryResult<String> {
        let identity = self.require_identity()?;
        self.client.put_address(&identity, address).await
    }

    /// Underlying service client
    pub fn client(&self) -> &ServiceClient {
        &self.client
    }

    /// Underlying local storage
    pub fn storage(&self) -> &LocalStorage {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::{client_config, sample_config, spawn_service};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_register_persists_identity() {
        let (_, url) = spawn_service().await;
        let dir = tempdir().unwrap();
        let config = client_config(&url, dir.path());

        {
            let mut registrar = DeviceRegistrar::new(&config).await.unwrap();
            assert!(!registrar.is_registered());
            let identity = registrar
                .register(DeviceModel::IchibuV2, &sample_config())
                .await
                .unwrap();
            assert_eq!(identity.serial, "67890-12345");
        }

        let registrar = DeviceRegistrar::new(&config).await.unwrap();
        assert_eq!(
            registrar.identity().map(|i| i.to_token()),
            Some("IchibuV2/67890-12345".to_string())
        );
        assert_eq!(*registrar.configuration(true).await.unwrap(), sample_config());
    }

    #[tokio::test]
    async fn test_register_twice_is_refused() {
        let (store, url) = spawn_service().await;
        let dir = tempdir().unwrap();
        let mut registrar = DeviceRegistrar::new(&client_config(&url, dir.path()))
            .await
            .unwrap();

        registrar.register(DeviceModel::IchibuV1, &sample_config()).await.unwrap();
        let err = registrar
            .register(DeviceModel::IchibuV1, &sample_config())
            .await
            .unwrap_err();
        assert_eq!(err, DirectoryError::AlreadyRegistered("IchibuV1/67890-12345".into()));

        let identity = registrar
            .re_register(DeviceModel::IchibuV1, &sample_config())
            .await
            .unwrap();
        assert_eq!(identity.serial, "67890-12345-0");
        assert_eq!(store.documents("devices").len(), 2);
    }

    #[tokio::test]
    async fn test_operations_need_registration() {
        let (_, url) = spawn_service().await;
        let dir = tempdir().unwrap();
        let registrar = DeviceRegistrar::new(&client_config(&url, dir.path()))
            .await
            .unwrap();

        assert!(matches!(
            registrar.configuration(false).await,
            Err(DirectoryError::ConfigurationError(_))
        ));
        assert!(matches!(
            registrar.update_address("10.0.0.1").await,
            Err(DirectoryError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_address_through_registrar() {
        let (_, url) = spawn_service().await;
        let dir = tempdir().unwrap();
        let mut registrar = DeviceRegistrar::new(&client_config(&url, dir.path()))
            .await
            .unwrap();

        registrar.register(DeviceModel::LibraV0, &sample_config()).await.unwrap();
        registrar.update_address("10.0.0.7:5000").await.unwrap();
        assert_eq!(registrar.address().await.unwrap(), "10.0.0.7:5000");
    }
}
