//! # Config Service Client
//!
//! HTTP client for the config service REST API.
//!
//! ## Caching
//!
//! Configurations are cached per identity with a TTL. Reads go to the
//! cache first; [`ServiceClient::refresh_configuration`] bypasses it, and
//! a successful [`ServiceClient::put_configuration`] replaces the cached
//! value.

use moka::future::Cache;
use reqwest::{Response, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use shared::{
    config::DeviceClientConfig, AddressPayload, Configuration, DeviceIdentity, DeviceModel,
    DirectoryError, DirectoryResult, ErrorResponse, MessageResponse, ADDRESS_PATH_PREFIX,
};

/// Client for one config service
pub struct ServiceClient {
    /// Base URL without trailing slash
    base_url: String,

    /// Bearer token
    token: String,

    /// HTTP client
    http_client: reqwest::Client,

    /// Configurations by identity token
    cache: Option<Cache<String, Arc<Configuration>>>,
}

impl ServiceClient {
    /// Create a client from the device configuration
    ///
    /// Fails when no auth token is configured.
    pub fn new(config: &DeviceClientConfig) -> DirectoryResult<Self> {
        let token = config.token()?.to_string();

        let cache = config.cache.enabled.then(|| {
            Cache::builder()
                .max_capacity(config.cache.max_configurations)
                .time_to_live(Duration::from_secs(config.cache.configuration_ttl_secs))
                .build()
        });

        info!(url = %config.service_url, caching = cache.is_some(), "Initializing config service client");

        Ok(Self {
            base_url: config.service_url.trim_end_matches('/').to_string(),
            token,
            http_client: reqwest::Client::new(),
            cache,
        })
    }

    fn device_url(&self, identity: &DeviceIdentity) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            urlencoding::encode(identity.model.as_str()),
            urlencoding::encode(&identity.serial)
        )
    }

    fn address_url(&self, identity: &DeviceIdentity) -> String {
        format!(
            "{}{}/{}/{}",
            self.base_url,
            ADDRESS_PATH_PREFIX,
            urlencoding::encode(identity.model.as_str()),
            urlencoding::encode(&identity.serial)
        )
    }

    /// Register a new device and return the identity the service assigned
    pub async fn create_device(
        &self,
        model: DeviceModel,
        config: &Configuration,
    ) -> DirectoryResult<DeviceIdentity> {
        let url = format!("{}/{}", self.base_url, model);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.token)
            .json(config)
            .send()
            .await
            .map_err(transport_error)?;

        let identity: DeviceIdentity = decode(response).await?;
        info!(identity = %identity, "Device created");

        if let Some(cache) = &self.cache {
            cache.insert(identity.to_token(), Arc::new(config.clone())).await;
        }
        Ok(identity)
    }

    /// Configuration of `identity`, from the cache when possible
    pub async fn get_configuration(
        &self,
        identity: &DeviceIdentity,
    ) -> DirectoryResult<Arc<Configuration>> {
        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&identity.to_token()).await {
                debug!(identity = %identity, "Configuration served from cache");
                return Ok(cached);
            }
        }
        self.refresh_configuration(identity).await
    }

    /// Fetch the configuration of `identity` from the service
    pub async fn refresh_configuration(
        &self,
        identity: &DeviceIdentity,
    ) -> DirectoryResult<Arc<Configuration>> {
        let response = self
            .http_client
            .get(self.device_url(identity))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;

        let config = Arc::new(decode::<Configuration>(response).await?);
        debug!(identity = %identity, "Configuration fetched");

        if let Some(cache) = &self.cache {
            cache.insert(identity.to_token(), Arc::clone(&config)).await;
        }
        Ok(config)
    }

    /// Replace the configuration of `identity`
    pub async fn put_configuration(
        &self,
        identity: &DeviceIdentity,
        config: &Configuration,
    ) -> DirectoryResult<String> {
        let response = self
            .http_client
            .put(self.device_url(identity))
            .bearer_auth(&self.token)
            .json(config)
            .send()
            .await
            .map_err(transport_error)?;

        let ack: MessageResponse = decode(response).await?;

        if let Some(cache) = &self.cache {
            cache.insert(identity.to_token(), Arc::new(config.clone())).await;
        }
        Ok(ack.message)
    }

    /// Address recorded for `identity`
    pub async fn get_address(&self, identity: &DeviceIdentity) -> DirectoryResult<String> {
        let response = self
            .http_client
            .get(self.address_url(identity))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(transport_error)?;

        let payload: AddressPayload = decode(response).await?;
        Ok(payload.address)
    }

    /// Record a new address for `identity`
    pub async fn put_address(&self, identity: &DeviceIdentity, address: &str) -> DirectoryResult<String> {
        let response = self
            .http_client
            .put(self.address_url(identity))
            .bearer_auth(&self.token)
            .json(&AddressPayload {
                address: address.to_string(),
            })
            .send()
            .await
            .map_err(transport_error)?;

        let ack: MessageResponse = decode(response).await?;
        Ok(ack.message)
    }

    /// Drop every cached configuration
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
    }
}

fn transport_error(err: reqwest::Error) -> DirectoryError {
    DirectoryError::ServiceError(err.to_string())
}

/// Decode a success body, or turn an error response back into the
/// matching directory error
async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> DirectoryResult<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| DirectoryError::SerializationError(e.to_string()));
    }

    let message = match response.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };

    Err(match status {
        StatusCode::BAD_REQUEST => DirectoryError::SchemaValidation {
            field: "request".into(),
            reason: message,
        },
        StatusCode::NOT_FOUND => DirectoryError::NotFound(message),
        StatusCode::CONFLICT => DirectoryError::WriteConflict(message),
        _ => DirectoryError::ServiceError(format!("{status}: {message}")),
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use config_service::{api, store::MemoryStore, AppState};
    use serde_json::json;
    use shared::{
        config::{AuthConfig, CacheConfig, DeviceClientConfig, ServiceConfig},
        Configuration,
    };
    use std::path::Path;
    use std::sync::Arc;

    pub(crate) const TOKEN: &str = "device-test-token";

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

    /// Serve a fresh config service on an ephemeral port
    pub(crate) async fn spawn_service() -> (MemoryStore, String) {
        let store = MemoryStore::new();
        let config = ServiceConfig {
            auth: AuthConfig::with_token(TOKEN),
            ..Default::default()
        };
        let state = Arc::new(AppState::new(config, Arc::new(store.clone())));
        let app = api::create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (store, format!("http://{addr}"))
    }

    pub(crate) fn client_config(url: &str, data_path: &Path) -> DeviceClientConfig {
        let mut config = DeviceClientConfig {
            service_url: url.to_string(),
            auth_token: Some(TOKEN.into()),
            cache: CacheConfig::default(),
            ..Default::default()
        };
        config.storage.data_path = data_path.to_path_buf();
        config
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_token_required() {
        let config = DeviceClientConfig::default();
        assert!(matches!(
            ServiceClient::new(&config),
            Err(DirectoryError::MissingEnvVar(_))
        ));
    }

    #[test]
    fn test_urls_are_encoded() {
        let mut config = DeviceClientConfig::default();
        config.service_url = "http://scale-host:8080/".into();
        config.auth_token = Some("t".into());
        let client = ServiceClient::new(&config).unwrap();

        let identity = DeviceIdentity::new(DeviceModel::IchibuV1, "a b");
        assert_eq!(client.device_url(&identity), "http://scale-host:8080/IchibuV1/a%20b");
        assert_eq!(
            client.address_url(&identity),
            "http://scale-host:8080/address/IchibuV1/a%20b"
        );
    }

    #[tokio::test]
    async fn test_round_trip_against_service() {
        let (_, url) = spawn_service().await;
        let dir = tempdir().unwrap();
        let client = ServiceClient::new(&client_config(&url, dir.path())).unwrap();

        let identity = client
            .create_device(DeviceModel::IchibuV1, &sample_config())
            .await
            .unwrap();
        assert_eq!(identity.to_token(), "IchibuV1/67890-12345");

        let fetched = client.refresh_configuration(&identity).await.unwrap();
        assert_eq!(*fetched, sample_config());

        let mut changed = sample_config();
        changed.max_noise = 0.2;
        let message = client.put_configuration(&identity, &changed).await.unwrap();
        assert_eq!(message, "Config for IchibuV1/67890-12345 updated successfully.");
        assert_eq!(*client.refresh_configuration(&identity).await.unwrap(), changed);

        assert!(matches!(
            client.get_address(&identity).await,
            Err(DirectoryError::NotFound(_))
        ));
        client.put_address(&identity, "192.168.1.100").await.unwrap();
        assert_eq!(client.get_address(&identity).await.unwrap(), "192.168.1.100");
    }

    #[tokio::test]
    async fn test_cache_serves_until_refreshed() {
        let (store, url) = spawn_service().await;
        let dir = tempdir().unwrap();
        let client = ServiceClient::new(&client_config(&url, dir.path())).unwrap();

        let identity = client
            .create_device(DeviceModel::LibraV0, &sample_config())
            .await
            .unwrap();
        client.get_configuration(&identity).await.unwrap();

        // Change the record behind the client's back
        let mut changed = sample_config();
        changed.location = "pantry".into();
        let config_ref = store.documents("config")[0].reference.clone();
        store.seed_document(&config_ref, changed.to_store_fields().unwrap());

        assert_eq!(client.get_configuration(&identity).await.unwrap().location, "counter");
        assert_eq!(client.refresh_configuration(&identity).await.unwrap().location, "pantry");
        assert_eq!(client.get_configuration(&identity).await.unwrap().location, "pantry");
    }

    #[tokio::test]
    async fn test_errors_are_mapped_back() {
        let (_, url) = spawn_service().await;
        let dir = tempdir().unwrap();
        let client = ServiceClient::new(&client_config(&url, dir.path())).unwrap();

        let missing = DeviceIdentity::new(DeviceModel::IchibuV2, "nope");
        assert!(matches!(
            client.refresh_configuration(&missing).await,
            Err(DirectoryError::NotFound(_))
        ));

        let mut wrong = client_config(&url, dir.path());
        wrong.auth_token = Some("wrong".into());
        let unauthorized = ServiceClient::new(&wrong).unwrap();
        assert!(matches!(
            unauthorized.refresh_configuration(&missing).await,
            Err(DirectoryError::ServiceError(_))
        ));
    }
}
