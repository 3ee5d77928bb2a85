//! # Record Schemas for the Mise Device Directory
//!
//! Three records are involved in resolving a device:
//!
//! - [`DeviceIdentity`](crate::identity::DeviceIdentity): what the caller names
//! - [`DirectoryEntry`]: stored in `devices`, maps an identity to a
//!   configuration document and carries the device's address
//! - [`Configuration`]: stored in `config`, the scale's settings
//!
//! Wire field names are lowerCamel; snake_case spellings are accepted on
//! input as aliases. Only lowerCamel is ever emitted.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{CONFIG_COLLECTION, FIELD_ADDRESS};
use crate::duration::{serialize_seconds, serialize_structured, WireDuration};
use crate::error::{DirectoryError, DirectoryResult};
use crate::identity::{DeviceIdentity, DeviceModel};

/// Field map of a stored document
pub type DocumentFields = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// CONFIGURATION RECORD
// =============================================================================

/// Settings of a single scale
///
/// `Serialize` produces the client form (structured durations);
/// [`Configuration::to_store_fields`] produces the store form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawConfiguration")]
pub struct Configuration {
    /// Load cell gain
    pub gain: f64,

    /// Ingredient being weighed
    pub ingredient: String,

    /// Hardware id of the load cell
    pub load_cell_id: u32,

    /// Human-readable placement (e.g. "counter")
    pub location: String,

    /// Tare offset
    pub offset: f64,

    /// Hardware id of the Phidget bridge
    pub phidget_id: u32,

    /// Interval between heartbeats sent by the device
    #[serde(serialize_with = "serialize_structured")]
    pub heartbeat_period: Duration,

    /// Interval between Phidget samples
    #[serde(serialize_with = "serialize_structured")]
    pub phidget_sample_period: Duration,

    /// Noise ceiling for a stable reading
    pub max_noise: f64,

    /// Number of samples kept in the smoothing buffer
    pub buffer_length: u32,
}

/// Store form of a configuration: same names, durations as float seconds
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredConfiguration<'a> {
    gain: f64,
    ingredient: &'a str,
    load_cell_id: u32,
    location: &'a str,
    offset: f64,
    phidget_id: u32,
    #[serde(serialize_with = "serialize_seconds")]
    heartbeat_period: Duration,
    #[serde(serialize_with = "serialize_seconds")]
    phidget_sample_period: Duration,
    max_noise: f64,
    buffer_length: u32,
}

impl<'a> From<&'a Configuration> for StoredConfiguration<'a> {
    fn from(config: &'a Configuration) -> Self {
        Self {
            gain: config.gain,
            ingredient: &config.ingredient,
            load_cell_id: config.load_cell_id,
            location: &config.location,
            offset: config.offset,
            phidget_id: config.phidget_id,
            heartbeat_period: config.heartbeat_period,
            phidget_sample_period: config.phidget_sample_period,
            max_noise: config.max_noise,
            buffer_length: config.buffer_length,
        }
    }
}

/// Unvalidated configuration as it arrives on the wire or from the store
///
/// Every field is optional here so that a missing field can be reported
/// by name instead of as a generic parse failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConfiguration {
    pub gain: Option<f64>,
    pub ingredient: Option<String>,
    #[serde(alias = "load_cell_id")]
    pub load_cell_id: Option<u32>,
    pub location: Option<String>,
    pub offset: Option<f64>,
    #[serde(alias = "phidget_id")]
    pub phidget_id: Option<u32>,
    #[serde(alias = "heartbeat_period")]
    pub heartbeat_period: Option<WireDuration>,
    #[serde(alias = "phidget_sample_period")]
    pub phidget_sample_period: Option<WireDuration>,
    #[serde(alias = "max_noise")]
    pub max_noise: Option<f64>,
    #[serde(alias = "buffer_length")]
    pub buffer_length: Option<u32>,
}

fn required<T>(value: Option<T>, field: &str) -> DirectoryResult<T> {
    value.ok_or_else(|| DirectoryError::missing_field(field))
}

impl TryFrom<RawConfiguration> for Configuration {
    type Error = DirectoryError;

    fn try_from(raw: RawConfiguration) -> Result<Self, Self::Error> {
        Ok(Self {
            gain: required(raw.gain, "gain")?,
            ingredient: required(raw.ingredient, "ingredient")?,
            load_cell_id: required(raw.load_cell_id, "loadCellId")?,
            location: required(raw.location, "location")?,
            offset: required(raw.offset, "offset")?,
            phidget_id: required(raw.phidget_id, "phidgetId")?,
            heartbeat_period: required(raw.heartbeat_period, "heartbeatPeriod")?
                .into_duration("heartbeatPeriod")?,
            phidget_sample_period: required(raw.phidget_sample_period, "phidgetSamplePeriod")?
                .into_duration("phidgetSamplePeriod")?,
            max_noise: required(raw.max_noise, "maxNoise")?,
            buffer_length: required(raw.buffer_length, "bufferLength")?,
        })
    }
}

impl Configuration {
    /// Validate a JSON payload in either naming convention
    pub fn from_json(value: serde_json::Value) -> DirectoryResult<Self> {
        let raw: RawConfiguration =
            serde_json::from_value(value).map_err(|e| DirectoryError::SchemaValidation {
                field: "configuration".into(),
                reason: e.to_string(),
            })?;
        Configuration::try_from(raw)
    }

    /// Decode a stored configuration document
    pub fn from_store_fields(fields: &DocumentFields) -> DirectoryResult<Self> {
        Self::from_json(serde_json::Value::Object(fields.clone()))
    }

    /// Encode in the store form (durations as float seconds)
    pub fn to_store_fields(&self) -> DirectoryResult<DocumentFields> {
        into_fields(serde_json::to_value(StoredConfiguration::from(self))?)
    }

    /// Encode in the client form (durations as `{secs, nanos}`)
    pub fn to_client_json(&self) -> DirectoryResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }
}

fn into_fields(value: serde_json::Value) -> DirectoryResult<DocumentFields> {
    match value {
        serde_json::Value::Object(fields) => Ok(fields),
        other => Err(DirectoryError::SerializationError(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

// =============================================================================
// DIRECTORY ENTRY
// =============================================================================

/// Stored entry mapping a device identity to its configuration document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Hardware model
    pub model: DeviceModel,

    /// Serial, unique together with `model`
    #[serde(alias = "serial_number")]
    pub serial_number: String,

    /// Id of the configuration document (older entries hold a
    /// `config/<id>` path instead)
    #[serde(rename = "config")]
    pub config_ref: String,

    /// Network locator of the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl DirectoryEntry {
    /// Create a new entry without an address
    pub fn new(identity: &DeviceIdentity, config_ref: impl Into<String>) -> Self {
        Self {
            model: identity.model,
            serial_number: identity.serial.clone(),
            config_ref: config_ref.into(),
            address: None,
        }
    }

    /// Identity this entry is indexed under
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(self.model, self.serial_number.clone())
    }

    /// Bare configuration document id
    ///
    /// Accepts both the current form (`"<id>"`) and the legacy path form
    /// (`"config/<id>"` or `"/config/<id>"`).
    pub fn config_id(&self) -> &str {
        let trimmed = self.config_ref.trim_start_matches('/');
        trimmed
            .strip_prefix(CONFIG_COLLECTION)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(trimmed)
    }

    /// Decode a stored entry
    pub fn from_store_fields(fields: &DocumentFields) -> DirectoryResult<Self> {
        Ok(serde_json::from_value(serde_json::Value::Object(fields.clone()))?)
    }

    /// Encode for the store
    pub fn to_store_fields(&self) -> DirectoryResult<DocumentFields> {
        into_fields(serde_json::to_value(self)?)
    }

    /// Partial document used to change only the address
    pub fn address_patch(address: &str) -> DocumentFields {
        let mut fields = DocumentFields::new();
        fields.insert(FIELD_ADDRESS.into(), serde_json::Value::String(address.into()));
        fields
    }
}

// =============================================================================
// API REQUEST/RESPONSE TYPES
// =============================================================================

/// Body of an address update and of an address read
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AddressPayload {
    /// Network locator of the device
    pub address: String,
}

/// Acknowledgement returned by mutating endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human-readable confirmation
    pub message: String,
}

/// Error body returned by every endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure description
    pub error: String,
}
