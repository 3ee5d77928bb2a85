//! # Constants for the Mise Device Directory
//!
//! Collection names, stored field names, defaults and environment
//! variable names shared by the service, the device client and the
//! benchmarks.

// =============================================================================
// DOCUMENT STORE LAYOUT
// =============================================================================

/// Collection holding directory entries (one per device)
pub const DEVICE_COLLECTION: &str = "devices";

/// Collection holding configuration records
pub const CONFIG_COLLECTION: &str = "config";

/// Directory entry field: device model tag
pub const FIELD_MODEL: &str = "model";

/// Directory entry field: device serial
pub const FIELD_SERIAL_NUMBER: &str = "serialNumber";

/// Directory entry field: reference to the configuration document
pub const FIELD_CONFIG: &str = "config";

/// Directory entry field: network address of the device
pub const FIELD_ADDRESS: &str = "address";

/// Length of generated document identifiers
pub const DOCUMENT_ID_LENGTH: usize = 20;

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Default number of attempts for a transaction aborted by a write conflict
pub const DEFAULT_TRANSACTION_ATTEMPTS: u32 = 5;

/// Default delay between conflicted attempts (milliseconds)
pub const DEFAULT_TRANSACTION_BACKOFF_MS: u64 = 10;

// =============================================================================
// API CONFIGURATION
// =============================================================================

/// Default config service port
pub const CONFIG_SERVICE_PORT: u16 = 8080;

/// Path prefix of the address routes
pub const ADDRESS_PATH_PREFIX: &str = "/address";

/// Maximum request body size (64 KB; configuration payloads are small)
pub const MAX_REQUEST_BODY_SIZE: usize = 64 * 1024;

// =============================================================================
// DEVICE CLIENT
// =============================================================================

/// Time-to-live for configurations cached by the device client (5 minutes)
pub const CACHE_TTL_CONFIGURATION_SECS: u64 = 5 * 60;

/// Maximum number of cached configurations on a client
pub const CACHE_MAX_CONFIGURATIONS: u64 = 64;

/// Default path for device-side storage
pub const DEFAULT_DEVICE_STORAGE_PATH: &str = "./device_storage";

/// Name of the file holding a device's registered identity
pub const IDENTITY_FILE_NAME: &str = "identity.json";

// =============================================================================
// ENVIRONMENT VARIABLE NAMES
// =============================================================================

/// Bearer token expected by the service (and sent by the client)
pub const ENV_AUTH_TOKEN: &str = "AUTH_TOKEN";

/// Host the service binds to
pub const ENV_HOST: &str = "MISE_HOST";

/// Port the service listens on (also honours the platform-provided `PORT`)
pub const ENV_PORT: &str = "MISE_PORT";

/// Fallback port variable set by container platforms
pub const ENV_PLATFORM_PORT: &str = "PORT";

/// Path of the persisted document store snapshot
pub const ENV_DATA_PATH: &str = "MISE_DATA_PATH";

/// Maximum attempts for conflicted transactions
pub const ENV_TRANSACTION_ATTEMPTS: &str = "MISE_TRANSACTION_ATTEMPTS";

/// Log level (trace, debug, info, warn, error)
pub const ENV_LOG_LEVEL: &str = "MISE_LOG";

/// Base URL of the config service, used by the device client
pub const ENV_SERVICE_URL: &str = "MISE_SERVICE_URL";

/// Device client storage directory
pub const ENV_DEVICE_STORAGE_PATH: &str = "MISE_DEVICE_STORAGE";
