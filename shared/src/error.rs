//! # Error Types for the Mise Device Directory
//!
//! Every failure the directory layer can report, grouped by the stage
//! that raises it. The grouping drives how the HTTP boundary classifies
//! a failure (client error, not found, conflict, server defect).

use thiserror::Error;

/// Main error type for the device directory
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DirectoryError {
    // =========================================================================
    // IDENTITY ERRORS
    // =========================================================================

    /// Identity token does not split into exactly two non-empty segments
    #[error("Malformed device identity '{token}': {reason}")]
    MalformedIdentity { token: String, reason: String },

    /// Model segment is not one of the known device models
    #[error("Unknown device model: {0}")]
    UnknownModel(String),

    // =========================================================================
    // SCHEMA ERRORS
    // =========================================================================

    /// A configuration payload is missing a field or carries a bad value
    #[error("Invalid configuration field '{field}': {reason}")]
    SchemaValidation { field: String, reason: String },

    // =========================================================================
    // DIRECTORY ERRORS
    // =========================================================================

    /// No directory entry exists for the identity
    #[error("No device found with identity {0} in collection 'devices'")]
    NotFound(String),

    /// The directory entry exists but has never been given an address
    #[error("Device has no configured address: {0}")]
    AddressNotSet(String),

    /// Duplicate entries or a dangling configuration reference
    #[error("Directory integrity violation: {0}")]
    IntegrityViolation(String),

    // =========================================================================
    // STORE ERRORS
    // =========================================================================

    /// The transaction was aborted because a concurrent transaction
    /// committed first
    #[error("Transaction aborted by a concurrent write: {0}")]
    WriteConflict(String),

    /// The document store rejected or failed an operation
    #[error("Document store error: {0}")]
    StoreError(String),

    /// Failed to read/write persisted store data
    #[error("Storage I/O error: {0}")]
    StorageIOError(String),

    // =========================================================================
    // DEVICE CLIENT ERRORS
    // =========================================================================

    /// The config service could not be reached or refused the request
    #[error("Config service request failed: {0}")]
    ServiceError(String),

    /// The device already holds a registered identity
    #[error("Device is already registered as {0}")]
    AlreadyRegistered(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Missing required environment variable
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    // =========================================================================
    // GENERIC ERRORS
    // =========================================================================

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias using DirectoryError
pub type DirectoryResult<T> = Result<T, DirectoryError>;

// =============================================================================
// ERROR CONVERSIONS
// =============================================================================

impl From<serde_json::Error> for DirectoryError {
    fn from(err: serde_json::Error) -> Self {
        DirectoryError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for DirectoryError {
    fn from(err: std::io::Error) -> Self {
        DirectoryError::StorageIOError(err.to_string())
    }
}

// =============================================================================
// ERROR CATEGORIES (for logging and status mapping)
// =============================================================================

impl DirectoryError {
    /// Shorthand for a missing required configuration field
    pub fn missing_field(field: &str) -> Self {
        DirectoryError::SchemaValidation {
            field: field.to_string(),
            reason: "field is required".into(),
        }
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            DirectoryError::MalformedIdentity { .. }
            | DirectoryError::UnknownModel(_) => "identity",

            DirectoryError::SchemaValidation { .. } => "schema",

            DirectoryError::NotFound(_)
            | DirectoryError::AddressNotSet(_) => "not_found",

            DirectoryError::IntegrityViolation(_) => "integrity",

            DirectoryError::WriteConflict(_) => "conflict",

            DirectoryError::StoreError(_)
            | DirectoryError::StorageIOError(_) => "storage",

            DirectoryError::ServiceError(_) => "service",

            DirectoryError::AlreadyRegistered(_)
            | DirectoryError::ConfigurationError(_)
            | DirectoryError::MissingEnvVar(_) => "config",

            DirectoryError::InternalError(_)
            | DirectoryError::SerializationError(_) => "internal",
        }
    }

    /// Whether the failure was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(self.category(), "identity" | "schema")
    }

    /// Check if the error is retryable
    ///
    /// Only write conflicts qualify: re-running the whole transaction
    /// against a fresh snapshot can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DirectoryError::WriteConflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category() {
        let err = DirectoryError::UnknownModel("ToasterV9".into());
        assert_eq!(err.category(), "identity");

        let err = DirectoryError::missing_field("loadCellId");
        assert_eq!(err.category(), "schema");

        let err = DirectoryError::AddressNotSet("IchibuV1/1-2".into());
        assert_eq!(err.category(), "not_found");

        let err = DirectoryError::IntegrityViolation("duplicate".into());
        assert_eq!(err.category(), "integrity");
    }

    #[test]
    fn test_is_retryable() {
        let err = DirectoryError::WriteConflict("devices".into());
        assert!(err.is_retryable());

        let err = DirectoryError::IntegrityViolation("dangling".into());
        assert!(!err.is_retryable());

        let err = DirectoryError::NotFound("IchibuV1/x".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_missing_field_names_the_field() {
        let err = DirectoryError::missing_field("heartbeatPeriod");
        assert_eq!(
            err.to_string(),
            "Invalid configuration field 'heartbeatPeriod': field is required"
        );
        assert!(err.is_client_error());
    }
}
