//! # Duration Codec
//!
//! Configuration periods are held internally as an exact
//! [`std::time::Duration`]. Two encodings exist at the edges:
//!
//! - **store** form: plain floating-point seconds (`30.0`)
//! - **client** form: structured seconds + nanosecond remainder
//!   (`{"secs": 30, "nanos": 0}`)
//!
//! Both encodings are accepted on input ([`WireDuration`]); each output
//! audience has its own serializer so the structured form is never
//! written to the store.

use serde::{Deserialize, Serialize, Serializer};
use std::time::Duration;

use crate::error::{DirectoryError, DirectoryResult};

/// Nanoseconds per second, upper bound (exclusive) of the `nanos` part
pub const NANOS_PER_SEC: u32 = 1_000_000_000;

/// Longest accepted duration, in whole seconds
///
/// Below this bound the store form (an `f64`) keeps sub-microsecond
/// precision, so every accepted value reads back from the store.
pub const MAX_DURATION_SECS: u64 = 1_000_000_000;

/// Structured duration as sent to clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientDuration {
    /// Whole seconds
    #[serde(alias = "seconds")]
    pub secs: u64,
    /// Sub-second remainder in nanoseconds
    #[serde(alias = "subsecond_nanos")]
    pub nanos: u32,
}

impl From<Duration> for ClientDuration {
    fn from(duration: Duration) -> Self {
        Self {
            secs: duration.as_secs(),
            nanos: duration.subsec_nanos(),
        }
    }
}

/// Any duration encoding accepted on input
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WireDuration {
    /// `{"secs": .., "nanos": ..}`
    Structured(ClientDuration),
    /// Floating-point seconds
    Seconds(f64),
}

impl WireDuration {
    /// Normalize into the internal representation
    ///
    /// `field` names the configuration field for error reporting.
    pub fn into_duration(self, field: &str) -> DirectoryResult<Duration> {
        let invalid = |reason: String| DirectoryError::SchemaValidation {
            field: field.to_string(),
            reason,
        };

        let duration = match self {
            WireDuration::Structured(ClientDuration { secs, nanos }) => {
                if nanos >= NANOS_PER_SEC {
                    return Err(invalid(format!(
                        "nanos must be below {NANOS_PER_SEC}, got {nanos}"
                    )));
                }
                Duration::new(secs, nanos)
            }
            WireDuration::Seconds(seconds) => from_store_seconds(seconds).map_err(invalid)?,
        };

        if duration > Duration::from_secs(MAX_DURATION_SECS) {
            return Err(invalid(format!(
                "duration must not exceed {MAX_DURATION_SECS} seconds, got {}",
                duration.as_secs()
            )));
        }
        Ok(duration)
    }
}

// =============================================================================
// STORE FORM
// =============================================================================

/// Encode a duration as floating-point seconds
pub fn to_store_seconds(duration: Duration) -> f64 {
    duration.as_secs_f64()
}

/// Decode floating-point seconds, rejecting negative and non-finite values
pub fn from_store_seconds(seconds: f64) -> Result<Duration, String> {
    if !seconds.is_finite() {
        return Err(format!("duration must be finite, got {seconds}"));
    }
    if seconds < 0.0 {
        return Err(format!("duration must not be negative, got {seconds}"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| e.to_string())
}

/// `serialize_with` helper for the store form
pub fn serialize_seconds<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(to_store_seconds(*duration))
}

// =============================================================================
// CLIENT FORM
// =============================================================================

/// Encode a duration in the structured client form
pub fn to_client(duration: Duration) -> ClientDuration {
    ClientDuration::from(duration)
}

/// `serialize_with` helper for the client form
pub fn serialize_structured<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    to_client(*duration).serialize(serializer)
}
