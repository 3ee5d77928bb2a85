//! # Device Identity Codec
//!
//! A device is addressed externally by a path-like token
//! `"{model}/{serial}"`, e.g. `IchibuV1/67890-12345`. This module parses
//! such tokens into a [`DeviceIdentity`] and encodes them back.
//!
//! Serials are opaque strings. They are either derived from hardware
//! identifiers at creation time or were assigned by older tooling; the
//! codec only requires them to be non-empty and free of `/`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{DirectoryError, DirectoryResult};

/// Separator between the model and serial segments of an identity token
pub const TOKEN_SEPARATOR: char = '/';

// =============================================================================
// DEVICE MODEL
// =============================================================================

/// Closed set of hardware models known to the directory
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeviceModel {
    /// First generation Ichibu scale
    IchibuV1,
    /// Second generation Ichibu scale
    IchibuV2,
    /// Libra prototype
    LibraV0,
}

impl DeviceModel {
    /// Every known model, in declaration order
    pub const ALL: [DeviceModel; 3] = [
        DeviceModel::IchibuV1,
        DeviceModel::IchibuV2,
        DeviceModel::LibraV0,
    ];

    /// Tag used on the wire and in stored documents
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceModel::IchibuV1 => "IchibuV1",
            DeviceModel::IchibuV2 => "IchibuV2",
            DeviceModel::LibraV0 => "LibraV0",
        }
    }
}

impl FromStr for DeviceModel {
    type Err = DirectoryError;

    /// Model tags are matched exactly (they are case sensitive)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceModel::ALL
            .into_iter()
            .find(|model| model.as_str() == s)
            .ok_or_else(|| DirectoryError::UnknownModel(s.to_string()))
    }
}

impl fmt::Display for DeviceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// DEVICE IDENTITY
// =============================================================================

/// Identity of a single device: its model plus a serial unique within
/// the directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    /// Hardware model
    pub model: DeviceModel,

    /// Serial designator
    #[serde(rename = "serialNumber", alias = "serial_number", alias = "serial")]
    pub serial: String,
}

impl DeviceIdentity {
    /// Create an identity from already-validated parts
    pub fn new(model: DeviceModel, serial: impl Into<String>) -> Self {
        Self {
            model,
            serial: serial.into(),
        }
    }

    /// Parse an identity token such as `"/IchibuV1/67890-12345"`
    ///
    /// Leading and trailing separators are ignored. The remaining token
    /// must consist of exactly two non-empty segments, the first of
    /// which must name a known model.
    pub fn parse(token: &str) -> DirectoryResult<Self> {
        let trimmed = token.trim_matches(TOKEN_SEPARATOR);
        let segments: Vec<&str> = trimmed.split(TOKEN_SEPARATOR).collect();

        if segments.len() != 2 {
            return Err(DirectoryError::MalformedIdentity {
                token: token.to_string(),
                reason: format!("expected 2 segments, found {}", segments.len()),
            });
        }
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(DirectoryError::MalformedIdentity {
                token: token.to_string(),
                reason: "segments must not be empty".into(),
            });
        }

        let model = segments[0].parse::<DeviceModel>()?;
        Ok(Self::new(model, segments[1]))
    }

    /// Encode the identity as a token accepted by [`DeviceIdentity::parse`]
    pub fn to_token(&self) -> String {
        format!("{}{}{}", self.model, TOKEN_SEPARATOR, self.serial)
    }
}

impl FromStr for DeviceIdentity {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceIdentity::parse(s)
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_from_str() {
        assert_eq!("IchibuV1".parse::<DeviceModel>().unwrap(), DeviceModel::IchibuV1);
        assert_eq!("LibraV0".parse::<DeviceModel>().unwrap(), DeviceModel::LibraV0);
        assert_eq!(
            "ichibuv1".parse::<DeviceModel>(),
            Err(DirectoryError::UnknownModel("ichibuv1".into()))
        );
    }

    #[test]
    fn test_parse_path_token() {
        let identity = DeviceIdentity::parse("/IchibuV2/67890-12345").unwrap();
        assert_eq!(identity.model, DeviceModel::IchibuV2);
        assert_eq!(identity.serial, "67890-12345");

        let identity = DeviceIdentity::parse("LibraV0/abc/").unwrap();
        assert_eq!(identity, DeviceIdentity::new(DeviceModel::LibraV0, "abc"));
    }

    #[test]
    fn test_parse_rejects_wrong_segment_count() {
        for token in ["", "/", "IchibuV1", "/IchibuV1/1/2", "IchibuV1//2"] {
            let err = DeviceIdentity::parse(token).unwrap_err();
            assert!(
                matches!(err, DirectoryError::MalformedIdentity { .. }),
                "{token:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn test_segment_count_checked_before_model() {
        // Both rules are violated; the structural one wins
        let err = DeviceIdentity::parse("Toaster/1/2").unwrap_err();
        assert!(matches!(err, DirectoryError::MalformedIdentity { .. }));
    }

    #[test]
    fn test_parse_rejects_unknown_model() {
        let err = DeviceIdentity::parse("/Toaster/42").unwrap_err();
        assert_eq!(err, DirectoryError::UnknownModel("Toaster".into()));
    }

    #[test]
    fn test_serial_is_opaque() {
        // Non-numeric serials are accepted as-is
        let identity = DeviceIdentity::parse("/IchibuV1/test-serial-123").unwrap();
        assert_eq!(identity.serial, "test-serial-123");
    }

    #[test]
    fn test_token_roundtrip() {
        let serials = ["1", "67890-12345", "67890-12345-0", "nonexistent", "a.b_c~d"];
        for model in DeviceModel::ALL {
            for serial in serials {
                let identity = DeviceIdentity::new(model, serial);
                assert_eq!(DeviceIdentity::parse(&identity.to_token()).unwrap(), identity);
            }
        }
    }

    #[test]
    fn test_identity_wire_format() {
        let identity = DeviceIdentity::new(DeviceModel::IchibuV1, "67890-12345");
        let json = serde_json::to_value(&identity).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "model": "IchibuV1", "serialNumber": "67890-12345" })
        );

        let back: DeviceIdentity =
            serde_json::from_value(serde_json::json!({ "model": "IchibuV1", "serial_number": "7" }))
                .unwrap();
        assert_eq!(back.serial, "7");
    }
}
