//! Tenant scope identifiers.

use crate::constants::MAX_LOCATION_ID_LEN;
use crate::error::{RegistryError, RegistryResult};
use std::fmt;
use std::str::FromStr;

/// Identifier of a location (practice, clinic, site) scoping every registry operation.
///
/// Location ids are used as directory names by the on-disk stores, so only a conservative
/// ASCII set is accepted: alphanumerics, `.`, `-` and `_`, at most 128 characters, and never
/// `.` or `..`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
#[serde(transparent)]
pub struct LocationId(String);

impl LocationId {
    /// Validates and wraps a location id.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Validation` if the id is empty, too long, or contains
    /// characters outside the permitted set.
    pub fn parse(input: &str) -> RegistryResult<Self> {
        if input.trim().is_empty() {
            return Err(RegistryError::validation(
                "location_id",
                "cannot be empty",
            ));
        }

        if input.len() > MAX_LOCATION_ID_LEN {
            return Err(RegistryError::validation(
                "location_id",
                format!("exceeds maximum length of {} characters", MAX_LOCATION_ID_LEN),
            ));
        }

        if input == "." || input == ".." {
            return Err(RegistryError::validation(
                "location_id",
                "cannot be a relative path component",
            ));
        }

        let ok = input
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_'));
        if !ok {
            return Err(RegistryError::validation(
                "location_id",
                "contains invalid characters (only alphanumeric, '.', '-', '_' allowed)",
            ));
        }

        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LocationId {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocationId::parse(s)
    }
}

impl<'de> serde::Deserialize<'de> for LocationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        LocationId::parse(&s).map_err(serde::de::Error::custom)
    }
}
