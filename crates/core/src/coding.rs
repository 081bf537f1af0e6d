//! Coded clinical metadata value types.
//!
//! Document metadata carries several coded attributes (class, type, format, facility type,
//! practice setting, confidentiality). Each is a `{code, coding_scheme, display_name}` triple
//! whose parts are all required once the attribute is present.

use crate::constants::MAX_CODE_COMPONENT_LEN;
use crate::error::{RegistryError, RegistryResult};
use docreg_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A well-formed coded value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodedValue {
    pub code: NonEmptyText,
    pub coding_scheme: NonEmptyText,
    pub display_name: NonEmptyText,
}

impl CodedValue {
    /// Builds a coded value, validating every component.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::Validation` naming the offending component when it is empty or
    /// longer than 256 characters.
    pub fn new(
        code: impl AsRef<str>,
        coding_scheme: impl AsRef<str>,
        display_name: impl AsRef<str>,
    ) -> RegistryResult<Self> {
        Ok(Self {
            code: component("code", code)?,
            coding_scheme: component("coding_scheme", coding_scheme)?,
            display_name: component("display_name", display_name)?,
        })
    }

    /// Re-checks the length bounds of a value obtained through deserialisation.
    pub(crate) fn check_bounds(&self, field: &str) -> RegistryResult<()> {
        for (part, value) in [
            ("code", &self.code),
            ("coding_scheme", &self.coding_scheme),
            ("display_name", &self.display_name),
        ] {
            if value.as_str().chars().count() > MAX_CODE_COMPONENT_LEN {
                return Err(RegistryError::validation(
                    &format!("{}.{}", field, part),
                    format!("exceeds maximum length of {} characters", MAX_CODE_COMPONENT_LEN),
                ));
            }
        }
        Ok(())
    }
}

fn component(part: &str, value: impl AsRef<str>) -> RegistryResult<NonEmptyText> {
    NonEmptyText::bounded(value, MAX_CODE_COMPONENT_LEN)
        .map_err(|e| RegistryError::validation(part, e))
}

impl fmt::Display for CodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}^{}^{}",
            self.code, self.display_name, self.coding_scheme
        )
    }
}

/// Author of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub name: NonEmptyText,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<NonEmptyText>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<NonEmptyText>,
}

/// Whether a document originated inside the practice or was received from outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentSource {
    #[default]
    Internal,
    External,
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentSource::Internal => f.write_str("internal"),
            DocumentSource::External => f.write_str("external"),
        }
    }
}

impl std::str::FromStr for DocumentSource {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" => Ok(DocumentSource::Internal),
            "external" => Ok(DocumentSource::External),
            other => Err(RegistryError::validation(
                "source",
                format!("expected 'internal' or 'external', got '{}'", other),
            )),
        }
    }
}
