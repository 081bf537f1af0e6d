use crate::permissions::Operation;
use crate::store::StoreError;
use docreg_files::FilesError;

/// Errors returned by registry lifecycle operations.
///
/// Validation and permission errors are raised before any store is touched.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("role '{role}' is not permitted to {operation} at location '{location}'")]
    PermissionDenied {
        location: String,
        role: String,
        operation: Operation,
    },

    #[error("document entry {entry_id} not found at location '{location}'")]
    NotFound { location: String, entry_id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("content storage failure: {0}")]
    ContentStorage(#[source] FilesError),

    #[error("metadata storage failure: {0}")]
    MetadataStorage(#[source] StoreError),

    #[error(
        "integrity check failed for entry {entry_id}: expected sha256 {expected} ({expected_size} bytes), found {actual} ({actual_size} bytes)"
    )]
    Integrity {
        entry_id: String,
        expected: String,
        actual: String,
        expected_size: u64,
        actual_size: u64,
    },
}

/// Coarse error classes for mapping to caller-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryErrorKind {
    Validation,
    PermissionDenied,
    NotFound,
    Conflict,
    StorageFailure,
    Integrity,
}

impl RegistryError {
    pub fn kind(&self) -> RegistryErrorKind {
        match self {
            RegistryError::Validation(_) => RegistryErrorKind::Validation,
            RegistryError::PermissionDenied { .. } => RegistryErrorKind::PermissionDenied,
            RegistryError::NotFound { .. } => RegistryErrorKind::NotFound,
            RegistryError::Conflict(_) => RegistryErrorKind::Conflict,
            RegistryError::ContentStorage(_) | RegistryError::MetadataStorage(_) => {
                RegistryErrorKind::StorageFailure
            }
            RegistryError::Integrity { .. } => RegistryErrorKind::Integrity,
        }
    }

    pub(crate) fn validation(field: &str, detail: impl std::fmt::Display) -> Self {
        RegistryError::Validation(format!("{}: {}", field, detail))
    }
}

pub type RegistryResult<T> = std::result::Result<T, RegistryError>;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read configuration file {}: {source}", .path.display())]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration file {}: {source}", .path.display())]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}
