//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the registry. The
//! registry never reads environment variables or configuration files while serving an
//! operation.

use crate::constants::{
    CONTENT_DIR_NAME, DEFAULT_QUERY_LIMIT, MAX_QUERY_LIMIT, METADATA_DIR_NAME,
};
use crate::error::ConfigError;
use crate::location::LocationId;
use crate::permissions::{Operation, Role};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Permission table for one location, as supplied by location management.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationConfig {
    pub location_id: LocationId,
    #[serde(default)]
    pub permissions: HashMap<Operation, Vec<Role>>,
}

#[derive(Debug, Deserialize)]
struct LocationsFile {
    #[serde(default)]
    locations: Vec<LocationConfig>,
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    data_dir: PathBuf,
    locations: Vec<LocationConfig>,
    reject_content_type_mismatch: bool,
    default_query_limit: usize,
}

impl CoreConfig {
    /// Create a new `CoreConfig`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if a location id appears more than once.
    pub fn new(data_dir: PathBuf, locations: Vec<LocationConfig>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for location in &locations {
            if !seen.insert(location.location_id.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "location '{}' is configured more than once",
                    location.location_id
                )));
            }
        }

        Ok(Self {
            data_dir,
            locations,
            reject_content_type_mismatch: false,
            default_query_limit: DEFAULT_QUERY_LIMIT,
        })
    }

    /// Treat a sniffed media type that contradicts the declared content type as invalid.
    pub fn with_reject_content_type_mismatch(mut self, reject: bool) -> Self {
        self.reject_content_type_mismatch = reject;
        self
    }

    /// Page size applied when a query omits `limit`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` unless `1 <= limit <= MAX_QUERY_LIMIT`.
    pub fn with_default_query_limit(mut self, limit: usize) -> Result<Self, ConfigError> {
        if limit == 0 || limit > MAX_QUERY_LIMIT {
            return Err(ConfigError::Invalid(format!(
                "default query limit must be between 1 and {}",
                MAX_QUERY_LIMIT
            )));
        }
        self.default_query_limit = limit;
        Ok(self)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn content_dir(&self) -> PathBuf {
        self.data_dir.join(CONTENT_DIR_NAME)
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.data_dir.join(METADATA_DIR_NAME)
    }

    pub fn locations(&self) -> &[LocationConfig] {
        &self.locations
    }

    pub fn reject_content_type_mismatch(&self) -> bool {
        self.reject_content_type_mismatch
    }

    pub fn default_query_limit(&self) -> usize {
        self.default_query_limit
    }
}

/// Parse a permission table from YAML text.
///
/// ```yaml
/// locations:
///   - location_id: L1
///     permissions:
///       register: [doctor]
///       query: [doctor, assistant]
/// ```
pub fn parse_locations(yaml: &str, origin: &Path) -> Result<Vec<LocationConfig>, ConfigError> {
    let file: LocationsFile = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;
    Ok(file.locations)
}

/// Load the permission table from a YAML file.
pub fn load_locations_file(path: &Path) -> Result<Vec<LocationConfig>, ConfigError> {
    let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_locations(&yaml, path)
}
