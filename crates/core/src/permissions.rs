//! Permission gate.
//!
//! Every registry operation asks the gate before touching a store. The gate is a pure lookup
//! over per-location configuration: a role may perform an operation at a location only if
//! that location explicitly lists the role for the operation. Unknown locations, unlisted
//! operations and unlisted roles are all denied.

use crate::config::LocationConfig;
use crate::location::LocationId;
use docreg_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Lifecycle operations subject to authorisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Register,
    Query,
    Retrieve,
    Update,
    Deprecate,
    Delete,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::Register,
        Operation::Query,
        Operation::Retrieve,
        Operation::Update,
        Operation::Deprecate,
        Operation::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Query => "query",
            Operation::Retrieve => "retrieve",
            Operation::Update => "update",
            Operation::Deprecate => "deprecate",
            Operation::Delete => "delete",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A role name as supplied by the authentication collaborator, e.g. `doctor`.
///
/// Roles compare exactly (case-sensitive) after trimming.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(NonEmptyText);

impl Role {
    pub fn new(name: impl AsRef<str>) -> Result<Self, docreg_types::TextError> {
        NonEmptyText::new(name).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller of a registry operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub role: Role,
    pub identity: NonEmptyText,
}

impl Actor {
    pub fn new(
        role: impl AsRef<str>,
        identity: impl AsRef<str>,
    ) -> Result<Self, docreg_types::TextError> {
        Ok(Self {
            role: Role::new(role)?,
            identity: NonEmptyText::new(identity)?,
        })
    }
}

pub trait PermissionGate: Send + Sync + fmt::Debug {
    /// Returns true only if `role` is explicitly allowed `operation` at `location`.
    fn allow(&self, location: &LocationId, role: &Role, operation: Operation) -> bool;
}

/// Gate backed by the location permission table from configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigPermissionGate {
    locations: HashMap<LocationId, HashMap<Operation, HashSet<Role>>>,
}

impl ConfigPermissionGate {
    pub fn from_locations<'a>(locations: impl IntoIterator<Item = &'a LocationConfig>) -> Self {
        let locations = locations
            .into_iter()
            .map(|location| {
                let table = location
                    .permissions
                    .iter()
                    .map(|(operation, roles)| (*operation, roles.iter().cloned().collect()))
                    .collect();
                (location.location_id.clone(), table)
            })
            .collect();
        Self { locations }
    }
}

impl PermissionGate for ConfigPermissionGate {
    fn allow(&self, location: &LocationId, role: &Role, operation: Operation) -> bool {
        self.locations
            .get(location)
            .and_then(|table| table.get(&operation))
            .is_some_and(|roles| roles.contains(role))
    }
}
