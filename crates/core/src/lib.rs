//! # Document Registry Core
//!
//! Core business logic for the per-location clinical document registry.
//!
//! This crate contains:
//! - The document entry model with coded clinical metadata
//! - The permission gate consulted by every lifecycle operation
//! - Metadata stores (in-memory and YAML-on-disk) with an indexed query engine
//! - The [`RegistryService`] orchestrating register, query, retrieve, update, deprecate and
//!   delete over a content store and a metadata store
//!
//! **No transport concerns**: HTTP routing, upload buffering and authentication belong to
//! the callers. The registry only authorises, via [`PermissionGate`].

pub mod audit;
pub mod coding;
pub mod config;
pub mod constants;
pub mod entry;
pub mod error;
pub mod location;
pub mod permissions;
pub mod query;
pub mod registry;
pub mod store;
pub mod validation;

pub use audit::{
    AuditError, AuditEvent, AuditOutcome, AuditSink, MemoryAuditSink, TracingAuditSink,
};
pub use coding::{Author, CodedValue, DocumentSource};
pub use config::{load_locations_file, CoreConfig, LocationConfig};
pub use entry::{
    AvailabilityStatus, ContentRef, DocumentEntry, DocumentMetadata, EntryId, MetadataPatch,
    TrailAction, TrailEvent,
};
pub use error::{ConfigError, RegistryError, RegistryErrorKind, RegistryResult};
pub use location::LocationId;
pub use permissions::{Actor, ConfigPermissionGate, Operation, PermissionGate, Role};
pub use query::{CodeMatch, QueryFilter, QueryPage};
pub use registry::{RegistryService, RetrievedDocument};
pub use store::{FileMetadataStore, MemoryMetadataStore, MetadataStore, StoreError};

pub use docreg_files::{ContentStore, FilesService, MemoryContentStore};
pub use docreg_types::NonEmptyText;
pub use docreg_uuid::{Sha256Hash, UuidService};
