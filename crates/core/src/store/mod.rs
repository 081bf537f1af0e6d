//! Metadata stores for document entries.
//!
//! Both backends keep a per-location in-memory index ([`index::LocationIndex`]) keyed by
//! entry id and by patient id. The file backend additionally persists every entry as a YAML
//! document and reloads the index when opened.
//!
//! Each location has its own lock, held only for the duration of a single store call. The
//! conditional operations (`supersede`, `deprecate`) check their precondition and apply their
//! mutation under that lock, which is what makes concurrent `update` calls on one head race
//! safely: exactly one sees the head, every other caller gets [`StoreError::Conflict`].

mod file;
mod index;
mod memory;

pub use file::{FileMetadataStore, YamlEntryFiles};
pub use index::{EntryPersistence, IndexedMetadataStore};
pub use memory::{MemoryMetadataStore, NoPersistence};

use crate::entry::{ContentRef, DocumentEntry, EntryId, TrailEvent};
use crate::location::LocationId;
use crate::query::{QueryFilter, QueryPage};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("entry not found: {0}")]
    NotFound(String),
    #[error("entry already exists: {0}")]
    AlreadyExists(String),
    #[error("{0}")]
    Conflict(String),
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialise entry: {0}")]
    Serialization(#[from] serde_yaml::Error),
    #[error("corrupt entry record at {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("write failed ({cause}) and rollback also failed ({rollback})")]
    RollbackFailed {
        cause: Box<StoreError>,
        rollback: Box<StoreError>,
    },
    #[error("metadata store lock poisoned")]
    Poisoned,
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Persistence and indexed lookup of document entries.
pub trait MetadataStore: Send + Sync + std::fmt::Debug {
    /// Adds a new entry. Fails with `AlreadyExists` if the id is taken.
    fn insert(&self, entry: DocumentEntry) -> StoreResult<()>;

    fn get(&self, location: &LocationId, entry_id: &EntryId)
        -> StoreResult<Option<DocumentEntry>>;

    /// Returns the page selected by `filter.skip` / `filter.limit`, plus the total match count.
    fn query(&self, location: &LocationId, filter: &QueryFilter) -> StoreResult<QueryPage>;

    /// Atomically inserts `successor` and deprecates `prior_id`, linking the two.
    ///
    /// Succeeds only if `prior_id` is still the head of its chain; otherwise returns
    /// `Conflict` and changes nothing. Returns the deprecated prior entry.
    fn supersede(
        &self,
        location: &LocationId,
        prior_id: &EntryId,
        successor: DocumentEntry,
        event: TrailEvent,
    ) -> StoreResult<DocumentEntry>;

    /// Marks an entry `Deprecated` in place and appends `event` to its trail.
    ///
    /// Already-deprecated entries are returned unchanged.
    fn deprecate(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        event: TrailEvent,
    ) -> StoreResult<DocumentEntry>;

    /// Removes an entry and returns it.
    fn remove(&self, location: &LocationId, entry_id: &EntryId) -> StoreResult<DocumentEntry>;

    /// True if any entry in `location` points at `content_ref`.
    fn references_content(&self, location: &LocationId, content_ref: &ContentRef)
        -> StoreResult<bool>;

    /// Every content reference used by entries in `location`.
    fn content_refs(&self, location: &LocationId) -> StoreResult<HashSet<ContentRef>>;
}
