//! Document content storage.
//!
//! This crate holds the raw bytes of registered documents. It never interprets them and carries
//! no business logic: metadata, lifecycle and permissions live in `docreg-core`.
//!
//! ## Design Principles
//!
//! - Semantic metadata and binary bytes are deliberately separated
//! - Stored content is immutable (new content always gets a new reference)
//! - A successful [`ContentStore::put`] is durable and readable before it returns
//! - Content is scoped per location; no cross-location namespace exists
//!
//! ## Storage Layout
//!
//! ```text
//! <root>/
//! └── <location_id>/
//!     └── files/
//!         └── 55/
//!             └── 0e/
//!                 └── 550e8400e29b41d4a716446655440000
//! ```

mod constants;
mod files;
mod memory;

pub use constants::FILES_FOLDER_NAME;
pub use docreg_uuid::{Sha256Hash, UuidService};
pub use files::{detect_media_type, sha256_of, FilesService, StoredContent};
pub use memory::MemoryContentStore;

/// Errors that can occur during content operations
#[derive(Debug, thiserror::Error)]
pub enum FilesError {
    /// Root directory does not exist or is not a directory
    #[error("Invalid root directory: {0}")]
    InvalidRootDirectory(String),

    /// Path validation failed (unsafe location segment)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// No content is stored under the given reference
    #[error("Content not found: {0}")]
    NotFound(String),

    /// The store refused or could not complete the operation
    #[error("Content store unavailable: {0}")]
    Unavailable(String),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Identifier error from docreg-uuid
    #[error("UUID error: {0}")]
    Uuid(#[from] docreg_uuid::UuidError),
}

pub type FilesResult<T> = Result<T, FilesError>;

/// Storage for document bytes, addressed by an opaque content reference.
///
/// Implementations must make `put` durable before returning: a subsequent `get` with the
/// returned reference always sees the bytes.
pub trait ContentStore: Send + Sync + std::fmt::Debug {
    /// Stores `bytes` under a freshly allocated reference.
    fn put(&self, location: &str, bytes: &[u8]) -> FilesResult<StoredContent>;

    /// Reads the bytes stored under `content_ref`.
    fn get(&self, location: &str, content_ref: &UuidService) -> FilesResult<Vec<u8>>;

    /// Removes the bytes stored under `content_ref`.
    fn delete(&self, location: &str, content_ref: &UuidService) -> FilesResult<()>;

    /// Returns whether `content_ref` is present.
    fn exists(&self, location: &str, content_ref: &UuidService) -> FilesResult<bool>;

    /// Lists every reference stored for `location`.
    fn list(&self, location: &str) -> FilesResult<Vec<UuidService>>;
}

/// Rejects location segments that could escape the storage root.
pub(crate) fn validate_location_segment(location: &str) -> FilesResult<()> {
    let ok = !location.is_empty()
        && location != "."
        && location != ".."
        && location
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'z' | b'A'..=b'Z' | b'.' | b'-' | b'_'));
    if !ok {
        return Err(FilesError::InvalidPath(format!(
            "unsafe location segment: '{}'",
            location
        )));
    }
    Ok(())
}
