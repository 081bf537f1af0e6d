//! Filesystem-backed content store.
//!
//! [`FilesService`] keeps document bytes under a single root directory, one subtree per
//! location:
//!
//! ```text
//! <root>/<location_id>/files/<s1>/<s2>/<content_ref>
//! ```
//!
//! # Durability
//!
//! Writes go to a temporary file in the destination directory, are flushed with `sync_all`,
//! and are then renamed into place. A reader therefore either sees no file or the complete
//! bytes, and a successful `put` survives a crash.
//!
//! # Implementation Notes
//!
//! - The service holds no state besides the canonicalised root
//! - Shard directories are created lazily on first write
//! - Content references are random canonical UUIDs, never derived from the bytes, so two
//!   entries never share stored content

use crate::constants::{MAX_ALLOCATION_ATTEMPTS, TEMP_FILE_PREFIX};
use crate::{
    validate_location_segment, ContentStore, FilesError, FilesResult, FILES_FOLDER_NAME,
};
use chrono::{DateTime, Utc};
use docreg_types::NonEmptyText;
use docreg_uuid::{Sha256Hash, UuidService};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Result of a successful `put`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct StoredContent {
    /// Opaque reference under which the bytes were stored
    pub content_ref: UuidService,

    /// SHA-256 digest of the stored bytes
    pub hash: Sha256Hash,

    /// Size of the content in bytes
    pub size_bytes: u64,

    /// Media type sniffed from the leading bytes, if recognised
    ///
    /// Best-effort only; callers must not treat it as authoritative.
    pub detected_media_type: Option<NonEmptyText>,

    /// UTC timestamp when the content was stored
    pub stored_at: DateTime<Utc>,
}

impl StoredContent {
    pub(crate) fn describe(content_ref: UuidService, bytes: &[u8]) -> Self {
        Self {
            content_ref,
            hash: sha256_of(bytes),
            size_bytes: bytes.len() as u64,
            detected_media_type: detect_media_type(bytes),
            stored_at: Utc::now(),
        }
    }
}

/// Computes the SHA-256 digest of `bytes`.
pub fn sha256_of(bytes: &[u8]) -> Sha256Hash {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let hash_array: [u8; 32] = hasher.finalize().into();
    Sha256Hash::from_bytes(&hash_array)
}

/// Sniffs the media type from magic bytes.
pub fn detect_media_type(bytes: &[u8]) -> Option<NonEmptyText> {
    infer::get(bytes).and_then(|kind| NonEmptyText::new(kind.mime_type()).ok())
}

/// Content store rooted in a local directory.
#[derive(Debug)]
pub struct FilesService {
    /// Canonicalised root directory containing one subtree per location
    root_directory: PathBuf,
}

impl FilesService {
    /// Creates a new `FilesService` rooted at `root_directory`.
    ///
    /// # Errors
    ///
    /// Returns `FilesError::InvalidRootDirectory` if the root does not exist, is not a
    /// directory, or cannot be canonicalised.
    pub fn new(root_directory: &Path) -> FilesResult<Self> {
        if !root_directory.exists() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Directory does not exist: {}",
                root_directory.display()
            )));
        }

        if !root_directory.is_dir() {
            return Err(FilesError::InvalidRootDirectory(format!(
                "Path is not a directory: {}",
                root_directory.display()
            )));
        }

        let root_directory = root_directory.canonicalize().map_err(|e| {
            FilesError::InvalidRootDirectory(format!(
                "Cannot canonicalize path {}: {}",
                root_directory.display(),
                e
            ))
        })?;

        Ok(Self { root_directory })
    }

    /// Returns the canonicalised root directory.
    #[must_use]
    pub fn root_directory(&self) -> &Path {
        &self.root_directory
    }

    /// Returns `<root>/<location>/files`.
    fn files_directory(&self, location: &str) -> FilesResult<PathBuf> {
        validate_location_segment(location)?;
        Ok(self.root_directory.join(location).join(FILES_FOLDER_NAME))
    }

    fn storage_path(&self, location: &str, content_ref: &UuidService) -> FilesResult<PathBuf> {
        Ok(content_ref.sharded_dir(&self.files_directory(location)?))
    }

    /// Writes `bytes` to `target` through a synced temporary file.
    ///
    /// Fails with `AlreadyExists` if `target` is already present.
    fn write_durably(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
        let parent = target
            .parent()
            .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "target has no parent"))?;
        fs::create_dir_all(parent)?;

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("content");
        let temp_path = parent.join(format!("{}{}", TEMP_FILE_PREFIX, file_name));

        let result = (|| {
            let mut temp = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&temp_path)?;
            temp.write_all(bytes)?;
            temp.sync_all()?;
            drop(temp);

            if target.exists() {
                return Err(std::io::Error::new(
                    ErrorKind::AlreadyExists,
                    format!("content already stored at {}", target.display()),
                ));
            }
            fs::rename(&temp_path, target)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
            return result;
        }

        // Persist the directory entry of the rename where the platform allows it.
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

impl ContentStore for FilesService {
    fn put(&self, location: &str, bytes: &[u8]) -> FilesResult<StoredContent> {
        let files_dir = self.files_directory(location)?;

        for _attempt in 0..MAX_ALLOCATION_ATTEMPTS {
            let content_ref = UuidService::new();
            let target = content_ref.sharded_dir(&files_dir);

            match Self::write_durably(&target, bytes) {
                Ok(()) => {
                    tracing::debug!(
                        location,
                        content_ref = %content_ref,
                        size = bytes.len(),
                        "stored content"
                    );
                    return Ok(StoredContent::describe(content_ref, bytes));
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => {
                    return Err(FilesError::Io(std::io::Error::new(
                        e.kind(),
                        format!("Failed to write content to {}: {}", target.display(), e),
                    )))
                }
            }
        }

        Err(FilesError::Io(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!(
                "failed to allocate a unique content reference after {} attempts",
                MAX_ALLOCATION_ATTEMPTS
            ),
        )))
    }

    fn get(&self, location: &str, content_ref: &UuidService) -> FilesResult<Vec<u8>> {
        let storage_path = self.storage_path(location, content_ref)?;

        fs::read(&storage_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FilesError::NotFound(content_ref.to_string()),
            _ => FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read content from {}: {}", storage_path.display(), e),
            )),
        })
    }

    fn delete(&self, location: &str, content_ref: &UuidService) -> FilesResult<()> {
        let storage_path = self.storage_path(location, content_ref)?;

        fs::remove_file(&storage_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => FilesError::NotFound(content_ref.to_string()),
            _ => FilesError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to delete content {}: {}", storage_path.display(), e),
            )),
        })?;
        tracing::debug!(location, content_ref = %content_ref, "deleted content");
        Ok(())
    }

    fn exists(&self, location: &str, content_ref: &UuidService) -> FilesResult<bool> {
        Ok(self.storage_path(location, content_ref)?.is_file())
    }

    fn list(&self, location: &str) -> FilesResult<Vec<UuidService>> {
        let files_dir = self.files_directory(location)?;
        let mut refs = Vec::new();

        let s1_iter = match fs::read_dir(&files_dir) {
            Ok(it) => it,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(refs),
            Err(e) => return Err(FilesError::Io(e)),
        };
        for s1 in s1_iter {
            let s1_path = s1?.path();
            if !s1_path.is_dir() {
                continue;
            }
            for s2 in fs::read_dir(&s1_path)? {
                let s2_path = s2?.path();
                if !s2_path.is_dir() {
                    continue;
                }
                for leaf in fs::read_dir(&s2_path)? {
                    let leaf = leaf?;
                    let name = leaf.file_name();
                    let Some(name) = name.to_str() else { continue };
                    if name.starts_with(TEMP_FILE_PREFIX) {
                        continue;
                    }
                    match UuidService::parse(name) {
                        Ok(content_ref) => refs.push(content_ref),
                        Err(_) => tracing::warn!(
                            path = %leaf.path().display(),
                            "ignoring unexpected file in content store"
                        ),
                    }
                }
            }
        }

        refs.sort();
        Ok(refs)
    }
}
