//! In-process content store.
//!
//! Used by tests and embedded deployments that do not need persistence. It also exposes
//! fault-injection hooks so callers can exercise storage and integrity failure paths.

use crate::files::StoredContent;
use crate::{validate_location_segment, ContentStore, FilesError, FilesResult};
use docreg_uuid::UuidService;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

type ContentKey = (String, UuidService);

#[derive(Debug, Default)]
pub struct MemoryContentStore {
    blobs: RwLock<HashMap<ContentKey, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `put` fail with `FilesError::Unavailable`.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Replaces stored bytes in place, bypassing immutability.
    ///
    /// Only useful for simulating on-disk corruption.
    pub fn tamper(&self, location: &str, content_ref: &UuidService, bytes: Vec<u8>) -> bool {
        let Ok(mut blobs) = self.blobs.write() else {
            return false;
        };
        match blobs.get_mut(&(location.to_owned(), content_ref.clone())) {
            Some(existing) => {
                *existing = bytes;
                true
            }
            None => false,
        }
    }

    /// Number of blobs held across all locations.
    pub fn len(&self) -> usize {
        self.blobs.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> FilesError {
    FilesError::Unavailable("content lock poisoned".into())
}

impl ContentStore for MemoryContentStore {
    fn put(&self, location: &str, bytes: &[u8]) -> FilesResult<StoredContent> {
        validate_location_segment(location)?;
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(FilesError::Unavailable("writes disabled".into()));
        }

        let mut blobs = self.blobs.write().map_err(poisoned)?;
        let mut content_ref = UuidService::new();
        while blobs.contains_key(&(location.to_owned(), content_ref.clone())) {
            content_ref = UuidService::new();
        }
        blobs.insert((location.to_owned(), content_ref.clone()), bytes.to_vec());

        Ok(StoredContent::describe(content_ref, bytes))
    }

    fn get(&self, location: &str, content_ref: &UuidService) -> FilesResult<Vec<u8>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        blobs
            .get(&(location.to_owned(), content_ref.clone()))
            .cloned()
            .ok_or_else(|| FilesError::NotFound(content_ref.to_string()))
    }

    fn delete(&self, location: &str, content_ref: &UuidService) -> FilesResult<()> {
        let mut blobs = self.blobs.write().map_err(poisoned)?;
        blobs
            .remove(&(location.to_owned(), content_ref.clone()))
            .map(|_| ())
            .ok_or_else(|| FilesError::NotFound(content_ref.to_string()))
    }

    fn exists(&self, location: &str, content_ref: &UuidService) -> FilesResult<bool> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        Ok(blobs.contains_key(&(location.to_owned(), content_ref.clone())))
    }

    fn list(&self, location: &str) -> FilesResult<Vec<UuidService>> {
        let blobs = self.blobs.read().map_err(poisoned)?;
        let mut refs: Vec<UuidService> = blobs
            .keys()
            .filter(|(loc, _)| loc == location)
            .map(|(_, content_ref)| content_ref.clone())
            .collect();
        refs.sort();
        Ok(refs)
    }
}
