use super::index::{EntryPersistence, IndexedMetadataStore};
use super::StoreResult;
use crate::entry::{DocumentEntry, EntryId};
use crate::location::LocationId;
use std::collections::HashMap;

/// Persistence that keeps nothing beyond the in-memory index.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPersistence;

impl EntryPersistence for NoPersistence {
    fn write(&self, _entry: &DocumentEntry) -> StoreResult<()> {
        Ok(())
    }

    fn remove(&self, _location: &LocationId, _entry_id: &EntryId) -> StoreResult<()> {
        Ok(())
    }
}

/// Metadata store for tests and embedded use; contents are lost on drop.
pub type MemoryMetadataStore = IndexedMetadataStore<NoPersistence>;

impl IndexedMetadataStore<NoPersistence> {
    pub fn new() -> Self {
        Self::with_indexes(NoPersistence, HashMap::new())
    }
}

impl Default for IndexedMetadataStore<NoPersistence> {
    fn default() -> Self {
        Self::new()
    }
}
