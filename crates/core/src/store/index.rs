use super::{MetadataStore, StoreError, StoreResult};
use crate::constants::DEFAULT_QUERY_LIMIT;
use crate::entry::{AvailabilityStatus, ContentRef, DocumentEntry, EntryId, TrailEvent};
use crate::location::LocationId;
use crate::query::{paginate, QueryFilter, QueryPage};
use docreg_types::NonEmptyText;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

/// Durable side of an indexed store. Called with the location lock held.
pub trait EntryPersistence: Send + Sync + std::fmt::Debug {
    /// Creates or replaces the stored record for `entry`.
    fn write(&self, entry: &DocumentEntry) -> StoreResult<()>;

    /// Deletes the stored record for an entry.
    fn remove(&self, location: &LocationId, entry_id: &EntryId) -> StoreResult<()>;
}

/// Entries of one location, indexed by id and by patient.
#[derive(Debug, Default)]
pub(crate) struct LocationIndex {
    entries: HashMap<EntryId, DocumentEntry>,
    by_patient: HashMap<NonEmptyText, BTreeSet<EntryId>>,
}

impl LocationIndex {
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn contains(&self, entry_id: &EntryId) -> bool {
        self.entries.contains_key(entry_id)
    }

    fn get(&self, entry_id: &EntryId) -> Option<&DocumentEntry> {
        self.entries.get(entry_id)
    }

    /// Inserts or replaces an entry, keeping the patient index current.
    pub(crate) fn put(&mut self, entry: DocumentEntry) {
        if let Some(previous) = self.entries.get(&entry.entry_id) {
            if previous.patient_id != entry.patient_id {
                let patient = previous.patient_id.clone();
                self.unlink_patient(&patient, &entry.entry_id);
            }
        }
        self.by_patient
            .entry(entry.patient_id.clone())
            .or_default()
            .insert(entry.entry_id.clone());
        self.entries.insert(entry.entry_id.clone(), entry);
    }

    fn take(&mut self, entry_id: &EntryId) -> Option<DocumentEntry> {
        let entry = self.entries.remove(entry_id)?;
        let patient = entry.patient_id.clone();
        self.unlink_patient(&patient, entry_id);
        Some(entry)
    }

    fn unlink_patient(&mut self, patient: &NonEmptyText, entry_id: &EntryId) {
        if let Some(ids) = self.by_patient.get_mut(patient) {
            ids.remove(entry_id);
            if ids.is_empty() {
                self.by_patient.remove(patient);
            }
        }
    }

    fn matching(&self, filter: &QueryFilter) -> Vec<DocumentEntry> {
        match filter.patient_id() {
            Some(patient) => {
                let Ok(patient) = NonEmptyText::new(patient) else {
                    return Vec::new();
                };
                self.by_patient
                    .get(&patient)
                    .into_iter()
                    .flatten()
                    .filter_map(|id| self.entries.get(id))
                    .filter(|entry| filter.matches(entry))
                    .cloned()
                    .collect()
            }
            None => self
                .entries
                .values()
                .filter(|entry| filter.matches(entry))
                .cloned()
                .collect(),
        }
    }
}

/// A [`MetadataStore`] over per-location indexes, persisted through `P`.
#[derive(Debug)]
pub struct IndexedMetadataStore<P> {
    persistence: P,
    locations: RwLock<HashMap<LocationId, Arc<Mutex<LocationIndex>>>>,
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::Poisoned
}

fn not_found(entry_id: &EntryId) -> StoreError {
    StoreError::NotFound(entry_id.to_string())
}

impl<P: EntryPersistence> IndexedMetadataStore<P> {
    pub(crate) fn with_indexes(
        persistence: P,
        indexes: HashMap<LocationId, LocationIndex>,
    ) -> Self {
        let locations = indexes
            .into_iter()
            .map(|(location, index)| (location, Arc::new(Mutex::new(index))))
            .collect();
        Self {
            persistence,
            locations: RwLock::new(locations),
        }
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    fn existing(&self, location: &LocationId) -> StoreResult<Option<Arc<Mutex<LocationIndex>>>> {
        let locations = self.locations.read().map_err(poisoned)?;
        Ok(locations.get(location).cloned())
    }

    fn existing_or_create(&self, location: &LocationId) -> StoreResult<Arc<Mutex<LocationIndex>>> {
        if let Some(index) = self.existing(location)? {
            return Ok(index);
        }
        let mut locations = self.locations.write().map_err(poisoned)?;
        Ok(locations.entry(location.clone()).or_default().clone())
    }

    /// Runs `f` against the index of `location` with its lock held.
    fn with_location<T>(
        &self,
        location: &LocationId,
        missing: impl FnOnce() -> StoreResult<T>,
        f: impl FnOnce(&mut LocationIndex) -> StoreResult<T>,
    ) -> StoreResult<T> {
        match self.existing(location)? {
            Some(index) => {
                let mut index = index.lock().map_err(poisoned)?;
                f(&mut index)
            }
            None => missing(),
        }
    }
}

impl<P: EntryPersistence> MetadataStore for IndexedMetadataStore<P> {
    fn insert(&self, entry: DocumentEntry) -> StoreResult<()> {
        let index = self.existing_or_create(&entry.location_id)?;
        let mut index = index.lock().map_err(poisoned)?;

        if index.contains(&entry.entry_id) {
            return Err(StoreError::AlreadyExists(entry.entry_id.to_string()));
        }
        self.persistence.write(&entry)?;
        tracing::debug!(
            location = %entry.location_id,
            entry_id = %entry.entry_id,
            "inserted document entry"
        );
        index.put(entry);
        Ok(())
    }

    fn get(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
    ) -> StoreResult<Option<DocumentEntry>> {
        self.with_location(location, || Ok(None), |index| {
            Ok(index.get(entry_id).cloned())
        })
    }

    fn query(&self, location: &LocationId, filter: &QueryFilter) -> StoreResult<QueryPage> {
        let matches = self.with_location(location, || Ok(Vec::new()), |index| {
            Ok(index.matching(filter))
        })?;
        Ok(paginate(
            matches,
            filter.skip.unwrap_or(0),
            filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
        ))
    }

    fn supersede(
        &self,
        location: &LocationId,
        prior_id: &EntryId,
        successor: DocumentEntry,
        event: TrailEvent,
    ) -> StoreResult<DocumentEntry> {
        self.with_location(location, || Err(not_found(prior_id)), |index| {
            let prior = index.get(prior_id).ok_or_else(|| not_found(prior_id))?;

            if !prior.is_head() {
                return Err(StoreError::Conflict(format!(
                    "entry {} is no longer the head of its version chain",
                    prior_id
                )));
            }
            if successor.supersedes.as_ref() != Some(prior_id) || &successor.location_id != location
            {
                return Err(StoreError::Conflict(format!(
                    "successor {} does not reference {}",
                    successor.entry_id, prior_id
                )));
            }
            if index.contains(&successor.entry_id) {
                return Err(StoreError::AlreadyExists(successor.entry_id.to_string()));
            }

            let mut deprecated = prior.clone();
            deprecated.availability_status = AvailabilityStatus::Deprecated;
            deprecated.superseded_by = Some(successor.entry_id.clone());
            deprecated.updated_at = event.at;
            deprecated.audit_trail.push(event);

            self.persistence.write(&successor)?;
            if let Err(cause) = self.persistence.write(&deprecated) {
                tracing::warn!(
                    location = %location,
                    successor = %successor.entry_id,
                    error = %cause,
                    "supersede failed on prior entry; rolling back successor"
                );
                return match self.persistence.remove(location, &successor.entry_id) {
                    Ok(()) => Err(cause),
                    Err(rollback) => Err(StoreError::RollbackFailed {
                        cause: Box::new(cause),
                        rollback: Box::new(rollback),
                    }),
                };
            }

            index.put(successor);
            index.put(deprecated.clone());
            Ok(deprecated)
        })
    }

    fn deprecate(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        event: TrailEvent,
    ) -> StoreResult<DocumentEntry> {
        self.with_location(location, || Err(not_found(entry_id)), |index| {
            let current = index.get(entry_id).ok_or_else(|| not_found(entry_id))?;
            if current.is_deprecated() {
                return Ok(current.clone());
            }

            let mut deprecated = current.clone();
            deprecated.availability_status = AvailabilityStatus::Deprecated;
            deprecated.updated_at = event.at;
            deprecated.audit_trail.push(event);

            self.persistence.write(&deprecated)?;
            index.put(deprecated.clone());
            Ok(deprecated)
        })
    }

    fn remove(&self, location: &LocationId, entry_id: &EntryId) -> StoreResult<DocumentEntry> {
        self.with_location(location, || Err(not_found(entry_id)), |index| {
            if !index.contains(entry_id) {
                return Err(not_found(entry_id));
            }
            self.persistence.remove(location, entry_id)?;
            index.take(entry_id).ok_or_else(|| not_found(entry_id))
        })
    }

    fn references_content(
        &self,
        location: &LocationId,
        content_ref: &ContentRef,
    ) -> StoreResult<bool> {
        self.with_location(location, || Ok(false), |index| {
            Ok(index
                .entries
                .values()
                .any(|entry| &entry.content_ref == content_ref))
        })
    }

    fn content_refs(&self, location: &LocationId) -> StoreResult<HashSet<ContentRef>> {
        self.with_location(location, || Ok(HashSet::new()), |index| {
            Ok(index
                .entries
                .values()
                .map(|entry| entry.content_ref.clone())
                .collect())
        })
    }
}
