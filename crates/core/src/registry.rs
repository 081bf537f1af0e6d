//! Registry service.
//!
//! [`RegistryService`] is the only entry point for document lifecycle operations. Every call
//! is authorised by the [`PermissionGate`] first, then validated, and only then allowed to
//! touch the content store and the metadata store.
//!
//! ## Ordering
//!
//! Content is always written before metadata and removed after it, so a metadata record never
//! points at bytes that do not exist. The reverse (bytes nobody references) can happen when a
//! later step fails; such orphans are removed by [`RegistryService::collect_garbage`].

use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::config::CoreConfig;
use crate::constants::MAX_QUERY_LIMIT;
use crate::entry::{
    ContentRef, DocumentEntry, DocumentMetadata, EntryId, MetadataPatch, TrailAction, TrailEvent,
};
use crate::error::{RegistryError, RegistryResult};
use crate::location::LocationId;
use crate::permissions::{Actor, ConfigPermissionGate, Operation, PermissionGate};
use crate::query::{QueryFilter, QueryPage};
use crate::store::{FileMetadataStore, MetadataStore, StoreError};
use crate::validation::{content_type_mismatch, validate_metadata};
use chrono::Utc;
use docreg_files::{detect_media_type, sha256_of, ContentStore, FilesError, FilesService};
use docreg_types::NonEmptyText;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::sync::{Arc, RwLock};

/// An entry together with its verified content bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedDocument {
    pub entry: DocumentEntry,
    pub bytes: Vec<u8>,
}

/// Orchestrates the permission gate, content store and metadata store.
#[derive(Debug)]
pub struct RegistryService {
    cfg: Arc<CoreConfig>,
    gate: Arc<dyn PermissionGate>,
    content: Arc<dyn ContentStore>,
    metadata: Arc<dyn MetadataStore>,
    audit: Arc<dyn AuditSink>,
    /// Held shared while content is written and its entry created, exclusively by garbage
    /// collection, so freshly written content is never mistaken for an orphan.
    gc_guard: RwLock<()>,
}

fn store_error(location: &LocationId, err: StoreError) -> RegistryError {
    match err {
        StoreError::NotFound(entry_id) => RegistryError::NotFound {
            location: location.to_string(),
            entry_id,
        },
        StoreError::Conflict(reason) => RegistryError::Conflict(reason),
        other => RegistryError::MetadataStorage(other),
    }
}

fn guard_poisoned<T>(_: T) -> RegistryError {
    RegistryError::MetadataStorage(StoreError::Poisoned)
}

impl RegistryService {
    pub fn new(
        cfg: Arc<CoreConfig>,
        gate: Arc<dyn PermissionGate>,
        content: Arc<dyn ContentStore>,
        metadata: Arc<dyn MetadataStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            cfg,
            gate,
            content,
            metadata,
            audit,
            gc_guard: RwLock::new(()),
        }
    }

    /// Opens the on-disk registry described by `cfg`.
    ///
    /// Content goes to `<data_dir>/content`, metadata to `<data_dir>/metadata`; both are
    /// created if missing. Permissions come from `cfg.locations()`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError::ContentStorage` or `RegistryError::MetadataStorage` if either
    /// directory cannot be created or the stored entries cannot be listed.
    pub fn open(cfg: Arc<CoreConfig>, audit: Arc<dyn AuditSink>) -> RegistryResult<Self> {
        let content_dir = cfg.content_dir();
        fs::create_dir_all(&content_dir)
            .map_err(|e| RegistryError::ContentStorage(FilesError::Io(e)))?;
        let content = FilesService::new(&content_dir).map_err(RegistryError::ContentStorage)?;
        let metadata =
            FileMetadataStore::open(cfg.metadata_dir()).map_err(RegistryError::MetadataStorage)?;
        let gate = ConfigPermissionGate::from_locations(cfg.locations());

        tracing::info!(
            data_dir = %cfg.data_dir().display(),
            locations = cfg.locations().len(),
            "opened document registry"
        );

        Ok(Self::new(
            cfg,
            Arc::new(gate),
            Arc::new(content),
            Arc::new(metadata),
            audit,
        ))
    }

    pub fn config(&self) -> &CoreConfig {
        &self.cfg
    }

    /// Registers a new document.
    ///
    /// # Arguments
    ///
    /// * `location` - Location the document belongs to.
    /// * `bytes` - Document content, stored verbatim.
    /// * `metadata` - Caller metadata; `patient_id` and `content_type` are required.
    /// * `actor` - Authenticated caller; its role must be allowed `register` at `location`.
    ///
    /// # Returns
    ///
    /// The new `Approved` entry, with checksum and size of the stored bytes.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied` if the gate does not allow the actor's role
    /// - `Validation` for missing or malformed metadata, and for a sniffed media type that
    ///   contradicts `content_type` when `reject_content_type_mismatch` is enabled
    /// - `ContentStorage` / `MetadataStorage` if either write fails
    ///
    /// # Safety & Rollback
    ///
    /// Content is written first. If the metadata insert then fails, the content is deleted
    /// best-effort; anything left behind is collected by [`collect_garbage`](Self::collect_garbage).
    pub fn register(
        &self,
        location: &LocationId,
        bytes: &[u8],
        metadata: DocumentMetadata,
        actor: &Actor,
    ) -> RegistryResult<DocumentEntry> {
        let result = self.register_inner(location, bytes, metadata, actor);
        let entry_id = result.as_ref().ok().map(|e| e.entry_id.clone());
        self.record(Operation::Register, None, location, entry_id, actor, &result);
        result
    }

    fn register_inner(
        &self,
        location: &LocationId,
        bytes: &[u8],
        metadata: DocumentMetadata,
        actor: &Actor,
    ) -> RegistryResult<DocumentEntry> {
        self.authorise(location, actor, Operation::Register)?;
        let validated = validate_metadata(metadata)?;
        self.check_detected_type(&validated.content_type, bytes)?;

        let _guard = self.gc_guard.read().map_err(guard_poisoned)?;
        let stored = self
            .content
            .put(location.as_str(), bytes)
            .map_err(RegistryError::ContentStorage)?;
        let content_ref = stored.content_ref.clone();
        let entry = validated.into_entry(location.clone(), stored, actor, None, Utc::now());

        if let Err(err) = self.metadata.insert(entry.clone()) {
            self.discard_content(location, &content_ref);
            return Err(store_error(location, err));
        }

        tracing::info!(
            location = %location,
            entry_id = %entry.entry_id,
            patient_id = %entry.patient_id,
            size = entry.content_size,
            "registered document"
        );
        Ok(entry)
    }

    /// Finds entries at `location` matching `filter`.
    ///
    /// Deprecated entries are excluded unless `filter.statuses` asks for them. A missing
    /// `limit` falls back to the configured default; any limit is capped at
    /// [`MAX_QUERY_LIMIT`]. No matches is an empty page, not an error.
    ///
    /// # Errors
    ///
    /// `PermissionDenied`, or `Validation` if `date_from` is after `date_to`.
    pub fn query(
        &self,
        location: &LocationId,
        filter: QueryFilter,
        actor: &Actor,
    ) -> RegistryResult<QueryPage> {
        let result = self.query_inner(location, filter, actor);
        self.record(Operation::Query, None, location, None, actor, &result);
        result
    }

    fn query_inner(
        &self,
        location: &LocationId,
        mut filter: QueryFilter,
        actor: &Actor,
    ) -> RegistryResult<QueryPage> {
        self.authorise(location, actor, Operation::Query)?;

        if let (Some(from), Some(to)) = (filter.date_from, filter.date_to) {
            if from > to {
                return Err(RegistryError::validation(
                    "date_from",
                    format!("{} is after date_to {}", from, to),
                ));
            }
        }

        let limit = filter
            .limit
            .unwrap_or(self.cfg.default_query_limit())
            .min(MAX_QUERY_LIMIT);
        filter.limit = Some(limit);

        let page = self
            .metadata
            .query(location, &filter)
            .map_err(|e| store_error(location, e))?;
        tracing::debug!(location = %location, total = page.total, returned = page.entries.len(), "query");
        Ok(page)
    }

    /// Returns an entry and its content, after verifying the stored checksum and size.
    ///
    /// Deprecated entries remain retrievable until they are deleted.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`
    /// - `NotFound` if no such entry exists at `location`
    /// - `Integrity` if the bytes no longer match the recorded checksum or size
    /// - `ContentStorage` if the bytes cannot be read
    pub fn retrieve(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        actor: &Actor,
    ) -> RegistryResult<RetrievedDocument> {
        let result = self.retrieve_inner(location, entry_id, actor);
        self.record(
            Operation::Retrieve,
            None,
            location,
            Some(entry_id.clone()),
            actor,
            &result,
        );
        result
    }

    fn retrieve_inner(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        actor: &Actor,
    ) -> RegistryResult<RetrievedDocument> {
        self.authorise(location, actor, Operation::Retrieve)?;
        let entry = self.lookup(location, entry_id)?;

        let bytes = self
            .content
            .get(location.as_str(), &entry.content_ref)
            .map_err(RegistryError::ContentStorage)?;

        let actual = sha256_of(&bytes);
        let actual_size = bytes.len() as u64;
        if actual != entry.content_hash || actual_size != entry.content_size {
            tracing::error!(
                location = %location,
                entry_id = %entry_id,
                content_ref = %entry.content_ref,
                "stored content failed integrity check"
            );
            return Err(RegistryError::Integrity {
                entry_id: entry_id.to_string(),
                expected: entry.content_hash.to_string(),
                actual: actual.to_string(),
                expected_size: entry.content_size,
                actual_size,
            });
        }

        Ok(RetrievedDocument { entry, bytes })
    }

    /// Replaces the head of a version chain with new content and metadata.
    ///
    /// Unset fields of `patch` are inherited from the prior head. The new entry gets
    /// `supersedes = entry_id`; the prior head becomes `Deprecated` with `superseded_by`
    /// pointing at the new entry. Both changes are applied together or not at all.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`
    /// - `NotFound` if no such entry exists at `location`
    /// - `Conflict` if `entry_id` is not the current head, including when a concurrent update
    ///   won the race
    /// - `Validation` for malformed merged metadata, or a `patient_id` different from the
    ///   prior head's
    /// - `ContentStorage` / `MetadataStorage` on I/O failure
    ///
    /// # Safety & Rollback
    ///
    /// If the metadata change fails, the new content is deleted best-effort. When the store
    /// reports that its own rollback failed the content is kept, since a metadata record may
    /// still reference it.
    pub fn update(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        bytes: &[u8],
        patch: MetadataPatch,
        actor: &Actor,
    ) -> RegistryResult<DocumentEntry> {
        let result = self.update_inner(location, entry_id, bytes, patch, actor);
        let recorded = match &result {
            Ok(entry) => entry.entry_id.clone(),
            Err(_) => entry_id.clone(),
        };
        self.record(
            Operation::Update,
            None,
            location,
            Some(recorded),
            actor,
            &result,
        );
        result
    }

    fn update_inner(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        bytes: &[u8],
        patch: MetadataPatch,
        actor: &Actor,
    ) -> RegistryResult<DocumentEntry> {
        self.authorise(location, actor, Operation::Update)?;
        let prior = self.lookup(location, entry_id)?;
        if !prior.is_head() {
            return Err(RegistryError::Conflict(not_head_message(&prior)));
        }

        if let Some(patient_id) = patch.patient_id.as_deref() {
            if patient_id.trim() != prior.patient_id.as_str() {
                return Err(RegistryError::validation(
                    "patient_id",
                    "cannot change between versions of a document",
                ));
            }
        }
        let validated = validate_metadata(patch.merged_over(&prior))?;
        self.check_detected_type(&validated.content_type, bytes)?;

        let _guard = self.gc_guard.read().map_err(guard_poisoned)?;
        let stored = self
            .content
            .put(location.as_str(), bytes)
            .map_err(RegistryError::ContentStorage)?;
        let content_ref = stored.content_ref.clone();

        let now = Utc::now();
        let successor = validated.into_entry(
            location.clone(),
            stored,
            actor,
            Some(prior.entry_id.clone()),
            now,
        );
        let event = TrailEvent {
            action: TrailAction::Superseded,
            actor: actor.identity.clone(),
            role: actor.role.clone(),
            at: now,
            reason: None,
            related_entry: Some(successor.entry_id.clone()),
        };

        match self
            .metadata
            .supersede(location, entry_id, successor.clone(), event)
        {
            Ok(_) => {
                tracing::info!(
                    location = %location,
                    prior = %entry_id,
                    entry_id = %successor.entry_id,
                    "superseded document"
                );
                Ok(successor)
            }
            Err(err @ StoreError::RollbackFailed { .. }) => {
                tracing::error!(
                    location = %location,
                    prior = %entry_id,
                    successor = %successor.entry_id,
                    error = %err,
                    "update left metadata in an inconsistent state"
                );
                Err(RegistryError::MetadataStorage(err))
            }
            Err(err) => {
                self.discard_content(location, &content_ref);
                Err(store_error(location, err))
            }
        }
    }

    /// Marks an entry `Deprecated` in place, recording `reason` in its audit trail.
    ///
    /// Deprecating an already-deprecated entry returns it unchanged.
    ///
    /// # Errors
    ///
    /// `PermissionDenied`, `NotFound`, or a storage failure.
    pub fn deprecate(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        actor: &Actor,
        reason: Option<&str>,
    ) -> RegistryResult<DocumentEntry> {
        let result = self.deprecate_inner(location, entry_id, actor, reason);
        self.record(
            Operation::Deprecate,
            None,
            location,
            Some(entry_id.clone()),
            actor,
            &result,
        );
        result
    }

    fn deprecate_inner(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        actor: &Actor,
        reason: Option<&str>,
    ) -> RegistryResult<DocumentEntry> {
        self.authorise(location, actor, Operation::Deprecate)?;
        let current = self.lookup(location, entry_id)?;
        if current.is_deprecated() {
            tracing::debug!(location = %location, entry_id = %entry_id, "entry already deprecated");
            return Ok(current);
        }

        let event = TrailEvent {
            action: TrailAction::Deprecated,
            actor: actor.identity.clone(),
            role: actor.role.clone(),
            at: Utc::now(),
            reason: reason
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_owned),
            related_entry: None,
        };
        let entry = self
            .metadata
            .deprecate(location, entry_id, event)
            .map_err(|e| store_error(location, e))?;

        tracing::info!(location = %location, entry_id = %entry_id, "deprecated document");
        Ok(entry)
    }

    /// Hard-deletes an entry and, if nothing else references it, its content.
    ///
    /// Without `force` only `Deprecated` entries may be deleted. Chain links on neighbouring
    /// versions are left as they are.
    ///
    /// # Errors
    ///
    /// - `PermissionDenied`
    /// - `NotFound` if no such entry exists at `location`
    /// - `Conflict` if the entry is `Approved` and `force` is false
    ///
    /// A failure to delete the content after the metadata is gone is logged, not returned;
    /// the bytes are then an orphan for [`collect_garbage`](Self::collect_garbage).
    pub fn delete(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        actor: &Actor,
        force: bool,
    ) -> RegistryResult<()> {
        let result = self.delete_inner(location, entry_id, actor, force);
        self.record(
            Operation::Delete,
            None,
            location,
            Some(entry_id.clone()),
            actor,
            &result,
        );
        result
    }

    fn delete_inner(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        actor: &Actor,
        force: bool,
    ) -> RegistryResult<()> {
        self.authorise(location, actor, Operation::Delete)?;
        let entry = self.lookup(location, entry_id)?;
        if !force && !entry.is_deprecated() {
            return Err(RegistryError::Conflict(format!(
                "entry {} is {}; deprecate first",
                entry_id, entry.availability_status
            )));
        }

        let removed = self
            .metadata
            .remove(location, entry_id)
            .map_err(|e| store_error(location, e))?;

        let still_referenced = self
            .metadata
            .references_content(location, &removed.content_ref)
            .map_err(|e| store_error(location, e))?;
        if !still_referenced {
            let content_ref = &removed.content_ref;
            let outcome = self
                .content
                .exists(location.as_str(), content_ref)
                .and_then(|present| {
                    if present {
                        self.content.delete(location.as_str(), content_ref)
                    } else {
                        tracing::debug!(location = %location, content_ref = %content_ref, "content already gone");
                        Ok(())
                    }
                });
            match outcome {
                Ok(()) | Err(FilesError::NotFound(_)) => {}
                Err(err) => tracing::warn!(
                    location = %location,
                    content_ref = %removed.content_ref,
                    error = %err,
                    "content left behind after delete"
                ),
            }
        }

        tracing::info!(location = %location, entry_id = %entry_id, force, "deleted document");
        Ok(())
    }

    /// Returns every version in the chain containing `entry_id`, oldest first.
    ///
    /// Links to versions that have since been deleted end the walk in that direction.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` (authorised as `query`) or `NotFound`.
    pub fn versions(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        actor: &Actor,
    ) -> RegistryResult<Vec<DocumentEntry>> {
        let result = self.versions_inner(location, entry_id, actor);
        self.record(
            Operation::Query,
            Some("versions"),
            location,
            Some(entry_id.clone()),
            actor,
            &result,
        );
        result
    }

    fn versions_inner(
        &self,
        location: &LocationId,
        entry_id: &EntryId,
        actor: &Actor,
    ) -> RegistryResult<Vec<DocumentEntry>> {
        self.authorise(location, actor, Operation::Query)?;
        let start = self.lookup(location, entry_id)?;

        let mut seen = HashSet::from([start.entry_id.clone()]);
        let mut chain = VecDeque::from([start.clone()]);

        let mut cursor = start.supersedes.clone();
        while let Some(id) = cursor.take() {
            if !seen.insert(id.clone()) {
                break;
            }
            if let Some(entry) = self.find(location, &id)? {
                cursor = entry.supersedes.clone();
                chain.push_front(entry);
            }
        }

        let mut cursor = start.superseded_by.clone();
        while let Some(id) = cursor.take() {
            if !seen.insert(id.clone()) {
                break;
            }
            if let Some(entry) = self.find(location, &id)? {
                cursor = entry.superseded_by.clone();
                chain.push_back(entry);
            }
        }

        Ok(chain.into())
    }

    /// Deletes content at `location` that no entry references, returning the removed refs.
    ///
    /// Such content is left behind when a register or update fails after its bytes were
    /// written. Authorised as `delete`.
    pub fn collect_garbage(
        &self,
        location: &LocationId,
        actor: &Actor,
    ) -> RegistryResult<Vec<ContentRef>> {
        let result = self.collect_garbage_inner(location, actor);
        self.record(
            Operation::Delete,
            Some("collect_garbage"),
            location,
            None,
            actor,
            &result,
        );
        result
    }

    fn collect_garbage_inner(
        &self,
        location: &LocationId,
        actor: &Actor,
    ) -> RegistryResult<Vec<ContentRef>> {
        self.authorise(location, actor, Operation::Delete)?;

        let _guard = self.gc_guard.write().map_err(guard_poisoned)?;
        let referenced = self
            .metadata
            .content_refs(location)
            .map_err(|e| store_error(location, e))?;
        let stored = self
            .content
            .list(location.as_str())
            .map_err(RegistryError::ContentStorage)?;

        let mut removed = Vec::new();
        for content_ref in stored {
            if referenced.contains(&content_ref) {
                continue;
            }
            match self.content.delete(location.as_str(), &content_ref) {
                Ok(()) => removed.push(content_ref),
                Err(FilesError::NotFound(_)) => {}
                Err(err) => return Err(RegistryError::ContentStorage(err)),
            }
        }

        tracing::info!(location = %location, removed = removed.len(), "collected unreferenced content");
        Ok(removed)
    }

    fn authorise(
        &self,
        location: &LocationId,
        actor: &Actor,
        operation: Operation,
    ) -> RegistryResult<()> {
        if self.gate.allow(location, &actor.role, operation) {
            return Ok(());
        }
        tracing::warn!(
            location = %location,
            role = %actor.role,
            actor = %actor.identity,
            operation = %operation,
            "permission denied"
        );
        Err(RegistryError::PermissionDenied {
            location: location.to_string(),
            role: actor.role.to_string(),
            operation,
        })
    }

    fn find(&self, location: &LocationId, entry_id: &EntryId) -> RegistryResult<Option<DocumentEntry>> {
        self.metadata
            .get(location, entry_id)
            .map_err(|e| store_error(location, e))
    }

    fn lookup(&self, location: &LocationId, entry_id: &EntryId) -> RegistryResult<DocumentEntry> {
        self.find(location, entry_id)?
            .ok_or_else(|| RegistryError::NotFound {
                location: location.to_string(),
                entry_id: entry_id.to_string(),
            })
    }

    fn check_detected_type(&self, declared: &NonEmptyText, bytes: &[u8]) -> RegistryResult<()> {
        let detected = detect_media_type(bytes);
        if !content_type_mismatch(declared, detected.as_ref()) {
            return Ok(());
        }
        let detected = detected.map(|d| d.to_string()).unwrap_or_default();
        if self.cfg.reject_content_type_mismatch() {
            return Err(RegistryError::validation(
                "content_type",
                format!("declared '{}' but content looks like '{}'", declared, detected),
            ));
        }
        tracing::warn!(declared = %declared, detected = %detected, "declared content type disagrees with content");
        Ok(())
    }

    fn discard_content(&self, location: &LocationId, content_ref: &ContentRef) {
        if let Err(err) = self.content.delete(location.as_str(), content_ref) {
            tracing::warn!(
                location = %location,
                content_ref = %content_ref,
                error = %err,
                "failed to discard content after error; left for garbage collection"
            );
        }
    }

    fn record<T>(
        &self,
        operation: Operation,
        action: Option<&'static str>,
        location: &LocationId,
        entry_id: Option<EntryId>,
        actor: &Actor,
        result: &RegistryResult<T>,
    ) {
        let event = AuditEvent {
            operation,
            action,
            location_id: location.clone(),
            entry_id,
            actor: actor.clone(),
            outcome: AuditOutcome::from_result(result),
            at: Utc::now(),
        };
        if let Err(err) = self.audit.record(&event) {
            tracing::warn!(operation = %operation, location = %location, error = %err, "failed to emit audit event");
        }
    }
}

fn not_head_message(entry: &DocumentEntry) -> String {
    match &entry.superseded_by {
        Some(next) => format!("entry {} has been superseded by {}", entry.entry_id, next),
        None => format!(
            "entry {} is {} and cannot be updated",
            entry.entry_id, entry.availability_status
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::coding::CodedValue;
    use crate::config::parse_locations;
    use crate::entry::AvailabilityStatus;
    use crate::error::RegistryErrorKind;
    use crate::store::{EntryPersistence, IndexedMetadataStore, MemoryMetadataStore, StoreResult};
    use docreg_files::MemoryContentStore;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::thread;
    use tempfile::TempDir;

    const LOCATIONS: &str = r#"
locations:
  - location_id: L1
    permissions:
      register: [doctor]
      query: [doctor, assistant]
      retrieve: [doctor, assistant]
      update: [doctor]
      deprecate: [doctor]
      delete: [doctor]
  - location_id: L2
    permissions:
      register: [doctor]
      query: [doctor]
      retrieve: [doctor]
      update: [doctor]
      deprecate: [doctor]
      delete: [doctor]
"#;

    const PNG_MAGIC: [u8; 12] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
    ];

    struct Fixture {
        registry: RegistryService,
        content: Arc<MemoryContentStore>,
        audit: Arc<MemoryAuditSink>,
    }

    fn config(data_dir: PathBuf) -> CoreConfig {
        let locations = parse_locations(LOCATIONS, Path::new("test")).unwrap();
        CoreConfig::new(data_dir, locations).unwrap()
    }

    fn fixture_with(cfg: CoreConfig, metadata: Arc<dyn MetadataStore>) -> Fixture {
        let content = Arc::new(MemoryContentStore::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let gate = ConfigPermissionGate::from_locations(cfg.locations());
        let registry = RegistryService::new(
            Arc::new(cfg),
            Arc::new(gate),
            content.clone(),
            metadata,
            audit.clone(),
        );
        Fixture {
            registry,
            content,
            audit,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            config(PathBuf::from("unused")),
            Arc::new(MemoryMetadataStore::new()),
        )
    }

    fn loc(id: &str) -> LocationId {
        LocationId::parse(id).unwrap()
    }

    fn doctor() -> Actor {
        Actor::new("doctor", "dr-weber").unwrap()
    }

    fn assistant() -> Actor {
        Actor::new("assistant", "mfa-schmidt").unwrap()
    }

    fn laborbefund() -> DocumentMetadata {
        DocumentMetadata {
            patient_id: Some("P1".into()),
            title: Some("Laborbefund".into()),
            content_type: Some("text/plain".into()),
            class_code: Some(CodedValue::new("LAB", "local", "Labor").unwrap()),
            ..Default::default()
        }
    }

    fn ids(page: &QueryPage) -> Vec<EntryId> {
        page.entries.iter().map(|e| e.entry_id.clone()).collect()
    }

    #[test]
    fn laborbefund_lifecycle() {
        let f = fixture();
        let l1 = loc("L1");

        let e1 = f
            .registry
            .register(&l1, b"Hb 14.2 g/dl", laborbefund(), &doctor())
            .unwrap();
        assert_eq!(e1.availability_status, AvailabilityStatus::Approved);

        let page = f
            .registry
            .query(&l1, QueryFilter::for_patient("P1"), &doctor())
            .unwrap();
        assert_eq!(ids(&page), vec![e1.entry_id.clone()]);

        let e2 = f
            .registry
            .update(&l1, &e1.entry_id, b"Hb 13.9 g/dl", MetadataPatch::default(), &doctor())
            .unwrap();
        let page = f
            .registry
            .query(&l1, QueryFilter::default(), &doctor())
            .unwrap();
        assert_eq!(ids(&page), vec![e2.entry_id.clone()]);
        assert_eq!(page.total, 1);

        f.registry.delete(&l1, &e1.entry_id, &doctor(), false).unwrap();

        let err = f
            .registry
            .delete(&l1, &e2.entry_id, &doctor(), false)
            .unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::Conflict);
    }

    #[test]
    fn retrieve_returns_identical_bytes() {
        let f = fixture();
        let bytes: Vec<u8> = (0..=255u8).rev().cycle().take(4096).collect();
        let metadata = DocumentMetadata {
            content_type: Some("application/octet-stream".into()),
            ..laborbefund()
        };

        let entry = f
            .registry
            .register(&loc("L1"), &bytes, metadata, &doctor())
            .unwrap();
        let retrieved = f
            .registry
            .retrieve(&loc("L1"), &entry.entry_id, &assistant())
            .unwrap();

        assert_eq!(retrieved.bytes, bytes);
        assert_eq!(retrieved.entry, entry);
        assert_eq!(entry.content_size, 4096);
    }

    #[test]
    fn update_links_both_versions_and_inherits_metadata() {
        let f = fixture();
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();

        let patch = MetadataPatch {
            comments: Some("Nachbefund".into()),
            ..Default::default()
        };
        let e2 = f
            .registry
            .update(&l1, &e1.entry_id, b"v2", patch, &doctor())
            .unwrap();
        let e1 = f.registry.retrieve(&l1, &e1.entry_id, &doctor()).unwrap().entry;

        assert_eq!(e1.availability_status, AvailabilityStatus::Deprecated);
        assert_eq!(e1.superseded_by.as_ref(), Some(&e2.entry_id));
        assert_eq!(e2.supersedes.as_ref(), Some(&e1.entry_id));
        assert_eq!(e2.title, e1.title);
        assert_eq!(e2.class_code, e1.class_code);
        assert_eq!(e2.comments.as_deref(), Some("Nachbefund"));
        assert_ne!(e2.content_ref, e1.content_ref);
        assert_eq!(
            e1.audit_trail.last().map(|t| t.action),
            Some(TrailAction::Superseded)
        );

        let old = f.registry.retrieve(&l1, &e1.entry_id, &doctor()).unwrap();
        assert_eq!(old.bytes, b"v1");
    }

    #[test]
    fn update_of_superseded_entry_is_conflict() {
        let f = fixture();
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();
        f.registry
            .update(&l1, &e1.entry_id, b"v2", MetadataPatch::default(), &doctor())
            .unwrap();

        let err = f
            .registry
            .update(&l1, &e1.entry_id, b"v3", MetadataPatch::default(), &doctor())
            .unwrap_err();

        assert_eq!(err.kind(), RegistryErrorKind::Conflict);
        assert_eq!(f.content.len(), 2);
    }

    #[test]
    fn update_cannot_move_document_to_another_patient() {
        let f = fixture();
        let e1 = f
            .registry
            .register(&loc("L1"), b"v1", laborbefund(), &doctor())
            .unwrap();

        let patch = MetadataPatch {
            patient_id: Some("P2".into()),
            ..Default::default()
        };
        let err = f
            .registry
            .update(&loc("L1"), &e1.entry_id, b"v2", patch, &doctor())
            .unwrap_err();

        assert_eq!(err.kind(), RegistryErrorKind::Validation);
        assert_eq!(f.content.len(), 1);
    }

    #[test]
    fn concurrent_updates_leave_exactly_one_head() {
        let f = fixture();
        let registry = Arc::new(f.registry);
        let l1 = loc("L1");
        let e1 = registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let l1 = l1.clone();
                let id = e1.entry_id.clone();
                thread::spawn(move || {
                    let bytes = format!("v2 from writer {}", i);
                    registry.update(&l1, &id, bytes.as_bytes(), MetadataPatch::default(), &doctor())
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.kind() == RegistryErrorKind::Conflict));

        let heads = registry
            .query(&l1, QueryFilter::for_patient("P1"), &doctor())
            .unwrap();
        assert_eq!(heads.total, 1);
        assert_eq!(f.content.len(), 2);
        assert_eq!(
            registry.versions(&l1, &e1.entry_id, &doctor()).unwrap().len(),
            2
        );
    }

    #[test]
    fn deprecate_twice_yields_same_state() {
        let f = fixture();
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();

        let first = f
            .registry
            .deprecate(&l1, &e1.entry_id, &doctor(), Some("Fehlbefund"))
            .unwrap();
        let second = f
            .registry
            .deprecate(&l1, &e1.entry_id, &doctor(), Some("again"))
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first.availability_status, AvailabilityStatus::Deprecated);
        let last = first.audit_trail.last().unwrap();
        assert_eq!(last.action, TrailAction::Deprecated);
        assert_eq!(last.reason.as_deref(), Some("Fehlbefund"));
        assert_eq!(last.actor.as_str(), "dr-weber");

        let page = f
            .registry
            .query(&l1, QueryFilter::default(), &doctor())
            .unwrap();
        assert_eq!(page.total, 0);
        let page = f
            .registry
            .query(&l1, QueryFilter::default().including_deprecated(), &doctor())
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[test]
    fn delete_requires_deprecation_unless_forced() {
        let f = fixture();
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();

        let err = f
            .registry
            .delete(&l1, &e1.entry_id, &doctor(), false)
            .unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::Conflict);
        assert!(f.registry.retrieve(&l1, &e1.entry_id, &doctor()).is_ok());

        f.registry.delete(&l1, &e1.entry_id, &doctor(), true).unwrap();

        let err = f
            .registry
            .retrieve(&l1, &e1.entry_id, &doctor())
            .unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::NotFound);
        assert!(f.content.is_empty());

        let err = f
            .registry
            .delete(&l1, &e1.entry_id, &doctor(), true)
            .unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::NotFound);
    }

    #[test]
    fn delete_succeeds_when_content_is_already_gone() {
        let f = fixture();
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();
        f.content.delete("L1", &e1.content_ref).unwrap();
        assert!(!f.content.exists("L1", &e1.content_ref).unwrap());

        f.registry.delete(&l1, &e1.entry_id, &doctor(), true).unwrap();

        let err = f
            .registry
            .retrieve(&l1, &e1.entry_id, &doctor())
            .unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::NotFound);
    }

    #[test]
    fn entries_are_invisible_from_other_locations() {
        let f = fixture();
        let e1 = f
            .registry
            .register(&loc("L1"), b"v1", laborbefund(), &doctor())
            .unwrap();

        let page = f
            .registry
            .query(
                &loc("L2"),
                QueryFilter::default().including_deprecated(),
                &doctor(),
            )
            .unwrap();
        assert!(page.entries.is_empty());

        for err in [
            f.registry
                .retrieve(&loc("L2"), &e1.entry_id, &doctor())
                .unwrap_err(),
            f.registry
                .deprecate(&loc("L2"), &e1.entry_id, &doctor(), None)
                .unwrap_err(),
            f.registry
                .delete(&loc("L2"), &e1.entry_id, &doctor(), true)
                .unwrap_err(),
        ] {
            assert_eq!(err.kind(), RegistryErrorKind::NotFound);
        }
    }

    #[test]
    fn denied_operations_change_nothing() {
        let f = fixture();
        let l1 = loc("L1");

        let err = f
            .registry
            .register(&l1, b"v1", laborbefund(), &assistant())
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::PermissionDenied {
                operation: Operation::Register,
                ..
            }
        ));
        assert!(f.content.is_empty());

        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();
        for err in [
            f.registry
                .deprecate(&l1, &e1.entry_id, &assistant(), None)
                .unwrap_err(),
            f.registry
                .delete(&l1, &e1.entry_id, &assistant(), true)
                .unwrap_err(),
            f.registry
                .update(&l1, &e1.entry_id, b"v2", MetadataPatch::default(), &assistant())
                .unwrap_err(),
            f.registry
                .register(&loc("L9"), b"v1", laborbefund(), &doctor())
                .unwrap_err(),
        ] {
            assert_eq!(err.kind(), RegistryErrorKind::PermissionDenied);
        }

        let current = f.registry.retrieve(&l1, &e1.entry_id, &doctor()).unwrap();
        assert_eq!(current.entry, e1);
        assert_eq!(f.content.len(), 1);
    }

    #[test]
    fn invalid_metadata_is_rejected_before_storing() {
        let f = fixture();
        let metadata = DocumentMetadata {
            patient_id: None,
            ..laborbefund()
        };

        let err = f
            .registry
            .register(&loc("L1"), b"v1", metadata, &doctor())
            .unwrap_err();

        assert_eq!(err.kind(), RegistryErrorKind::Validation);
        assert!(f.content.is_empty());
    }

    #[test]
    fn corrupted_content_is_an_integrity_error() {
        let f = fixture();
        let e1 = f
            .registry
            .register(&loc("L1"), b"Hb 14.2 g/dl", laborbefund(), &doctor())
            .unwrap();
        assert!(f
            .content
            .tamper("L1", &e1.content_ref, b"Hb 41.2 g/dl".to_vec()));

        let err = f
            .registry
            .retrieve(&loc("L1"), &e1.entry_id, &doctor())
            .unwrap_err();

        assert_eq!(err.kind(), RegistryErrorKind::Integrity);
        assert_ne!(err.kind(), RegistryErrorKind::StorageFailure);
    }

    #[test]
    fn failed_content_write_creates_no_entry() {
        let f = fixture();
        f.content.set_fail_writes(true);

        let err = f
            .registry
            .register(&loc("L1"), b"v1", laborbefund(), &doctor())
            .unwrap_err();

        assert_eq!(err.kind(), RegistryErrorKind::StorageFailure);
        let page = f
            .registry
            .query(&loc("L1"), QueryFilter::default().including_deprecated(), &doctor())
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[derive(Debug)]
    struct RejectingPersistence;

    impl EntryPersistence for RejectingPersistence {
        fn write(&self, _entry: &DocumentEntry) -> StoreResult<()> {
            Err(StoreError::Io {
                path: PathBuf::from("metadata"),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        }

        fn remove(&self, _location: &LocationId, _entry_id: &EntryId) -> StoreResult<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_metadata_write_discards_content() {
        let metadata = IndexedMetadataStore::with_indexes(RejectingPersistence, HashMap::new());
        let f = fixture_with(config(PathBuf::from("unused")), Arc::new(metadata));

        let err = f
            .registry
            .register(&loc("L1"), b"v1", laborbefund(), &doctor())
            .unwrap_err();

        assert_eq!(err.kind(), RegistryErrorKind::StorageFailure);
        assert!(f.content.is_empty());
    }

    /// Persistence that fails its n-th write, and every removal when `fail_removals` is set.
    #[derive(Debug, Default)]
    struct FlakyPersistence {
        writes: AtomicUsize,
        fail_on_write: usize,
        fail_removals: bool,
    }

    fn disk_error(what: &str) -> StoreError {
        StoreError::Io {
            path: PathBuf::from("metadata"),
            source: std::io::Error::new(std::io::ErrorKind::Other, what.to_owned()),
        }
    }

    impl EntryPersistence for FlakyPersistence {
        fn write(&self, _entry: &DocumentEntry) -> StoreResult<()> {
            let n = self.writes.fetch_add(1, AtomicOrdering::SeqCst) + 1;
            if n == self.fail_on_write {
                return Err(disk_error("disk full"));
            }
            Ok(())
        }

        fn remove(&self, _location: &LocationId, _entry_id: &EntryId) -> StoreResult<()> {
            if self.fail_removals {
                return Err(disk_error("read-only file system"));
            }
            Ok(())
        }
    }

    /// Registers one entry, then updates it against a store whose third write fails.
    fn update_with_failing_prior_write(fail_removals: bool) -> (Fixture, DocumentEntry, RegistryError) {
        let metadata = IndexedMetadataStore::with_indexes(
            FlakyPersistence {
                fail_on_write: 3,
                fail_removals,
                ..Default::default()
            },
            HashMap::new(),
        );
        let f = fixture_with(config(PathBuf::from("unused")), Arc::new(metadata));
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();

        let err = f
            .registry
            .update(&l1, &e1.entry_id, b"v2", MetadataPatch::default(), &doctor())
            .unwrap_err();
        (f, e1, err)
    }

    #[test]
    fn rolled_back_update_discards_new_content() {
        let (f, e1, err) = update_with_failing_prior_write(false);

        assert_eq!(err.kind(), RegistryErrorKind::StorageFailure);
        assert_eq!(f.content.len(), 1);
        let current = f.registry.retrieve(&loc("L1"), &e1.entry_id, &doctor()).unwrap();
        assert!(current.entry.is_head());
        assert_eq!(current.bytes, b"v1");
    }

    #[test]
    fn failed_rollback_keeps_new_content() {
        let (f, e1, err) = update_with_failing_prior_write(true);

        assert_eq!(err.kind(), RegistryErrorKind::StorageFailure);
        assert!(matches!(
            err,
            RegistryError::MetadataStorage(StoreError::RollbackFailed { .. })
        ));
        assert_eq!(f.content.len(), 2);
        let current = f.registry.retrieve(&loc("L1"), &e1.entry_id, &doctor()).unwrap();
        assert!(current.entry.is_head());
    }

    #[test]
    fn update_of_deprecated_entry_is_conflict() {
        let f = fixture();
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();
        f.registry
            .deprecate(&l1, &e1.entry_id, &doctor(), Some("entered in error"))
            .unwrap();

        let err = f
            .registry
            .update(&l1, &e1.entry_id, b"v2", MetadataPatch::default(), &doctor())
            .unwrap_err();

        assert_eq!(err.kind(), RegistryErrorKind::Conflict);
        assert!(err.to_string().contains("cannot be updated"));
        assert_eq!(f.content.len(), 1);
        let stored = f.registry.versions(&l1, &e1.entry_id, &doctor()).unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored[0].superseded_by.is_none());
    }

    #[test]
    fn garbage_collection_removes_only_orphans() {
        let f = fixture();
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();
        let orphan = f.content.put("L1", b"left behind").unwrap().content_ref;

        let err = f.registry.collect_garbage(&l1, &assistant()).unwrap_err();
        assert_eq!(err.kind(), RegistryErrorKind::PermissionDenied);

        let removed = f.registry.collect_garbage(&l1, &doctor()).unwrap();

        assert_eq!(removed, vec![orphan]);
        assert_eq!(f.content.len(), 1);
        assert!(f.registry.retrieve(&l1, &e1.entry_id, &doctor()).is_ok());
    }

    #[test]
    fn versions_walks_the_whole_chain() {
        let f = fixture();
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();
        let e2 = f
            .registry
            .update(&l1, &e1.entry_id, b"v2", MetadataPatch::default(), &doctor())
            .unwrap();
        let e3 = f
            .registry
            .update(&l1, &e2.entry_id, b"v3", MetadataPatch::default(), &doctor())
            .unwrap();

        let chain: Vec<_> = f
            .registry
            .versions(&l1, &e2.entry_id, &assistant())
            .unwrap()
            .into_iter()
            .map(|e| e.entry_id)
            .collect();
        assert_eq!(chain, vec![e1.entry_id.clone(), e2.entry_id, e3.entry_id.clone()]);

        f.registry.delete(&l1, &e1.entry_id, &doctor(), false).unwrap();
        let chain = f.registry.versions(&l1, &e3.entry_id, &doctor()).unwrap();
        assert_eq!(chain.len(), 2);
    }

    #[test]
    fn query_rejects_inverted_date_window() {
        let f = fixture();
        let now = Utc::now();
        let filter = QueryFilter {
            date_from: Some(now),
            date_to: Some(now - chrono::Duration::days(1)),
            ..Default::default()
        };

        let err = f.registry.query(&loc("L1"), filter, &doctor()).unwrap_err();

        assert_eq!(err.kind(), RegistryErrorKind::Validation);
    }

    #[test]
    fn query_limit_is_capped() {
        let f = fixture();
        for _ in 0..3 {
            f.registry
                .register(&loc("L1"), b"v", laborbefund(), &doctor())
                .unwrap();
        }

        let filter = QueryFilter {
            limit: Some(2),
            ..Default::default()
        };
        let page = f.registry.query(&loc("L1"), filter, &doctor()).unwrap();
        assert_eq!((page.entries.len(), page.total), (2, 3));

        let filter = QueryFilter {
            limit: Some(MAX_QUERY_LIMIT * 10),
            ..Default::default()
        };
        let page = f.registry.query(&loc("L1"), filter, &doctor()).unwrap();
        assert_eq!(page.entries.len(), 3);
    }

    #[test]
    fn sniffed_type_is_recorded_and_mismatch_only_warns_by_default() {
        let f = fixture();
        let metadata = DocumentMetadata {
            content_type: Some("application/pdf".into()),
            ..laborbefund()
        };

        let entry = f
            .registry
            .register(&loc("L1"), &PNG_MAGIC, metadata, &doctor())
            .unwrap();

        assert_eq!(entry.content_type.as_str(), "application/pdf");
        assert_eq!(
            entry.detected_media_type.as_ref().map(|t| t.as_str()),
            Some("image/png")
        );
    }

    #[test]
    fn mismatch_is_rejected_when_configured() {
        let cfg = config(PathBuf::from("unused")).with_reject_content_type_mismatch(true);
        let f = fixture_with(cfg, Arc::new(MemoryMetadataStore::new()));
        let metadata = DocumentMetadata {
            content_type: Some("application/pdf".into()),
            ..laborbefund()
        };

        let err = f
            .registry
            .register(&loc("L1"), &PNG_MAGIC, metadata, &doctor())
            .unwrap_err();

        assert_eq!(err.kind(), RegistryErrorKind::Validation);
        assert!(f.content.is_empty());
    }

    #[test]
    fn cda_documents_pass_strict_type_checking() {
        let cfg = config(PathBuf::from("unused")).with_reject_content_type_mismatch(true);
        let f = fixture_with(cfg, Arc::new(MemoryMetadataStore::new()));
        let cda = br#"<?xml version="1.0" encoding="UTF-8"?>
<ClinicalDocument xmlns="urn:hl7-org:v3"><title>Laborbefund</title></ClinicalDocument>"#;

        for declared in ["application/xml", "application/hl7-v3+xml", "text/xml"] {
            let metadata = DocumentMetadata {
                content_type: Some(declared.into()),
                ..laborbefund()
            };
            let entry = f
                .registry
                .register(&loc("L1"), cda, metadata, &doctor())
                .unwrap();
            assert_eq!(entry.content_type.as_str(), declared);
        }
        assert_eq!(f.content.len(), 3);
    }

    #[test]
    fn every_operation_is_audited_and_sink_failures_are_ignored() {
        let f = fixture();
        let l1 = loc("L1");
        let e1 = f
            .registry
            .register(&l1, b"v1", laborbefund(), &doctor())
            .unwrap();
        let _ = f.registry.delete(&l1, &e1.entry_id, &assistant(), true);

        let events = f.audit.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].operation, Operation::Register);
        assert_eq!(events[0].entry_id.as_ref(), Some(&e1.entry_id));
        assert_eq!(events[0].outcome, AuditOutcome::Success);
        assert_eq!(events[1].outcome, AuditOutcome::Denied);
        assert_eq!(events[1].actor, assistant());

        f.audit.set_failing(true);
        let e2 = f
            .registry
            .update(&l1, &e1.entry_id, b"v2", MetadataPatch::default(), &doctor());
        assert!(e2.is_ok());
        assert_eq!(f.audit.events().len(), 2);
    }

    #[test]
    fn open_persists_entries_and_content_on_disk() {
        let temp = TempDir::new().unwrap();
        let cfg = Arc::new(config(temp.path().to_path_buf()));
        let audit: Arc<dyn AuditSink> = Arc::new(MemoryAuditSink::new());

        let entry = {
            let registry = RegistryService::open(cfg.clone(), audit.clone()).unwrap();
            registry
                .register(&loc("L1"), b"Hb 14.2 g/dl", laborbefund(), &doctor())
                .unwrap()
        };

        let registry = RegistryService::open(cfg, audit).unwrap();
        let retrieved = registry
            .retrieve(&loc("L1"), &entry.entry_id, &doctor())
            .unwrap();

        assert_eq!(retrieved.bytes, b"Hb 14.2 g/dl");
        assert_eq!(retrieved.entry, entry);
        assert!(temp.path().join("content").join("L1").join("files").is_dir());
        assert!(temp.path().join("metadata").join("L1").join("entries").is_dir());
    }
}
