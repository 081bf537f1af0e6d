//! YAML-on-disk metadata persistence.
//!
//! Each entry is one YAML file:
//!
//! ```text
//! <metadata_dir>/<location_id>/entries/<s1>/<s2>/<entry_id>.yaml
//! ```
//!
//! Files are replaced by writing a sibling temp file, syncing it and renaming it over the
//! target, so a reader (or a restart) sees either the old or the new record, never a torn one.

use super::index::{EntryPersistence, IndexedMetadataStore, LocationIndex};
use super::{StoreError, StoreResult};
use crate::constants::{ENTRIES_DIR_NAME, ENTRY_FILE_EXTENSION};
use crate::entry::{DocumentEntry, EntryId};
use crate::location::LocationId;
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const TEMP_FILE_PREFIX: &str = ".tmp-";

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes entries as YAML files below a root directory.
#[derive(Debug, Clone)]
pub struct YamlEntryFiles {
    root: PathBuf,
}

impl YamlEntryFiles {
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entries_dir(&self, location: &LocationId) -> PathBuf {
        self.root.join(location.as_str()).join(ENTRIES_DIR_NAME)
    }

    /// Path of the YAML record for an entry.
    pub fn entry_path(&self, location: &LocationId, entry_id: &EntryId) -> PathBuf {
        entry_id.sharded_file(&self.entries_dir(location), ENTRY_FILE_EXTENSION)
    }

    fn replace_file(target: &Path, contents: &[u8]) -> StoreResult<()> {
        let parent = target.parent().ok_or_else(|| StoreError::Corrupt {
            path: target.to_path_buf(),
            reason: "entry path has no parent directory".into(),
        })?;
        fs::create_dir_all(parent).map_err(io_error(parent))?;

        let file_name = target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("entry");
        let temp_path = parent.join(format!("{}{}", TEMP_FILE_PREFIX, file_name));

        let result = (|| {
            let mut temp = fs::File::create(&temp_path)?;
            temp.write_all(contents)?;
            temp.sync_all()?;
            drop(temp);
            fs::rename(&temp_path, target)
        })();

        if let Err(source) = result {
            let _ = fs::remove_file(&temp_path);
            return Err(StoreError::Io {
                path: target.to_path_buf(),
                source,
            });
        }

        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    /// Reads every entry file below the root into per-location indexes.
    ///
    /// Records that cannot be parsed, or whose contents disagree with their path, are logged
    /// and skipped so that one damaged file does not take the whole registry offline. A
    /// successor written by an interrupted supersede is removed, leaving its prior as head.
    fn load(&self) -> StoreResult<HashMap<LocationId, LocationIndex>> {
        let mut indexes = HashMap::new();

        for location_dir in fs::read_dir(&self.root).map_err(io_error(&self.root))?.flatten() {
            let path = location_dir.path();
            if !path.is_dir() {
                continue;
            }
            let Some(location) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| LocationId::parse(n).ok())
            else {
                tracing::warn!(path = %path.display(), "skipping directory that is not a location id");
                continue;
            };

            let mut loaded = HashMap::new();
            for file in entry_files(&self.entries_dir(&location)) {
                match read_entry(&file) {
                    Ok(entry) if entry.location_id != location => {
                        tracing::warn!(
                            path = %file.display(),
                            found = %entry.location_id,
                            "skipping entry filed under the wrong location"
                        );
                    }
                    Ok(entry) if self.entry_path(&location, &entry.entry_id) != file => {
                        tracing::warn!(
                            path = %file.display(),
                            entry_id = %entry.entry_id,
                            "skipping entry whose id does not match its file name"
                        );
                    }
                    Ok(entry) => {
                        loaded.insert(entry.entry_id.clone(), entry);
                    }
                    Err(err) => {
                        tracing::warn!(path = %file.display(), error = %err, "skipping unreadable entry");
                    }
                }
            }

            for orphan in unlinked_successors(&loaded) {
                loaded.remove(&orphan);
                tracing::warn!(
                    location = %location,
                    entry_id = %orphan,
                    "dropping successor whose prior entry was never superseded"
                );
                if let Err(err) = self.remove(&location, &orphan) {
                    tracing::warn!(
                        location = %location,
                        entry_id = %orphan,
                        error = %err,
                        "failed to remove unlinked successor"
                    );
                }
            }

            let mut index = LocationIndex::default();
            for entry in loaded.into_values() {
                index.put(entry);
            }
            indexes.insert(location, index);
        }

        Ok(indexes)
    }
}

/// Entries left behind by a supersede that never completed: they name a prior entry that is
/// still stored but does not point back at them. The prior remains the head of its chain.
fn unlinked_successors(loaded: &HashMap<EntryId, DocumentEntry>) -> Vec<EntryId> {
    loaded
        .values()
        .filter(|entry| {
            entry.supersedes.as_ref().is_some_and(|prior_id| {
                loaded
                    .get(prior_id)
                    .is_some_and(|prior| prior.superseded_by.as_ref() != Some(&entry.entry_id))
            })
        })
        .map(|entry| entry.entry_id.clone())
        .collect()
}

/// Entry files in the two shard levels below `entries_dir`. Temp files are ignored.
fn entry_files(entries_dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(s1_iter) = fs::read_dir(entries_dir) else {
        return files;
    };
    for s1 in s1_iter.flatten() {
        let Ok(s2_iter) = fs::read_dir(s1.path()) else {
            continue;
        };
        for s2 in s2_iter.flatten() {
            let Ok(leaf_iter) = fs::read_dir(s2.path()) else {
                continue;
            };
            for leaf in leaf_iter.flatten() {
                let path = leaf.path();
                let is_temp = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(TEMP_FILE_PREFIX));
                let is_entry = path
                    .extension()
                    .is_some_and(|ext| ext == ENTRY_FILE_EXTENSION);
                if path.is_file() && is_entry && !is_temp {
                    files.push(path);
                }
            }
        }
    }
    files
}

fn read_entry(path: &Path) -> StoreResult<DocumentEntry> {
    let yaml = fs::read_to_string(path).map_err(io_error(path))?;
    serde_yaml::from_str(&yaml).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

impl EntryPersistence for YamlEntryFiles {
    fn write(&self, entry: &DocumentEntry) -> StoreResult<()> {
        let yaml = serde_yaml::to_string(entry)?;
        let path = self.entry_path(&entry.location_id, &entry.entry_id);
        Self::replace_file(&path, yaml.as_bytes())
    }

    fn remove(&self, location: &LocationId, entry_id: &EntryId) -> StoreResult<()> {
        let path = self.entry_path(location, entry_id);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { path, source }),
        }
    }
}

/// Metadata store persisted as one YAML file per entry.
pub type FileMetadataStore = IndexedMetadataStore<YamlEntryFiles>;

impl IndexedMetadataStore<YamlEntryFiles> {
    /// Opens (creating if needed) the metadata directory and loads every stored entry.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if the directory cannot be created or listed.
    pub fn open(root: impl Into<PathBuf>) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(io_error(&root))?;

        let files = YamlEntryFiles { root };
        let indexes = files.load()?;
        let count: usize = indexes.values().map(|i| i.len()).sum();
        tracing::info!(
            root = %files.root.display(),
            locations = indexes.len(),
            entries = count,
            "opened metadata store"
        );

        Ok(Self::with_indexes(files, indexes))
    }
}
