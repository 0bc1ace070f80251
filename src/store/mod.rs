//! Store API for simplestore
//!
//! [`DataStore`] is one opened store: a root directory, the registry file
//! inside it, and one record file per ID. Each opened store is an
//! independently constructed instance owning its registry snapshot; there is
//! no process-wide state.
//!
//! Single-writer model: mutating operations take `&mut self`, so within a
//! process the borrow rules are the mutual-exclusion scope. Nothing
//! coordinates across processes.
//!
//! Crash ordering per operation:
//! - `add` writes the record file before registering the ID; a crash in
//!   between leaves an orphan file that reconciliation reclaims, never a
//!   registry entry without data.
//! - `write`/`append` write the new file before deleting the old; a crash
//!   leaves at worst two files for one ID, resolved by reconciliation.
//! - `delete` unregisters before deleting the file; a crash leaves an
//!   orphan that reconciliation reclaims rather than losing data.
//!
//! Reconciliation never runs implicitly; call [`DataStore::check_integrity`].

use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{StoreError, StoreResult};
use crate::observability::Logger;
use crate::recovery::{Reconciler, RepairReport};
use crate::registry::IdRegistry;
use crate::storage::{
    content_fingerprint, read_record, remove_record, scan_records, write_record, RecordName,
};

/// A content-addressed file store rooted at one directory.
///
/// IDs are caller-assigned and never generated. Content is an ordered
/// sequence of text lines; every read verifies the content against the
/// fingerprint embedded in the record's file name.
#[derive(Debug)]
pub struct DataStore {
    root: PathBuf,
    registry: IdRegistry,
}

impl DataStore {
    /// Opens the store at `root`, creating the directory and an empty
    /// registry file if they do not exist.
    ///
    /// # Errors
    ///
    /// `RegistryCorrupt` if the persisted registry is damaged; run
    /// [`Reconciler`] (or open elsewhere and call
    /// [`DataStore::check_integrity`]) to repair it first. `Io` on
    /// filesystem failure.
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)
            .map_err(|e| StoreError::Io(format!("create {}: {}", root.display(), e)))?;

        let registry = IdRegistry::open(&root)?;
        Logger::info(
            "STORE_OPENED",
            &[
                ("ids", &registry.len().to_string()),
                ("root", &root.display().to_string()),
            ],
        );

        Ok(Self { root, registry })
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fingerprint of `lines`, exactly as it would be embedded in a record
    /// file name.
    pub fn hash(lines: &[String]) -> String {
        content_fingerprint(lines)
    }

    /// Sorted snapshot of the currently registered IDs.
    pub fn list_ids(&self) -> Vec<u64> {
        self.registry.snapshot()
    }

    /// Adds a new record.
    ///
    /// Checks the persisted registry, not only the in-memory snapshot, so a
    /// deleted ID cannot resurrect through a stale cache. The record file is
    /// written before the ID is registered.
    ///
    /// # Errors
    ///
    /// `DuplicateId` if `id` is already registered.
    pub fn add(&mut self, id: u64, lines: &[String]) -> StoreResult<()> {
        let mut registry = IdRegistry::load(&self.root)?;
        if registry.contains(id) {
            return Err(StoreError::DuplicateId(id));
        }

        write_record(&self.root, id, lines)?;
        registry.add(id);
        registry.persist()?;
        self.registry = registry;
        Ok(())
    }

    /// Reads a record's content, validating its fingerprint.
    ///
    /// If a crash left several files for the ID, the smallest-fingerprint
    /// validating one is returned (the same file reconciliation would keep);
    /// cleanup stays with [`DataStore::check_integrity`].
    ///
    /// # Errors
    ///
    /// `IdNotFound` if `id` is unregistered or has no file; `CorruptRecord`
    /// if every file for `id` fails its fingerprint check.
    pub fn read(&self, id: u64) -> StoreResult<Vec<String>> {
        if !self.registry.contains(id) {
            return Err(StoreError::IdNotFound(id));
        }

        let candidates = self.record_names(id)?;
        if candidates.is_empty() {
            return Err(StoreError::IdNotFound(id));
        }

        let mut corruption: Option<StoreError> = None;
        for name in &candidates {
            match read_record(&self.root, name) {
                Ok(lines) => return Ok(lines),
                Err(err @ StoreError::CorruptRecord { .. }) => {
                    corruption.get_or_insert(err);
                }
                // vanished between scan and read
                Err(StoreError::IdNotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Err(corruption.unwrap_or(StoreError::IdNotFound(id)))
    }

    /// Replaces a record's content. Update-only; use [`DataStore::add`] to
    /// create.
    ///
    /// # Errors
    ///
    /// `IdNotFound` if `id` is not registered.
    pub fn write(&mut self, id: u64, lines: &[String]) -> StoreResult<()> {
        if !self.registry.contains(id) {
            return Err(StoreError::IdNotFound(id));
        }
        self.replace(id, lines)
    }

    /// Appends `lines` to a record's existing content, preserving order.
    ///
    /// # Errors
    ///
    /// `IdNotFound` if `id` is absent; `CorruptRecord` if the current
    /// content fails its fingerprint check.
    pub fn append(&mut self, id: u64, lines: &[String]) -> StoreResult<()> {
        let mut content = self.read(id)?;
        content.extend_from_slice(lines);
        self.replace(id, &content)
    }

    /// Deletes a record: registry entry and file.
    ///
    /// The ID is unregistered (and the registry persisted) before the file
    /// is deleted.
    ///
    /// # Errors
    ///
    /// `IdNotFound` if `id` is not registered.
    pub fn delete(&mut self, id: u64) -> StoreResult<()> {
        let mut registry = IdRegistry::load(&self.root)?;
        if !registry.contains(id) {
            return Err(StoreError::IdNotFound(id));
        }

        registry.remove(id);
        registry.persist()?;
        self.registry = registry;

        for name in self.record_names(id)? {
            remove_record(&self.root, &name)?;
        }
        Ok(())
    }

    /// Runs a reconciliation pass and refreshes the in-memory registry
    /// snapshot. Returns what was repaired.
    pub fn check_integrity(&mut self) -> StoreResult<RepairReport> {
        let report = Reconciler::new(&self.root).reconcile()?;
        self.registry = IdRegistry::load(&self.root)?;
        Ok(report)
    }

    /// Deletes the whole store: registry, record files, and the root
    /// directory itself. Consumes the store.
    pub fn delete_store(self) -> StoreResult<()> {
        fs::remove_dir_all(&self.root)
            .map_err(|e| StoreError::Io(format!("remove {}: {}", self.root.display(), e)))?;
        Logger::info("STORE_DELETED", &[("root", &self.root.display().to_string())]);
        Ok(())
    }

    /// All record files currently on disk for `id`, sorted by fingerprint.
    fn record_names(&self, id: u64) -> StoreResult<Vec<RecordName>> {
        Ok(scan_records(&self.root)?.remove(&id).unwrap_or_default())
    }

    /// New-then-delete-old file swap shared by `write` and `append`.
    fn replace(&mut self, id: u64, lines: &[String]) -> StoreResult<()> {
        let old_names = self.record_names(id)?;
        let new_name = write_record(&self.root, id, lines)?;

        for old in old_names {
            if old != new_name {
                remove_record(&self.root, &old)?;
            }
        }
        Ok(())
    }
}
