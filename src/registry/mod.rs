//! ID registry subsystem for simplestore
//!
//! The registry is the authoritative set of IDs a store currently considers
//! valid, persisted as `_ID.dat` inside the store root: one decimal ID per
//! line, sorted, rewritten atomically (temp + fsync + rename) on every
//! mutation so a crash mid-write leaves the previous version intact.
//!
//! Opening a store creates the registry file eagerly, so an empty store
//! directory is immediately well-formed.
//!
//! A persisted registry with duplicate or unparsable entries is corrupt:
//! the strict loader refuses it and the caller must reconcile before
//! trusting the store. Only the reconciler uses the lenient loader, which
//! collapses duplicates and drops garbage while reporting what it tolerated.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::errors::{StoreError, StoreResult};

/// Well-known registry file name inside the store root.
pub const REGISTRY_FILE: &str = "_ID.dat";

/// What the lenient loader had to tolerate in a persisted registry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryDamage {
    /// Entries that appeared more than once
    pub duplicate_entries: u64,
    /// Lines that did not parse as an ID
    pub unparsable_lines: u64,
}

impl RegistryDamage {
    /// True if the persisted form was exactly the deduplicated set.
    pub fn is_clean(&self) -> bool {
        self.duplicate_entries == 0 && self.unparsable_lines == 0
    }
}

/// Persisted set of record IDs.
#[derive(Debug)]
pub struct IdRegistry {
    path: PathBuf,
    ids: BTreeSet<u64>,
}

impl IdRegistry {
    /// Path of the registry file inside `root`.
    pub fn registry_path(root: &Path) -> PathBuf {
        root.join(REGISTRY_FILE)
    }

    /// Opens the registry inside `root`, creating an empty one if the file
    /// does not exist yet.
    ///
    /// # Errors
    ///
    /// `RegistryCorrupt` if the persisted form contains duplicates or
    /// unparsable lines; repair via reconciliation before trusting it.
    pub fn open(root: &Path) -> StoreResult<Self> {
        let path = Self::registry_path(root);
        if !path.exists() {
            let registry = Self {
                path,
                ids: BTreeSet::new(),
            };
            registry.persist()?;
            return Ok(registry);
        }
        Self::load(root)
    }

    /// Loads the registry strictly. A missing file is an empty registry.
    pub fn load(root: &Path) -> StoreResult<Self> {
        let (registry, damage) = Self::load_lenient(root)?;
        if !damage.is_clean() {
            return Err(StoreError::RegistryCorrupt(format!(
                "{} duplicate entries, {} unparsable lines in {}",
                damage.duplicate_entries,
                damage.unparsable_lines,
                registry.path.display()
            )));
        }
        Ok(registry)
    }

    /// Loads the registry tolerantly, collapsing duplicates and dropping
    /// unparsable lines. Reconciler use only; the returned damage report
    /// tells the caller whether the persisted form needs rewriting.
    pub fn load_lenient(root: &Path) -> StoreResult<(Self, RegistryDamage)> {
        let path = Self::registry_path(root);
        let mut ids = BTreeSet::new();
        let mut damage = RegistryDamage::default();

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(StoreError::Io(format!(
                    "read registry {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<u64>() {
                Ok(id) => {
                    if !ids.insert(id) {
                        damage.duplicate_entries += 1;
                    }
                }
                Err(_) => damage.unparsable_lines += 1,
            }
        }

        Ok((Self { path, ids }, damage))
    }

    /// True if `id` is registered.
    pub fn contains(&self, id: u64) -> bool {
        self.ids.contains(&id)
    }

    /// Registers `id`. No-op if already present; returns whether it was new.
    pub fn add(&mut self, id: u64) -> bool {
        self.ids.insert(id)
    }

    /// Unregisters `id`. No-op if absent; returns whether it was present.
    pub fn remove(&mut self, id: u64) -> bool {
        self.ids.remove(&id)
    }

    /// Drops every registered ID from the in-memory set.
    pub fn clear(&mut self) {
        self.ids.clear();
    }

    /// Sorted snapshot of all registered IDs.
    pub fn snapshot(&self) -> Vec<u64> {
        self.ids.iter().copied().collect()
    }

    /// The registered IDs as a set.
    pub fn ids(&self) -> &BTreeSet<u64> {
        &self.ids
    }

    /// Number of registered IDs.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Rewrites the registry file: deduplicated, sorted, one ID per line.
    ///
    /// The new content goes to a temporary file, is fsynced, then renamed
    /// onto `_ID.dat`; the old version stays valid until the rename lands.
    pub fn persist(&self) -> StoreResult<()> {
        let mut contents = String::new();
        for id in &self.ids {
            contents.push_str(&id.to_string());
            contents.push('\n');
        }

        let tmp_path = self.path.with_extension("dat.tmp");
        let mut file = File::create(&tmp_path)
            .map_err(|e| StoreError::Io(format!("create {}: {}", tmp_path.display(), e)))?;
        file.write_all(contents.as_bytes())
            .map_err(|e| StoreError::Io(format!("write {}: {}", tmp_path.display(), e)))?;
        file.sync_all()
            .map_err(|e| StoreError::Io(format!("fsync {}: {}", tmp_path.display(), e)))?;

        fs::rename(&tmp_path, &self.path).map_err(|e| {
            StoreError::Io(format!(
                "rename {} -> {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })
    }
}
