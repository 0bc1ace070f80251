//! Integrity reconciliation
//!
//! Brings the registry and the on-disk record files back into mutual
//! consistency after a crash or an out-of-band edit. Repair policy, in
//! order:
//!
//! 1. Collapse duplicate (or unparsable) registry entries.
//! 2. For an ID with several files, keep the one whose fingerprint validates
//!    against its own content; ties go to the lexicographically smallest
//!    fingerprint. Delete the rest.
//! 3. Delete any surviving file whose content no longer hashes to its
//!    embedded fingerprint; its content is unrecoverable evidence, never
//!    "fixed" by renaming.
//! 4. Drop registry IDs with no backing file; reclaim on-disk files whose ID
//!    is unregistered.
//! 5. Rewrite the registry only if any step changed it.
//!
//! Reconciliation is idempotent and never fails because corruption existed;
//! it only surfaces unrecoverable I/O errors.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::{StoreError, StoreResult};
use crate::observability::Logger;
use crate::registry::IdRegistry;
use crate::storage::{remove_record, scan_records, verify_fingerprint, RecordName};

/// Summary of the repairs a reconciliation pass performed.
///
/// All-zero (and `registry_rewritten == false`) means the store already
/// satisfied every invariant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Duplicate registry entries collapsed
    pub registry_duplicates_collapsed: u64,
    /// Unparsable registry lines dropped
    pub registry_garbage_dropped: u64,
    /// Redundant files removed for IDs that had several
    pub duplicate_files_removed: u64,
    /// Files removed because their content failed the fingerprint check
    pub corrupt_files_removed: u64,
    /// Registry IDs dropped because no valid file backs them
    pub unbacked_ids_dropped: u64,
    /// On-disk files adopted into the registry
    pub orphan_ids_reclaimed: u64,
    /// Whether the registry file was rewritten
    pub registry_rewritten: bool,
}

impl RepairReport {
    /// True if the pass found nothing to repair.
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Repairs a store directory against the consistency invariants.
pub struct Reconciler {
    root: PathBuf,
}

impl Reconciler {
    /// Creates a reconciler for the store rooted at `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Runs one full reconciliation pass.
    ///
    /// # Errors
    ///
    /// `Io` only: corruption is repaired, not reported as failure.
    pub fn reconcile(&self) -> StoreResult<RepairReport> {
        let mut report = RepairReport::default();

        // Step 1: registry, tolerantly
        let (mut registry, damage) = IdRegistry::load_lenient(&self.root)?;
        report.registry_duplicates_collapsed = damage.duplicate_entries;
        report.registry_garbage_dropped = damage.unparsable_lines;
        let mut registry_dirty = !damage.is_clean();
        if registry_dirty {
            Logger::warn(
                "REGISTRY_COLLAPSED",
                &[
                    ("duplicates", &damage.duplicate_entries.to_string()),
                    ("garbage_lines", &damage.unparsable_lines.to_string()),
                ],
            );
        }

        // Steps 2 + 3: resolve duplicates, discard corrupt files. Every file
        // is validated against its own content; removals are classified by
        // that result, not by position in the group.
        let mut backed: BTreeSet<u64> = BTreeSet::new();
        for (id, names) in scan_records(&self.root)? {
            let mut survivor: Option<&RecordName> = None;

            // names are sorted by fingerprint, so the first validating one
            // is the deterministic winner
            for name in &names {
                if !self.validates(name)? {
                    self.discard(name, "corrupt")?;
                    report.corrupt_files_removed += 1;
                } else if survivor.is_none() {
                    survivor = Some(name);
                } else {
                    self.discard(name, "duplicate")?;
                    report.duplicate_files_removed += 1;
                }
            }

            if survivor.is_some() {
                backed.insert(id);
            }
        }

        // Step 4: set difference both ways
        for id in registry.snapshot() {
            if !backed.contains(&id) {
                registry.remove(id);
                registry_dirty = true;
                report.unbacked_ids_dropped += 1;
                Logger::warn("UNBACKED_ID_DROPPED", &[("id", &id.to_string())]);
            }
        }
        for id in &backed {
            if registry.add(*id) {
                registry_dirty = true;
                report.orphan_ids_reclaimed += 1;
                Logger::warn("ORPHAN_RECLAIMED", &[("id", &id.to_string())]);
            }
        }

        // Step 5: persist only when something changed
        if registry_dirty {
            registry.persist()?;
            report.registry_rewritten = true;
        }

        Logger::info(
            "RECONCILE_COMPLETE",
            &[
                ("clean", if report.is_clean() { "true" } else { "false" }),
                ("ids", &registry.len().to_string()),
            ],
        );

        Ok(report)
    }

    /// Checks a record file's content against its embedded fingerprint.
    ///
    /// A file that vanished mid-pass counts as not validating.
    fn validates(&self, name: &RecordName) -> StoreResult<bool> {
        let path = name.path(&self.root);
        match fs::read(&path) {
            Ok(body) => Ok(verify_fingerprint(&body, &name.fingerprint)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::Io(format!(
                "read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn discard(&self, name: &RecordName, reason: &str) -> StoreResult<()> {
        Logger::warn(
            "RECORD_FILE_REMOVED",
            &[
                ("file", &name.file_name()),
                ("id", &name.id.to_string()),
                ("reason", reason),
            ],
        );
        remove_record(&self.root, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{content_fingerprint, encode_lines, write_record};
    use tempfile::TempDir;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn write_registry(root: &Path, body: &str) {
        std::fs::write(IdRegistry::registry_path(root), body).unwrap();
    }

    fn registered_ids(root: &Path) -> Vec<u64> {
        IdRegistry::load(root).unwrap().snapshot()
    }

    fn record_files(root: &Path) -> Vec<String> {
        let mut files: Vec<String> = std::fs::read_dir(root)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|n| RecordName::parse(n).is_ok())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_clean_store_needs_no_repair() {
        let temp = TempDir::new().unwrap();
        write_record(temp.path(), 1, &lines(&["a"])).unwrap();
        write_registry(temp.path(), "1\n");

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert!(report.is_clean());
        assert_eq!(registered_ids(temp.path()), vec![1]);
    }

    #[test]
    fn test_registry_duplicates_are_collapsed() {
        let temp = TempDir::new().unwrap();
        write_record(temp.path(), 4, &lines(&["x"])).unwrap();
        write_registry(temp.path(), "4\n4\n4\n");

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert_eq!(report.registry_duplicates_collapsed, 2);
        assert!(report.registry_rewritten);
        assert_eq!(registered_ids(temp.path()), vec![4]);
    }

    #[test]
    fn test_corrupt_file_removed_and_id_dropped() {
        let temp = TempDir::new().unwrap();
        let name = write_record(temp.path(), 6, &lines(&["valid"])).unwrap();
        write_registry(temp.path(), "6\n");

        std::fs::write(name.path(temp.path()), b"edited out of band\n").unwrap();

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert_eq!(report.corrupt_files_removed, 1);
        assert_eq!(report.unbacked_ids_dropped, 1);
        assert!(!name.path(temp.path()).exists());
        assert!(registered_ids(temp.path()).is_empty());
    }

    #[test]
    fn test_dangling_registry_entry_dropped() {
        let temp = TempDir::new().unwrap();
        write_registry(temp.path(), "11\n");

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert_eq!(report.unbacked_ids_dropped, 1);
        assert!(registered_ids(temp.path()).is_empty());
    }

    #[test]
    fn test_orphan_file_reclaimed() {
        let temp = TempDir::new().unwrap();
        write_record(temp.path(), 42, &lines(&["orphan"])).unwrap();
        write_registry(temp.path(), "");

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert_eq!(report.orphan_ids_reclaimed, 1);
        assert_eq!(registered_ids(temp.path()), vec![42]);
    }

    #[test]
    fn test_duplicate_files_resolved_to_validating_one() {
        let temp = TempDir::new().unwrap();
        // one valid file, one stale file whose name lies about its content
        let valid = write_record(temp.path(), 3, &lines(&["current"])).unwrap();
        let stale = RecordName {
            id: 3,
            fingerprint: content_fingerprint(&lines(&["previous"])),
        };
        std::fs::write(stale.path(temp.path()), b"overwritten since\n").unwrap();
        write_registry(temp.path(), "3\n");

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert_eq!(report.corrupt_files_removed, 1);
        assert!(valid.path(temp.path()).exists());
        assert!(!stale.path(temp.path()).exists());
        assert_eq!(registered_ids(temp.path()), vec![3]);
    }

    #[test]
    fn test_removals_classified_by_own_validation_not_sort_order() {
        // corrupt files on both sides of the valid fingerprint: one sorts
        // before it, one after, and both must count as corrupt
        let temp = TempDir::new().unwrap();
        let valid = write_record(temp.path(), 3, &lines(&["current"])).unwrap();

        let low = RecordName {
            id: 3,
            fingerprint: "00000000".to_string(),
        };
        std::fs::write(low.path(temp.path()), b"low junk\n").unwrap();
        let high = RecordName {
            id: 3,
            fingerprint: "ffffffff".to_string(),
        };
        std::fs::write(high.path(temp.path()), b"high junk\n").unwrap();
        write_registry(temp.path(), "3\n");

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert_eq!(report.corrupt_files_removed, 2);
        assert_eq!(report.duplicate_files_removed, 0);
        assert!(valid.path(temp.path()).exists());
        assert!(!low.path(temp.path()).exists());
        assert!(!high.path(temp.path()).exists());
        assert_eq!(registered_ids(temp.path()), vec![3]);
    }

    #[test]
    fn test_two_validating_files_keep_smallest_fingerprint() {
        let temp = TempDir::new().unwrap();
        let a = write_record(temp.path(), 8, &lines(&["one"])).unwrap();
        let b = write_record(temp.path(), 8, &lines(&["two"])).unwrap();
        write_registry(temp.path(), "8\n");

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert_eq!(report.duplicate_files_removed, 1);

        let (winner, loser) = if a.fingerprint < b.fingerprint {
            (a, b)
        } else {
            (b, a)
        };
        assert!(winner.path(temp.path()).exists());
        assert!(!loser.path(temp.path()).exists());
    }

    #[test]
    fn test_foreign_files_are_left_alone() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"not ours").unwrap();
        std::fs::write(temp.path().join("9-deadbeef.dat.tmp"), b"leftover").unwrap();
        write_registry(temp.path(), "");

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert!(report.is_clean());
        assert!(temp.path().join("notes.txt").exists());
        assert!(temp.path().join("9-deadbeef.dat.tmp").exists());
    }

    #[test]
    fn test_reconciliation_is_idempotent() {
        let temp = TempDir::new().unwrap();
        write_record(temp.path(), 1, &lines(&["keep"])).unwrap();
        write_record(temp.path(), 1, &lines(&["drop"])).unwrap();
        let corrupt = write_record(temp.path(), 2, &lines(&["soon gone"])).unwrap();
        std::fs::write(corrupt.path(temp.path()), b"zap\n").unwrap();
        write_record(temp.path(), 42, &lines(&["orphan"])).unwrap();
        write_registry(temp.path(), "1\n1\n2\n99\n");

        let first = Reconciler::new(temp.path()).reconcile().unwrap();
        assert!(!first.is_clean());

        let files_after_first = record_files(temp.path());
        let ids_after_first = registered_ids(temp.path());

        let second = Reconciler::new(temp.path()).reconcile().unwrap();
        assert!(second.is_clean());
        assert_eq!(record_files(temp.path()), files_after_first);
        assert_eq!(registered_ids(temp.path()), ids_after_first);
    }

    #[test]
    fn test_reconcile_of_empty_directory() {
        let temp = TempDir::new().unwrap();
        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert!(report.is_clean());
    }

    #[test]
    fn test_encode_lines_matches_what_reconciler_validates() {
        // a hand-placed orphan built from the public codec must survive
        let temp = TempDir::new().unwrap();
        let content = lines(&["hand", "made"]);
        let name = RecordName {
            id: 5,
            fingerprint: content_fingerprint(&content),
        };
        std::fs::write(name.path(temp.path()), encode_lines(&content)).unwrap();
        write_registry(temp.path(), "");

        let report = Reconciler::new(temp.path()).reconcile().unwrap();
        assert_eq!(report.orphan_ids_reclaimed, 1);
        assert!(name.path(temp.path()).exists());
    }
}
