//! Error types for simplestore
//!
//! One taxonomy for the whole crate. Store operations surface these as typed
//! failures; the reconciler self-heals everything it can and only fails with
//! `Io`.

use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Store errors
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// `add` on an ID that is already registered
    #[error("ID already registered: {0}")]
    DuplicateId(u64),

    /// Operation on an ID that is not registered or has no record file
    #[error("ID not found: {0}")]
    IdNotFound(u64),

    /// A record file's content no longer matches its embedded fingerprint
    #[error("corrupt record for ID {id}: fingerprint {expected} expected, content hashes to {actual}")]
    CorruptRecord {
        id: u64,
        expected: String,
        actual: String,
    },

    /// The persisted registry contains duplicate or unparsable entries
    #[error("registry corrupt: {0}")]
    RegistryCorrupt(String),

    /// A file name in the store directory does not match the record pattern
    #[error("malformed record file name: {0}")]
    MalformedFileName(String),

    /// Underlying filesystem failure
    #[error("I/O failure: {0}")]
    Io(String),
}

impl StoreError {
    /// True for errors the reconciler is allowed to surface
    pub fn is_io(&self) -> bool {
        matches!(self, StoreError::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_id() {
        assert!(StoreError::DuplicateId(7).to_string().contains('7'));
        assert!(StoreError::IdNotFound(42).to_string().contains("42"));
    }

    #[test]
    fn test_corrupt_record_display_shows_both_fingerprints() {
        let err = StoreError::CorruptRecord {
            id: 3,
            expected: "deadbeef".into(),
            actual: "0badc0de".into(),
        };
        let display = err.to_string();
        assert!(display.contains("deadbeef"));
        assert!(display.contains("0badc0de"));
    }

    #[test]
    fn test_only_io_is_io() {
        assert!(StoreError::Io("disk full".into()).is_io());
        assert!(!StoreError::DuplicateId(1).is_io());
        assert!(!StoreError::RegistryCorrupt("dup".into()).is_io());
    }
}
