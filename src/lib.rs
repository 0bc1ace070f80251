//! simplestore - a minimal content-addressed file store
//!
//! Each record is identified by a caller-supplied integer ID and persisted
//! as one file named `{id}-{fingerprint}.dat`, where the fingerprint is a
//! hash of the file's content. A registry file (`_ID.dat`) holds the
//! authoritative set of IDs. The interesting part is keeping the two
//! consistent: every mutation is individually crash-safe via atomic renames,
//! and an explicit reconciliation pass detects and repairs any drift left by
//! crashes or out-of-band edits.
//!
//! ```no_run
//! use simplestore::DataStore;
//!
//! # fn main() -> simplestore::StoreResult<()> {
//! let mut store = DataStore::open("/tmp/my-store")?;
//! store.add(1, &["first line".to_string(), "second line".to_string()])?;
//! let content = store.read(1)?;
//! let report = store.check_integrity()?;
//! assert!(report.is_clean());
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod observability;
pub mod recovery;
pub mod registry;
pub mod storage;
pub mod store;

pub use errors::{StoreError, StoreResult};
pub use recovery::{Reconciler, RepairReport};
pub use registry::IdRegistry;
pub use store::DataStore;
