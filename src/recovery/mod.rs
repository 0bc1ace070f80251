//! Recovery subsystem for simplestore
//!
//! There is no write-ahead log: every store mutation degrades, across a
//! crash, to a state this module can repair. Reconciliation restores the
//! consistency invariants:
//!
//! 1. The registry has no duplicate IDs
//! 2. No two record files share an ID
//! 3. Every registered ID has exactly one record file
//! 4. Every record file's ID is registered
//! 5. Every record file's embedded fingerprint matches its content
//!
//! Repairs are deterministic and idempotent: unverifiable state is
//! discarded, verifiable state is reclaimed, content is never invented.

mod reconciler;

pub use reconciler::{Reconciler, RepairReport};
