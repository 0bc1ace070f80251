//! Record storage subsystem for simplestore
//!
//! A record exists only as a file: `{id}-{fingerprint}.dat`, where the
//! fingerprint is the CRC32 of the canonical body encoding. The file name is
//! the record's identity and its integrity claim at the same time.
//!
//! # Design principles
//!
//! - Fingerprint verified on every read
//! - All file replacement is write-temp, fsync, atomic rename
//! - Foreign file names are skipped, never deleted
//! - Directory scans are deterministic (sorted by ID, then fingerprint)

mod fingerprint;
mod record;

pub use fingerprint::{compute_fingerprint, is_valid_fingerprint, verify_fingerprint, FINGERPRINT_LEN};
pub use record::{
    content_fingerprint, decode_lines, encode_lines, read_record, remove_record, scan_records,
    write_record, RecordName, RECORD_EXT,
};
