//! Record codec: file names and file bodies
//!
//! One record = one file named `{id}-{fingerprint}.dat`. The name alone
//! identifies the record and carries the expected hash of the body; the body
//! is the canonical encoding of the content lines. Re-hashing the body and
//! comparing against the name is the corruption check.
//!
//! # Body encoding
//!
//! One encoded line per content line, each terminated with `\n`. Backslash
//! and newline characters inside a line are escaped (`\\` and `\n`), so
//! content round-trips exactly and the encoding is order-sensitive.
//!
//! File names that do not match the pattern are foreign: every scan skips
//! them and nothing ever deletes them.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::fingerprint::{compute_fingerprint, is_valid_fingerprint};
use crate::errors::{StoreError, StoreResult};

/// Extension shared by record files and the registry file.
pub const RECORD_EXT: &str = "dat";

/// Parsed identity of a record file: ID plus embedded fingerprint.
///
/// Obtainable from a file name without reading the body.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RecordName {
    /// Caller-assigned record ID
    pub id: u64,
    /// Fingerprint embedded in the file name (lowercase hex)
    pub fingerprint: String,
}

impl RecordName {
    /// Renders the file name, `{id}-{fingerprint}.dat`.
    pub fn file_name(&self) -> String {
        format!("{}-{}.{}", self.id, self.fingerprint, RECORD_EXT)
    }

    /// Full path of this record inside `dir`.
    pub fn path(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    /// Parses a file name into `(id, fingerprint)`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedFileName` for anything that does not match the
    /// record pattern. Callers treat such files as foreign and skip them.
    pub fn parse(file_name: &str) -> StoreResult<Self> {
        let malformed = || StoreError::MalformedFileName(file_name.to_string());

        let stem = file_name
            .strip_suffix(".dat")
            .ok_or_else(malformed)?;
        let (id_part, fp_part) = stem.split_once('-').ok_or_else(malformed)?;

        if id_part.is_empty() || !id_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed());
        }
        // canonical decimal only: a leading zero would re-render to a
        // different file name than the one on disk
        if id_part.len() > 1 && id_part.starts_with('0') {
            return Err(malformed());
        }
        let id: u64 = id_part.parse().map_err(|_| malformed())?;

        if !is_valid_fingerprint(fp_part) {
            return Err(malformed());
        }

        Ok(Self {
            id,
            fingerprint: fp_part.to_string(),
        })
    }
}

/// Encodes content lines into canonical body bytes.
pub fn encode_lines(lines: &[String]) -> Vec<u8> {
    let mut body = Vec::new();
    for line in lines {
        for c in line.chars() {
            match c {
                '\\' => body.extend_from_slice(b"\\\\"),
                '\n' => body.extend_from_slice(b"\\n"),
                c => {
                    let mut buf = [0u8; 4];
                    body.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        body.push(b'\n');
    }
    body
}

/// Decodes canonical body bytes back into content lines.
///
/// Inverse of [`encode_lines`]. A body our own writer produced always
/// decodes; a body that passes the fingerprint check yet fails here was not
/// written by this codec and is surfaced as an I/O-level failure.
pub fn decode_lines(body: &[u8]) -> StoreResult<Vec<String>> {
    let text = std::str::from_utf8(body)
        .map_err(|e| StoreError::Io(format!("record body is not UTF-8: {}", e)))?;

    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\\') => current.push('\\'),
                Some('n') => current.push('\n'),
                other => {
                    return Err(StoreError::Io(format!(
                        "invalid escape in record body: \\{}",
                        other.map(String::from).unwrap_or_default()
                    )))
                }
            },
            '\n' => lines.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        return Err(StoreError::Io(
            "record body ends with an unterminated line".to_string(),
        ));
    }

    Ok(lines)
}

/// Fingerprint of content lines, as embedded in the record file name.
pub fn content_fingerprint(lines: &[String]) -> String {
    compute_fingerprint(&encode_lines(lines))
}

/// Writes a record file for `id` into `dir`, durably and atomically.
///
/// The body goes to a temporary file first, is fsynced, then renamed onto
/// the final `{id}-{fingerprint}.dat` name. A crash leaves either no new
/// file or a complete one; a leftover `.tmp` name fails
/// [`RecordName::parse`] and is ignored by every scan.
pub fn write_record(dir: &Path, id: u64, lines: &[String]) -> StoreResult<RecordName> {
    let body = encode_lines(lines);
    let name = RecordName {
        id,
        fingerprint: compute_fingerprint(&body),
    };

    let final_path = name.path(dir);
    let tmp_path = dir.join(format!("{}.tmp", name.file_name()));

    let mut file = File::create(&tmp_path)
        .map_err(|e| StoreError::Io(format!("create {}: {}", tmp_path.display(), e)))?;
    file.write_all(&body)
        .map_err(|e| StoreError::Io(format!("write {}: {}", tmp_path.display(), e)))?;
    file.sync_all()
        .map_err(|e| StoreError::Io(format!("fsync {}: {}", tmp_path.display(), e)))?;

    fs::rename(&tmp_path, &final_path).map_err(|e| {
        StoreError::Io(format!(
            "rename {} -> {}: {}",
            tmp_path.display(),
            final_path.display(),
            e
        ))
    })?;

    Ok(name)
}

/// Reads a record file and validates its body against the embedded
/// fingerprint.
///
/// # Errors
///
/// `CorruptRecord` if the body no longer hashes to `name.fingerprint`;
/// `IdNotFound` if the file vanished; `Io` for other filesystem failures.
pub fn read_record(dir: &Path, name: &RecordName) -> StoreResult<Vec<String>> {
    let path = name.path(dir);
    let body = fs::read(&path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::IdNotFound(name.id)
        } else {
            StoreError::Io(format!("read {}: {}", path.display(), e))
        }
    })?;

    let actual = compute_fingerprint(&body);
    if actual != name.fingerprint {
        return Err(StoreError::CorruptRecord {
            id: name.id,
            expected: name.fingerprint.clone(),
            actual,
        });
    }

    decode_lines(&body)
}

/// Deletes a record file. Missing files are not an error.
pub fn remove_record(dir: &Path, name: &RecordName) -> StoreResult<()> {
    let path = name.path(dir);
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StoreError::Io(format!("remove {}: {}", path.display(), e))),
    }
}

/// Scans `dir` and groups record files by ID.
///
/// Foreign files (anything failing name parsing, including the registry file
/// and leftover temporaries) are skipped. Names within each group are sorted
/// by fingerprint so duplicate resolution is deterministic.
pub fn scan_records(dir: &Path) -> StoreResult<BTreeMap<u64, Vec<RecordName>>> {
    let mut groups: BTreeMap<u64, Vec<RecordName>> = BTreeMap::new();

    let entries = fs::read_dir(dir)
        .map_err(|e| StoreError::Io(format!("read dir {}: {}", dir.display(), e)))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| StoreError::Io(format!("read dir {}: {}", dir.display(), e)))?;
        let file_type = entry
            .file_type()
            .map_err(|e| StoreError::Io(format!("stat {}: {}", entry.path().display(), e)))?;
        if !file_type.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let file_name = match file_name.to_str() {
            Some(name) => name,
            None => continue,
        };
        if let Ok(name) = RecordName::parse(file_name) {
            groups.entry(name.id).or_default().push(name);
        }
    }

    for names in groups.values_mut() {
        names.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
    }

    Ok(groups)
}
