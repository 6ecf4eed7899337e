//! File descriptors and the tar/bag read results that own them (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single `{label, value}` tag, as read from a BagIt tag file. Tag
/// sequences are insertion-ordered within a file and merged in file-read
/// order across files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub label: String,
    pub value: String,
}

impl Tag {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Tag {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// A payload file descriptor: one entry under `data/` in a bag.
///
/// Owned exclusively by the [`TarResult`] that produced it; every other view
/// (the catalog-record DTO built in the Record stage) borrows `&PayloadFile`
/// rather than cloning it, so `needs_save` / `stored_at` cannot diverge
/// between views (spec §3 "Ownership & lifecycle", §9 "Pointer/reference
/// graphs").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadFile {
    /// Path relative to the bag root, e.g. `data/x/y.pdf`.
    pub relative_path: String,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub id: Uuid,
    pub md5: String,
    pub sha256: Option<String>,
    pub mime_type: Option<String>,
    /// False when a prior ingest already recorded the identical MD5 at the
    /// same relative path — such files are skipped in the Store stage.
    pub needs_save: bool,
    pub storage_url: Option<String>,
    /// The MD5 the object store reported back after `save`, kept for audit
    /// alongside the locally computed `md5`.
    pub store_reported_md5: Option<String>,
    /// `"<clean-bag-name>/<relative-path>"`.
    pub friendly_identifier: String,
    pub id_assigned_at: DateTime<Utc>,
    pub sha256_generated_at: Option<DateTime<Utc>>,
    pub stored_at: Option<DateTime<Utc>>,
}

impl PayloadFile {
    /// A freshly minted descriptor at the moment the tee-hashing writer has
    /// finished streaming a payload file (size/md5 known, sha256 present
    /// only in "build ingest data" mode — see `archivist-bag`).
    pub fn new(
        relative_path: String,
        size: u64,
        modified_at: DateTime<Utc>,
        md5: String,
        clean_bag_name: &str,
    ) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        PayloadFile {
            friendly_identifier: format!("{clean_bag_name}/{relative_path}"),
            relative_path,
            size,
            modified_at,
            id,
            md5,
            sha256: None,
            mime_type: None,
            needs_save: true,
            storage_url: None,
            store_reported_md5: None,
            id_assigned_at: now,
            sha256_generated_at: None,
            stored_at: None,
        }
    }
}

/// The result of unpacking one tar stream (spec §3 "Tar result").
///
/// Exclusively owned by the in-flight pipeline instance processing the bag
/// and destroyed on Cleanup (the files it names on disk are removed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TarResult {
    pub tar_path: String,
    pub output_dir: String,
    pub files: Vec<PayloadFile>,
    /// Sorted lexicographically — this ordering is part of the public
    /// contract (spec §4.B) so downstream consumers can rely on it.
    pub files_unpacked: Vec<String>,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
}

impl TarResult {
    pub fn is_ok(&self) -> bool {
        self.error_message.is_none()
    }
}

/// The result of reading and validating an unpacked bag directory (spec §3
/// "Bag-read result").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BagReadResult {
    pub bag_dir: String,
    pub files: Vec<String>,
    pub tags: Vec<Tag>,
    pub checksum_errors: Vec<String>,
    pub error_message: Option<String>,
}

impl BagReadResult {
    pub fn is_valid(&self) -> bool {
        self.error_message.is_none() && self.checksum_errors.is_empty()
    }

    /// Finds the first tag matching `label`, case-insensitively.
    pub fn tag(&self, label: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.label.eq_ignore_ascii_case(label))
            .map(|t| t.value.as_str())
    }
}

/// The three related names derived from a raw tar key (spec §3 "Bag
/// identity").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BagIdentity {
    pub raw_key: String,
    pub clean_bag_name: String,
    pub object_identifier: String,
}
