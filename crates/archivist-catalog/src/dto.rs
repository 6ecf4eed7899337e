//! Wire DTOs for the catalog's JSON API (spec §3, §4.C).

use archivist_model::{PayloadFile, Tag};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Institution {
    pub identifier: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDto {
    pub identifier: String,
    pub object_identifier: String,
    pub payload: PayloadFile,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPreservationObject {
    pub identifier: String,
    pub institution: String,
    pub title: String,
    pub description: String,
    pub access: String,
    pub tags: Vec<Tag>,
    pub files: Vec<FileDto>,
}

/// A lightweight per-file row from the catalog's "file summary" endpoint —
/// just enough to drive a restore (identifier, size, location, digests),
/// skipping the full file record's event history (spec §4.H "optimized
/// 'file summary' call when the full catalog would be slow").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSummary {
    pub identifier: String,
    pub relative_path: String,
    pub size: u64,
    pub storage_url: Option<String>,
    pub md5: String,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreservationObjectDto {
    pub identifier: String,
    pub institution: String,
    pub title: String,
    pub description: String,
    pub access: String,
    pub tags: Vec<Tag>,
}

/// Builds the `FileDto` list for an object-create/update call from the
/// payload descriptors Unpack produced.
pub fn dto_files_from(object_identifier: &str, files: &[PayloadFile]) -> Vec<FileDto> {
    files
        .iter()
        .map(|payload| FileDto {
            identifier: payload.friendly_identifier.clone(),
            object_identifier: object_identifier.to_string(),
            payload: payload.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStatusDto {
    pub id: Option<u64>,
    pub name: String,
    pub bucket: String,
    pub bag_date: DateTime<Utc>,
    pub etag: String,
    pub stage: String,
    pub status: String,
    pub note: String,
    pub retry: bool,
    pub reviewed: bool,
    pub institution: String,
    pub generic_file_identifier: Option<String>,
    pub object_identifier: Option<String>,
    pub state: Option<String>,
}
