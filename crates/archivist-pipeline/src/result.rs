//! The accumulating process result that travels with a bag through every
//! stage's message body (spec §6 "for later stages, the full accumulating
//! process-result").

use archivist_model::{BagReadResult, TarResult};
use serde::{Deserialize, Serialize};

/// The bootstrap payload an ingest message starts life as (spec §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3File {
    pub bucket_name: String,
    pub key: String,
    pub etag: String,
    pub last_modified: String,
    pub size: u64,
    pub storage_class: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessResult {
    pub bucket: String,
    pub key: String,
    pub etag: String,
    pub size: u64,
    pub institution: String,
    pub clean_bag_name: String,
    pub object_identifier: String,
    pub local_tar_path: Option<String>,
    pub tar_result: Option<TarResult>,
    pub bag_read_result: Option<BagReadResult>,
    pub process_status_id: Option<u64>,
    pub reviewed: bool,
    pub error_message: Option<String>,
    pub retry: bool,
    /// Set on messages populated from `items_pending_delete` — the single
    /// generic file a Delete-pipeline message targets (spec §3
    /// "Process-status record" optional generic-file identifier).
    pub generic_file_identifier: Option<String>,
}

impl ProcessResult {
    pub fn from_s3_file(file: S3File, institution: String, clean_bag_name: String, object_identifier: String) -> Self {
        ProcessResult {
            bucket: file.bucket_name,
            key: file.key,
            etag: file.etag,
            size: file.size,
            institution,
            clean_bag_name,
            object_identifier,
            ..Default::default()
        }
    }

    pub fn in_flight_key(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }
}
