//! The process-status ledger row (spec §3 "Process-status record").

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Fetch,
    Unpack,
    Store,
    Record,
    Cleanup,
    Restore,
    Delete,
    Fixity,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Fetch => "Fetch",
            Stage::Unpack => "Unpack",
            Stage::Store => "Store",
            Stage::Record => "Record",
            Stage::Cleanup => "Cleanup",
            Stage::Restore => "Restore",
            Stage::Delete => "Delete",
            Stage::Fixity => "Fixity",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Started,
    Success,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Pending => "Pending",
            Status::Started => "Started",
            Status::Success => "Success",
            Status::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// The authoritative per-bag ledger row maintained in the catalog.
///
/// Only the pipeline mutates `stage`, `status`, `note`, `retry`, `state`,
/// and `stored_at`; a human reviewer may set only `reviewed` (spec §3
/// "Ownership & lifecycle"). This split is modeled here by keeping
/// `reviewed` outside of the constructor the pipeline uses to build
/// updates. `Stage`/`Status`'s `Display` impls are what the pipeline's
/// `archivist_catalog::ProcessStatusDto` (plain-`String` wire fields)
/// actually gets built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessStatusRecord {
    pub id: Option<i64>,
    pub bag_name: String,
    pub bucket: String,
    pub bag_modified_at: DateTime<Utc>,
    pub etag: String,
    pub stage: Stage,
    pub status: Status,
    pub note: String,
    pub retry: bool,
    pub reviewed: bool,
    pub institution: String,
    pub generic_file_identifier: Option<String>,
    pub object_identifier: Option<String>,
    /// Opaque serialized process-result, kept for diagnosis.
    pub state: Option<serde_json::Value>,
    pub stored_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_display_matches_catalog_wire_names() {
        assert_eq!(Stage::Fetch.to_string(), "Fetch");
        assert_eq!(Stage::Unpack.to_string(), "Unpack");
        assert_eq!(Stage::Store.to_string(), "Store");
        assert_eq!(Stage::Record.to_string(), "Record");
        assert_eq!(Stage::Cleanup.to_string(), "Cleanup");
        assert_eq!(Stage::Restore.to_string(), "Restore");
        assert_eq!(Stage::Delete.to_string(), "Delete");
        assert_eq!(Stage::Fixity.to_string(), "Fixity");
    }

    #[test]
    fn status_display_matches_catalog_wire_names() {
        assert_eq!(Status::Pending.to_string(), "Pending");
        assert_eq!(Status::Started.to_string(), "Started");
        assert_eq!(Status::Success.to_string(), "Success");
        assert_eq!(Status::Failed.to_string(), "Failed");
    }
}
