//! The preservation-object model: objects, files, and their event history
//! (spec §3 "Preservation-object model").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::payload::PayloadFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Ingest,
    FixityCheck,
    FixityGeneration,
    IdentifierAssignment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub detail: String,
    pub outcome: Outcome,
    pub outcome_detail: String,
    pub implementing_agent: String,
    pub information: String,
}

/// The agent string recorded for SHA-256 fixity events (spec §4.I "fixed
/// constants naming the hashing library").
pub const FIXITY_AGENT: &str = "Go crypto/sha256";
pub const FIXITY_OBJECT: &str = "sha256";

impl Event {
    pub fn new(
        event_type: EventType,
        detail: impl Into<String>,
        outcome: Outcome,
        outcome_detail: impl Into<String>,
        implementing_agent: impl Into<String>,
        information: impl Into<String>,
    ) -> Self {
        Event {
            id: Uuid::new_v4(),
            event_type,
            timestamp: Utc::now(),
            detail: detail.into(),
            outcome,
            outcome_detail: outcome_detail.into(),
            implementing_agent: implementing_agent.into(),
            information: information.into(),
        }
    }
}

/// A preserved object: institution, descriptive tags, and its files with
/// their recorded events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreservationObject {
    pub identifier: String,
    pub institution: String,
    pub title: String,
    pub description: String,
    pub access: String,
    pub files: Vec<PreservedFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreservedFile {
    pub identifier: String,
    pub payload: PayloadFile,
    pub events: Vec<Event>,
}

/// Builds the deterministic per-file event sequence the Record stage emits
/// for a newly stored file (spec §4.G "Event order per file is
/// deterministic"):
/// `fixity_check` (md5 matched remote) → `ingest` (stored-at, store-returned
/// md5) → `fixity_generation` (sha256) → `identifier_assignment` (friendly
/// identifier) → `identifier_assignment` (storage url).
pub fn ingest_event_sequence(file: &PayloadFile, agent: &str) -> Vec<Event> {
    let mut events = Vec::with_capacity(5);

    events.push(Event::new(
        EventType::FixityCheck,
        "MD5 fixity check against object store response",
        Outcome::Success,
        file.md5.clone(),
        agent,
        "Verified MD5 digest reported by the object store matches the locally computed digest",
    ));

    events.push(Event::new(
        EventType::Ingest,
        "Copied payload file to preservation storage",
        Outcome::Success,
        file.store_reported_md5.clone().unwrap_or_default(),
        agent,
        format!(
            "Stored at {}",
            file.stored_at.map(|t| t.to_rfc3339()).unwrap_or_default()
        ),
    ));

    if let Some(sha256) = &file.sha256 {
        events.push(Event::new(
            EventType::FixityGeneration,
            "Generated SHA-256 fixity value",
            Outcome::Success,
            sha256.clone(),
            FIXITY_AGENT,
            "Generated during bag unpack",
        ));
    }

    events.push(Event::new(
        EventType::IdentifierAssignment,
        "Assigned friendly identifier",
        Outcome::Success,
        file.friendly_identifier.clone(),
        agent,
        "Assigned human-readable catalog identifier",
    ));

    events.push(Event::new(
        EventType::IdentifierAssignment,
        "Assigned storage URL",
        Outcome::Success,
        file.storage_url.clone().unwrap_or_default(),
        agent,
        "Assigned after successful upload to preservation storage",
    ));

    events
}
