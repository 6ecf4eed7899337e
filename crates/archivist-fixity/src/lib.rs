//! Fixity engine: stream-hashes a preserved file's bytes and compares the
//! result to the catalog's recorded SHA-256 (spec §4.I).

use archivist_catalog::{Client as CatalogClient, EntityKind};
use archivist_error::{Error, Result};
use archivist_model::{Event, EventType, Outcome, PayloadFile, FIXITY_AGENT, FIXITY_OBJECT};
use archivist_objectstore::{parse_s3_uri, Client as ObjectStoreClient};
use chrono::{DateTime, Utc};

/// Checks one file's fixity and records the resulting event in the
/// catalog, returning the event that was saved.
///
/// A file with no recorded SHA-256 is "check impossible" rather than a
/// mismatch (spec §4.I "a result with an empty current digest is treated
/// as check impossible"): the event is saved with a Failure outcome but a
/// distinct detail string, not the "expected X got Y" mismatch message.
pub async fn check_file_fixity(
    catalog: &CatalogClient,
    store: &ObjectStoreClient,
    file: &PayloadFile,
) -> Result<Event> {
    let (bucket, key, expected) = plan_check(file)?;

    let event = if expected.is_empty() {
        Event::new(
            EventType::FixityCheck,
            "SHA-256 fixity check",
            Outcome::Failure,
            "check impossible: no SHA-256 digest recorded for this file",
            FIXITY_AGENT,
            FIXITY_OBJECT,
        )
    } else {
        let result = store.fetch_and_sha256(&bucket, &key).await?;
        if result.sha256 == expected {
            Event::new(
                EventType::FixityCheck,
                "SHA-256 fixity check",
                Outcome::Success,
                result.sha256,
                FIXITY_AGENT,
                FIXITY_OBJECT,
            )
        } else {
            Event::new(
                EventType::FixityCheck,
                "SHA-256 fixity check",
                Outcome::Failure,
                format!("expected {expected} got {}", result.sha256),
                FIXITY_AGENT,
                FIXITY_OBJECT,
            )
        }
    };

    catalog
        .event_save(EntityKind::File, &file.friendly_identifier, &event)
        .await?;

    Ok(event)
}

/// Resolves the bucket, key, and expected digest for a fixity check
/// without touching the network — split out so the non-retryable-URI and
/// empty-digest decisions are unit-testable on their own.
fn plan_check(file: &PayloadFile) -> Result<(String, String, String)> {
    let storage_url = file
        .storage_url
        .as_deref()
        .ok_or_else(|| Error::validation(format!("file {} has no storage URL", file.friendly_identifier)))?;
    let (bucket, key) = parse_s3_uri(storage_url)?;
    let expected = file.sha256.clone().unwrap_or_default();
    Ok((bucket, key, expected))
}

/// One file's fixity check result, surfaced to the scan's caller even when
/// the underlying check failed to run at all.
pub struct ScanOutcome {
    pub file_identifier: String,
    pub result: Result<Event>,
}

/// Scans every file the catalog reports as not checked since `since`,
/// checking each in turn. A single file's failure does not abort the scan
/// — it is logged and recorded in the returned outcome list, and the scan
/// continues to the next file (spec §4.I has no batch-abort semantics; the
/// scan is a fan-out over independent per-file checks).
pub async fn run_scan(
    catalog: &CatalogClient,
    store: &ObjectStoreClient,
    since: DateTime<Utc>,
) -> Result<Vec<ScanOutcome>> {
    let files = catalog.files_not_checked_since(since).await?;
    let mut outcomes = Vec::with_capacity(files.len());

    for file in files {
        let result = check_file_fixity(catalog, store, &file).await;
        if let Err(e) = &result {
            tracing::warn!(file = file.friendly_identifier, error = %e, "fixity check failed");
        }
        outcomes.push(ScanOutcome {
            file_identifier: file.friendly_identifier.clone(),
            result,
        });
    }

    Ok(outcomes)
}
