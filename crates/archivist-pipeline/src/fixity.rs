//! Fixity stage: checks one file's SHA-256 against its preservation copy
//! (spec §4.I). Messages on this topic are published by a periodic scan of
//! `files_not_checked_since`, one per file, carrying the file's identifier
//! in `generic_file_identifier`.

use archivist_bus::InFlightMessage;
use archivist_catalog::ProcessStatusDto;
use archivist_error::Kind;
use archivist_fixity::check_file_fixity;
use archivist_model::process_status::{Stage as ModelStage, Status as ModelStatus};
use archivist_model::Outcome;
use async_trait::async_trait;

use crate::context::ProcessContext;
use crate::result::ProcessResult;
use crate::stage::{Stage, StageOutcome};

pub struct FixityStage;

#[async_trait]
impl Stage for FixityStage {
    fn name(&self) -> &'static str {
        "Fixity"
    }

    async fn run(&self, ctx: &ProcessContext, _msg: &dyn InFlightMessage, result: ProcessResult) -> StageOutcome {
        let Some(file_identifier) = result.generic_file_identifier.clone() else {
            return StageOutcome::Fail {
                note: "Fixity stage received a message with no file identifier".to_string(),
            };
        };

        let file = match ctx.catalog.file_get(&file_identifier).await {
            Ok(Some(file)) => file,
            Ok(None) => {
                let note = format!("file {file_identifier} does not exist in the catalog");
                upsert_status(ctx, &result, ModelStatus::Failed, &note, false).await;
                return StageOutcome::Fail { note };
            }
            Err(e) if e.kind == Kind::Transient => {
                return StageOutcome::Requeue {
                    delay: std::time::Duration::from_secs(5),
                    note: e.message,
                };
            }
            Err(e) => {
                upsert_status(ctx, &result, ModelStatus::Failed, &e.message, false).await;
                return StageOutcome::Fail { note: e.message };
            }
        };

        match check_file_fixity(&ctx.catalog, &ctx.store, &file.payload).await {
            Ok(event) => {
                let status = if event.outcome == Outcome::Success { ModelStatus::Success } else { ModelStatus::Failed };
                upsert_status(ctx, &result, status, &event.outcome_detail, false).await;
                StageOutcome::Done
            }
            Err(e) if e.kind == Kind::Transient => {
                upsert_status(ctx, &result, ModelStatus::Started, &e.message, true).await;
                StageOutcome::Requeue {
                    delay: std::time::Duration::from_secs(5),
                    note: e.message,
                }
            }
            Err(e) => {
                upsert_status(ctx, &result, ModelStatus::Failed, &e.message, false).await;
                StageOutcome::Fail { note: e.message }
            }
        }
    }
}

async fn upsert_status(ctx: &ProcessContext, result: &ProcessResult, status: ModelStatus, note: &str, retry: bool) {
    let record = ProcessStatusDto {
        id: result.process_status_id,
        name: result.clean_bag_name.clone(),
        bucket: result.bucket.clone(),
        bag_date: chrono::Utc::now(),
        etag: result.etag.clone(),
        stage: ModelStage::Fixity.to_string(),
        status: status.to_string(),
        note: note.to_string(),
        retry,
        reviewed: result.reviewed,
        institution: result.institution.clone(),
        generic_file_identifier: result.generic_file_identifier.clone(),
        object_identifier: None,
        state: serde_json::to_string(result).ok(),
    };
    if let Err(e) = ctx.catalog.process_status_upsert(&record).await {
        tracing::warn!(error = %e, "failed to update process-status row");
    }
}
