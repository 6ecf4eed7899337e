//! Restore stage: drives [`archivist_restore::restore_object`] from a
//! catalog object identifier to one or more tars in the delivery bucket
//! (spec §4.H). Independent of the ingest chain — consumes its own topic,
//! populated from catalog queries rather than published by Cleanup.

use archivist_bus::InFlightMessage;
use archivist_catalog::ProcessStatusDto;
use archivist_error::Kind;
use archivist_model::process_status::{Stage as ModelStage, Status as ModelStatus};
use archivist_restore::{restore_object, RestoreOptions};
use async_trait::async_trait;

use crate::context::ProcessContext;
use crate::result::ProcessResult;
use crate::stage::{Stage, StageOutcome};

pub struct RestoreStage;

#[async_trait]
impl Stage for RestoreStage {
    fn name(&self) -> &'static str {
        "Restore"
    }

    async fn run(&self, ctx: &ProcessContext, msg: &dyn InFlightMessage, result: ProcessResult) -> StageOutcome {
        if result.object_identifier.is_empty() {
            return StageOutcome::Fail {
                note: "Restore stage received a message with no object identifier".to_string(),
            };
        }

        upsert_status(ctx, &result, ModelStatus::Started, "", true).await;

        let options = RestoreOptions {
            test_mode: ctx.restore_to_test_buckets,
            ..RestoreOptions::default()
        };
        let working_dir = ctx.working_dir.join(format!(
            "restore-{}",
            result.object_identifier.replace('/', "_")
        ));

        match restore_object(
            &ctx.catalog,
            &ctx.store,
            &working_dir,
            &result.object_identifier,
            &result.institution,
            &options,
            Some(msg),
        )
        .await
        {
            Ok(sets) => {
                let note = sets
                    .iter()
                    .map(|s| format!("{} ({} bytes)", s.url, s.size))
                    .collect::<Vec<_>>()
                    .join(", ");
                upsert_status(ctx, &result, ModelStatus::Success, &note, false).await;
                StageOutcome::Done
            }
            Err(e) if e.kind == Kind::Transient => {
                upsert_status(ctx, &result, ModelStatus::Started, &e.message, true).await;
                StageOutcome::Requeue {
                    delay: std::time::Duration::from_secs(30),
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
        stage: ModelStage::Restore.to_string(),
        status: status.to_string(),
        note: note.to_string(),
        retry,
        reviewed: result.reviewed,
        institution: result.institution.clone(),
        generic_file_identifier: None,
        object_identifier: Some(result.object_identifier.clone()),
        state: serde_json::to_string(result).ok(),
    };
    if let Err(e) = ctx.catalog.process_status_upsert(&record).await {
        tracing::warn!(error = %e, "failed to update process-status row");
    }
}
