//! Cleanup stage: releases the disk reservation, removes local working
//! files, and optionally deletes the source key from the drop bucket
//! (spec §4.G).

use archivist_bus::InFlightMessage;
use archivist_catalog::ProcessStatusDto;
use archivist_model::process_status::{Stage as ModelStage, Status as ModelStatus};
use async_trait::async_trait;

use crate::context::ProcessContext;
use crate::result::ProcessResult;
use crate::stage::{Stage, StageOutcome};

pub struct CleanupStage {
    /// Delete the drop-bucket source object once Record succeeds and the
    /// bag has been reviewed, or a deployment opts in regardless (spec
    /// §4.G "iff record stage succeeded and reviewed flag is true (or
    /// policy opts in)").
    pub delete_on_success: bool,
}

#[async_trait]
impl Stage for CleanupStage {
    fn name(&self) -> &'static str {
        "Cleanup"
    }

    async fn run(&self, ctx: &ProcessContext, _msg: &dyn InFlightMessage, result: ProcessResult) -> StageOutcome {
        ctx.disk.release(result.size);
        ctx.inflight.unregister(&result.in_flight_key());

        if let Some(tar_path) = &result.local_tar_path {
            tokio::fs::remove_file(tar_path).await.ok();
        }
        if let Some(tar_result) = &result.tar_result {
            let bag_dir = std::path::Path::new(&tar_result.output_dir).join(&result.clean_bag_name);
            tokio::fs::remove_dir_all(&bag_dir).await.ok();
        }

        let record_succeeded = result.error_message.is_none();
        if record_succeeded && (result.reviewed || self.delete_on_success) {
            if let Err(e) = ctx.store.delete(&result.bucket, &result.key).await {
                // "retry delete" (spec §4.G) — log and move on rather than
                // blocking Cleanup from completing on a delete failure.
                tracing::warn!(error = %e, bag = result.key, "failed to delete source key from drop bucket");
            }
        }

        upsert_status(ctx, &result, ModelStatus::Success, "", false).await;

        StageOutcome::Done
    }
}

async fn upsert_status(ctx: &ProcessContext, result: &ProcessResult, status: ModelStatus, note: &str, retry: bool) {
    let record = ProcessStatusDto {
        id: result.process_status_id,
        name: result.clean_bag_name.clone(),
        bucket: result.bucket.clone(),
        bag_date: chrono::Utc::now(),
        etag: result.etag.clone(),
        stage: ModelStage::Cleanup.to_string(),
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
