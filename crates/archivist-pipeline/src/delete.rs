//! Delete stage: removes one generic file's preservation copy from object
//! storage and its catalog record (spec §3's Delete-pipeline generic-file
//! identifier; populated from `items_pending_delete`).

use archivist_bus::InFlightMessage;
use archivist_catalog::ProcessStatusDto;
use archivist_error::{Error, Kind};
use archivist_model::process_status::{Stage as ModelStage, Status as ModelStatus};
use archivist_objectstore::parse_s3_uri;
use async_trait::async_trait;

use crate::context::ProcessContext;
use crate::result::ProcessResult;
use crate::stage::{Stage, StageOutcome};

pub struct DeleteStage;

#[async_trait]
impl Stage for DeleteStage {
    fn name(&self) -> &'static str {
        "Delete"
    }

    async fn run(&self, ctx: &ProcessContext, _msg: &dyn InFlightMessage, result: ProcessResult) -> StageOutcome {
        let Some(file_identifier) = result.generic_file_identifier.clone() else {
            return StageOutcome::Fail {
                note: "Delete stage received a message with no generic file identifier".to_string(),
            };
        };

        upsert_status(ctx, &result, ModelStatus::Started, "", true).await;

        let outcome = self.delete_file(ctx, &file_identifier).await;
        match outcome {
            Ok(()) => {
                upsert_status(ctx, &result, ModelStatus::Success, "", false).await;
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

impl DeleteStage {
    async fn delete_file(&self, ctx: &ProcessContext, file_identifier: &str) -> archivist_error::Result<()> {
        let file = ctx
            .catalog
            .file_get(file_identifier)
            .await?
            .ok_or_else(|| Error::not_found(format!("file {file_identifier} does not exist in the catalog")))?;

        if let Some(storage_url) = &file.payload.storage_url {
            let (bucket, key) = parse_s3_uri(storage_url)?;
            ctx.store.delete(&bucket, &key).await?;
        }

        ctx.catalog.file_delete(file_identifier).await
    }
}

async fn upsert_status(ctx: &ProcessContext, result: &ProcessResult, status: ModelStatus, note: &str, retry: bool) {
    let record = ProcessStatusDto {
        id: result.process_status_id,
        name: result.clean_bag_name.clone(),
        bucket: result.bucket.clone(),
        bag_date: chrono::Utc::now(),
        etag: result.etag.clone(),
        stage: ModelStage::Delete.to_string(),
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
