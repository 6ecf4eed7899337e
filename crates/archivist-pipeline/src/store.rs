//! Store stage: streams every payload file whose `needs_save` flag is set
//! to the preservation bucket, keyed by its UUID. Idempotent — a requeued
//! Store message skips files a prior attempt already uploaded (spec §4.G).

use std::path::Path;

use archivist_bus::InFlightMessage;
use archivist_catalog::ProcessStatusDto;
use archivist_error::Kind;
use archivist_model::process_status::{Stage as ModelStage, Status as ModelStatus};
use archivist_objectstore::make_options;
use async_trait::async_trait;
use chrono::Utc;

use crate::context::ProcessContext;
use crate::result::ProcessResult;
use crate::stage::{Stage, StageOutcome};

pub struct StoreStage;

#[async_trait]
impl Stage for StoreStage {
    fn name(&self) -> &'static str {
        "Store"
    }

    async fn run(&self, ctx: &ProcessContext, _msg: &dyn InFlightMessage, mut result: ProcessResult) -> StageOutcome {
        let file_count = match result.tar_result.as_ref() {
            Some(tar_result) => tar_result.files.len(),
            None => {
                return StageOutcome::Fail {
                    note: "Store stage received a message with no tar result".to_string(),
                }
            }
        };

        // Indexed rather than an `iter_mut()` held across the loop, so each
        // iteration's borrow of `result.tar_result` ends before the status
        // helpers below need to borrow all of `result` to build a DTO.
        for index in 0..file_count {
            let tar_result = result.tar_result.as_ref().unwrap();
            let file = &tar_result.files[index];
            if !file.needs_save || file.stored_at.is_some() {
                continue;
            }
            let local_path = Path::new(&tar_result.output_dir)
                .join(&result.clean_bag_name)
                .join(&file.relative_path);

            let bytes = match tokio::fs::read(&local_path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    let note = format!("could not read {}: {e}", local_path.display());
                    mark_failed(ctx, &result, &note).await;
                    return StageOutcome::Fail { note };
                }
            };

            let tar_result = result.tar_result.as_ref().unwrap();
            let file = &tar_result.files[index];
            let options = make_options(
                None,
                vec![
                    ("institution".to_string(), result.institution.clone()),
                    ("bag".to_string(), result.clean_bag_name.clone()),
                    ("bagpath".to_string(), file.relative_path.clone()),
                    ("md5".to_string(), file.md5.clone()),
                ],
            );
            let mime = file.mime_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
            let key = file.id.to_string();
            let md5 = file.md5.clone();

            match ctx
                .store
                .save(&ctx.preservation_bucket, &key, &mime, bytes.into(), &options)
                .await
            {
                Ok(url) => {
                    let file = &mut result.tar_result.as_mut().unwrap().files[index];
                    file.storage_url = Some(url);
                    file.store_reported_md5 = Some(md5);
                    file.stored_at = Some(Utc::now());
                }
                Err(e) if e.kind == Kind::Transient => {
                    upsert_status(ctx, &result, ModelStatus::Started, &e.message, true).await;
                    return StageOutcome::Requeue {
                        delay: std::time::Duration::from_secs(5),
                        note: e.message,
                    };
                }
                Err(e) => {
                    mark_failed(ctx, &result, &e.message).await;
                    return StageOutcome::Fail { note: e.message };
                }
            }
        }

        upsert_status(ctx, &result, ModelStatus::Started, "", true).await;

        StageOutcome::Advance {
            next_topic: crate::TOPIC_RECORD,
            result,
        }
    }
}

async fn mark_failed(ctx: &ProcessContext, result: &ProcessResult, note: &str) {
    upsert_status(ctx, result, ModelStatus::Failed, note, false).await;
}

async fn upsert_status(ctx: &ProcessContext, result: &ProcessResult, status: ModelStatus, note: &str, retry: bool) {
    let record = ProcessStatusDto {
        id: result.process_status_id,
        name: result.clean_bag_name.clone(),
        bucket: result.bucket.clone(),
        bag_date: chrono::Utc::now(),
        etag: result.etag.clone(),
        stage: ModelStage::Store.to_string(),
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
