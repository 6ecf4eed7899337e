//! Unpack stage: run `Untar` + `ReadBag`, then diff payload files against
//! the catalog's existing record to decide which ones actually need
//! storing (spec §4.G).

use std::path::Path;

use archivist_bag::{read_bag, untar};
use archivist_bus::InFlightMessage;
use archivist_catalog::ProcessStatusDto;
use archivist_model::process_status::{Stage as ModelStage, Status as ModelStatus};
use async_trait::async_trait;

use crate::context::ProcessContext;
use crate::result::ProcessResult;
use crate::stage::{Stage, StageOutcome};

pub struct UnpackStage;

#[async_trait]
impl Stage for UnpackStage {
    fn name(&self) -> &'static str {
        "Unpack"
    }

    async fn run(&self, ctx: &ProcessContext, _msg: &dyn InFlightMessage, mut result: ProcessResult) -> StageOutcome {
        let Some(local_tar_path) = result.local_tar_path.clone() else {
            return StageOutcome::Fail {
                note: "Unpack stage received a message with no local tar path".to_string(),
            };
        };
        let tar_path = Path::new(&local_tar_path);

        let tar_result = match untar(tar_path, &result.institution, true) {
            Ok(tar_result) => tar_result,
            Err(e) => {
                mark_failed(ctx, &result, &e.message).await;
                return StageOutcome::Fail { note: e.message };
            }
        };

        if !tar_result.is_ok() {
            let note = tar_result.error_message.clone().unwrap_or_default();
            mark_failed(ctx, &result, &note).await;
            return StageOutcome::Fail { note };
        }

        let bag_dir = Path::new(&tar_result.output_dir).join(&result.clean_bag_name);
        let bag_read = match read_bag(&bag_dir) {
            Ok(bag_read) => bag_read,
            Err(e) => {
                let note = format!("could not read bag directory {}: {e}", bag_dir.display());
                mark_failed(ctx, &result, &note).await;
                return StageOutcome::Fail { note };
            }
        };

        if !bag_read.is_valid() {
            let note = bag_read.error_message.clone().unwrap_or_default();
            mark_failed(ctx, &result, &note).await;
            return StageOutcome::Fail { note };
        }

        let mut tar_result = tar_result;
        mark_unchanged_files_as_not_needing_save(ctx, &mut tar_result.files).await;

        result.tar_result = Some(tar_result);
        result.bag_read_result = Some(bag_read);

        upsert_status(ctx, &result, ModelStatus::Started, "", true).await;

        StageOutcome::Advance {
            next_topic: crate::TOPIC_STORE,
            result,
        }
    }
}

/// Files whose MD5 matches an existing file at the same relative path are
/// left alone in Store and keep their existing events (spec §4.G "An
/// already-existing preservation object... files whose MD5 matches an
/// existing file at the same relative path set needs-save=false").
async fn mark_unchanged_files_as_not_needing_save(
    ctx: &ProcessContext,
    files: &mut [archivist_model::PayloadFile],
) {
    for file in files.iter_mut() {
        match ctx.catalog.file_get(&file.friendly_identifier).await {
            Ok(Some(existing)) if existing.payload.md5 == file.md5 => {
                file.needs_save = false;
            }
            _ => {}
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
        stage: ModelStage::Unpack.to_string(),
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
