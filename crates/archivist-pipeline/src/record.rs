//! Record stage: creates or updates the preservation object in the catalog
//! with all files and their deterministic event sequence (spec §4.G).

use archivist_bus::InFlightMessage;
use archivist_catalog::{dto_files_from, EntityKind, NewPreservationObject, ProcessStatusDto};
use archivist_model::ingest_event_sequence;
use archivist_model::process_status::{Stage as ModelStage, Status as ModelStatus};
use async_trait::async_trait;

use crate::context::ProcessContext;
use crate::result::ProcessResult;
use crate::stage::{Stage, StageOutcome};

pub struct RecordStage;

#[async_trait]
impl Stage for RecordStage {
    fn name(&self) -> &'static str {
        "Record"
    }

    async fn run(&self, ctx: &ProcessContext, _msg: &dyn InFlightMessage, result: ProcessResult) -> StageOutcome {
        let Some(tar_result) = result.tar_result.as_ref() else {
            return StageOutcome::Fail {
                note: "Record stage received a message with no tar result".to_string(),
            };
        };
        let Some(bag_read) = result.bag_read_result.as_ref() else {
            return StageOutcome::Fail {
                note: "Record stage received a message with no bag-read result".to_string(),
            };
        };

        let title = bag_read.tag("title").unwrap_or_default().to_string();
        let access = bag_read.tag("access").or_else(|| bag_read.tag("rights")).unwrap_or_default();

        let new_object = NewPreservationObject {
            identifier: result.object_identifier.clone(),
            institution: result.institution.clone(),
            title,
            description: bag_read.tag("description").unwrap_or_default().to_string(),
            access: access.to_lowercase(),
            tags: bag_read.tags.clone(),
            files: dto_files_from(&result.object_identifier, &tar_result.files),
        };

        let object_exists = matches!(ctx.catalog.object_get(&result.object_identifier, false).await, Ok(Some(_)));

        let saved = if object_exists {
            ctx.catalog.object_update(&result.object_identifier, &new_object).await
        } else {
            ctx.catalog.object_create(&new_object).await
        };

        if let Err(e) = saved {
            mark_failed(ctx, &result, &e.message).await;
            return StageOutcome::Fail { note: e.message };
        }

        for file in &tar_result.files {
            if !file.needs_save {
                continue;
            }
            for event in ingest_event_sequence(file, &ctx.agent) {
                if let Err(e) = ctx
                    .catalog
                    .event_save(EntityKind::File, &file.friendly_identifier, &event)
                    .await
                {
                    tracing::warn!(error = %e, file_identifier = %file.friendly_identifier, "failed to save event");
                }
            }
        }

        upsert_status(ctx, &result, ModelStatus::Success, "", false).await;

        StageOutcome::Advance {
            next_topic: crate::TOPIC_CLEANUP,
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
        stage: ModelStage::Record.to_string(),
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
