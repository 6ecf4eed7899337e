//! Fetch stage: download the bag's tar file from the drop bucket to the
//! working volume, reserving disk space and guarding against duplicate
//! in-flight processing first (spec §4.G).

use std::time::Duration;

use archivist_bus::InFlightMessage;
use archivist_catalog::ProcessStatusDto;
use archivist_error::Kind;
use archivist_model::process_status::{Stage as ModelStage, Status as ModelStatus};
use async_trait::async_trait;
use tracing::info;

use crate::context::ProcessContext;
use crate::result::ProcessResult;
use crate::stage::{Stage, StageOutcome};

pub struct FetchStage;

#[async_trait]
impl Stage for FetchStage {
    fn name(&self) -> &'static str {
        "Fetch"
    }

    async fn run(&self, ctx: &ProcessContext, _msg: &dyn InFlightMessage, mut result: ProcessResult) -> StageOutcome {
        let in_flight_key = result.in_flight_key();
        let local_tar_path = ctx.working_dir.join(format!("{}.tar", result.clean_bag_name));

        if ctx.inflight.is_in_progress(&in_flight_key, &local_tar_path) {
            return StageOutcome::Requeue {
                delay: Duration::from_secs(5),
                note: format!("{in_flight_key} already in progress, requeueing without marking Started"),
            };
        }

        let msg_id = uuid::Uuid::new_v4().to_string();
        if let Err(e) = ctx.inflight.register(&in_flight_key, &msg_id) {
            return StageOutcome::Requeue {
                delay: Duration::from_secs(5),
                note: e.message,
            };
        }

        if let Err(e) = ctx.disk.reserve(result.size) {
            ctx.inflight.unregister(&in_flight_key);
            return StageOutcome::Fail {
                note: format!("could not reserve disk space: {}", e.message),
            };
        }

        upsert_status(ctx, &result, ModelStatus::Started, "", true).await;

        match ctx.store.fetch_to_file(&result.bucket, &result.key, &local_tar_path).await {
            Ok(fetch) => {
                info!(bag = %in_flight_key, size = fetch.size, "fetched bag to working volume");
                result.local_tar_path = Some(local_tar_path.display().to_string());
                StageOutcome::Advance {
                    next_topic: crate::TOPIC_UNPACK,
                    result,
                }
            }
            Err(e) if e.kind == Kind::Transient => {
                StageOutcome::Requeue {
                    delay: Duration::from_secs(5),
                    note: e.message,
                }
            }
            Err(e) => {
                ctx.disk.release(result.size);
                ctx.inflight.unregister(&in_flight_key);
                tokio::fs::remove_file(&local_tar_path).await.ok();
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
        stage: ModelStage::Fetch.to_string(),
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
