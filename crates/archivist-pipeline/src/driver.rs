//! The generic poll-run-act loop shared by every stage worker: consume one
//! message, touch it before and after the stage body, and act on the
//! returned [`StageOutcome`] (spec §4.F "Workers MUST call `touch()`
//! periodically", §4.G per-stage table).

use std::sync::Arc;
use std::time::Duration;

use archivist_bus::Bus;
use tracing::{error, info, warn};

use crate::context::ProcessContext;
use crate::result::ProcessResult;
use crate::stage::{Stage, StageOutcome};

/// Runs `stage` against messages on `topic` until `ctx.shutdown` fires.
/// Each iteration is one message processed to completion before the next
/// is taken (spec §5 "Each worker processes one message to completion
/// before taking another").
pub async fn run_worker(bus: Arc<dyn Bus>, topic: &'static str, stage: Arc<dyn Stage>, ctx: ProcessContext) {
    info!(stage = stage.name(), topic, "worker starting");

    while !ctx.is_shutting_down() {
        let msg = match bus.consume(topic).await {
            Ok(Some(msg)) => msg,
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(250)).await;
                continue;
            }
            Err(e) => {
                warn!(stage = stage.name(), error = %e, "consume failed, backing off");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        let result: ProcessResult = match serde_json::from_value(msg.payload().clone()) {
            Ok(result) => result,
            Err(e) => {
                error!(stage = stage.name(), error = %e, "malformed message body, dropping");
                msg.finish().await.ok();
                continue;
            }
        };

        if let Err(e) = msg.touch().await {
            warn!(stage = stage.name(), error = %e, "touch before stage failed");
        }

        let started = std::time::Instant::now();
        let outcome = stage.run(&ctx, msg.as_ref(), result).await;
        let duration_ms = started.elapsed().as_millis();
        info!(stage = stage.name(), duration_ms, "stage finished");

        if let Err(e) = msg.touch().await {
            warn!(stage = stage.name(), error = %e, "touch after stage failed");
        }

        match outcome {
            StageOutcome::Advance { next_topic, result } => {
                let payload = match serde_json::to_value(&result) {
                    Ok(v) => v,
                    Err(e) => {
                        error!(stage = stage.name(), error = %e, "could not encode result for next stage");
                        msg.finish().await.ok();
                        continue;
                    }
                };
                if let Err(e) = bus.publish(next_topic, payload).await {
                    error!(stage = stage.name(), next_topic, error = %e, "publish to next stage failed");
                }
                msg.finish().await.ok();
            }
            StageOutcome::Requeue { delay, note } => {
                warn!(stage = stage.name(), note, "requeueing message");
                msg.requeue(delay).await.ok();
            }
            StageOutcome::Fail { note } => {
                error!(stage = stage.name(), note, "stage failed permanently");
                msg.finish().await.ok();
            }
            StageOutcome::Done => {
                msg.finish().await.ok();
            }
        }
    }

    info!(stage = stage.name(), topic, "worker shutting down");
}
