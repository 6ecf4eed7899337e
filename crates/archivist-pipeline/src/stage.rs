//! The `Stage` trait every pipeline worker implements, and the outcome
//! enumeration its `run` returns (spec §4.G's state-transition table).

use archivist_bus::InFlightMessage;
use async_trait::async_trait;
use std::time::Duration;

use crate::context::ProcessContext;
use crate::result::ProcessResult;

pub enum StageOutcome {
    /// Success: publish `result` to `next_topic` and finish the input message.
    Advance {
        next_topic: &'static str,
        result: ProcessResult,
    },
    /// Transient failure: requeue the input message after `delay`.
    Requeue { delay: Duration, note: String },
    /// Permanent failure: mark the process-status row Failed and finish
    /// the input message without publishing further.
    Fail { note: String },
    /// Terminal success: nothing further to publish (Cleanup is the last
    /// stage of the ingest pipeline).
    Done,
}

#[async_trait]
pub trait Stage: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        ctx: &ProcessContext,
        msg: &dyn InFlightMessage,
        result: ProcessResult,
    ) -> StageOutcome;
}
