//! Message bus adapter (spec §4.F): at-least-once delivery, a `touch()` /
//! `finish()` / `requeue()` message handle, and two implementations — an
//! in-process `MemoryBus` for tests and a real NSQ wire-protocol adapter.
//!
//! Grounded on the dispatch-loop shape of the teacher's `agent::handlers`
//! module (a `Handler`-style trait consumed by a poll loop), generalized
//! from a Postgres-`LISTEN`-driven single process to a networked bus.

pub mod memory;
pub mod nsq;

use std::time::Duration;

use archivist_error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Per-message timeout default (spec §4.F): ~12 minutes.
pub const DEFAULT_MSG_TIMEOUT: Duration = Duration::from_secs(12 * 60);
/// Hard cap on cumulative per-message timeout extensions via `touch()`.
pub const MAX_MSG_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// A bus topic producer/consumer.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish(&self, topic: &str, value: Value) -> Result<()>;

    /// Non-blocking poll: `Ok(None)` means no message is currently
    /// available on `topic`.
    async fn consume(&self, topic: &str) -> Result<Option<Box<dyn InFlightMessage>>>;
}

/// A single delivered message, carrying enough state to extend its own
/// visibility timeout or resolve it (spec §4.F).
#[async_trait]
pub trait InFlightMessage: Send + Sync {
    fn id(&self) -> &str;
    fn attempt(&self) -> u32;
    fn payload(&self) -> &Value;

    /// Extends the message's visibility timeout. Workers MUST call this at
    /// every step boundary of an operation whose wall-clock may exceed the
    /// base timeout (spec §4.F, §4.H).
    async fn touch(&self) -> Result<()>;

    async fn finish(self: Box<Self>) -> Result<()>;

    async fn requeue(self: Box<Self>, delay: Duration) -> Result<()>;
}
