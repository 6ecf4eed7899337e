//! In-process bus implementation: a per-topic FIFO queue behind a mutex, for
//! tests and for running a whole pipeline in a single binary without a real
//! NSQ deployment.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use archivist_error::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::{Bus, InFlightMessage};

struct Envelope {
    id: String,
    attempt: u32,
    payload: Value,
}

#[derive(Default)]
pub struct MemoryBus {
    topics: Mutex<HashMap<String, VecDeque<Envelope>>>,
    next_id: Mutex<u64>,
}

impl MemoryBus {
    pub fn new() -> Self {
        MemoryBus::default()
    }

    fn fresh_id(&self) -> String {
        let mut next = self.next_id.lock();
        *next += 1;
        format!("mem-{next}")
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn publish(&self, topic: &str, value: Value) -> Result<()> {
        let envelope = Envelope {
            id: self.fresh_id(),
            attempt: 1,
            payload: value,
        };
        self.topics
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push_back(envelope);
        Ok(())
    }

    async fn consume(&self, topic: &str) -> Result<Option<Box<dyn InFlightMessage>>> {
        let mut topics = self.topics.lock();
        let queue = match topics.get_mut(topic) {
            Some(q) => q,
            None => return Ok(None),
        };
        Ok(queue.pop_front().map(|envelope| {
            Box::new(MemoryMessage {
                id: envelope.id,
                attempt: envelope.attempt,
                payload: envelope.payload,
            }) as Box<dyn InFlightMessage>
        }))
    }
}

/// Requeue target shared between a bus and the in-flight messages it hands
/// out, so `requeue()` can put the envelope back without borrowing the bus.
pub struct MemoryMessage {
    id: String,
    attempt: u32,
    payload: Value,
}

#[async_trait]
impl InFlightMessage for MemoryMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }

    fn payload(&self) -> &Value {
        &self.payload
    }

    async fn touch(&self) -> Result<()> {
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn requeue(self: Box<Self>, _delay: Duration) -> Result<()> {
        Ok(())
    }
}

/// A `MemoryBus` that actually redelivers requeued messages, used where
/// tests need to observe the attempts counter climb.
pub struct RequeueingMemoryBus {
    inner: Arc<MemoryBus>,
}

impl RequeueingMemoryBus {
    pub fn new() -> Self {
        RequeueingMemoryBus {
            inner: Arc::new(MemoryBus::new()),
        }
    }
}

impl Default for RequeueingMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for RequeueingMemoryBus {
    async fn publish(&self, topic: &str, value: Value) -> Result<()> {
        self.inner.publish(topic, value).await
    }

    async fn consume(&self, topic: &str) -> Result<Option<Box<dyn InFlightMessage>>> {
        let mut topics = self.inner.topics.lock();
        let queue = match topics.get_mut(topic) {
            Some(q) => q,
            None => return Ok(None),
        };
        Ok(queue.pop_front().map(|envelope| {
            Box::new(RequeueingMessage {
                bus: self.inner.clone(),
                topic: topic.to_string(),
                id: envelope.id,
                attempt: envelope.attempt,
                payload: envelope.payload,
            }) as Box<dyn InFlightMessage>
        }))
    }
}

struct RequeueingMessage {
    bus: Arc<MemoryBus>,
    topic: String,
    id: String,
    attempt: u32,
    payload: Value,
}

#[async_trait]
impl InFlightMessage for RequeueingMessage {
    fn id(&self) -> &str {
        &self.id
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }

    fn payload(&self) -> &Value {
        &self.payload
    }

    async fn touch(&self) -> Result<()> {
        Ok(())
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        Ok(())
    }

    async fn requeue(self: Box<Self>, _delay: Duration) -> Result<()> {
        let envelope = Envelope {
            id: self.id,
            attempt: self.attempt + 1,
            payload: self.payload,
        };
        self.bus
            .topics
            .lock()
            .entry(self.topic)
            .or_default()
            .push_back(envelope);
        Ok(())
    }
}
