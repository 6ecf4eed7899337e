//! A minimal NSQ wire-protocol client: enough of PUB/SUB/RDY/FIN/REQ/TOUCH
//! to drive the pipeline against a real `nsqd`.
//!
//! Publishing goes over `nsqd`'s HTTP `/pub` endpoint (simplest path for a
//! fire-and-forget publish); consuming uses the binary TCP protocol since
//! that's the only way to receive pushed messages and manage their
//! visibility timeout.

use std::sync::Arc;
use std::time::Duration;

use archivist_error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::{Bus, InFlightMessage};

const MAGIC: &[u8; 4] = b"  V2";
const FRAME_TYPE_RESPONSE: i32 = 0;
const FRAME_TYPE_ERROR: i32 = 1;
const FRAME_TYPE_MESSAGE: i32 = 2;

pub struct NsqBus {
    http: reqwest::Client,
    http_address: String,
    tcp_address: String,
    channel: String,
}

impl NsqBus {
    pub fn new(http_address: impl Into<String>, tcp_address: impl Into<String>, channel: impl Into<String>) -> Self {
        NsqBus {
            http: reqwest::Client::new(),
            http_address: http_address.into(),
            tcp_address: tcp_address.into(),
            channel: channel.into(),
        }
    }
}

#[async_trait]
impl Bus for NsqBus {
    async fn publish(&self, topic: &str, value: Value) -> Result<()> {
        let body = serde_json::to_vec(&value)
            .map_err(|e| Error::validation(format!("could not encode message for {topic}: {e}")))?;
        let url = format!("http://{}/pub?topic={topic}", self.http_address);
        let resp = self
            .http
            .post(&url)
            .body(body)
            .send()
            .await
            .map_err(|e| Error::transient(format!("PUB {topic}: {e}")))?;
        if !resp.status().is_success() {
            return Err(Error::transient(format!(
                "PUB {topic} failed with status {}",
                resp.status()
            )));
        }
        Ok(())
    }

    /// Opens a short-lived connection, subscribes, requests one message
    /// (`RDY 1`), and reads exactly one frame. Real long-running consumers
    /// would keep the connection open across calls; this adapter trades
    /// some per-call connection overhead for a much simpler state machine.
    async fn consume(&self, topic: &str) -> Result<Option<Box<dyn InFlightMessage>>> {
        let mut stream = TcpStream::connect(&self.tcp_address)
            .await
            .map_err(|e| Error::transient(format!("connecting to nsqd at {}: {e}", self.tcp_address)))?;

        stream
            .write_all(MAGIC)
            .await
            .map_err(|e| Error::transient(format!("nsq handshake: {e}")))?;

        send_command(&mut stream, &format!("SUB {topic} {}\n", self.channel)).await?;
        read_response_frame(&mut stream).await?;

        send_command(&mut stream, "RDY 1\n").await?;

        match tokio::time::timeout(Duration::from_millis(500), read_frame(&mut stream)).await {
            Ok(Ok(Some((FRAME_TYPE_MESSAGE, body)))) => {
                let (msg_id, attempts, payload_bytes) = parse_message_frame(&body)?;
                let payload: Value = serde_json::from_slice(&payload_bytes)
                    .map_err(|e| Error::validation(format!("malformed message body: {e}")))?;
                Ok(Some(Box::new(NsqMessage {
                    stream: Arc::new(AsyncMutex::new(stream)),
                    id: msg_id,
                    attempt: attempts,
                    payload,
                })))
            }
            Ok(Ok(Some((FRAME_TYPE_ERROR, body)))) => Err(Error::transient(format!(
                "nsqd error frame: {}",
                String::from_utf8_lossy(&body)
            ))),
            Ok(Ok(Some((FRAME_TYPE_RESPONSE, _)))) | Ok(Ok(None)) => Ok(None),
            Ok(Ok(Some((other, _)))) => {
                warn!(frame_type = other, "unexpected nsq frame type");
                Ok(None)
            }
            Ok(Err(e)) => Err(Error::transient(format!("reading nsq frame: {e}"))),
            Err(_timeout) => Ok(None),
        }
    }
}

struct NsqMessage {
    stream: Arc<AsyncMutex<TcpStream>>,
    id: String,
    attempt: u32,
    payload: Value,
}

#[async_trait]
impl InFlightMessage for NsqMessage {
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
        let mut stream = self.stream.lock().await;
        send_command(&mut stream, &format!("TOUCH {}\n", self.id)).await
    }

    async fn finish(self: Box<Self>) -> Result<()> {
        let mut stream = self.stream.lock().await;
        send_command(&mut stream, &format!("FIN {}\n", self.id)).await
    }

    async fn requeue(self: Box<Self>, delay: Duration) -> Result<()> {
        let mut stream = self.stream.lock().await;
        send_command(&mut stream, &format!("REQ {} {}\n", self.id, delay.as_millis())).await
    }
}

async fn send_command(stream: &mut TcpStream, command: &str) -> Result<()> {
    debug!(command = command.trim_end(), "nsq command");
    stream
        .write_all(command.as_bytes())
        .await
        .map_err(|e| Error::transient(format!("writing nsq command: {e}")))
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Option<(i32, Vec<u8>)>> {
    let mut size_buf = [0u8; 4];
    if stream.read_exact(&mut size_buf).await.is_err() {
        return Ok(None);
    }
    let size = i32::from_be_bytes(size_buf) as usize;

    let mut frame_type_buf = [0u8; 4];
    stream.read_exact(&mut frame_type_buf).await?;
    let frame_type = i32::from_be_bytes(frame_type_buf);

    let mut body = vec![0u8; size - 4];
    stream.read_exact(&mut body).await?;
    Ok(Some((frame_type, body)))
}

async fn read_response_frame(stream: &mut TcpStream) -> Result<()> {
    match read_frame(stream)
        .await
        .map_err(|e| Error::transient(format!("reading nsq response: {e}")))?
    {
        Some((FRAME_TYPE_ERROR, body)) => Err(Error::transient(format!(
            "nsqd returned error: {}",
            String::from_utf8_lossy(&body)
        ))),
        _ => Ok(()),
    }
}

/// Parses an NSQ MESSAGE frame body: 8-byte big-endian timestamp, 2-byte
/// big-endian attempts counter, 16-byte ASCII message id, remaining bytes
/// the message body.
fn parse_message_frame(body: &[u8]) -> Result<(String, u32, Vec<u8>)> {
    if body.len() < 26 {
        return Err(Error::validation("nsq MESSAGE frame shorter than header"));
    }
    let attempts = u16::from_be_bytes([body[8], body[9]]) as u32;
    let id = String::from_utf8_lossy(&body[10..26]).trim().to_string();
    let payload = body[26..].to_vec();
    Ok((id, attempts.max(1), payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_message_frame_extracts_id_attempts_and_body() {
        let mut body = Vec::new();
        body.extend_from_slice(&0i64.to_be_bytes()); // timestamp
        body.extend_from_slice(&3u16.to_be_bytes()); // attempts
        body.extend_from_slice(b"0000000000000001"); // 16-byte id
        body.extend_from_slice(b"{\"k\":1}");

        let (id, attempts, payload) = parse_message_frame(&body).unwrap();
        assert_eq!(id, "0000000000000001");
        assert_eq!(attempts, 3);
        assert_eq!(payload, b"{\"k\":1}");
    }

    #[test]
    fn parse_message_frame_rejects_short_body() {
        assert!(parse_message_frame(&[0u8; 10]).is_err());
    }
}
