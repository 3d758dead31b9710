pub mod codec;
pub mod transport;

use crate::activity::ActivityPayload;
use async_trait::async_trait;
use codec::{IpcCodec, IpcFrame, Opcode};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tracing::debug;
use uuid::Uuid;

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(5);
// Discord refuses activity fields longer than this.
const MAX_FIELD_CHARS: usize = 128;

#[derive(Debug, Error)]
pub enum PresenceError {
    #[error("discord ipc i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("discord closed the connection: {0}")]
    Closed(String),
    #[error("discord rejected the request: {0}")]
    Rejected(String),
    #[error("timed out waiting for discord")]
    Timeout,
}

/// A ready presence connection.
#[async_trait]
pub trait PresenceChannel: Send {
    async fn set_activity(&mut self, payload: &ActivityPayload) -> Result<(), PresenceError>;
    async fn clear_activity(&mut self) -> Result<(), PresenceError>;
    async fn close(&mut self) -> Result<(), PresenceError>;
}

/// Opens presence connections; `connect` resolves once the client is ready.
#[async_trait]
pub trait PresenceConnector: Send + Sync {
    type Channel: PresenceChannel;

    async fn connect(&self) -> Result<Self::Channel, PresenceError>;
}

pub struct IpcClient<S> {
    framed: Framed<S, IpcCodec>,
    pid: u32,
}

impl<S> IpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Sends the handshake and waits for the `READY` dispatch.
    pub async fn handshake(stream: S, client_id: &str) -> Result<Self, PresenceError> {
        let mut client = Self {
            framed: Framed::new(stream, IpcCodec),
            pid: std::process::id(),
        };
        client
            .framed
            .send(IpcFrame::new(
                Opcode::Handshake,
                json!({ "v": 1, "client_id": client_id }),
            ))
            .await?;

        timeout(RESPONSE_TIMEOUT, client.wait_ready())
            .await
            .map_err(|_| PresenceError::Timeout)??;
        Ok(client)
    }

    async fn wait_ready(&mut self) -> Result<(), PresenceError> {
        loop {
            let frame = self.next_frame().await?;
            if frame.body["cmd"] == "DISPATCH" && frame.body["evt"] == "READY" {
                debug!(
                    user = %frame.body["data"]["user"]["username"],
                    "discord ipc ready"
                );
                return Ok(());
            }
        }
    }

    async fn next_frame(&mut self) -> Result<IpcFrame, PresenceError> {
        loop {
            let frame = match self.framed.next().await {
                Some(frame) => frame?,
                None => return Err(PresenceError::Closed("socket closed".to_string())),
            };
            match frame.opcode {
                Opcode::Ping => {
                    self.framed
                        .send(IpcFrame::new(Opcode::Pong, frame.body))
                        .await?;
                }
                Opcode::Close => {
                    let reason = frame.body["message"]
                        .as_str()
                        .unwrap_or("no reason given")
                        .to_string();
                    return Err(PresenceError::Closed(reason));
                }
                Opcode::Pong => {}
                Opcode::Handshake | Opcode::Frame => return Ok(frame),
            }
        }
    }

    async fn set_activity_value(&mut self, activity: Value) -> Result<(), PresenceError> {
        let nonce = Uuid::new_v4().to_string();
        self.framed
            .send(IpcFrame::new(
                Opcode::Frame,
                json!({
                    "cmd": "SET_ACTIVITY",
                    "args": { "pid": self.pid, "activity": activity },
                    "nonce": nonce,
                }),
            ))
            .await?;

        timeout(RESPONSE_TIMEOUT, self.await_reply(&nonce))
            .await
            .map_err(|_| PresenceError::Timeout)?
    }

    async fn await_reply(&mut self, nonce: &str) -> Result<(), PresenceError> {
        loop {
            let frame = self.next_frame().await?;
            if frame.body["nonce"] != nonce {
                continue;
            }
            if frame.body["evt"] == "ERROR" {
                let message = frame.body["data"]["message"]
                    .as_str()
                    .unwrap_or("unknown error")
                    .to_string();
                return Err(PresenceError::Rejected(message));
            }
            return Ok(());
        }
    }
}

#[async_trait]
impl<S> PresenceChannel for IpcClient<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn set_activity(&mut self, payload: &ActivityPayload) -> Result<(), PresenceError> {
        self.set_activity_value(activity_json(payload)).await
    }

    async fn clear_activity(&mut self) -> Result<(), PresenceError> {
        self.set_activity_value(Value::Null).await
    }

    async fn close(&mut self) -> Result<(), PresenceError> {
        self.framed
            .send(IpcFrame::new(Opcode::Close, json!({})))
            .await?;
        SinkExt::close(&mut self.framed).await?;
        Ok(())
    }
}

pub fn activity_json(payload: &ActivityPayload) -> Value {
    json!({
        "details": clip(&payload.details),
        "state": clip(&payload.state),
        "timestamps": { "start": payload.start_timestamp_ms },
        "assets": {
            "large_image": payload.large_image_key,
            "large_text": clip(&payload.large_image_text),
        },
        "instance": payload.instance,
    })
}

fn clip(text: &str) -> String {
    text.chars().take(MAX_FIELD_CHARS).collect()
}

/// Connects over the local Discord socket.
#[derive(Debug, Clone)]
pub struct IpcConnector {
    client_id: String,
}

impl IpcConnector {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
        }
    }
}

#[async_trait]
impl PresenceConnector for IpcConnector {
    type Channel = IpcClient<transport::IpcStream>;

    async fn connect(&self) -> Result<Self::Channel, PresenceError> {
        let stream = transport::connect().await?;
        IpcClient::handshake(stream, &self.client_id).await
    }
}
