pub mod auth;

use crate::model::RigSnapshot;
use async_trait::async_trait;
use auth::{auth_header, Credentials, SignedRequest};
use hmac::digest::InvalidLength;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub const RIGS_PATH: &str = "/main/api/v2/mining/rigs2";
pub const TIME_PATH: &str = "/api/v2/time";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("NiceHash rejected the credentials (HTTP {status})")]
    Auth { status: u16 },
    #[error("NiceHash request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("NiceHash answered HTTP {status}")]
    Status { status: u16 },
    #[error("unexpected NiceHash response: {0}")]
    Schema(#[from] serde_json::Error),
    #[error("cannot sign NiceHash request: {0}")]
    Signing(#[from] InvalidLength),
}

impl TelemetryError {
    /// Label used for the fetch error counter.
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryError::Auth { .. } | TelemetryError::Signing(_) => "auth",
            TelemetryError::Network(_) | TelemetryError::Status { .. } => "network",
            TelemetryError::Schema(_) => "schema",
        }
    }
}

#[async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch(&self) -> Result<RigSnapshot, TelemetryError>;
}

#[async_trait]
impl<T> TelemetrySource for Arc<T>
where
    T: TelemetrySource + ?Sized,
{
    async fn fetch(&self) -> Result<RigSnapshot, TelemetryError> {
        (**self).fetch().await
    }
}

#[derive(Debug, Clone)]
pub struct NiceHashClient {
    http: Client,
    base_url: String,
    credentials: Credentials,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerTime {
    server_time: u64,
}

impl NiceHashClient {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Credentials,
    ) -> Result<Self, TelemetryError> {
        let http = Client::builder()
            .user_agent(concat!("nicehash-presence/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }

    // Signing with the server clock keeps requests valid on hosts with skew.
    async fn signing_time_ms(&self) -> u64 {
        match self.server_time_ms().await {
            Ok(ms) => ms,
            Err(err) => {
                debug!(error = %err, "server time unavailable, signing with local clock");
                local_time_ms()
            }
        }
    }

    async fn server_time_ms(&self) -> Result<u64, TelemetryError> {
        let resp = self
            .http
            .get(format!("{}{}", self.base_url, TIME_PATH))
            .send()
            .await?;
        let body = check_status(resp)?.bytes().await?;
        let time: ServerTime = serde_json::from_slice(&body)?;
        Ok(time.server_time)
    }
}

#[async_trait]
impl TelemetrySource for NiceHashClient {
    async fn fetch(&self) -> Result<RigSnapshot, TelemetryError> {
        let time_ms = self.signing_time_ms().await;
        let nonce = Uuid::new_v4().to_string();
        let request_id = Uuid::new_v4().to_string();
        let auth = auth_header(
            &self.credentials,
            &SignedRequest {
                time_ms,
                nonce: &nonce,
                method: "GET",
                path: RIGS_PATH,
                query: "",
            },
        )?;

        let resp = self
            .http
            .get(format!("{}{}", self.base_url, RIGS_PATH))
            .header("X-Time", time_ms.to_string())
            .header("X-Nonce", &nonce)
            .header("X-Organization-Id", &self.credentials.org_id)
            .header("X-Request-Id", &request_id)
            .header("X-Auth", auth)
            .send()
            .await?;
        let body = check_status(resp)?.bytes().await?;
        let snapshot: RigSnapshot = serde_json::from_slice(&body)?;

        debug!(
            request_id = %request_id,
            rigs = snapshot.mining_rigs.len(),
            devices = snapshot.device_count(),
            "rigs fetched"
        );
        Ok(snapshot)
    }
}

fn check_status(resp: Response) -> Result<Response, TelemetryError> {
    let status = resp.status();
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(TelemetryError::Auth {
            status: status.as_u16(),
        }),
        s if !s.is_success() => Err(TelemetryError::Status {
            status: status.as_u16(),
        }),
        _ => Ok(resp),
    }
}

fn local_time_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
