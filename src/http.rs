use crate::activity::ActivityPayload;
use crate::metrics::Metrics;
use crate::state::{MiningState, SharedState};
use axum::body::Body;
use axum::extract::State;
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub state: SharedState,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiState {
    pub started_at: String,
    pub last_refresh: Option<String>,
    pub rig_count: usize,
    pub device_count: usize,
    pub unpaid_amount: Option<String>,
    pub next_payout: Option<String>,
    pub selected_device: Option<DeviceSummary>,
    pub last_activity: Option<ActivityPayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceSummary {
    pub rig_id: String,
    pub rig: String,
    pub device_id: String,
    pub name: String,
    pub device_type: String,
    pub status: String,
    pub power_usage: f64,
    pub algorithm: Option<String>,
    pub speed: Option<String>,
}

impl ApiState {
    fn collect(state: &SharedState) -> Self {
        let mining = state.mining();
        let mining = mining.as_deref();
        Self {
            started_at: rfc3339(state.started_at()),
            last_refresh: mining.map(|m| rfc3339(m.refreshed_at)),
            rig_count: mining.map_or(0, |m| m.snapshot.mining_rigs.len()),
            device_count: mining.map_or(0, |m| m.snapshot.device_count()),
            unpaid_amount: mining.map(|m| m.snapshot.unpaid_amount.clone()),
            next_payout: mining.map(|m| rfc3339(m.snapshot.next_payout_timestamp)),
            selected_device: mining.and_then(DeviceSummary::from_state),
            last_activity: state.last_activity(),
        }
    }
}

impl DeviceSummary {
    fn from_state(mining: &MiningState) -> Option<Self> {
        let at = mining.selected?;
        let rig = mining.snapshot.mining_rigs.get(at.rig)?;
        let device = mining.snapshot.device_at(at)?;
        let speed = device.speeds.first();
        Some(Self {
            rig_id: rig.rig_id.clone(),
            rig: rig.name.clone(),
            device_id: device.id.clone(),
            name: device.name.clone(),
            device_type: device.device_type.enum_name.clone(),
            status: device.status.enum_name.clone(),
            power_usage: device.power_usage,
            algorithm: speed.map(|s| format!("{} ({})", s.title, s.algorithm)),
            speed: speed.map(|s| format!("{:.2} {}/s", s.speed, s.display_suffix)),
        })
    }
}

fn rfc3339(at: SystemTime) -> String {
    humantime::format_rfc3339_seconds(at).to_string()
}

pub fn build_router(metrics: Arc<Metrics>, state: SharedState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/state", get(state_handler))
        .with_state(HttpAppState { metrics, state })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(app): State<HttpAppState>) -> Response {
    app.metrics.inc_scrape_count();
    app.metrics.update_from_state(&app.state);
    match app.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn state_handler(State(app): State<HttpAppState>) -> impl IntoResponse {
    Json(ApiState::collect(&app.state))
}
