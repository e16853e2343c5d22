//! Gateway HTTP server: webhook bridges into the inbound queue, plus health and status.

use crate::events::{EventSender, InboundEvent, MonitoringAlert, PushEvent, RelayMessage};
use crate::status::StatusAggregator;
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the relay token on `/message`.
pub const AUTH_HEADER: &str = "Beacon-Auth";
const GITHUB_EVENT_HEADER: &str = "X-GitHub-Event";

/// Shared state for the gateway handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Producer side of the dispatcher's inbound queue.
    pub events: EventSender,
    pub status: Arc<StatusAggregator>,
    /// Token required on `/message`.
    pub auth_token: Arc<str>,
    /// Reported by the health endpoint.
    pub port: u16,
}

impl GatewayState {
    fn enqueue(&self, event: InboundEvent) -> StatusCode {
        if self.events.send(event).is_err() {
            log::warn!("gateway: inbound queue closed, rejecting webhook");
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        StatusCode::OK
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/status", get(status_http))
        .route("/gh-webhooks", post(github_webhook))
        .route("/message", post(relay_message))
        .route("/new-relic", post(new_relic_alert))
        .with_state(state)
}

/// Serve the gateway on an already-bound listener until `shutdown` completes.
pub async fn serve(
    listener: tokio::net::TcpListener,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("gateway listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server exited")?;
    log::info!("gateway stopped");
    Ok(())
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.port,
    }))
}

/// GET /status returns the latest aggregated status snapshot.
async fn status_http(State(state): State<GatewayState>) -> Response {
    Json(state.status.read()).into_response()
}

/// POST /gh-webhooks: only push events are relayed.
async fn github_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let event = headers
        .get(GITHUB_EVENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if event != "push" {
        return (StatusCode::BAD_REQUEST, r#"only "push" event supported"#).into_response();
    }
    let push: PushEvent = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            log::warn!("gateway: decoding push body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    log::debug!("gateway: push on {} with {} commit(s)", push.git_ref, push.commits.len());
    state.enqueue(InboundEvent::RepositoryPush(push)).into_response()
}

/// POST /message: token-protected generic relay.
async fn relay_message(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let provided = headers
        .get(AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if provided != &*state.auth_token {
        let delay = rand::thread_rng().gen_range(100..200);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        log::debug!("gateway: rejected relay with bad token");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, r#"Basic realm="Authorization Required""#)],
        )
            .into_response();
    }
    let relay: RelayMessage = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(e) => {
            log::warn!("gateway: decoding relay body: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    state.enqueue(InboundEvent::GenericRelay(relay)).into_response()
}

#[derive(Debug, Deserialize)]
struct AlertForm {
    #[serde(default)]
    alert: String,
}

/// POST /new-relic: urlencoded form whose `alert` field holds the alert JSON.
async fn new_relic_alert(State(state): State<GatewayState>, Form(form): Form<AlertForm>) -> Response {
    let alert: MonitoringAlert = match serde_json::from_str(&form.alert) {
        Ok(a) => a,
        Err(e) => {
            log::warn!("gateway: decoding alert: {}", e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };
    state.enqueue(InboundEvent::MonitoringAlert(alert)).into_response()
}
