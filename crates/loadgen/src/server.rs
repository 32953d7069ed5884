//! HTTP control plane.
//!
//! Provides:
//! - `POST /simulation`: `{"method": "start" | "stop", "params": [...]}`
//! - `GET /metrics`: Prometheus text exposition
//! - `GET /healthz`: liveness probe
//!
//! `start` takes positional, optional params:
//! `[concurrency, txIntervalMs, complexity, accountCount, rotationGroups]`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config::RunOverrides, controller::RunControl};

/// State shared across all HTTP handlers.
#[derive(Clone)]
struct ServerState {
    control: Arc<dyn RunControl>,
}

/// Body of `POST /simulation`.
#[derive(Debug, Deserialize)]
struct SimulationRequest {
    method: String,
    #[serde(default)]
    params: Vec<Value>,
}

/// Body of every `POST /simulation` response.
#[derive(Debug, Serialize, Deserialize)]
struct MessageResponse {
    message: String,
}

fn reply(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<MessageResponse>) {
    (status, Json(MessageResponse { message: message.into() }))
}

/// Reads the positional param at `index` as an unsigned integer.
///
/// Missing and `null` params are `None`; numeric strings are accepted.
fn param_u64(params: &[Value], index: usize, name: &str) -> Result<Option<u64>, String> {
    let invalid = || format!("Invalid param {name}: expected a non-negative integer");
    match params.get(index) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
        Some(Value::String(s)) => s.trim().parse().map(Some).map_err(|_| invalid()),
        Some(_) => Err(invalid()),
    }
}

fn parse_overrides(params: &[Value]) -> Result<RunOverrides, String> {
    let usize_param = |index, name| {
        param_u64(params, index, name)?
            .map(|v| usize::try_from(v).map_err(|_| format!("Invalid param {name}: too large")))
            .transpose()
    };

    let complexity = param_u64(params, 2, "complexity")?
        .map(|v| u8::try_from(v).map_err(|_| "Invalid param complexity: must be 0-100".to_string()))
        .transpose()?;

    Ok(RunOverrides {
        concurrency: usize_param(0, "concurrency")?,
        tx_interval: param_u64(params, 1, "txIntervalMs")?.map(Duration::from_millis),
        complexity,
        account_count: usize_param(3, "accountCount")?,
        rotation_groups: usize_param(4, "rotationGroups")?,
    })
}

/// `POST /simulation`: starts or stops a run.
async fn simulation(
    State(state): State<ServerState>,
    Json(request): Json<SimulationRequest>,
) -> impl IntoResponse {
    match request.method.as_str() {
        "start" => {
            let overrides = match parse_overrides(&request.params) {
                Ok(overrides) => overrides,
                Err(message) => return reply(StatusCode::BAD_REQUEST, message),
            };
            match state.control.start(overrides).await {
                Ok(()) => reply(StatusCode::OK, "Simulation started"),
                Err(e) => {
                    warn!(error = %e, "Start rejected");
                    reply(StatusCode::BAD_REQUEST, e.to_string())
                }
            }
        }
        "stop" => match state.control.stop().await {
            Ok(()) => reply(StatusCode::OK, "Simulation stopped"),
            Err(e) => reply(StatusCode::BAD_REQUEST, e.to_string()),
        },
        _ => reply(StatusCode::BAD_REQUEST, "Invalid method"),
    }
}

/// `GET /metrics`: Prometheus exposition.
async fn metrics(State(state): State<ServerState>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], state.control.metrics())
}

/// `GET /healthz`: liveness probe.
async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Builds the control plane router.
pub fn router(control: Arc<dyn RunControl>) -> Router {
    Router::new()
        .route("/healthz", get(liveness))
        .route("/metrics", get(metrics))
        .route("/simulation", post(simulation))
        .with_state(ServerState { control })
}

/// Serves the control plane on `addr` until `cancel` is triggered.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to `addr`.
pub async fn serve(
    addr: SocketAddr,
    control: Arc<dyn RunControl>,
    cancel: CancellationToken,
) -> eyre::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Control server started");

    axum::serve(listener, router(control))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    info!("Control server stopped");
    Ok(())
}
