//! HTTP admin surface: health probe, status snapshot and offset
//! adjustment. Reads come from the engine's watch channel so no
//! request ever blocks the engine loop.

use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::engine::messages::{EngineCmd, EngineStatus};

#[derive(Clone)]
pub struct AdminState {
    pub status_rx: watch::Receiver<EngineStatus>,
    pub cmd_tx: mpsc::Sender<EngineCmd>,
}

#[derive(Serialize, Deserialize)]
pub struct OffsetBody {
    pub offset: u64,
}

pub async fn serve_admin(state: AdminState, addr: SocketAddr) {
    let app = Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/offset", post(set_offset))
        .with_state(state);

    info!("🌐 Admin HTTP listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn index(State(state): State<AdminState>) -> Html<String> {
    let snapshot = state.status_rx.borrow().clone();
    Html(format!(
        "<h1>suitcast</h1>\
         <p>current round: #{} | offset: {} | pending: {} | queued: {}</p>\
         <p><a href=\"/status\">status</a> · <a href=\"/health\">health</a></p>",
        snapshot.current_round,
        snapshot.offset,
        snapshot.pending.len(),
        snapshot.queued,
    ))
}

async fn health() -> &'static str {
    "OK"
}

async fn status(State(state): State<AdminState>) -> Json<EngineStatus> {
    Json(state.status_rx.borrow().clone())
}

async fn set_offset(
    State(state): State<AdminState>,
    Json(body): Json<OffsetBody>,
) -> Result<Json<u64>, StatusCode> {
    state
        .cmd_tx
        .send(EngineCmd::SetOffset(body.offset))
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    info!("🌐 Offset update requested via HTTP: {}", body.offset);
    Ok(Json(body.offset))
}
