//! suitcast — Prediction Scheduling & Reconciliation Engine
//!
//! Actor-based architecture:
//!   Transport ──FeedEvent──→ PredictionEngine ──AnnounceCmd──→ Announcer
//!                                  │  ↑                            │
//!                 (watch) status ──┘  └────── AnnounceResult ──────┘
//!
//! Two Telegram channels feed the engine: finalized round results and
//! per-suit running counts. Predictions are published to a third
//! channel and amended in place once settled.

use std::net::SocketAddr;

use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

use suitcast::admin::{serve_admin, AdminState};
use suitcast::engine::announcer::{Announcer, AnnouncerConfig};
use suitcast::engine::clock::SystemClock;
use suitcast::engine::core::{EngineConfig, PredictionEngine};
use suitcast::engine::messages::*;
use suitcast::reset::{run_reset_timer, ResetConfig};
use suitcast::transport::{Transport, TransportConfig};

fn admin_addr() -> SocketAddr {
    let port = std::env::var("SUITCAST_HTTP_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080u16);
    SocketAddr::from(([0, 0, 0, 0], port))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("═══════════════════════════════════════════════════");
    info!("  suitcast — Prediction Scheduling Engine");
    info!("═══════════════════════════════════════════════════");

    let engine_cfg = EngineConfig::from_env();
    let transport_cfg = TransportConfig::from_env();
    let announcer_cfg = AnnouncerConfig::from_env();
    let reset_cfg = ResetConfig::from_env();

    info!(
        "📊 Config: offset={} cooldown={}s reset={:02}:{:02}UTC{:+} dry={}",
        engine_cfg.offset,
        engine_cfg.cooldown_secs,
        reset_cfg.hour,
        reset_cfg.minute,
        reset_cfg.utc_offset_hours,
        announcer_cfg.dry_run,
    );

    // ═══ Channel plumbing ═══
    let (feed_tx, feed_rx) = mpsc::channel::<FeedEvent>(256);
    let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCmd>(32);
    let (announce_tx, announce_rx) = mpsc::channel::<AnnounceCmd>(64);
    let (publish_tx, publish_rx) = mpsc::channel::<AnnounceResult>(64);
    let (status_tx, status_rx) = watch::channel(EngineStatus::default());

    // ═══ Actors ═══
    let engine = PredictionEngine::new(
        engine_cfg,
        SystemClock,
        feed_rx,
        cmd_rx,
        publish_rx,
        announce_tx,
        status_tx,
    );
    tokio::spawn(engine.run());

    let announcer = Announcer::new(announcer_cfg, announce_rx, publish_tx);
    tokio::spawn(announcer.run());

    tokio::spawn(run_reset_timer(reset_cfg, cmd_tx.clone()));

    let transport = Transport::new(transport_cfg, feed_tx, cmd_tx.clone(), status_rx.clone());
    tokio::spawn(transport.run());

    info!("🚀 Actors spawned — serving admin HTTP");

    // Admin HTTP keeps the process alive.
    serve_admin(AdminState { status_rx, cmd_tx }, admin_addr()).await;

    Ok(())
}
