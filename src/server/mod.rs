//! Development relay: the pub/sub provider over WebSocket, plus HTTP ingest
//! so a backend (or `curl`) can publish change events and broadcasts.

pub mod api;
mod socket;

use anyhow::{Context, Result};
use colored::*;
use tokio::net::TcpListener;

use crate::realtime::LocalBroker;

pub use api::{router, AppState};

/// Bind `0.0.0.0:port` and serve until the process exits
pub async fn start(port: u16, broker: LocalBroker) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding relay to {addr}"))?;

    println!(
        "{} Relay running at {}",
        "✓".green(),
        format!("ws://{}/ws", addr).bright_blue()
    );

    serve_on(listener, broker).await
}

/// Serve on an already bound listener
pub async fn serve_on(listener: TcpListener, broker: LocalBroker) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(%addr, "relay listening");
    }
    axum::serve(listener, router(broker))
        .await
        .context("relay server stopped")
}
