use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use super::socket::ws_handler;
use crate::realtime::{LocalBroker, RawChange};

#[derive(Clone)]
pub struct AppState {
    pub broker: LocalBroker,
}

#[derive(Debug, Deserialize)]
pub struct BroadcastBody {
    pub event: String,
    #[serde(default)]
    pub payload: Value,
}

pub fn router(broker: LocalBroker) -> Router {
    let state = AppState { broker };

    Router::new()
        .route("/", get(|| async { "Beam realtime relay" }))
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/changes", post(publish_change))
        .route("/broadcast/{channel}", post(publish_broadcast))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "subscriptions": state.broker.subscriber_count(),
    }))
}

/// Ingest a row change from the backend
async fn publish_change(
    State(state): State<AppState>,
    Json(change): Json<RawChange>,
) -> (StatusCode, Json<Value>) {
    let table = change.table.clone();
    let event = change.event_type;
    let delivered = state.broker.publish_change(change);
    tracing::debug!(%table, ?event, delivered, "change ingested");
    (StatusCode::ACCEPTED, Json(json!({ "delivered": delivered })))
}

async fn publish_broadcast(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    Json(body): Json<BroadcastBody>,
) -> (StatusCode, Json<Value>) {
    let delivered = state
        .broker
        .broadcast_from(None, &channel, &body.event, body.payload);
    tracing::debug!(%channel, event = %body.event, delivered, "broadcast ingested");
    (StatusCode::ACCEPTED, Json(json!({ "delivered": delivered })))
}
