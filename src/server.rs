//! HTTP surface — webhook intake plus operator tooling.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::debug;

use crate::actions::{ActionStatus, PendingAction};
use crate::router::{MessageRouter, RouterOutcome};

/// Build the axum application.
pub fn relay_routes(router: Arc<MessageRouter>) -> axum::Router {
    axum::Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/webhook", post(webhook))
        .route("/status", get(status))
        .route("/actions", get(actions))
        .route("/patterns/approve", post(add_approve_pattern))
        .route("/patterns/reject", post(add_reject_pattern))
        .layer(CorsLayer::permissive())
        .with_state(router)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Chat Relay is running",
        "status": "healthy",
    }))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "chat-relay",
    }))
}

/// Sole dispatch entry point. Always answers 200 with the outcome; the
/// router converts every failure into an outcome.
async fn webhook(
    State(router): State<Arc<MessageRouter>>,
    Json(payload): Json<serde_json::Value>,
) -> Json<RouterOutcome> {
    debug!("Received webhook");
    Json(router.dispatch(&payload).await)
}

async fn status(State(router): State<Arc<MessageRouter>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": router.status_text().await,
    }))
}

#[derive(Deserialize)]
struct ActionsQuery {
    status: Option<String>,
}

async fn actions(
    State(router): State<Arc<MessageRouter>>,
    Query(query): Query<ActionsQuery>,
) -> Json<Vec<PendingAction>> {
    let filter = query.status.as_deref().and_then(|s| match s {
        "pending" => Some(ActionStatus::Pending),
        "approved" => Some(ActionStatus::Approved),
        "rejected" => Some(ActionStatus::Rejected),
        _ => None,
    });
    Json(router.pending_actions(filter).await)
}

#[derive(Deserialize)]
struct PatternBody {
    pattern: String,
}

async fn add_approve_pattern(
    State(router): State<Arc<MessageRouter>>,
    Json(body): Json<PatternBody>,
) -> Json<serde_json::Value> {
    let added = router.add_auto_approve_pattern(&body.pattern).await;
    Json(serde_json::json!({ "added": added }))
}

async fn add_reject_pattern(
    State(router): State<Arc<MessageRouter>>,
    Json(body): Json<PatternBody>,
) -> Json<serde_json::Value> {
    let added = router.add_auto_reject_pattern(&body.pattern).await;
    Json(serde_json::json!({ "added": added }))
}
