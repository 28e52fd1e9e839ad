//! WebSocket + REST surface for decision-makers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::approval::model::{Decision, Verdict};
use crate::approval::{DecisionHub, DecisionOutcome};
use crate::mailbox::WorkItem;
use crate::mailbox::parse::clean_sender;
use crate::workflow::{WorkflowCoordinator, WorkflowSubmitter};

/// Shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<WorkflowCoordinator>,
    pub submitter: WorkflowSubmitter,
    pub mailbox_enabled: bool,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/pending-approvals", get(pending_approvals))
        .route("/process-email", post(process_email))
        .route("/decisions", post(submit_decision))
        .route("/decisions/{workflow_id}", get(decision_history))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

// ── Status ──────────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let coordinator = &state.coordinator;
    Json(serde_json::json!({
        "status": "ok",
        "service": "inbox-hitl",
        "pending_approvals": coordinator.registry().pending_count(),
        "connected_clients": coordinator.hub().connection_count(),
        "in_flight_workflows": coordinator.in_flight(),
        "mailbox_enabled": state.mailbox_enabled,
    }))
}

async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    let pending_count = state.coordinator.registry().pending_count();
    match state.coordinator.audit().stats().await {
        Ok(stats) => {
            let mut body = serde_json::to_value(stats).unwrap_or_else(|_| serde_json::json!({}));
            body["pending_count"] = serde_json::json!(pending_count);
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            error!(error = %e, "Failed to read audit stats");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

async fn pending_approvals(State(state): State<AppState>) -> impl IntoResponse {
    let approvals = state.coordinator.registry().list_pending();
    Json(serde_json::json!({
        "count": approvals.len(),
        "approvals": approvals,
    }))
}

// ── Submission ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ProcessEmailRequest {
    email_from: String,
    #[serde(default)]
    email_to: Option<String>,
    #[serde(default)]
    email_subject: String,
    #[serde(default)]
    email_body: String,
}

async fn process_email(
    State(state): State<AppState>,
    Json(req): Json<ProcessEmailRequest>,
) -> impl IntoResponse {
    let workflow_id = short_id();
    let item = WorkItem::new(
        workflow_id.clone(),
        clean_sender(&req.email_from),
        req.email_to.unwrap_or_default(),
        req.email_subject,
        req.email_body,
    )
    .or_recipient(&state.coordinator.config().default_recipient)
    .with_metadata(serde_json::json!({ "from_full": req.email_from }));

    match state.submitter.submit_as(workflow_id, item) {
        Ok(workflow_id) => {
            info!(workflow_id = %workflow_id, "Email submitted via API");
            (
                StatusCode::OK,
                Json(serde_json::json!({ "status": "processing", "workflow_id": workflow_id })),
            )
        }
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Eight hex chars, enough to tell concurrent workflows apart in a UI.
fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

// ── Decisions ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    workflow_id: String,
    decision: Verdict,
    #[serde(default)]
    edited_content: Option<String>,
    #[serde(default)]
    suspension_id: Option<Uuid>,
}

async fn submit_decision(
    State(state): State<AppState>,
    Json(req): Json<DecisionRequest>,
) -> impl IntoResponse {
    let mut decision = Decision::new(req.workflow_id.clone(), req.decision);
    if let Some(content) = req.edited_content {
        decision = decision.with_edit(content);
    }
    decision.suspension_id = req.suspension_id;

    let outcome = state.coordinator.hub().submit_decision(decision);
    let status = match outcome {
        DecisionOutcome::Resumed => StatusCode::OK,
        DecisionOutcome::NoPending => StatusCode::NOT_FOUND,
        DecisionOutcome::Stale | DecisionOutcome::InvalidVerdict | DecisionOutcome::Expired => {
            StatusCode::CONFLICT
        }
    };
    (
        status,
        Json(serde_json::json!({
            "workflow_id": req.workflow_id,
            "outcome": outcome.label(),
        })),
    )
}

async fn decision_history(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> impl IntoResponse {
    let registry = state.coordinator.registry();
    Json(serde_json::json!({
        "workflow_id": workflow_id,
        "pending": registry.is_pending(&workflow_id),
        "decisions": registry.decisions_for(&workflow_id),
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    debug!("WebSocket client connecting");
    let hub = Arc::clone(state.coordinator.hub());
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

async fn handle_socket(mut socket: WebSocket, hub: Arc<DecisionHub>) {
    let mut subscription = hub.connect();
    let id = subscription.id;

    loop {
        tokio::select! {
            notification = subscription.rx.recv() => {
                let Some(notification) = notification else { break };
                match serde_json::to_string(&notification) {
                    Ok(json) => {
                        if socket.send(Message::Text(json.into())).await.is_err() {
                            debug!(connection = %id, "Client disconnected during send");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Failed to serialize notification"),
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        hub.handle_client_text(&text);
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        warn!(connection = %id, error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    hub.disconnect(id);
}
