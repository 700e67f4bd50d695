// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the webhook intake and management API.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use leadgate_core::MessageContent;
use leadgate_engine::WebhookEnvelope;
use leadgate_storage::queries;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ApiError, ErrorBody};
use crate::server::AppState;

/// POST /webhook/whatsapp
///
/// The gateway retries deliveries that do not get a 2xx, so this endpoint
/// acknowledges everything, including bodies it cannot read, and hands the
/// event to the processor asynchronously.
pub async fn post_webhook(
    State(state): State<AppState>,
    body: Option<Json<serde_json::Value>>,
) -> Json<serde_json::Value> {
    let Some(Json(value)) = body else {
        warn!("webhook delivery without a JSON body, acknowledged");
        return Json(serde_json::json!({"success": true}));
    };
    match serde_json::from_value::<WebhookEnvelope>(value) {
        Ok(envelope) => {
            let processor = state.processor.clone();
            tokio::spawn(async move {
                processor.process(envelope).await;
            });
        }
        Err(e) => {
            warn!(error = %e, "unreadable webhook envelope, acknowledged");
        }
    }
    Json(serde_json::json!({"success": true}))
}

/// GET /health
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SessionFilter {
    #[serde(default)]
    pub state: Option<String>,
}

/// GET /v1/sessions
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(filter): Query<SessionFilter>,
) -> Result<Response, ApiError> {
    let sessions = state.sessions.list(filter.state.as_deref()).await?;
    Ok(Json(serde_json::json!({ "sessions": sessions })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub name: String,
    pub phone: String,
}

/// POST /v1/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(body): Json<CreateSessionRequest>,
) -> Result<Response, ApiError> {
    state.sessions.create_session(&body.name, &body.phone).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({"name": body.name})),
    )
        .into_response())
}

/// GET /v1/sessions/{name}
pub async fn get_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    match state.sessions.get(&name).await? {
        Some(session) => Ok(Json(session).into_response()),
        None => Ok(not_found("no such session")),
    }
}

/// POST /v1/sessions/{name}/start
pub async fn start_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    state.sessions.start(&name).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

/// GET /v1/sessions/{name}/qr
pub async fn get_session_qr(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let qr = state.sessions.qr_code(&name).await?;
    Ok(Json(serde_json::json!({"qr": qr.payload})).into_response())
}

/// POST /v1/sessions/{name}/stop
pub async fn stop_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    state.sessions.stop(&name).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

/// POST /v1/sessions/{name}/logout
pub async fn logout_session(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    state.sessions.logout(&name).await?;
    Ok(StatusCode::ACCEPTED.into_response())
}

#[derive(Debug, Deserialize)]
pub struct EnqueueMessageRequest {
    pub session: String,
    pub recipient: String,
    pub content: MessageContent,
    /// RFC 3339 UTC timestamp; omit for immediate dispatch.
    #[serde(default)]
    pub due_at: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EnqueueMessageResponse {
    pub message_id: String,
}

/// POST /v1/messages
pub async fn enqueue_message(
    State(state): State<AppState>,
    Json(body): Json<EnqueueMessageRequest>,
) -> Result<Response, ApiError> {
    let message_id = state
        .scheduler
        .enqueue(
            &body.session,
            &body.recipient,
            &body.content,
            body.due_at.as_deref(),
            body.correlation_id.as_deref(),
        )
        .await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueMessageResponse { message_id }),
    )
        .into_response())
}

#[derive(Debug, Deserialize)]
pub struct ScheduleFilter {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default = "default_schedule_limit")]
    pub limit: i64,
}

fn default_schedule_limit() -> i64 {
    100
}

/// GET /v1/schedule
pub async fn list_schedule(
    State(state): State<AppState>,
    Query(filter): Query<ScheduleFilter>,
) -> Result<Response, ApiError> {
    let entries =
        queries::queue::list_entries(&state.db, filter.status.as_deref(), filter.limit).await?;
    Ok(Json(serde_json::json!({ "entries": entries })).into_response())
}

/// GET /v1/messages/{id}
pub async fn get_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match queries::messages::get_message(&state.db, &id).await? {
        Some(message) => Ok(Json(message).into_response()),
        None => Ok(not_found("no such message")),
    }
}

#[derive(Debug, Deserialize)]
pub struct ContactFilter {
    #[serde(default)]
    pub stage: Option<String>,
}

/// GET /v1/contacts
pub async fn list_contacts(
    State(state): State<AppState>,
    Query(filter): Query<ContactFilter>,
) -> Result<Response, ApiError> {
    let contacts = queries::contacts::list_contacts(&state.db, filter.stage.as_deref()).await?;
    Ok(Json(serde_json::json!({ "contacts": contacts })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct StageOverrideRequest {
    pub stage: leadgate_core::FunnelStage,
}

/// PUT /v1/contacts/{id}/stage
///
/// Operator override: pins the contact to a stage the classifier may not
/// move it below.
pub async fn set_contact_stage(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StageOverrideRequest>,
) -> Result<Response, ApiError> {
    let updated =
        queries::contacts::set_manual_stage(&state.db, &id, &body.stage.to_string()).await?;
    if updated {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(not_found("no such contact"))
    }
}

/// GET /v1/templates
pub async fn list_templates(State(state): State<AppState>) -> Result<Response, ApiError> {
    let templates = queries::templates::list_templates(&state.db).await?;
    Ok(Json(serde_json::json!({ "templates": templates })).into_response())
}

#[derive(Debug, Deserialize)]
pub struct UpsertTemplateRequest {
    #[serde(default)]
    pub stage: Option<leadgate_core::FunnelStage>,
    pub body: String,
}

/// PUT /v1/templates/{name}
pub async fn upsert_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(body): Json<UpsertTemplateRequest>,
) -> Result<Response, ApiError> {
    let stage = body.stage.map(|s| s.to_string());
    queries::templates::upsert_template(&state.db, &name, stage.as_deref(), &body.body).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// DELETE /v1/templates/{name}
pub async fn delete_template(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    if queries::templates::delete_template(&state.db, &name).await? {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(not_found("no such template"))
    }
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}
