// SPDX-FileCopyrightText: 2026 Leadgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Router assembly and HTTP listener.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use leadgate_config::model::ServerConfig;
use leadgate_core::LeadgateError;
use leadgate_engine::{Scheduler, SessionManager, WebhookProcessor};
use leadgate_storage::Database;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::handlers;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sessions: Arc<SessionManager>,
    pub scheduler: Arc<Scheduler>,
    pub processor: Arc<WebhookProcessor>,
}

/// Builds the full application router.
pub fn build_router(state: AppState) -> Router {
    let intake = Router::new()
        .route("/webhook/whatsapp", post(handlers::post_webhook))
        .route("/health", get(handlers::get_health));

    let api = Router::new()
        .route(
            "/v1/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route("/v1/sessions/{name}", get(handlers::get_session))
        .route("/v1/sessions/{name}/start", post(handlers::start_session))
        .route("/v1/sessions/{name}/qr", get(handlers::get_session_qr))
        .route("/v1/sessions/{name}/stop", post(handlers::stop_session))
        .route("/v1/sessions/{name}/logout", post(handlers::logout_session))
        .route("/v1/messages", post(handlers::enqueue_message))
        .route("/v1/messages/{id}", get(handlers::get_message))
        .route("/v1/schedule", get(handlers::list_schedule))
        .route("/v1/contacts", get(handlers::list_contacts))
        .route("/v1/contacts/{id}/stage", put(handlers::set_contact_stage))
        .route("/v1/templates", get(handlers::list_templates))
        .route(
            "/v1/templates/{name}",
            put(handlers::upsert_template).delete(handlers::delete_template),
        );

    Router::new()
        .merge(intake)
        .merge(api)
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Binds the listener and serves until the process is stopped.
pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<(), LeadgateError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| LeadgateError::Internal(format!("failed to bind {addr}: {e}")))?;
    info!(addr = %addr, "http server listening");
    axum::serve(listener, build_router(state))
        .await
        .map_err(|e| LeadgateError::Internal(format!("http server error: {e}")))
}
