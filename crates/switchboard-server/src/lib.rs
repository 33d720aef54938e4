//! HTTP surface of the switchboard voice agent.
//!
//! Exposes the telephony webhooks (`/voice/*`, `/conference/events`), the
//! `/media-stream` WebSocket, and a bearer-protected control API under
//! `/api`. All handlers share one [`AppState`].

pub mod api;
pub mod api_conference;
pub mod api_contacts;
pub mod api_media;
pub mod api_voice;
pub mod config;
pub mod middleware;

use axum::{
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use switchboard_conference::ConferenceRegistry;
use switchboard_intents::{ContactBook, IntentResolver};
use switchboard_voice::Transcriber;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Active conferences and the outbound actions on them.
    pub registry: ConferenceRegistry,
    pub resolver: Arc<IntentResolver>,
    /// The same book the resolver reads, exposed for management.
    pub contacts: Arc<ContactBook>,
    pub transcriber: Arc<dyn Transcriber>,
    /// WebSocket URL handed to the telephony backend for call audio.
    pub media_stream_url: String,
    /// Absolute URL of `/conference/events`.
    pub status_callback_url: String,
    /// Token required on `/api` routes. Empty disables them.
    pub api_bearer_token: String,
}

/// Health check handler.
async fn health(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "activeConferences": state.registry.len(),
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/conference/add",
            post(api_conference::add_participant_handler),
        )
        .route(
            "/api/conference/forward",
            post(api_conference::forward_call_handler),
        )
        .route(
            "/api/conference/end",
            post(api_conference::end_conference_handler),
        )
        .route(
            "/api/contacts",
            get(api_contacts::get_contacts_handler).put(api_contacts::put_contacts_handler),
        )
        .layer(axum::middleware::from_fn(middleware::auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/voice/incoming", post(api_voice::incoming_call_handler))
        .route("/voice/accept", post(api_voice::accept_call_handler))
        .route(
            "/conference/events",
            post(api_conference::conference_events_handler),
        )
        .route("/media-stream", get(api_media::media_stream_handler))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
