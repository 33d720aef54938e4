//! Switchboard server binary.
//!
//! Starts the axum HTTP server with structured logging, wires the telephony,
//! transcription and completion clients, and shuts down gracefully on
//! SIGTERM/SIGINT, cancelling every pending conference timer on the way out.

use std::net::SocketAddr;
use std::sync::Arc;
use switchboard_conference::{ConferenceRegistry, RegistrySettings, TwilioClient};
use switchboard_intents::{ContactBook, ContactDirectory, HttpCompletionClient, IntentResolver};
use switchboard_server::{app, config, AppState};
use switchboard_voice::DeepgramTranscriber;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("SWITCHBOARD_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration, the server cannot start without valid config");

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    if config.twilio.account_sid.is_empty() || config.twilio.auth_token.is_empty() {
        tracing::warn!("twilio credentials are not configured, outbound calls will fail");
    }
    if config.transcription.api_key.is_empty() {
        tracing::warn!("transcription api key is not configured, calls will not be transcribed");
    }
    if config.security.api_bearer_token.is_empty() {
        tracing::warn!("INTERNAL_API_BEARER is not set, the /api routes will reject every request");
    }

    let backend = TwilioClient::new(config.twilio.clone())
        .expect("failed to build telephony http client");
    let status_callback_url = config.status_callback_url();
    let registry = ConferenceRegistry::new(
        Arc::new(backend),
        RegistrySettings {
            auto_hangup: config.conference.auto_hangup(),
            default_from: config.twilio.phone_number.clone(),
            status_callback_url: Some(status_callback_url.clone()),
            agent_label: config.conference.agent_label.clone(),
        },
    );

    let region = config.contacts.default_region;
    let contacts = Arc::new(ContactBook::open(&config.contacts.path, region));
    let mut resolver = IntentResolver::new(contacts.clone() as Arc<dyn ContactDirectory>, region);
    if config.completion.is_enabled() {
        let client = HttpCompletionClient::new(config.completion.clone())
            .expect("failed to build completion http client");
        resolver = resolver.with_completion(Arc::new(client));
        tracing::info!(endpoint = %config.completion.endpoint, "fallback intent classifier enabled");
    } else {
        tracing::info!("no completion service configured, using phrase matching only");
    }

    let state = AppState {
        registry: registry.clone(),
        resolver: Arc::new(resolver),
        contacts,
        transcriber: Arc::new(DeepgramTranscriber::new(config.transcription.clone())),
        media_stream_url: config.media_stream_url(),
        status_callback_url,
        api_bearer_token: config.security.api_bearer_token.clone(),
    };

    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(%addr, public_url = %config.server.public_url, "starting switchboard server");

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    registry.shutdown();
    tracing::info!("switchboard server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}
