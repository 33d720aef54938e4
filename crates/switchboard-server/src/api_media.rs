//! `/media-stream` WebSocket endpoint.
//!
//! The telephony backend opens one socket per accepted call and pushes JSON
//! text frames (`connected`, `start`, `media`, `stop`). Each socket drives
//! its own [`MediaStream`]; nothing is sent back.

use crate::AppState;
use axum::{
    extract::{
        ws::{Message as AxumMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use std::sync::Arc;
use switchboard_voice::{MediaStream, StreamContext};
use uuid::Uuid;

/// Handler for `GET /media-stream`.
pub async fn media_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let connection_id = Uuid::new_v4();
    tracing::info!(%connection_id, event = "ws-connect", "media stream connection opened");

    let ctx = StreamContext {
        transcriber: state.transcriber.clone(),
        resolver: state.resolver.clone(),
        registry: state.registry.clone(),
    };
    let mut stream = MediaStream::new(ctx);

    while let Some(frame) = socket.recv().await {
        match frame {
            Ok(AxumMessage::Text(text)) => stream.handle_text(text.as_str()).await,
            Ok(AxumMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(%connection_id, "media stream socket error: {}", e);
                break;
            }
        }
    }

    stream.close().await;
    tracing::debug!(%connection_id, "media stream connection finished");
}
