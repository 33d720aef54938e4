//! Contact book management API.

use crate::api::ApiError;
use crate::AppState;
use axum::extract::{Extension, Json};
use std::collections::HashMap;
use std::sync::Arc;
use switchboard_intents::ContactMap;

/// Handler for `GET /api/contacts`.
pub async fn get_contacts_handler(Extension(state): Extension<Arc<AppState>>) -> Json<ContactMap> {
    Json(state.contacts.all())
}

/// Handler for `PUT /api/contacts`.
///
/// Replaces the whole book and returns what was stored. Entries whose number
/// cannot be normalized are dropped.
pub async fn put_contacts_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(contacts): Json<HashMap<String, String>>,
) -> Result<Json<ContactMap>, ApiError> {
    let submitted = contacts.len();
    let book = state.contacts.clone();
    let stored = tokio::task::spawn_blocking(move || book.replace(contacts))
        .await
        .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
        .map_err(|e| {
            tracing::error!("failed to save contacts: {}", e);
            ApiError::InternalServerError(e.to_string())
        })?;

    tracing::info!(
        submitted,
        stored = stored.len(),
        "contacts updated"
    );
    Ok(Json(stored))
}
