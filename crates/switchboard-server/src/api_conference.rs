//! Conference status webhooks and the internal conference control API.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    extract::{Extension, Form, Json},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchboard_types::{ConferenceEvent, ConferenceStatusCallback};

/// Handler for `POST /conference/events`.
///
/// Always answers 200, including for callbacks that cannot be used.
pub async fn conference_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Form(callback): Form<ConferenceStatusCallback>,
) -> StatusCode {
    tracing::info!(
        conference_sid = %callback.conference_sid,
        conference_name = callback.friendly_name.as_deref().unwrap_or(""),
        call_sid = callback.call_sid.as_deref().unwrap_or(""),
        event = %callback.status_callback_event,
        "conference event received"
    );

    let event = match ConferenceEvent::try_from(callback) {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!("ignoring conference callback: {}", e);
            return StatusCode::OK;
        }
    };

    tracing::debug!(conference_sid = event.sid(), "applying conference event");
    let registry = &state.registry;
    match event {
        ConferenceEvent::Started { sid, name } => registry.start(&sid, &name),
        ConferenceEvent::Ended { sid } => registry.end(&sid),
        ConferenceEvent::ParticipantJoined {
            sid,
            call_leg_id,
            label,
        } => registry.join(&sid, &call_leg_id, label.as_deref()),
        ConferenceEvent::ParticipantLeft { sid, call_leg_id } => {
            registry.leave(&sid, &call_leg_id)
        }
        ConferenceEvent::Other { sid, event } => {
            tracing::debug!(conference_sid = %sid, event = %event, "conference event not tracked")
        }
    }

    StatusCode::OK
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddParticipantRequest {
    pub conference_name: String,
    pub target_number: String,
    #[serde(default)]
    pub from_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardCallRequest {
    pub conference_name: String,
    pub target_number: String,
    #[serde(default)]
    pub drop_agent_leg: bool,
    #[serde(default)]
    pub from_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndConferenceRequest {
    pub conference_name: String,
}

/// Result body of a successful control operation.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ControlResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub call_sid: Option<String>,
}

impl ControlResponse {
    fn ok(call_sid: Option<String>) -> Json<Self> {
        Json(Self {
            success: true,
            call_sid,
        })
    }
}

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(value)
}

fn optional(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Handler for `POST /api/conference/add`.
pub async fn add_participant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<AddParticipantRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    let conference_name = required("conferenceName", &payload.conference_name)?;
    let target_number = required("targetNumber", &payload.target_number)?;

    let call_sid = state
        .registry
        .add_participant(conference_name, target_number, optional(&payload.from_number))
        .await?;
    Ok(ControlResponse::ok(Some(call_sid)))
}

/// Handler for `POST /api/conference/forward`.
pub async fn forward_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ForwardCallRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    let conference_name = required("conferenceName", &payload.conference_name)?;
    let target_number = required("targetNumber", &payload.target_number)?;

    let call_sid = state
        .registry
        .forward_call(
            conference_name,
            target_number,
            payload.drop_agent_leg,
            optional(&payload.from_number),
        )
        .await?;
    Ok(ControlResponse::ok(Some(call_sid)))
}

/// Handler for `POST /api/conference/end`.
pub async fn end_conference_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<EndConferenceRequest>,
) -> Result<Json<ControlResponse>, ApiError> {
    let conference_name = required("conferenceName", &payload.conference_name)?;

    state.registry.end_conference(conference_name).await?;
    Ok(ControlResponse::ok(None))
}
