//! Inbound call webhooks.
//!
//! An incoming call first gets a short greeting with an optional key press,
//! then `/voice/accept` forks its audio to the media stream endpoint and
//! places the caller in a conference of their own, `conf_<CallSid>`.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    extract::{Extension, Form},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use switchboard_conference::twiml;
use switchboard_types::conference_name_for_call;

const ACCEPT_PATH: &str = "/voice/accept";

const GREETING: &str = "Welcome. Press any key or wait to continue.";

/// Voice webhook form fields we use.
#[derive(Debug, Deserialize)]
pub struct VoiceWebhook {
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "To", default)]
    pub to: String,
    #[serde(rename = "Digits", default)]
    pub digits: Option<String>,
}

fn markup(body: String) -> Response {
    ([(CONTENT_TYPE, "text/xml")], body).into_response()
}

/// Handler for `POST /voice/incoming`.
pub async fn incoming_call_handler(Form(call): Form<VoiceWebhook>) -> Result<Response, ApiError> {
    tracing::info!(
        call_sid = %call.call_sid,
        from = %call.from,
        to = %call.to,
        event = "incoming-call",
        "incoming call received"
    );

    Ok(markup(twiml::incoming_call(ACCEPT_PATH, GREETING)?))
}

/// Handler for `POST /voice/accept`.
pub async fn accept_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Form(call): Form<VoiceWebhook>,
) -> Result<Response, ApiError> {
    let call_sid = call.call_sid.trim();
    if call_sid.is_empty() {
        return Err(ApiError::BadRequest("CallSid is required".to_string()));
    }

    let conference_name = conference_name_for_call(call_sid);
    tracing::info!(
        call_sid = %call_sid,
        from = %call.from,
        digits = call.digits.as_deref().unwrap_or(""),
        conference_name = %conference_name,
        event = "call-accepted",
        "call accepted, starting conference and media stream"
    );

    Ok(markup(twiml::accept_call(&twiml::AcceptCall {
        stream_url: &state.media_stream_url,
        conference_name: &conference_name,
        caller: &call.from,
        call_sid,
        status_callback_url: Some(&state.status_callback_url),
    })?))
}
