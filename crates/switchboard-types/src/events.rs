//! Conference status callbacks from the telephony backend.

use serde::Deserialize;
use thiserror::Error;

/// Raw conference status callback body, as posted by the telephony backend.
///
/// Field names follow the backend's form encoding. Convert to a
/// [`ConferenceEvent`] before acting on it.
#[derive(Debug, Clone, Deserialize)]
pub struct ConferenceStatusCallback {
    #[serde(rename = "ConferenceSid")]
    pub conference_sid: String,
    #[serde(rename = "FriendlyName", default)]
    pub friendly_name: Option<String>,
    #[serde(rename = "StatusCallbackEvent")]
    pub status_callback_event: String,
    #[serde(rename = "CallSid", default)]
    pub call_sid: Option<String>,
    #[serde(rename = "ParticipantLabel", default)]
    pub participant_label: Option<String>,
}

/// A typed conference lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConferenceEvent {
    Started {
        sid: String,
        name: String,
    },
    Ended {
        sid: String,
    },
    ParticipantJoined {
        sid: String,
        call_leg_id: String,
        label: Option<String>,
    },
    ParticipantLeft {
        sid: String,
        call_leg_id: String,
    },
    /// Any other callback (mute, hold, announcements). Not acted on.
    Other {
        sid: String,
        event: String,
    },
}

impl ConferenceEvent {
    /// The conference SID the event refers to.
    pub fn sid(&self) -> &str {
        match self {
            Self::Started { sid, .. }
            | Self::Ended { sid }
            | Self::ParticipantJoined { sid, .. }
            | Self::ParticipantLeft { sid, .. }
            | Self::Other { sid, .. } => sid,
        }
    }
}

/// Errors converting a raw callback into a [`ConferenceEvent`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventError {
    #[error("conference callback '{event}' is missing field {field}")]
    MissingField { event: String, field: &'static str },
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<ConferenceStatusCallback> for ConferenceEvent {
    type Error = EventError;

    fn try_from(raw: ConferenceStatusCallback) -> Result<Self, Self::Error> {
        let ConferenceStatusCallback {
            conference_sid: sid,
            friendly_name,
            status_callback_event: event,
            call_sid,
            participant_label,
        } = raw;

        let missing = |field| EventError::MissingField {
            event: event.clone(),
            field,
        };

        match event.as_str() {
            "conference-start" => {
                let name = non_empty(friendly_name).ok_or_else(|| missing("FriendlyName"))?;
                Ok(Self::Started { sid, name })
            }
            "conference-end" => Ok(Self::Ended { sid }),
            "participant-join" => {
                let call_leg_id = non_empty(call_sid).ok_or_else(|| missing("CallSid"))?;
                Ok(Self::ParticipantJoined {
                    sid,
                    call_leg_id,
                    label: non_empty(participant_label),
                })
            }
            "participant-leave" => {
                let call_leg_id = non_empty(call_sid).ok_or_else(|| missing("CallSid"))?;
                Ok(Self::ParticipantLeft { sid, call_leg_id })
            }
            other => Ok(Self::Other {
                sid,
                event: other.to_string(),
            }),
        }
    }
}
