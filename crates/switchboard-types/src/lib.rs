//! Shared types for the Switchboard voice agent.
//!
//! This crate provides the value types that cross crate boundaries: the
//! parsed intent produced by the classification pipeline, the confidence tier
//! model, and the typed forms of the telephony backend's loosely-typed
//! webhook and media-stream payloads.
//!
//! Untyped JSON and form bodies are converted into the enums defined here
//! on arrival.

use serde::{Deserialize, Serialize};

pub mod events;
pub mod media;

pub use events::{ConferenceEvent, ConferenceStatusCallback, EventError};
pub use media::{MediaChunk, MediaFormat, MediaStreamEvent, StreamStart};

/// Prefix used when deriving a conference name from an inbound call leg.
pub const CONFERENCE_NAME_PREFIX: &str = "conf_";

/// Returns the conference name assigned to an inbound call leg.
///
/// Inbound callers are dialed into a conference named after their own call
/// leg, so the media stream and the conference webhooks agree on the handle.
pub fn conference_name_for_call(call_leg_id: &str) -> String {
    format!("{CONFERENCE_NAME_PREFIX}{call_leg_id}")
}

/// The kind of action a spoken command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    /// Bring a third party into the conference.
    Add,
    /// Forward the call to someone else.
    Forward,
    /// Hang up the conference.
    End,
    /// Nothing actionable was said.
    None,
}

impl IntentKind {
    /// Returns the wire label for this intent kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Forward => "forward",
            Self::End => "end",
            Self::None => "none",
        }
    }

    /// Whether carrying out this intent requires a target number.
    pub fn needs_target(self) -> bool {
        matches!(self, Self::Add | Self::Forward)
    }
}

impl std::str::FromStr for IntentKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "add" => Ok(Self::Add),
            "forward" => Ok(Self::Forward),
            "end" => Ok(Self::End),
            "none" => Ok(Self::None),
            _ => Err(()),
        }
    }
}

/// Coarse classification certainty.
///
/// Only `High` short-circuits the fallback classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// A classified spoken command.
///
/// Produced by the intent resolver and consumed immediately by the media
/// stream loop; never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedIntent {
    pub kind: IntentKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_name: Option<String>,
    /// Canonical E.164 number, when one could be resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_number: Option<String>,
    pub confidence: Confidence,
}

impl ParsedIntent {
    /// An intent with no action and the given confidence.
    pub fn none(confidence: Confidence) -> Self {
        Self {
            kind: IntentKind::None,
            target_name: None,
            target_number: None,
            confidence,
        }
    }

    /// The end-call intent. It never carries a target.
    pub fn end(confidence: Confidence) -> Self {
        Self {
            kind: IntentKind::End,
            target_name: None,
            target_number: None,
            confidence,
        }
    }

    /// Best human-readable description of the target, for logs.
    pub fn target_label(&self) -> Option<&str> {
        self.target_number
            .as_deref()
            .or(self.target_name.as_deref())
    }
}
