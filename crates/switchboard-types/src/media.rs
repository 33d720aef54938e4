//! Media stream messages sent by the telephony backend over the
//! `/media-stream` WebSocket.

use serde::Deserialize;
use std::collections::HashMap;

/// One inbound media stream message.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum MediaStreamEvent {
    /// Sent once when the socket is established, before `start`.
    Connected,
    Start {
        #[serde(rename = "streamSid", default)]
        stream_sid: Option<String>,
        start: StreamStart,
    },
    Media {
        media: MediaChunk,
    },
    Stop,
    /// Marks, DTMF and anything newer than this code knows about.
    #[serde(other)]
    Unknown,
}

impl MediaStreamEvent {
    /// Parses a text frame.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Short label for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connected => "connected",
            Self::Start { .. } => "start",
            Self::Media { .. } => "media",
            Self::Stop => "stop",
            Self::Unknown => "unknown",
        }
    }
}

/// Metadata sent with the `start` message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    #[serde(default)]
    pub stream_sid: Option<String>,
    #[serde(default)]
    pub call_sid: Option<String>,
    /// `<Parameter>` values attached to the stream in call-control markup.
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
    #[serde(default)]
    pub media_format: Option<MediaFormat>,
}

impl StreamStart {
    /// Returns a non-empty custom parameter.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.custom_parameters
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFormat {
    pub encoding: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// One audio frame.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaChunk {
    #[serde(default)]
    pub track: Option<String>,
    /// Base64-encoded 8 kHz mono mu-law audio.
    #[serde(default)]
    pub payload: String,
}
