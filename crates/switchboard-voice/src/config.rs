use serde::{Deserialize, Serialize};
use std::fmt;

fn default_url() -> String {
    "wss://api.deepgram.com/v1/listen".to_string()
}

fn default_model() -> String {
    "nova-2".to_string()
}

/// Settings for the streaming speech-recognition service.
#[derive(Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            url: default_url(),
            model: default_model(),
        }
    }
}

impl fmt::Debug for TranscriptionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranscriptionConfig")
            .field("api_key", &"[REDACTED]")
            .field("url", &self.url)
            .field("model", &self.model)
            .finish()
    }
}

impl TranscriptionConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Listen URL for 8 kHz mono mu-law call audio with interim results.
    pub fn listen_url(&self) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        format!(
            "{}{}encoding=mulaw&sample_rate=8000&channels=1&model={}&smart_format=true&interim_results=true",
            self.url, separator, self.model
        )
    }
}
