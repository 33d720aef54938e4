use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("Transcription service error: {0}")]
    Transcription(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for VoiceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transcription(err.to_string())
    }
}
