use thiserror::Error;

/// Failures of the fallback classifier.
///
/// These never reach a caller of the resolver: they are logged and collapse
/// to a neutral `none` intent.
#[derive(Error, Debug)]
pub enum IntentError {
    #[error("completion service request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion service returned status {0}")]
    Status(u16),

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),

    #[error("no completion service configured")]
    NotConfigured,
}

/// Failures loading or saving the contact book.
#[derive(Error, Debug)]
pub enum ContactsError {
    #[error("contact book I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("contact book serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
