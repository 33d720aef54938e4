use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConferenceError {
    #[error("Conference not found: {0}")]
    NotFound(String),

    #[error("Telephony backend error: {0}")]
    Telephony(String),

    #[error("Failed to render call markup: {0}")]
    Markup(String),
}

impl From<reqwest::Error> for ConferenceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Telephony(err.to_string())
    }
}
