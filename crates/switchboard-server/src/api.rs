//! Error responses shared by the HTTP handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use switchboard_conference::ConferenceError;
use thiserror::Error;

/// Failure of a handler, rendered as `{"success": false, "error": "..."}`.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream failure: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(msg)
            | ApiError::NotFound(msg)
            | ApiError::BadGateway(msg)
            | ApiError::InternalServerError(msg) => msg,
            ApiError::Unauthorized => "unauthorized".to_string(),
        };

        let body = Json(serde_json::json!({
            "success": false,
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<ConferenceError> for ApiError {
    fn from(err: ConferenceError) -> Self {
        match err {
            ConferenceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            ConferenceError::Telephony(_) => ApiError::BadGateway(err.to_string()),
            ConferenceError::Markup(_) => ApiError::InternalServerError(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conference_errors_map_to_statuses() {
        let not_found = ApiError::from(ConferenceError::NotFound("confA".to_string()));
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);

        let upstream = ApiError::from(ConferenceError::Telephony("HTTP 500".to_string()));
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);

        let markup = ApiError::from(ConferenceError::Markup("bad".to_string()));
        assert_eq!(markup.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            upstream.to_string(),
            "upstream failure: Telephony backend error: HTTP 500"
        );
    }
}
