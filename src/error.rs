use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::protocol::ALREADY_VOTED_REASON;

/// Outcome of a rejected ledger, gate or synchronization request.
///
/// Every variant is a per-request result delivered to the requesting
/// session only. None of them is fatal to the service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Poll not found")]
    NotFound,
    #[error("Poll has ended")]
    PollEnded,
    #[error("Poll option not found")]
    OptionNotFound,
    #[error("{}", ALREADY_VOTED_REASON)]
    AlreadyVoted,
    #[error("Only the poll owner can end it")]
    NotOwner,
    #[error("Invalid poll: {0}")]
    InvalidPoll(&'static str),
    #[error("Storage error: {0}")]
    Storage(String),
}

impl SyncError {
    /// Reason string shown to the viewer.
    pub fn client_message(&self) -> String {
        match self {
            SyncError::Storage(_) => "Something went wrong, please try again".to_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PollError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Invalid request: {0}")]
    InvalidRequest(&'static str),
    #[error("Poll not found")]
    PollNotFound,
    #[error("Session error")]
    Session,
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl IntoResponse for PollError {
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            PollError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized"),
            PollError::Forbidden => (StatusCode::FORBIDDEN, "Only the poll owner can do that"),
            PollError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
            PollError::PollNotFound => (StatusCode::NOT_FOUND, "Poll not found"),
            PollError::Session => (StatusCode::INTERNAL_SERVER_ERROR, "Session error"),
            PollError::DatabaseError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
        };

        let body = Json(json!({
            "error": error_message,
            "details": self.to_string()
        }));

        (status, body).into_response()
    }
}

impl From<SyncError> for PollError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::NotFound => PollError::PollNotFound,
            SyncError::NotOwner => PollError::Forbidden,
            SyncError::InvalidPoll(reason) => PollError::InvalidRequest(reason),
            SyncError::Storage(msg) => PollError::DatabaseError(msg),
            // Vote rejections never reach the REST surface.
            other => PollError::DatabaseError(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(error: sqlx::Error) -> Self {
        SyncError::Storage(error.to_string())
    }
}

impl From<tower_sessions::session::Error> for PollError {
    fn from(_: tower_sessions::session::Error) -> Self {
        PollError::Session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_error_maps_to_status() {
        assert_eq!(
            PollError::PollNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PollError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            PollError::InvalidRequest("empty question")
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn sync_error_converts_for_rest_callers() {
        assert!(matches!(
            PollError::from(SyncError::NotFound),
            PollError::PollNotFound
        ));
        assert!(matches!(
            PollError::from(SyncError::InvalidPoll("too few options")),
            PollError::InvalidRequest("too few options")
        ));
    }
}
