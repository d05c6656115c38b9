use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::http::FetchError;
use crate::models::ErrorResponse;

/// Errors surfaced by the scrapers and the HTTP API.
#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream site error: {0}")]
    Upstream(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T, E = ScrapeError> = std::result::Result<T, E>;

impl ScrapeError {
    pub fn not_found(what: impl Into<String>) -> Self {
        ScrapeError::NotFound(what.into())
    }

    pub fn bad_request(what: impl Into<String>) -> Self {
        ScrapeError::BadRequest(what.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ScrapeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ScrapeError::NotFound(_) => StatusCode::NOT_FOUND,
            ScrapeError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ScrapeError::Network(_) => StatusCode::SERVICE_UNAVAILABLE,
            ScrapeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<FetchError> for ScrapeError {
    fn from(err: FetchError) -> Self {
        match (err.status(), &err) {
            (Some(status), _) if status == StatusCode::NOT_FOUND => ScrapeError::NotFound(err.to_string()),
            (Some(_), _) => ScrapeError::Upstream(err.to_string()),
            (None, FetchError::Transport { .. }) => ScrapeError::Network(err.to_string()),
            (None, FetchError::Client(_)) => ScrapeError::Internal(err.to_string()),
            (None, _) => ScrapeError::Upstream(err.to_string()),
        }
    }
}

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (error, details) = match &self {
            ScrapeError::BadRequest(_) => ("Invalid request", self.to_string()),
            ScrapeError::NotFound(_) => ("Not found", self.to_string()),
            ScrapeError::Upstream(_) => ("Upstream site error", self.to_string()),
            ScrapeError::Network(_) => ("Network error", self.to_string()),
            ScrapeError::Internal(_) => ("Internal server error", self.to_string()),
        };
        if status.is_server_error() {
            tracing::warn!(%status, %details, "request failed");
        }

        let body = ErrorResponse {
            error: error.to_string(),
            code: Some(status.as_u16()),
            details: Some(details),
        };
        (status, Json(body)).into_response()
    }
}
