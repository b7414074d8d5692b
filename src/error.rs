//! Error handling for the zonewatch server

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid request field
    #[error("Validation error: {0}")]
    Validation(String),

    /// No geofence for an id, or missing video asset
    #[error("Not found: {0}")]
    NotFound(String),

    /// Geofence / alert backend read or write failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Persisted geofence document could not be decoded
    #[error("Malformed geofence for {video_id}: {message}")]
    MalformedGeofence { video_id: String, message: String },

    /// Detection capability failed on a frame
    #[error("Detection error: {0}")]
    Detection(String),

    /// Video source missing or undecodable
    #[error("Source unavailable for {video_id}: {message}")]
    SourceUnavailable { video_id: String, message: String },

    /// Frame could not be encoded / decoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Upload exceeds the configured body limit
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Range start lies beyond the asset
    #[error("Range not satisfiable (asset size {size})")]
    RangeNotSatisfiable { size: u64 },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// HTTP status and stable error code for this error
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Error::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Error::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Error::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            Error::MalformedGeofence { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "MALFORMED_GEOFENCE")
            }
            Error::Detection(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DETECTION_ERROR"),
            Error::SourceUnavailable { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SOURCE_UNAVAILABLE")
            }
            Error::Encoding(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ENCODING_ERROR"),
            Error::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
            Error::RangeNotSatisfiable { .. } => {
                (StatusCode::RANGE_NOT_SATISFIABLE, "RANGE_NOT_SATISFIABLE")
            }
            Error::Serialization(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "SERIALIZATION_ERROR")
            }
            Error::Http(_) => (StatusCode::BAD_GATEWAY, "HTTP_ERROR"),
            Error::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Error::Sqlx(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            Error::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_code) = self.status_and_code();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request error"
            );
        } else {
            tracing::debug!(
                status = %status,
                error_code = %error_code,
                message = %message,
                "Request rejected"
            );
        }

        let body = Json(json!({
            "error_code": error_code,
            "message": message
        }));

        if let Error::RangeNotSatisfiable { size } = self {
            return (
                status,
                [(header::CONTENT_RANGE, format!("bytes */{}", size))],
                body,
            )
                .into_response();
        }

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            Error::Validation("x".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            Error::NotFound("x".into()).status_and_code().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            Error::Storage("x".into()).status_and_code().0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            Error::PayloadTooLarge("x".into()).status_and_code().0,
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            Error::Detection("x".into()).status_and_code().1,
            "DETECTION_ERROR"
        );
    }

    #[test]
    fn test_range_not_satisfiable_sets_content_range() {
        let resp = Error::RangeNotSatisfiable { size: 1000 }.into_response();
        assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            resp.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }
}
