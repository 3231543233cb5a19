use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tinylink_core::ShortenerError;
use tracing::error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Errors surfaced by request handlers.
#[derive(Debug)]
pub enum AppError {
    /// The request body or path could not be understood.
    BadRequest(String),
    Shortener(ShortenerError),
}

impl From<ShortenerError> for AppError {
    fn from(value: ShortenerError) -> Self {
        AppError::Shortener(value)
    }
}

impl From<JsonRejection> for AppError {
    fn from(value: JsonRejection) -> Self {
        AppError::BadRequest(value.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Shortener(err) => match err {
                ShortenerError::Conflict { short_url } => (StatusCode::CONFLICT, short_url),
                ShortenerError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
                ShortenerError::Deleted(_) => (StatusCode::GONE, err.to_string()),
                ShortenerError::InvalidUrl(_) | ShortenerError::InvalidHash(_) => {
                    (StatusCode::BAD_REQUEST, err.to_string())
                }
                ShortenerError::Storage(_) => {
                    error!(error = %err, "request failed");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "internal server error".to_string(),
                    )
                }
            },
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ShortenerError) -> StatusCode {
        AppError::from(err).into_response().status()
    }

    #[test]
    fn maps_shortener_errors_to_status_codes() {
        assert_eq!(
            status_of(ShortenerError::Conflict {
                short_url: "http://localhost:8080/h".to_string()
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ShortenerError::NotFound("h".to_string())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ShortenerError::Deleted("h".to_string())),
            StatusCode::GONE
        );
        assert_eq!(
            status_of(ShortenerError::InvalidUrl("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ShortenerError::InvalidHash("x".to_string())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(ShortenerError::Storage("db down".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn bad_request_is_400() {
        let response = AppError::BadRequest("empty batch".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
