use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use uuid::Uuid;

use arachne_core::error::AppError;

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            AppError::InvalidInput(_)
            | AppError::ForbiddenFlag(_)
            | AppError::SerializationError(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            AppError::BlocklistedUrl => (StatusCode::FORBIDDEN, self.0.to_string()),
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, self.0.to_string()),
            AppError::InsufficientCredits(_) => {
                (StatusCode::PAYMENT_REQUIRED, self.0.to_string())
            }
            AppError::JobTimeout => (StatusCode::REQUEST_TIMEOUT, self.0.to_string()),
            AppError::CrawlNotFound => (StatusCode::NOT_FOUND, self.0.to_string()),
            AppError::ForbiddenTeam => (StatusCode::FORBIDDEN, self.0.to_string()),
            AppError::CreditCheckError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error checking team credits. Please contact support.".to_string(),
            ),
            AppError::LlmExtractionFailed(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            }
            AppError::QueueUnavailable(_) | AppError::StoreError(_) => {
                let exception_id = log_exception(&self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error (exception {exception_id})"),
                )
            }
            AppError::Unexpected(_) => {
                let exception_id = log_exception(&self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!(
                        "An unexpected error occurred. Please contact support \
                         quoting exception {exception_id}"
                    ),
                )
            }
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            return_code: status.as_u16(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Log an unexpected error under a fresh exception id and return the id.
pub fn log_exception(error: &AppError) -> Uuid {
    let exception_id = Uuid::new_v4();
    tracing::error!(exception_id = %exception_id, error = %error, "Unexpected error");
    exception_id
}
