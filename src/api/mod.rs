//! Resource API Endpoints
//! Mission: CRUD surfaces behind the authorization gate

pub mod admin;
pub mod collaborations;
pub mod feedback;
pub mod submissions;
pub mod templates;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Resource API errors
#[derive(Debug)]
pub enum ApiError {
    SubmissionNotFound,
    FeedbackNotFound,
    CollaborationNotFound,
    TemplateNotFound,
    UserNotFound,
    FileNotFound,
    /// Valid session, but the resource belongs to someone else
    AccessDenied,
    FeedbackAlreadyExists,
    InvalidUpload(String),
    MissingField(&'static str),
    InvalidStatusFilter,
    UnsupportedFileType,
    AiNotConfigured,
    AiFailed,
    InternalError,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::SubmissionNotFound => {
                (StatusCode::NOT_FOUND, "Submission not found".to_string())
            }
            ApiError::FeedbackNotFound => {
                (StatusCode::NOT_FOUND, "Feedback not found".to_string())
            }
            ApiError::CollaborationNotFound => {
                (StatusCode::NOT_FOUND, "Collaboration not found".to_string())
            }
            ApiError::TemplateNotFound => {
                (StatusCode::NOT_FOUND, "Template not found".to_string())
            }
            ApiError::UserNotFound => (StatusCode::NOT_FOUND, "User not found".to_string()),
            ApiError::FileNotFound => (StatusCode::NOT_FOUND, "File not found".to_string()),
            ApiError::AccessDenied => (
                StatusCode::FORBIDDEN,
                "You don't have access to this resource".to_string(),
            ),
            ApiError::FeedbackAlreadyExists => (
                StatusCode::BAD_REQUEST,
                "Feedback already exists for this submission. Use PATCH to update.".to_string(),
            ),
            ApiError::InvalidUpload(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::MissingField(field) => (
                StatusCode::BAD_REQUEST,
                format!("Missing required field: {}", field),
            ),
            ApiError::InvalidStatusFilter => {
                (StatusCode::BAD_REQUEST, "Unknown status filter".to_string())
            }
            ApiError::UnsupportedFileType => (
                StatusCode::BAD_REQUEST,
                "AI grading supports only plain-text submissions".to_string(),
            ),
            ApiError::AiNotConfigured => (
                StatusCode::SERVICE_UNAVAILABLE,
                "AI grading is not configured".to_string(),
            ),
            ApiError::AiFailed => (
                StatusCode::BAD_GATEWAY,
                "AI grading request failed".to_string(),
            ),
            ApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, message).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_status_codes() {
        assert_eq!(
            ApiError::SubmissionNotFound.into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::AccessDenied.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::FeedbackAlreadyExists.into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::AiNotConfigured.into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
