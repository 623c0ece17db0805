//! Feedback endpoints: review results on submissions, including AI-generated
//! feedback.

use crate::api::{submissions::check_access, ApiError};
use crate::ai::GraderError;
use crate::auth::models::User;
use crate::server::AppState;
use crate::storage::feedback_store::Feedback;
use crate::storage::submission_store::SubmissionStatus;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct FeedbackList {
    pub feedback: Vec<Feedback>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFeedbackRequest {
    pub submission_id: Uuid,
    pub content: String,
    pub grade: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFeedbackRequest {
    pub content: String,
    pub grade: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GenerateFeedbackRequest {
    pub template_id: Option<Uuid>,
}

/// Feedback for one submission - GET /api/feedback/submission/:id
pub async fn get_for_submission(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(submission_id): Path<Uuid>,
) -> Result<Json<Feedback>, ApiError> {
    let submission = state
        .submissions
        .get(&submission_id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    check_access(&submission, &user)?;

    let feedback = state
        .feedback
        .get_by_submission(&submission_id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::FeedbackNotFound)?;

    Ok(Json(feedback))
}

/// All feedback on the caller's submissions - GET /api/feedback
pub async fn list_mine(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<FeedbackList>, ApiError> {
    let feedback = state
        .feedback
        .list_for_owner(&user.id)
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(FeedbackList { feedback }))
}

/// Create feedback - POST /api/feedback (admin only)
pub async fn create_feedback(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateFeedbackRequest>,
) -> Result<(StatusCode, Json<Feedback>), ApiError> {
    if !user.is_admin {
        return Err(ApiError::AccessDenied);
    }

    let submission = state
        .submissions
        .get(&payload.submission_id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    let existing = state
        .feedback
        .get_by_submission(&submission.id)
        .map_err(|_| ApiError::InternalError)?;
    if existing.is_some() {
        return Err(ApiError::FeedbackAlreadyExists);
    }

    let feedback = state
        .feedback
        .create(
            &submission.id,
            None,
            &payload.content,
            payload.grade.as_deref(),
        )
        .map_err(|_| ApiError::InternalError)?;

    state
        .submissions
        .set_status(&submission.id, SubmissionStatus::Reviewed)
        .map_err(|_| ApiError::InternalError)?;

    info!(
        "✅ Feedback recorded for submission {} by {}",
        submission.id, user.email
    );

    Ok((StatusCode::CREATED, Json(feedback)))
}

/// Update feedback - PATCH /api/feedback/:id (admin only)
pub async fn update_feedback(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateFeedbackRequest>,
) -> Result<Json<Feedback>, ApiError> {
    if !user.is_admin {
        return Err(ApiError::AccessDenied);
    }

    let feedback = state
        .feedback
        .update(&id, &payload.content, payload.grade.as_deref())
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::FeedbackNotFound)?;

    Ok(Json(feedback))
}

/// Delete feedback - DELETE /api/feedback/:id (admin only)
///
/// The submission drops back to pending so it shows up for review again.
pub async fn delete_feedback(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if !user.is_admin {
        return Err(ApiError::AccessDenied);
    }

    let submission_id = state
        .feedback
        .delete(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::FeedbackNotFound)?;

    state
        .submissions
        .set_status(&submission_id, SubmissionStatus::Pending)
        .map_err(|_| ApiError::InternalError)?;

    Ok(StatusCode::NO_CONTENT)
}

/// Generate AI feedback - POST /api/feedback/generate/:submission_id (admin only)
pub async fn generate_feedback(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(submission_id): Path<Uuid>,
    payload: Option<Json<GenerateFeedbackRequest>>,
) -> Result<(StatusCode, Json<Feedback>), ApiError> {
    if !user.is_admin {
        return Err(ApiError::AccessDenied);
    }

    let submission = state
        .submissions
        .get(&submission_id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    let existing = state
        .feedback
        .get_by_submission(&submission.id)
        .map_err(|_| ApiError::InternalError)?;
    if existing.is_some() {
        return Err(ApiError::FeedbackAlreadyExists);
    }

    // Only formats we can hand to the model as text
    match submission.file_type.as_deref() {
        Some("text/plain") | Some("application/x-ipynb+json") => {}
        _ => return Err(ApiError::UnsupportedFileType),
    }

    let file_path = submission
        .file_path
        .as_deref()
        .ok_or(ApiError::FileNotFound)?;
    let bytes = state
        .files
        .read(file_path)
        .map_err(|_| ApiError::FileNotFound)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();

    // Requested template, else the site default, else freeform grading
    let requested_template = payload.and_then(|Json(p)| p.template_id);
    let template = match requested_template {
        Some(id) => Some(
            state
                .templates
                .get(&id)
                .map_err(|_| ApiError::InternalError)?
                .ok_or(ApiError::TemplateNotFound)?,
        ),
        None => state
            .templates
            .get_default()
            .map_err(|_| ApiError::InternalError)?,
    };

    let graded = state
        .grader
        .grade_submission(
            &submission.title,
            &text,
            template.as_ref().map(|t| t.structure.as_str()),
        )
        .await
        .map_err(|e| match e {
            GraderError::NotConfigured => ApiError::AiNotConfigured,
            GraderError::RequestFailed(msg) => {
                warn!("AI grading failed for {}: {}", submission.id, msg);
                ApiError::AiFailed
            }
        })?;

    let feedback = state
        .feedback
        .create(
            &submission.id,
            template.as_ref().map(|t| &t.id),
            &graded.content,
            graded.grade.as_deref(),
        )
        .map_err(|_| ApiError::InternalError)?;

    state
        .submissions
        .set_status(&submission.id, SubmissionStatus::Reviewed)
        .map_err(|_| ApiError::InternalError)?;

    info!(
        "🤖 AI feedback generated for submission {} (grade: {})",
        submission.id,
        feedback.grade.as_deref().unwrap_or("n/a")
    );

    Ok((StatusCode::CREATED, Json(feedback)))
}
