//! Submission endpoints: upload, list, fetch, download, delete.

use crate::api::ApiError;
use crate::auth::models::User;
use crate::server::AppState;
use crate::storage::files::FileStorage;
use crate::storage::submission_store::{NewSubmission, Submission, SubmissionStatus};
use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct SubmissionList {
    pub submissions: Vec<Submission>,
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: Option<String>,
}

fn parse_status_filter(raw: &Option<String>) -> Result<Option<SubmissionStatus>, ApiError> {
    match raw {
        None => Ok(None),
        Some(s) => SubmissionStatus::from_str(s)
            .map(Some)
            .ok_or(ApiError::InvalidStatusFilter),
    }
}

/// Owner or site admin may touch a submission.
pub(crate) fn check_access(submission: &Submission, user: &User) -> Result<(), ApiError> {
    if submission.user_id != user.id && !user.is_admin {
        return Err(ApiError::AccessDenied);
    }
    Ok(())
}

/// Upload a new submission - POST /api/submissions/upload (multipart)
pub async fn upload_submission(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Submission>), ApiError> {
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;
    let mut file: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidUpload(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => {
                title = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidUpload(e.to_string()))?,
                );
            }
            "description" => {
                description = Some(
                    field
                        .text()
                        .await
                        .map_err(|e| ApiError::InvalidUpload(e.to_string()))?,
                );
            }
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::InvalidUpload(e.to_string()))?;
                file = Some((filename, data.to_vec()));
            }
            _ => {}
        }
    }

    let title = title.filter(|t| !t.trim().is_empty());
    let Some(title) = title else {
        return Err(ApiError::MissingField("title"));
    };
    let Some((filename, data)) = file else {
        return Err(ApiError::MissingField("file"));
    };

    if !FileStorage::is_allowed(&filename) {
        return Err(ApiError::InvalidUpload(format!(
            "File type of {} is not allowed",
            filename
        )));
    }

    let saved = state
        .files
        .save(&user.id, &filename, &data)
        .map_err(|e| ApiError::InvalidUpload(e.to_string()))?;

    let created = state.submissions.create(NewSubmission {
        title,
        description: description.filter(|d| !d.trim().is_empty()),
        file_path: saved.relative_path.clone(),
        original_filename: filename,
        file_type: saved.file_type,
        user_id: user.id,
    });

    match created {
        Ok(submission) => {
            info!(
                "📄 New submission '{}' from {} ({} bytes)",
                submission.title,
                user.email,
                data.len()
            );
            Ok((StatusCode::CREATED, Json(submission)))
        }
        Err(e) => {
            // Don't leave the file orphaned if the row never landed
            warn!("Failed to record submission: {}", e);
            state.files.delete(&saved.relative_path);
            Err(ApiError::InternalError)
        }
    }
}

/// Current user's submissions - GET /api/submissions?status=
pub async fn list_submissions(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<SubmissionList>, ApiError> {
    let status = parse_status_filter(&query.status)?;
    let submissions = state
        .submissions
        .list_for_user(&user.id, status)
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(SubmissionList { submissions }))
}

/// Fetch one submission - GET /api/submissions/:id
pub async fn get_submission(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<Submission>, ApiError> {
    let submission = state
        .submissions
        .get(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    check_access(&submission, &user)?;

    Ok(Json(submission))
}

/// Download the stored file - GET /api/submissions/:id/download
pub async fn download_submission(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let submission = state
        .submissions
        .get(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    check_access(&submission, &user)?;

    let Some(file_path) = submission.file_path.as_deref() else {
        return Err(ApiError::FileNotFound);
    };

    let data = state.files.read(file_path).map_err(|_| ApiError::FileNotFound)?;

    let content_type = submission
        .file_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let filename = submission
        .original_filename
        .unwrap_or_else(|| "download".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        data,
    )
        .into_response())
}

/// Delete a submission and its file - DELETE /api/submissions/:id
pub async fn delete_submission(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let submission = state
        .submissions
        .get(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    check_access(&submission, &user)?;

    if let Some(file_path) = submission.file_path.as_deref() {
        state.files.delete(file_path);
    }

    state
        .submissions
        .delete(&id)
        .map_err(|_| ApiError::InternalError)?;

    info!("🗑️  Submission {} deleted by {}", id, user.email);

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_filter() {
        assert_eq!(parse_status_filter(&None).unwrap(), None);
        assert_eq!(
            parse_status_filter(&Some("reviewed".to_string())).unwrap(),
            Some(SubmissionStatus::Reviewed)
        );
        assert!(parse_status_filter(&Some("bogus".to_string())).is_err());
    }
}
