//! Collaboration endpoints: sharing submissions with other users.

use crate::api::ApiError;
use crate::auth::models::User;
use crate::server::AppState;
use crate::storage::collaboration_store::{Collaboration, Permission};
use crate::storage::submission_store::Submission;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct CollaborationList {
    pub collaborations: Vec<Collaboration>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCollaborationRequest {
    pub submission_id: Uuid,
    pub user_id: Uuid,
    #[serde(default = "default_permission")]
    pub permission: Permission,
}

fn default_permission() -> Permission {
    Permission::Read
}

#[derive(Debug, Deserialize)]
pub struct UpdateCollaborationRequest {
    pub permission: Permission,
}

/// The submission owner, or a collaborator holding admin permission, may
/// manage sharing.
fn can_manage(
    state: &AppState,
    submission: &Submission,
    user: &User,
) -> Result<bool, ApiError> {
    if submission.user_id == user.id {
        return Ok(true);
    }

    let grant = state
        .collaborations
        .find(&submission.id, &user.id)
        .map_err(|_| ApiError::InternalError)?;

    Ok(matches!(
        grant,
        Some(Collaboration {
            permission: Permission::Admin,
            ..
        })
    ))
}

/// Grants on all submissions the caller owns - GET /api/collaborations
pub async fn list_collaborations(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<CollaborationList>, ApiError> {
    let collaborations = state
        .collaborations
        .list_for_owner(&user.id)
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(CollaborationList { collaborations }))
}

/// Grants on one submission - GET /api/collaborations/submission/:id
pub async fn list_for_submission(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(submission_id): Path<Uuid>,
) -> Result<Json<CollaborationList>, ApiError> {
    let submission = state
        .submissions
        .get(&submission_id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    // Only the owner sees the full sharing list
    if submission.user_id != user.id {
        return Err(ApiError::AccessDenied);
    }

    let collaborations = state
        .collaborations
        .list_for_submission(&submission_id)
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(CollaborationList { collaborations }))
}

/// Share a submission - POST /api/collaborations
pub async fn create_collaboration(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateCollaborationRequest>,
) -> Result<(StatusCode, Json<Collaboration>), ApiError> {
    let submission = state
        .submissions
        .get(&payload.submission_id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    if !can_manage(&state, &submission, &user)? {
        return Err(ApiError::AccessDenied);
    }

    let target = state
        .users
        .get_by_id(&payload.user_id)
        .map_err(|_| ApiError::InternalError)?;
    if target.is_none() {
        return Err(ApiError::UserNotFound);
    }

    let collaboration = state
        .collaborations
        .upsert(&payload.submission_id, &payload.user_id, payload.permission)
        .map_err(|_| ApiError::InternalError)?;

    Ok((StatusCode::CREATED, Json(collaboration)))
}

/// Change a grant's permission - PUT /api/collaborations/:id
pub async fn update_collaboration(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCollaborationRequest>,
) -> Result<Json<Collaboration>, ApiError> {
    let collaboration = state
        .collaborations
        .get(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::CollaborationNotFound)?;

    let submission = state
        .submissions
        .get(&collaboration.submission_id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    if !can_manage(&state, &submission, &user)? {
        return Err(ApiError::AccessDenied);
    }

    let updated = state
        .collaborations
        .upsert(
            &collaboration.submission_id,
            &collaboration.user_id,
            payload.permission,
        )
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(updated))
}

/// Revoke a grant - DELETE /api/collaborations/:id
pub async fn delete_collaboration(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let collaboration = state
        .collaborations
        .get(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::CollaborationNotFound)?;

    let submission = state
        .submissions
        .get(&collaboration.submission_id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    if !can_manage(&state, &submission, &user)? {
        return Err(ApiError::AccessDenied);
    }

    state
        .collaborations
        .delete(&id)
        .map_err(|_| ApiError::InternalError)?;

    Ok(StatusCode::NO_CONTENT)
}
