//! Admin endpoints: user management, submission oversight, template curation.
//!
//! Every route here sits behind `require_admin`, so handlers can assume the
//! caller is an administrator.

use crate::api::ApiError;
use crate::models::{total_pages, PageParams};
use crate::server::AppState;
use crate::storage::submission_store::{
    Submission, SubmissionFilter, SubmissionStats, SubmissionStatus,
};
use crate::storage::template_store::{Template, TemplateStats};
use crate::auth::models::UserResponse;
use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub users: Vec<UserResponse>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct SubmissionListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
    pub status: Option<String>,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionPage {
    pub submissions: Vec<Submission>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetAdminRequest {
    pub is_admin: bool,
}

#[derive(Debug, Deserialize)]
pub struct SetActiveRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize)]
pub struct TemplateListResponse {
    pub templates: Vec<Template>,
}

/// Paged user list with email search - GET /api/admin/users
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserPage>, ApiError> {
    let params = PageParams {
        page: query.page,
        per_page: query.per_page,
    };
    let (page, per_page) = params.normalize();
    let search = query.search.as_deref().filter(|s| !s.trim().is_empty());

    let total = state
        .users
        .count(search)
        .map_err(|_| ApiError::InternalError)?;
    let users = state
        .users
        .list(params.offset(), per_page, search)
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(UserPage {
        users: users.iter().map(UserResponse::from_user).collect(),
        total,
        page,
        per_page,
        total_pages: total_pages(total, per_page),
    }))
}

/// One user - GET /api/admin/users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .users
        .get_by_id(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::UserNotFound)?;

    Ok(Json(UserResponse::from_user(&user)))
}

/// Grant or revoke admin - PATCH /api/admin/users/:id/set-admin
pub async fn set_admin(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetAdminRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state
        .users
        .set_admin(&id, payload.is_admin)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::UserNotFound)?;

    info!(
        "🔧 Admin flag for {} set to {}",
        user.email, user.is_admin
    );

    Ok(Json(json!({
        "id": user.id,
        "email": user.email,
        "is_admin": user.is_admin,
    })))
}

/// Activate or deactivate an account - PATCH /api/admin/users/:id/set-active
///
/// Deactivation also revokes every live token the user holds, so existing
/// sessions die on their next request.
pub async fn set_active(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SetActiveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state
        .users
        .set_active(&id, payload.is_active)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::UserNotFound)?;

    if !payload.is_active {
        state
            .tokens
            .revoke_all_for_user(&id)
            .map_err(|_| ApiError::InternalError)?;
    }

    info!(
        "🔧 Active flag for {} set to {}",
        user.email, user.is_active
    );

    Ok(Json(json!({
        "id": user.id,
        "email": user.email,
        "is_active": user.is_active,
    })))
}

/// Paged submission list with filters - GET /api/admin/submissions
pub async fn list_submissions(
    State(state): State<AppState>,
    Query(query): Query<SubmissionListQuery>,
) -> Result<Json<SubmissionPage>, ApiError> {
    let params = PageParams {
        page: query.page,
        per_page: query.per_page,
    };
    let (page, per_page) = params.normalize();

    let status = match &query.status {
        None => None,
        Some(raw) => Some(
            SubmissionStatus::from_str(raw).ok_or(ApiError::InvalidStatusFilter)?,
        ),
    };

    let filter = SubmissionFilter {
        status,
        user_id: query.user_id,
    };

    let total = state
        .submissions
        .count(&filter)
        .map_err(|_| ApiError::InternalError)?;
    let submissions = state
        .submissions
        .list_paginated(&filter, params.offset(), per_page)
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(SubmissionPage {
        submissions,
        total,
        page,
        per_page,
        total_pages: total_pages(total, per_page),
    }))
}

/// One submission, regardless of owner - GET /api/admin/submissions/:id
pub async fn get_submission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Submission>, ApiError> {
    let submission = state
        .submissions
        .get(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::SubmissionNotFound)?;

    Ok(Json(submission))
}

/// Review-state counts - GET /api/admin/submissions/stats
pub async fn submission_stats(
    State(state): State<AppState>,
) -> Result<Json<SubmissionStats>, ApiError> {
    let stats = state
        .submissions
        .stats()
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(stats))
}

/// Every template, public or not - GET /api/admin/templates
pub async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<TemplateListResponse>, ApiError> {
    let templates = state
        .templates
        .list_all()
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(TemplateListResponse { templates }))
}

/// Hide a template - PUT /api/admin/templates/:id/archive
pub async fn archive_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Template>, ApiError> {
    let template = state
        .templates
        .archive(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::TemplateNotFound)?;

    Ok(Json(template))
}

/// Promote a template to the default - PUT /api/admin/templates/:id/set-default
pub async fn set_default_template(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Template>, ApiError> {
    let template = state
        .templates
        .set_default(&id)
        .map_err(|_| ApiError::InternalError)?
        .ok_or(ApiError::TemplateNotFound)?;

    info!("🔧 Default template is now '{}'", template.title);

    Ok(Json(template))
}

#[derive(Debug, Serialize)]
pub struct TemplateStatsResponse {
    pub template_stats: Vec<TemplateStats>,
}

/// Usage numbers per template - GET /api/admin/templates/stats
pub async fn template_stats(
    State(state): State<AppState>,
) -> Result<Json<TemplateStatsResponse>, ApiError> {
    let template_stats = state
        .templates
        .stats()
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(TemplateStatsResponse { template_stats }))
}
