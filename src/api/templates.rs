//! Correction template endpoints for the non-admin surface.

use crate::api::ApiError;
use crate::auth::models::{User, UserRole};
use crate::server::AppState;
use crate::storage::template_store::Template;
use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct TemplateList {
    pub templates: Vec<Template>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTemplateRequest {
    pub title: String,
    pub description: Option<String>,
    pub structure: String,
    #[serde(default)]
    pub is_public: bool,
}

/// Public templates - GET /api/templates
pub async fn list_templates(
    State(state): State<AppState>,
) -> Result<Json<TemplateList>, ApiError> {
    let templates = state
        .templates
        .list_public()
        .map_err(|_| ApiError::InternalError)?;

    Ok(Json(TemplateList { templates }))
}

/// Create a template - POST /api/templates (teachers and admins)
pub async fn create_template(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateTemplateRequest>,
) -> Result<(StatusCode, Json<Template>), ApiError> {
    if user.role != UserRole::Teacher && !user.is_admin {
        return Err(ApiError::AccessDenied);
    }

    let template = state
        .templates
        .create(
            &payload.title,
            payload.description.as_deref(),
            &payload.structure,
            payload.is_public,
            &user.id,
        )
        .map_err(|_| ApiError::InternalError)?;

    Ok((StatusCode::CREATED, Json(template)))
}
