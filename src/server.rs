//! Application state and router assembly.

use crate::ai::AiGrader;
use crate::api;
use crate::auth::{api as auth_api, require_admin, require_auth, VerificationCodec};
use crate::auth::{TokenStore, UserStore};
use crate::middleware::{rate_limit_middleware, request_logging, RateLimitConfig, RateLimitLayer};
use crate::models::Config;
use crate::storage::{
    CollaborationStore, Db, FeedbackStore, FileStorage, SubmissionStore, TemplateStore,
};
use anyhow::{Context, Result};
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, patch, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;

/// Application state shared across all request handlers
#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserStore>,
    pub tokens: Arc<TokenStore>,
    pub submissions: Arc<SubmissionStore>,
    pub feedback: Arc<FeedbackStore>,
    pub collaborations: Arc<CollaborationStore>,
    pub templates: Arc<TemplateStore>,
    pub files: Arc<FileStorage>,
    pub grader: Arc<AiGrader>,
    pub verifier: Arc<VerificationCodec>,
    /// Base URL used in links handed to users (verification emails)
    pub base_url: String,
}

impl AppState {
    pub fn new(config: &Config) -> Result<Self> {
        let db = Db::open(&config.database_path)?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            users: Arc::new(UserStore::new(db.clone())),
            tokens: Arc::new(TokenStore::new(
                db.clone(),
                config.access_token_expire_minutes,
            )),
            submissions: Arc::new(SubmissionStore::new(db.clone())),
            feedback: Arc::new(FeedbackStore::new(db.clone())),
            collaborations: Arc::new(CollaborationStore::new(db.clone())),
            templates: Arc::new(TemplateStore::new(db)),
            files: Arc::new(FileStorage::new(config.upload_dir.clone())?),
            grader: Arc::new(AiGrader::new(
                http_client,
                config.anthropic_api_key.clone(),
                config.openai_api_key.clone(),
                config.ai_model.clone(),
            )),
            verifier: Arc::new(VerificationCodec::new(config.secret_key.clone())),
            base_url: format!("http://{}:{}", config.host, config.port),
        })
    }

    /// State over throwaway storage for unit tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        let db = Db::open_in_memory().expect("in-memory db");
        let upload_dir =
            std::env::temp_dir().join(format!("gradeflow-test-{}", uuid::Uuid::new_v4()));

        Self {
            users: Arc::new(UserStore::new(db.clone())),
            tokens: Arc::new(TokenStore::new(db.clone(), 30)),
            submissions: Arc::new(SubmissionStore::new(db.clone())),
            feedback: Arc::new(FeedbackStore::new(db.clone())),
            collaborations: Arc::new(CollaborationStore::new(db.clone())),
            templates: Arc::new(TemplateStore::new(db)),
            files: Arc::new(FileStorage::new(upload_dir).expect("temp upload dir")),
            grader: Arc::new(AiGrader::new(
                reqwest::Client::new(),
                None,
                None,
                "test".to_string(),
            )),
            verifier: Arc::new(VerificationCodec::new("test-secret".to_string())),
            base_url: "http://localhost:0".to_string(),
        }
    }
}

/// The two rate limiters the router installs: a loose one over the whole
/// API and a tight one over AI generation.
#[derive(Clone)]
pub struct RateLimiters {
    pub general: RateLimitLayer,
    pub ai: RateLimitLayer,
}

impl RateLimiters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            general: RateLimitLayer::new(RateLimitConfig::per_minute(config.rate_limit_default)),
            ai: RateLimitLayer::new(RateLimitConfig::per_minute(config.rate_limit_ai)),
        }
    }

    /// Drop stale per-IP entries on both limiters.
    pub fn cleanup(&self) {
        self.general.cleanup();
        self.ai.cleanup();
    }
}

/// Assemble the full application router.
pub fn build_router(state: AppState, limiters: RateLimiters) -> Router {
    // Routes usable without a session
    let public = Router::new()
        .route("/health", get(health_check))
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/register/student", post(auth_api::register_student))
        .route("/api/auth/register/teacher", post(auth_api::register_teacher))
        .route("/api/auth/verify-email", get(auth_api::verify_email))
        .route(
            "/api/auth/resend-verification",
            post(auth_api::resend_verification),
        );

    // AI generation gets its own tighter limit on top of everything else
    let ai_routes = Router::new()
        .route(
            "/api/feedback/generate/:submission_id",
            post(api::feedback::generate_feedback),
        )
        .route_layer(from_fn_with_state(limiters.ai, rate_limit_middleware));

    let protected = Router::new()
        .route("/api/auth/logout", post(auth_api::logout))
        .route("/api/auth/me", get(auth_api::me))
        .route(
            "/api/submissions/upload",
            post(api::submissions::upload_submission),
        )
        .route("/api/submissions", get(api::submissions::list_submissions))
        .route(
            "/api/submissions/:id",
            get(api::submissions::get_submission).delete(api::submissions::delete_submission),
        )
        .route(
            "/api/submissions/:id/download",
            get(api::submissions::download_submission),
        )
        .route(
            "/api/feedback",
            get(api::feedback::list_mine).post(api::feedback::create_feedback),
        )
        .route(
            "/api/feedback/submission/:submission_id",
            get(api::feedback::get_for_submission),
        )
        .route(
            "/api/feedback/:id",
            patch(api::feedback::update_feedback).delete(api::feedback::delete_feedback),
        )
        .merge(ai_routes)
        .route(
            "/api/collaborations",
            get(api::collaborations::list_collaborations)
                .post(api::collaborations::create_collaboration),
        )
        .route(
            "/api/collaborations/submission/:id",
            get(api::collaborations::list_for_submission),
        )
        .route(
            "/api/collaborations/:id",
            put(api::collaborations::update_collaboration)
                .delete(api::collaborations::delete_collaboration),
        )
        .route(
            "/api/templates",
            get(api::templates::list_templates).post(api::templates::create_template),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    let admin = Router::new()
        .route("/api/admin/users", get(api::admin::list_users))
        .route("/api/admin/users/:id", get(api::admin::get_user))
        .route("/api/admin/users/:id/set-admin", patch(api::admin::set_admin))
        .route(
            "/api/admin/users/:id/set-active",
            patch(api::admin::set_active),
        )
        .route("/api/admin/submissions", get(api::admin::list_submissions))
        .route(
            "/api/admin/submissions/stats",
            get(api::admin::submission_stats),
        )
        .route("/api/admin/submissions/:id", get(api::admin::get_submission))
        .route("/api/admin/templates", get(api::admin::list_templates))
        .route("/api/admin/templates/stats", get(api::admin::template_stats))
        .route(
            "/api/admin/templates/:id/archive",
            put(api::admin::archive_template),
        )
        .route(
            "/api/admin/templates/:id/set-default",
            put(api::admin::set_default_template),
        )
        // Auth runs first, then the admin check on the resolved user
        .route_layer(from_fn(require_admin))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(admin)
        .layer(from_fn_with_state(limiters.general, rate_limit_middleware))
        .layer(from_fn(request_logging))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "gradeflow backend operational"
}
