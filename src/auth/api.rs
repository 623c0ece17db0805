//! Authentication API Endpoints
//! Mission: Login, logout, registration, and email verification

use crate::auth::{
    middleware::BearerToken,
    models::{LoginForm, RegisterRequest, TokenResponse, User, UserResponse, UserRole},
};
use crate::server::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Form, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

/// Login endpoint - POST /api/auth/login
///
/// Form-encoded OAuth2 password style: the email arrives in `username`.
pub async fn login(
    State(state): State<AppState>,
    Form(form): Form<LoginForm>,
) -> Result<Json<TokenResponse>, AuthApiError> {
    let user = state
        .users
        .authenticate(&form.username, &form.password)
        .map_err(|e| {
            warn!("Credential check failed: {}", e);
            AuthApiError::InternalError
        })?;

    let Some(user) = user else {
        warn!("❌ Failed login attempt: {}", form.username);
        return Err(AuthApiError::InvalidCredentials);
    };

    if !user.is_active {
        warn!("❌ Login rejected for unverified account: {}", user.email);
        return Err(AuthApiError::EmailNotVerified);
    }

    let token = state.tokens.issue(&user.id).map_err(|e| {
        warn!("Token issuance failed: {}", e);
        AuthApiError::InternalError
    })?;

    info!("✅ Login successful: {} ({})", user.email, user.role.as_str());

    Ok(Json(TokenResponse {
        access_token: token.token,
        token_type: "bearer".to_string(),
        expires_at: token.expires_at.to_rfc3339(),
    }))
}

/// Logout endpoint - POST /api/auth/logout (protected)
///
/// Revokes the presented token. Revocation is idempotent, so repeated
/// logouts with a not-yet-expired token still succeed.
pub async fn logout(
    State(state): State<AppState>,
    Extension(token): Extension<BearerToken>,
    Extension(user): Extension<User>,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    state.tokens.revoke(&token.0).map_err(|e| {
        warn!("Logout revocation failed: {}", e);
        AuthApiError::InternalError
    })?;

    info!("👋 User logged out: {}", user.email);

    Ok(Json(json!({ "detail": "Successfully logged out" })))
}

/// Register a student - POST /api/auth/register/student
pub async fn register_student(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<UserResponse>, AuthApiError> {
    register(state, payload, UserRole::Student).await
}

/// Register a teacher - POST /api/auth/register/teacher
pub async fn register_teacher(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<UserResponse>, AuthApiError> {
    register(state, payload, UserRole::Teacher).await
}

async fn register(
    state: AppState,
    payload: RegisterRequest,
    role: UserRole,
) -> Result<Json<UserResponse>, AuthApiError> {
    if payload.password.len() < 8 {
        return Err(AuthApiError::WeakPassword);
    }

    let existing = state
        .users
        .get_by_email(&payload.email)
        .map_err(|_| AuthApiError::InternalError)?;
    if existing.is_some() {
        warn!("Registration attempt with existing email: {}", payload.email);
        return Err(AuthApiError::UserAlreadyExists);
    }

    let user = state
        .users
        .create_user(&payload.email, &payload.name, &payload.password, role)
        .map_err(|e| {
            warn!("Failed to create user: {}", e);
            AuthApiError::InternalError
        })?;

    if let Err(e) = state
        .verifier
        .send_verification_email(&state.base_url, &user)
    {
        // Account exists either way; the link can be re-sent
        warn!("Failed to send verification email: {}", e);
    }

    Ok(Json(UserResponse::from_user(&user)))
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailQuery {
    pub token: String,
}

/// Verify an email address - GET /api/auth/verify-email?token=...
pub async fn verify_email(
    State(state): State<AppState>,
    Query(query): Query<VerifyEmailQuery>,
) -> Result<Json<UserResponse>, AuthApiError> {
    let Some(verified) = state.verifier.decode(&query.token) else {
        warn!("Email verification failed: invalid token");
        return Err(AuthApiError::InvalidVerificationToken);
    };

    let user = state
        .users
        .get_by_id(&verified.user_id)
        .map_err(|_| AuthApiError::InternalError)?
        .ok_or(AuthApiError::UserNotFound)?;

    if user.email != verified.email {
        warn!("Email verification failed: email mismatch for {}", user.id);
        return Err(AuthApiError::InvalidVerificationToken);
    }

    if user.is_verified {
        return Ok(Json(UserResponse::from_user(&user)));
    }

    let user = state
        .users
        .mark_verified(&user.id)
        .map_err(|_| AuthApiError::InternalError)?
        .ok_or(AuthApiError::UserNotFound)?;

    info!("✅ Email verified for {}", user.email);

    Ok(Json(UserResponse::from_user(&user)))
}

#[derive(Debug, Deserialize)]
pub struct ResendVerificationRequest {
    pub email: String,
}

/// Resend the verification link - POST /api/auth/resend-verification
///
/// Never reveals whether the email exists.
pub async fn resend_verification(
    State(state): State<AppState>,
    Json(payload): Json<ResendVerificationRequest>,
) -> Result<Json<serde_json::Value>, AuthApiError> {
    let user = state
        .users
        .get_by_email(&payload.email)
        .map_err(|_| AuthApiError::InternalError)?;

    if let Some(user) = user {
        if user.is_verified {
            return Ok(Json(json!({ "detail": "Email already verified" })));
        }
        if let Err(e) = state
            .verifier
            .send_verification_email(&state.base_url, &user)
        {
            warn!("Failed to resend verification email: {}", e);
        }
    }

    Ok(Json(json!({
        "detail": "If the email exists, a verification link has been sent"
    })))
}

/// Current user profile - GET /api/auth/me (protected)
pub async fn me(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse::from_user(&user))
}

/// Auth API errors
#[derive(Debug)]
pub enum AuthApiError {
    InvalidCredentials,
    EmailNotVerified,
    UserAlreadyExists,
    WeakPassword,
    InvalidVerificationToken,
    UserNotFound,
    InternalError,
}

impl IntoResponse for AuthApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthApiError::InvalidCredentials => {
                (StatusCode::UNAUTHORIZED, "Incorrect email or password")
            }
            AuthApiError::EmailNotVerified => (
                StatusCode::UNAUTHORIZED,
                "Email not verified. Please check your inbox for the verification link.",
            ),
            AuthApiError::UserAlreadyExists => (
                StatusCode::CONFLICT,
                "A user with this email already exists",
            ),
            AuthApiError::WeakPassword => (
                StatusCode::BAD_REQUEST,
                "Password must be at least 8 characters",
            ),
            AuthApiError::InvalidVerificationToken => (
                StatusCode::BAD_REQUEST,
                "Invalid or expired verification token",
            ),
            AuthApiError::UserNotFound => (StatusCode::NOT_FOUND, "User not found"),
            AuthApiError::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        (status, message).into_response()
    }
}
