//! Authorization Gate
//! Mission: Keep protected routes behind a valid session, admin routes behind the admin flag

use crate::auth::models::User;
use crate::server::AppState;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Extension,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tracing::warn;

/// The raw bearer string that authenticated this request (logout needs it).
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Authentication/authorization failures, kept distinguishable end to end
#[derive(Debug, PartialEq, Eq)]
pub enum AuthError {
    /// No usable Authorization header on a protected call
    MissingToken,
    UnknownToken,
    ExpiredToken,
    RevokedToken,
    /// Token is fine but its owner has been deactivated
    InactiveUser,
    /// Valid session, insufficient role
    Forbidden,
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing authorization token"),
            AuthError::UnknownToken => (StatusCode::UNAUTHORIZED, "Unknown or malformed token"),
            AuthError::ExpiredToken => (StatusCode::UNAUTHORIZED, "Token has expired"),
            AuthError::RevokedToken => (StatusCode::UNAUTHORIZED, "Token has been revoked"),
            AuthError::InactiveUser => (StatusCode::UNAUTHORIZED, "Account is deactivated"),
            AuthError::Forbidden => (StatusCode::FORBIDDEN, "Admin privileges required"),
            AuthError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error"),
        };

        (status, message).into_response()
    }
}

/// Full resolution of a presented token to its (active) owner.
///
/// Token-level checks first (unknown/revoked/expired), then the user must
/// still exist and be active. Read-only, so concurrent requests with the
/// same token are safe; a revocation racing an in-flight request only
/// affects the next validation.
pub fn resolve_user(state: &AppState, token: &str) -> Result<User, AuthError> {
    let record = state.tokens.validate(token)?;

    let user = state
        .users
        .get_by_id(&record.user_id)
        .map_err(|e| {
            warn!("User lookup during auth failed: {}", e);
            AuthError::Internal
        })?
        .ok_or(AuthError::UnknownToken)?;

    if !user.is_active {
        return Err(AuthError::InactiveUser);
    }

    Ok(user)
}

/// Middleware guarding protected routes: resolves the bearer token and makes
/// the `User` (plus the raw token) available to handlers via extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let Some(TypedHeader(bearer)) = bearer else {
        return Err(AuthError::MissingToken);
    };

    let user = resolve_user(&state, bearer.token())?;

    req.extensions_mut()
        .insert(BearerToken(bearer.token().to_string()));
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}

/// Layered after `require_auth`: rejects valid non-admin sessions with
/// Forbidden, never Unauthorized.
pub async fn require_admin(
    Extension(user): Extension<User>,
    req: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if !user.is_admin {
        return Err(AuthError::Forbidden);
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::models::UserRole;
    use crate::server::AppState;

    fn state() -> AppState {
        AppState::for_tests()
    }

    #[test]
    fn test_auth_error_status_codes() {
        for err in [
            AuthError::MissingToken,
            AuthError::UnknownToken,
            AuthError::ExpiredToken,
            AuthError::RevokedToken,
            AuthError::InactiveUser,
        ] {
            assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
        }

        assert_eq!(
            AuthError::Forbidden.into_response().status(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn test_resolve_user_happy_path() {
        let state = state();
        let user = state
            .users
            .create_user("r@school.edu", "R", "pw", UserRole::Student)
            .unwrap();
        state.users.mark_verified(&user.id).unwrap();

        let issued = state.tokens.issue(&user.id).unwrap();
        let resolved = resolve_user(&state, &issued.token).unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[test]
    fn test_resolve_user_inactive_owner() {
        let state = state();
        let user = state
            .users
            .create_user("d@school.edu", "D", "pw", UserRole::Student)
            .unwrap();
        state.users.mark_verified(&user.id).unwrap();
        let issued = state.tokens.issue(&user.id).unwrap();

        // Deactivating the owner invalidates an otherwise-live token
        state.users.set_active(&user.id, false).unwrap();
        assert!(matches!(
            resolve_user(&state, &issued.token),
            Err(AuthError::InactiveUser)
        ));
    }

    #[test]
    fn test_resolve_user_unknown_token() {
        let state = state();
        assert!(matches!(
            resolve_user(&state, "garbage"),
            Err(AuthError::UnknownToken)
        ));
    }
}
