//! Token Issuer/Validator
//! Mission: Turn verified logins into revocable bearer tokens
//!
//! Tokens are opaque random strings persisted in the database, so logout and
//! account deactivation take effect on the very next request. Per token the
//! lifecycle is issued -> active -> expired | revoked, with no way out of the
//! terminal states.

use crate::auth::middleware::AuthError;
use crate::auth::models::AuthToken;
use crate::storage::db::Db;
use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

const TOKEN_COLUMNS: &str = "id, token, user_id, expires_at, is_revoked, created_at";

/// Database-backed token store
#[derive(Clone)]
pub struct TokenStore {
    db: Db,
    ttl_minutes: i64,
}

fn row_to_token(row: &Row<'_>) -> rusqlite::Result<AuthToken> {
    let id_str: String = row.get(0)?;
    let user_id_str: String = row.get(2)?;
    let expires_str: String = row.get(3)?;

    let conversion = |e: Box<dyn std::error::Error + Send + Sync>, idx: usize| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e)
    };

    Ok(AuthToken {
        id: Uuid::parse_str(&id_str).map_err(|e| conversion(Box::new(e), 0))?,
        token: row.get(1)?,
        user_id: Uuid::parse_str(&user_id_str).map_err(|e| conversion(Box::new(e), 2))?,
        expires_at: DateTime::parse_from_rfc3339(&expires_str)
            .map_err(|e| conversion(Box::new(e), 3))?
            .with_timezone(&Utc),
        is_revoked: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// 32 random bytes, URL-safe base64. Opaque: carries no claims.
fn generate_token_value() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

impl TokenStore {
    pub fn new(db: Db, ttl_minutes: i64) -> Self {
        Self { db, ttl_minutes }
    }

    /// Issue a fresh token for `user_id` with the configured expiry window.
    pub fn issue(&self, user_id: &Uuid) -> Result<AuthToken> {
        let token = AuthToken {
            id: Uuid::new_v4(),
            token: generate_token_value(),
            user_id: *user_id,
            expires_at: Utc::now() + Duration::minutes(self.ttl_minutes),
            is_revoked: false,
            created_at: Utc::now().to_rfc3339(),
        };

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tokens (id, token, user_id, expires_at, is_revoked, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![
                    token.id.to_string(),
                    token.token,
                    token.user_id.to_string(),
                    token.expires_at.to_rfc3339(),
                    token.created_at,
                ],
            )
            .context("Failed to insert token")?;
            Ok(())
        })?;

        debug!(user_id = %user_id, expires_at = %token.expires_at, "Issued token");

        Ok(token)
    }

    /// Resolve a presented token string to its record, distinguishing the
    /// failure modes: unknown, revoked, expired.
    pub fn validate(&self, token: &str) -> Result<AuthToken, AuthError> {
        let record = self
            .db
            .with_conn(|conn| {
                let record = conn
                    .query_row(
                        &format!("SELECT {} FROM tokens WHERE token = ?1", TOKEN_COLUMNS),
                        params![token],
                        row_to_token,
                    )
                    .optional()
                    .context("Failed to look up token")?;
                Ok(record)
            })
            .map_err(|e| {
                warn!("Token lookup failed: {}", e);
                AuthError::Internal
            })?;

        let Some(record) = record else {
            debug!("Token validation failed: unknown token");
            return Err(AuthError::UnknownToken);
        };

        if record.is_revoked {
            debug!(user_id = %record.user_id, "Token validation failed: revoked");
            return Err(AuthError::RevokedToken);
        }

        if record.expires_at < Utc::now() {
            debug!(user_id = %record.user_id, "Token validation failed: expired");
            return Err(AuthError::ExpiredToken);
        }

        Ok(record)
    }

    /// Revoke a token. Idempotent: revoking an already-revoked or unknown
    /// token is a no-op.
    pub fn revoke(&self, token: &str) -> Result<()> {
        let changed = self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE tokens SET is_revoked = 1 WHERE token = ?1",
                    params![token],
                )
                .context("Failed to revoke token")?;
            Ok(changed)
        })?;

        if changed > 0 {
            debug!("Token revoked");
        }
        Ok(())
    }

    /// Revoke every live token a user holds (account deactivation path).
    pub fn revoke_all_for_user(&self, user_id: &Uuid) -> Result<usize> {
        let changed = self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE tokens SET is_revoked = 1
                     WHERE user_id = ?1 AND is_revoked = 0 AND expires_at > ?2",
                    params![user_id.to_string(), Utc::now().to_rfc3339()],
                )
                .context("Failed to revoke user tokens")?;
            Ok(changed)
        })?;

        if changed > 0 {
            info!("🗑️  Revoked {} live tokens for user {}", changed, user_id);
        }
        Ok(changed)
    }

    /// Delete rows whose expiry has passed. Run periodically; validation does
    /// not depend on it.
    pub fn purge_expired(&self) -> Result<usize> {
        let deleted = self.db.with_conn(|conn| {
            let deleted = conn
                .execute(
                    "DELETE FROM tokens WHERE expires_at < ?1",
                    params![Utc::now().to_rfc3339()],
                )
                .context("Failed to purge expired tokens")?;
            Ok(deleted)
        })?;
        Ok(deleted)
    }
}
