//! Email verification tokens.
//!
//! Signed, short-lived, single-purpose JWTs. These never act as session
//! credentials; the bearer tokens in `token_store` stay the only way in.

use crate::auth::models::User;
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

const VERIFICATION_PURPOSE: &str = "email_verification";
const VERIFICATION_TTL_HOURS: i64 = 48;

#[derive(Debug, Serialize, Deserialize)]
struct VerificationClaims {
    sub: String,
    email: String,
    purpose: String,
    exp: usize,
}

/// Identity recovered from a valid verification token.
#[derive(Debug, PartialEq, Eq)]
pub struct VerifiedEmail {
    pub user_id: Uuid,
    pub email: String,
}

/// Issues and checks the signed verification links.
#[derive(Clone)]
pub struct VerificationCodec {
    secret: String,
}

impl VerificationCodec {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }

    pub fn issue(&self, user: &User) -> Result<String> {
        let exp = Utc::now()
            .checked_add_signed(Duration::hours(VERIFICATION_TTL_HOURS))
            .context("Invalid timestamp")?
            .timestamp() as usize;

        let claims = VerificationClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            purpose: VERIFICATION_PURPOSE.to_string(),
            exp,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to sign verification token")
    }

    /// None on any failure: bad signature, expiry, wrong purpose, bad id.
    pub fn decode(&self, token: &str) -> Option<VerifiedEmail> {
        let data = decode::<VerificationClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .ok()?;

        if data.claims.purpose != VERIFICATION_PURPOSE {
            debug!("Verification token rejected: wrong purpose");
            return None;
        }

        let user_id = Uuid::parse_str(&data.claims.sub).ok()?;
        Some(VerifiedEmail {
            user_id,
            email: data.claims.email,
        })
    }

    /// "Send" the verification mail. No SMTP is wired up, so the link is
    /// written to the log where operators (and dev setups) can grab it.
    pub fn send_verification_email(&self, base_url: &str, user: &User) -> Result<()> {
        let token = self.issue(user)?;
        info!(
            "📧 Verification link for {}: {}/api/auth/verify-email?token={}",
            user.email, base_url, token
        );
        Ok(())
    }
}
