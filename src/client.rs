//! Client-side session holder.
//!
//! One explicit object owns the current token and user projection; request
//! code goes through it instead of reading ambient globals. Interested parts
//! of a UI subscribe to `SessionEvent`s and treat `LoggedOut` as "go to the
//! login screen".

use crate::auth::models::{TokenResponse, UserResponse};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use reqwest::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Session lifecycle notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn,
    LoggedOut,
}

#[derive(Debug, Clone)]
struct Session {
    token: String,
    user: Option<UserResponse>,
}

/// Holds the bearer token, attaches it to every request, and reacts to
/// access-denied responses by clearing itself.
#[derive(Clone)]
pub struct SessionClient {
    base_url: String,
    http: reqwest::Client,
    session: Arc<Mutex<Option<Session>>>,
    events: broadcast::Sender<SessionEvent>,
    last_login_error: Arc<Mutex<Option<String>>>,
    /// When set, the raw token survives restarts in this file.
    cache_path: Option<PathBuf>,
}

impl SessionClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::new(),
            session: Arc::new(Mutex::new(None)),
            events,
            last_login_error: Arc::new(Mutex::new(None)),
            cache_path: None,
        }
    }

    /// Enable token persistence, restoring any previously cached token.
    pub fn with_token_cache(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Ok(raw) = std::fs::read_to_string(&path) {
            let token = raw.trim().to_string();
            if !token.is_empty() {
                debug!("Restored cached session token");
                *self.session.lock() = Some(Session { token, user: None });
            }
        }
        self.cache_path = Some(path);
        self
    }

    /// Subscribe to login/logout notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.lock().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.token.clone())
    }

    /// Last-fetched user projection, if any.
    pub fn current_user(&self) -> Option<UserResponse> {
        self.session.lock().as_ref().and_then(|s| s.user.clone())
    }

    /// Server message from the most recent rejected login.
    pub fn last_login_error(&self) -> Option<String> {
        self.last_login_error.lock().clone()
    }

    /// Log in with email and password.
    ///
    /// On success the token is stored and the user projection fetched; on
    /// rejection the stored state is left untouched and the server's message
    /// is kept for display.
    pub async fn login(&self, email: &str, password: &str) -> Result<bool> {
        let resp = self
            .http
            .post(format!("{}/api/auth/login", self.base_url))
            .form(&[("username", email), ("password", password)])
            .send()
            .await
            .context("Login request failed")?;

        if !resp.status().is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!("Login rejected: {}", message);
            *self.last_login_error.lock() = Some(message);
            return Ok(false);
        }

        let token_resp = resp
            .json::<TokenResponse>()
            .await
            .context("Failed to parse login response")?;

        *self.session.lock() = Some(Session {
            token: token_resp.access_token,
            user: None,
        });
        *self.last_login_error.lock() = None;
        self.persist_token();

        // Hydrate the user projection; the session stands even if this fails
        if let Err(e) = self.refresh_current_user().await {
            warn!("Could not fetch user profile after login: {}", e);
        }

        let _ = self.events.send(SessionEvent::LoggedIn);
        info!("🔑 Session established for {}", email);

        Ok(true)
    }

    /// Log out. Local state is cleared unconditionally before the server
    /// round trip; the revoke call is best effort.
    pub async fn logout(&self) {
        let old = self.session.lock().take();
        self.remove_cached_token();
        let _ = self.events.send(SessionEvent::LoggedOut);

        if let Some(session) = old {
            let result = self
                .http
                .post(format!("{}/api/auth/logout", self.base_url))
                .bearer_auth(&session.token)
                .send()
                .await;
            if let Err(e) = result {
                debug!("Server-side logout failed (token expires on its own): {}", e);
            }
        }
    }

    /// GET with the session token attached.
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let mut req = self.http.get(format!("{}{}", self.base_url, path));
        if let Some(token) = self.token() {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("Request failed")?;
        self.intercept_unauthorized(&resp);
        Ok(resp)
    }

    /// POST a JSON body with the session token attached.
    pub async fn post_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let mut req = self.http.post(format!("{}{}", self.base_url, path));
        if let Some(token) = self.token() {
            req = req.bearer_auth(token);
        }

        let resp = req.json(body).send().await.context("Request failed")?;
        self.intercept_unauthorized(&resp);
        Ok(resp)
    }

    /// PATCH a JSON body with the session token attached.
    pub async fn patch_json<T: serde::Serialize>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let mut req = self.http.patch(format!("{}{}", self.base_url, path));
        if let Some(token) = self.token() {
            req = req.bearer_auth(token);
        }

        let resp = req.json(body).send().await.context("Request failed")?;
        self.intercept_unauthorized(&resp);
        Ok(resp)
    }

    /// DELETE with the session token attached.
    pub async fn delete(&self, path: &str) -> Result<reqwest::Response> {
        let mut req = self.http.delete(format!("{}{}", self.base_url, path));
        if let Some(token) = self.token() {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.context("Request failed")?;
        self.intercept_unauthorized(&resp);
        Ok(resp)
    }

    /// Re-fetch `/api/auth/me` into the cached projection.
    pub async fn refresh_current_user(&self) -> Result<Option<UserResponse>> {
        let resp = self.get("/api/auth/me").await?;
        if !resp.status().is_success() {
            return Ok(None);
        }

        let user = resp
            .json::<UserResponse>()
            .await
            .context("Failed to parse user profile")?;

        if let Some(session) = self.session.lock().as_mut() {
            session.user = Some(user.clone());
        }
        Ok(Some(user))
    }

    /// Any 401 means this session is dead, whatever the sub-reason: drop the
    /// token and tell subscribers to route back to login.
    fn intercept_unauthorized(&self, resp: &reqwest::Response) {
        if resp.status() != StatusCode::UNAUTHORIZED {
            return;
        }

        let had_session = self.session.lock().take().is_some();
        if had_session {
            self.remove_cached_token();
            warn!("Session rejected by server - returning to login");
            let _ = self.events.send(SessionEvent::LoggedOut);
        }
    }

    fn persist_token(&self) {
        let Some(path) = &self.cache_path else {
            return;
        };
        if let Some(token) = self.token() {
            if let Err(e) = std::fs::write(path, token) {
                warn!("Failed to cache session token: {}", e);
            }
        }
    }

    fn remove_cached_token(&self) {
        if let Some(path) = &self.cache_path {
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_client_has_no_session() {
        let client = SessionClient::new("http://localhost:0");
        assert!(!client.is_logged_in());
        assert!(client.token().is_none());
        assert!(client.current_user().is_none());
        assert!(client.last_login_error().is_none());
    }

    #[test]
    fn test_token_cache_restores_session() {
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("token");
        std::fs::write(&cache, "cached-token-value\n").unwrap();

        let client = SessionClient::new("http://localhost:0").with_token_cache(&cache);
        assert!(client.is_logged_in());
        assert_eq!(client.token().as_deref(), Some("cached-token-value"));

        // Empty cache file is not a session
        std::fs::write(&cache, "").unwrap();
        let client = SessionClient::new("http://localhost:0").with_token_cache(&cache);
        assert!(!client.is_logged_in());
    }

    #[tokio::test]
    async fn test_logout_clears_state_without_server() {
        // No server behind this base URL: logout must still clear locally
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("token");
        std::fs::write(&cache, "stale").unwrap();

        let client = SessionClient::new("http://127.0.0.1:1").with_token_cache(&cache);
        let mut events = client.subscribe();

        client.logout().await;
        assert!(!client.is_logged_in());
        assert!(!cache.exists());
        assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    }
}
