//! Session lifecycle: login, logout, registration, startup restore.
//!
//! Login and registration go straight to the transport — they cannot flow
//! through the authenticated executor because no token exists yet. Logout
//! is best-effort on the server side and unconditional on the client side.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::client::ApiClient;
use crate::error::{Error, Result, ServerError};
use crate::refresh::RefreshCoordinator;
use crate::store::{TokenStore, UserProfile};
use crate::token;

#[derive(Deserialize)]
struct LoginResponse {
    access_token: String,
    refresh_token: String,
    user: UserProfile,
}

/// What `init` found in persistent storage.
#[derive(Debug)]
pub enum InitOutcome {
    /// No usable persisted session; starting logged out.
    NoSession,
    /// Session restored; the profile may still be the claims-derived
    /// placeholder if the authoritative fetch could not complete.
    Restored(UserProfile),
}

pub struct SessionManager {
    base_url: String,
    agent: ureq::Agent,
    timeout: Duration,
    store: Arc<TokenStore>,
    api: Arc<ApiClient>,
    refresher: Arc<RefreshCoordinator>,
    /// Proactive refresh window in seconds: tokens this close to expiry are
    /// refreshed at startup instead of waiting for the first 401.
    refresh_window_secs: i64,
}

impl SessionManager {
    pub fn new(
        base_url: &str,
        agent: ureq::Agent,
        timeout: Duration,
        store: Arc<TokenStore>,
        api: Arc<ApiClient>,
        refresher: Arc<RefreshCoordinator>,
        refresh_window_secs: i64,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            timeout,
            store,
            api,
            refresher,
            refresh_window_secs,
        }
    }

    /// Authenticate with the backend. On success both tokens and the
    /// returned profile are stored; on any failure the session is left
    /// exactly as it was.
    pub fn login(&self, username: &str, password: &str) -> Result<UserProfile> {
        let url = format!("{}/auth/login", self.base_url);
        let resp = self
            .agent
            .post(&url)
            .timeout(self.timeout)
            .send_json(json!({ "username": username, "password": password }));

        match resp {
            Ok(r) => {
                let parsed: LoginResponse = r
                    .into_json()
                    .map_err(|e| Error::MalformedResponse(e.to_string()))?;
                self.store
                    .set(&parsed.access_token, Some(&parsed.refresh_token));
                self.store.set_user(parsed.user.clone());
                tracing::info!(username = %parsed.user.username, "logged in");
                Ok(parsed.user)
            }
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                Err(Error::ServerRejected(ServerError::from_body(code, &body)))
            }
            Err(e) => Err(Error::Network(e.to_string())),
        }
    }

    /// Create an account. Does not log the new user in.
    pub fn register(&self, username: &str, email: &str, password: &str) -> Result<Value> {
        let url = format!("{}/auth/register", self.base_url);
        let resp = self.agent.post(&url).timeout(self.timeout).send_json(json!({
            "username": username,
            "email": email,
            "password": password,
        }));

        match resp {
            Ok(r) => r
                .into_json()
                .map_err(|e| Error::MalformedResponse(e.to_string())),
            Err(ureq::Error::Status(code, r)) => {
                let body = r.into_string().unwrap_or_default();
                Err(Error::ServerRejected(ServerError::from_body(code, &body)))
            }
            Err(e) => Err(Error::Network(e.to_string())),
        }
    }

    /// End the session. The server-side invalidation call is best-effort;
    /// local state is cleared no matter what. Safe to call repeatedly or
    /// when never logged in.
    pub fn logout(&self) {
        if let Some(access_token) = self.store.access_token() {
            let url = format!("{}/auth/logout", self.base_url);
            let result = self
                .agent
                .post(&url)
                .timeout(self.timeout)
                .set("Authorization", &format!("Bearer {}", access_token))
                .call();
            if let Err(e) = result {
                tracing::warn!("server-side logout failed (ignored): {}", e);
            }
        }
        self.store.clear();
        tracing::info!("session cleared");
    }

    /// Restore a persisted session at startup.
    ///
    /// The profile is seeded synchronously from token claims, so callers see
    /// an identity before any network round trip. A token already inside the
    /// refresh window is refreshed now rather than on the first 401. The
    /// authoritative profile fetch then runs through the executor: a 401
    /// there is not fatal by itself (the executor's own refresh-and-retry
    /// covers it), and a transport failure keeps the placeholder — only a
    /// true refresh failure tears the session down.
    pub fn init(&self) -> Result<InitOutcome> {
        if !self.store.restore() {
            return Ok(InitOutcome::NoSession);
        }
        let Some(access_token) = self.store.access_token() else {
            return Ok(InitOutcome::NoSession);
        };

        if self.store.user().is_none() {
            if let Some(claims) = token::decode(&access_token) {
                self.store.set_user(UserProfile {
                    id: claims.subject,
                    username: claims.username.unwrap_or_default(),
                    is_first_login: false,
                    extra: serde_json::Map::new(),
                });
            }
        }

        if token::is_expired(&access_token, self.refresh_window_secs) {
            tracing::debug!("restored token inside refresh window, refreshing now");
            // teardown on failure already handled by the coordinator
            self.refresher.refresh()?;
        }

        match self.api.get("/users/me") {
            Ok(resp) if resp.is_success() => {
                let profile: UserProfile = resp.json()?;
                self.store.set_user(profile);
            }
            Ok(resp) => {
                tracing::warn!(
                    status = resp.status,
                    "profile fetch rejected, keeping placeholder profile"
                );
            }
            Err(Error::Network(e)) => {
                tracing::warn!("profile fetch unreachable, keeping placeholder: {}", e);
            }
            Err(e) => return Err(e),
        }

        match self.store.user() {
            Some(user) => Ok(InitOutcome::Restored(user)),
            // refresh or profile fetch tore the session down concurrently
            None => Ok(InitOutcome::NoSession),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.store.user()
    }
}
