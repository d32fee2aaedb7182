//! Authenticated request execution.
//!
//! `ApiClient` performs one logical request against the backend: it stamps
//! the current access token as a bearer credential, and on a 401 runs the
//! single-flight refresh and re-issues the request exactly once. The retry
//! response is final even if it is itself a 401 — retry cost is bounded and
//! there is no way to loop. Every non-401 status, success or not, is handed
//! back unmodified; interpreting business-level error bodies is the
//! caller's job.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result, ServerError};
use crate::refresh::RefreshCoordinator;
use crate::store::TokenStore;

/// A response that made it back from the server, whatever its status.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: u16,
    body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> &str {
        &self.body
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| Error::MalformedResponse(e.to_string()))
    }

    /// Normalize this response's body as a server rejection.
    pub fn server_error(&self) -> ServerError {
        ServerError::from_body(self.status, &self.body)
    }
}

pub struct ApiClient {
    base_url: String,
    agent: ureq::Agent,
    timeout: Duration,
    store: Arc<TokenStore>,
    refresher: Arc<RefreshCoordinator>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        agent: ureq::Agent,
        timeout: Duration,
        store: Arc<TokenStore>,
        refresher: Arc<RefreshCoordinator>,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
            timeout,
            store,
            refresher,
        }
    }

    pub fn get(&self, path: &str) -> Result<ApiResponse> {
        self.request("GET", path, None, &[])
    }

    pub fn post(&self, path: &str, body: Option<&Value>) -> Result<ApiResponse> {
        self.request("POST", path, body, &[])
    }

    /// Issue one authenticated request with up to one refresh-driven retry.
    ///
    /// Fails with `Unauthenticated` before touching the network when no
    /// access token exists at all — "never logged in" is a caller error,
    /// unlike "token expired", which is allowed to reach the server and
    /// come back as a 401.
    pub fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> Result<ApiResponse> {
        let token = self.store.access_token().ok_or(Error::Unauthenticated)?;

        let response = self.send(method, path, &token, body, headers)?;
        if response.status != 401 {
            return Ok(response);
        }

        if self.store.refresh_token().is_none() {
            tracing::warn!("401 with no refresh token, tearing down session");
            self.store.clear();
            return Err(Error::AuthenticationRequired);
        }

        let new_token = match self.refresher.refresh() {
            Ok(token) => token,
            // the refresh token vanished between our check and the refresh
            // (e.g. a concurrent logout); same outcome as having none
            Err(Error::NoRefreshToken) => return Err(Error::AuthenticationRequired),
            Err(_) => return Err(Error::AuthenticationFailed),
        };

        // exactly one retry; its response is final even if 401
        self.send(method, path, &new_token, body, headers)
    }

    fn send(
        &self,
        method: &str,
        path: &str,
        token: &str,
        body: Option<&Value>,
        headers: &[(&str, &str)],
    ) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = self.agent.request(method, &url).timeout(self.timeout);
        for (name, value) in headers {
            req = req.set(name, value);
        }
        // set last: the credential header always wins over caller headers
        req = req.set("Authorization", &format!("Bearer {}", token));

        let resp = match body {
            Some(value) => req.send_json(value.clone()),
            None => req.call(),
        };

        match resp {
            Ok(r) => Self::into_response(r),
            Err(ureq::Error::Status(_, r)) => Self::into_response(r),
            Err(e) => Err(Error::Network(e.to_string())),
        }
    }

    fn into_response(resp: ureq::Response) -> Result<ApiResponse> {
        let status = resp.status();
        let body = resp
            .into_string()
            .map_err(|e| Error::Network(e.to_string()))?;
        Ok(ApiResponse { status, body })
    }
}
