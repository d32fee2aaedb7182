//! Error taxonomy for the auth/request pipeline.
//!
//! Transport failures and server rejections are kept distinct: a `Network`
//! error means no usable response at all and is never treated as an
//! authentication problem. All `Authentication*` variants are raised only
//! after any required session teardown has already happened, so callers
//! never need to log out themselves in response to them.

use serde_json::Value;
use thiserror::Error;

/// A server rejection normalized to one shape at the HTTP boundary.
///
/// The backend is inconsistent about error bodies (`message`, `error` or
/// `msg`, sometimes with a machine `code`), so decoding happens exactly once
/// here instead of at every call site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerError {
    pub code: Option<String>,
    pub message: String,
}

impl ServerError {
    /// Decode an error body, falling back to the status line when the body
    /// is empty or not recognizable JSON.
    pub fn from_body(status: u16, body: &str) -> Self {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) {
            let message = ["message", "error", "msg"]
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string);
            let code = map
                .get("code")
                .and_then(Value::as_str)
                .map(str::to_string);
            if let Some(message) = message {
                return Self { code, message };
            }
        }
        Self {
            code: None,
            message: format!("request failed with status {}", status),
        }
    }
}

impl std::fmt::Display for ServerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Failures surfaced by the session and request pipeline.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// A refresh was requested but the session holds no refresh token.
    /// Terminal: the caller must log in again.
    #[error("no refresh token available, log in again")]
    NoRefreshToken,

    /// The refresh endpoint rejected us or the transport failed mid-refresh.
    /// The session has already been torn down.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// A request was attempted with no access token at all. Caller error,
    /// distinct from an expired token (which is allowed to reach the server).
    #[error("not logged in")]
    Unauthenticated,

    /// The server answered 401 and there is no refresh token to recover
    /// with. The session has been cleared.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The server answered 401, a refresh was attempted and it failed.
    /// The session has been cleared.
    #[error("authentication failed and token refresh was rejected")]
    AuthenticationFailed,

    /// Transport-level failure: no response was received. Propagated as-is,
    /// never retried by this layer.
    #[error("network error: {0}")]
    Network(String),

    /// Login or registration was rejected by the server.
    #[error("{0}")]
    ServerRejected(ServerError),

    /// A 2xx response carried a body we could not decode.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
