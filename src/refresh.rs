//! Single-flight token refresh.
//!
//! At most one refresh is ever in flight per session. The first caller to
//! request one becomes the leader and performs the network call; every
//! caller that arrives while it is pending blocks on a condvar and adopts
//! the leader's outcome instead of issuing a second call. Without this
//! guard, concurrent 401s fan out into parallel refresh calls, one of which
//! the server may reject — invalidating the token the other just won.
//!
//! A failed refresh always ends the session: the store is cleared (memory
//! and mirror) before the error is reported, and it is never retried.

use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result, ServerError};
use crate::store::TokenStore;

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// State machine: Idle -> Refreshing -> Idle. `generation` increments on
/// every completion so late waiters can tell "the flight I joined finished"
/// from a later flight.
#[derive(Default)]
struct Flight {
    in_flight: bool,
    generation: u64,
    last_outcome: Option<Result<String>>,
}

pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    agent: ureq::Agent,
    refresh_url: String,
    timeout: Duration,
    flight: Mutex<Flight>,
    finished: Condvar,
}

impl RefreshCoordinator {
    pub fn new(store: Arc<TokenStore>, agent: ureq::Agent, base_url: &str, timeout: Duration) -> Self {
        Self {
            store,
            agent,
            refresh_url: format!("{}/auth/refresh", base_url.trim_end_matches('/')),
            timeout,
            flight: Mutex::new(Flight::default()),
            finished: Condvar::new(),
        }
    }

    /// Obtain a fresh access token, joining an in-flight refresh if one
    /// exists. Returns the new access token on success.
    pub fn refresh(&self) -> Result<String> {
        let mut flight = self.flight.lock().unwrap();
        if flight.in_flight {
            let joined = flight.generation;
            while flight.in_flight && flight.generation == joined {
                flight = self.finished.wait(flight).unwrap();
            }
            // last_outcome is always set when a flight completes
            return flight
                .last_outcome
                .clone()
                .unwrap_or(Err(Error::RefreshFailed("refresh state lost".to_string())));
        }

        let Some(refresh_token) = self.store.refresh_token() else {
            return Err(Error::NoRefreshToken);
        };
        flight.in_flight = true;
        drop(flight);

        let outcome = match self.call_refresh_endpoint(&refresh_token) {
            Ok(parsed) => {
                tracing::debug!("access token refreshed");
                // single atomic store update; refresh token kept unless rotated
                self.store
                    .set(&parsed.access_token, parsed.refresh_token.as_deref());
                Ok(parsed.access_token)
            }
            Err(e) => {
                tracing::warn!("token refresh failed, tearing down session: {}", e);
                self.store.clear();
                Err(e)
            }
        };

        let mut flight = self.flight.lock().unwrap();
        flight.in_flight = false;
        flight.generation += 1;
        flight.last_outcome = Some(outcome.clone());
        self.finished.notify_all();
        drop(flight);

        outcome
    }

    /// POST /auth/refresh with the refresh token as bearer credential.
    /// Both transport failures and non-2xx statuses are refresh failures.
    fn call_refresh_endpoint(&self, refresh_token: &str) -> Result<RefreshResponse> {
        let resp = self
            .agent
            .post(&self.refresh_url)
            .timeout(self.timeout)
            .set("Authorization", &format!("Bearer {}", refresh_token))
            .call();

        match resp {
            Ok(r) => r
                .into_json()
                .map_err(|e| Error::RefreshFailed(format!("bad refresh response: {}", e))),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let server = ServerError::from_body(code, &body);
                Err(Error::RefreshFailed(server.to_string()))
            }
            Err(e) => Err(Error::RefreshFailed(format!("network error: {}", e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStorage;

    fn coordinator(base_url: &str) -> RefreshCoordinator {
        RefreshCoordinator::new(
            Arc::new(TokenStore::new(Box::new(MemoryStorage::new()))),
            ureq::Agent::new(),
            base_url,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_refresh_without_token_fails_fast() {
        // no network call is made, so a bogus URL is fine
        let coord = coordinator("http://127.0.0.1:1");
        match coord.refresh() {
            Err(Error::NoRefreshToken) => {}
            other => panic!("expected NoRefreshToken, got {:?}", other),
        }
    }

    #[test]
    fn test_refresh_network_failure_tears_down() {
        // nothing listens on port 1, so the transport fails
        let coord = coordinator("http://127.0.0.1:1");
        coord.store.set("A1", Some("R1"));
        match coord.refresh() {
            Err(Error::RefreshFailed(_)) => {}
            other => panic!("expected RefreshFailed, got {:?}", other),
        }
        assert_eq!(coord.store.access_token(), None);
        assert_eq!(coord.store.refresh_token(), None);
    }
}
