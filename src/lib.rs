//! Client library for the CampusHub community API.
//!
//! The interesting part is the authenticated request pipeline: a token
//! store with a durable mirror, best-effort token claims decoding, a
//! single-flight refresh coordinator, an executor that retries a 401
//! exactly once after refreshing, and the session lifecycle tying them
//! together. Everything else the backend offers (forum, notifications,
//! uploads) is reached through `ApiClient` with plain paths.

pub mod client;
pub mod config;
pub mod error;
pub mod refresh;
pub mod session;
pub mod store;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

pub use client::{ApiClient, ApiResponse};
pub use config::Config;
pub use error::{Error, Result, ServerError};
pub use session::{InitOutcome, SessionManager};
pub use store::{CredentialStorage, FileStorage, MemoryStorage, NoopStorage, TokenStore, UserProfile};

/// The assembled client: session lifecycle plus authenticated requests.
///
/// Construct one at application start and pass it by reference; the storage
/// backend is injected so non-interactive contexts can run without a
/// durable store.
pub struct Client {
    store: Arc<TokenStore>,
    api: Arc<ApiClient>,
    session: SessionManager,
}

impl Client {
    pub fn new(config: &Config, storage: Box<dyn CredentialStorage>) -> Self {
        let agent = ureq::Agent::new();
        let store = Arc::new(TokenStore::new(storage));
        let refresher = Arc::new(refresh::RefreshCoordinator::new(
            store.clone(),
            agent.clone(),
            &config.base_url,
            Duration::from_secs(config.refresh_timeout_secs),
        ));
        let api = Arc::new(ApiClient::new(
            &config.base_url,
            agent.clone(),
            Duration::from_secs(config.request_timeout_secs),
            store.clone(),
            refresher.clone(),
        ));
        let session = SessionManager::new(
            &config.base_url,
            agent,
            Duration::from_secs(config.request_timeout_secs),
            store.clone(),
            api.clone(),
            refresher,
            config.refresh_window_secs,
        );
        Self {
            store,
            api,
            session,
        }
    }

    /// Client backed by the on-disk credential store from the config.
    pub fn with_file_storage(config: &Config) -> Self {
        Self::new(
            config,
            Box::new(FileStorage::new(&config.credentials_dir())),
        )
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }
}
