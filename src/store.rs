//! Session credential store with a durable mirror.
//!
//! `TokenStore` is the single mutation point for session state (tokens and
//! cached profile). Every change is mirrored to a pluggable
//! `CredentialStorage` backend; storage write failures are logged and
//! swallowed so credential updates themselves can never fail. In-memory
//! state always wins over the mirror except at `restore()`, where the
//! persisted record seeds an empty session.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Cached identity of the logged-in user.
///
/// `id` is stable for the lifetime of a session; the other attributes may be
/// superseded by a later authoritative fetch (last write wins). Unknown
/// server-side attributes are carried along in `extra`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    #[serde(default, rename = "isFirstLogin")]
    pub is_first_login: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// On-disk shape of a persisted session. Field names match the storage keys
/// the web client used (`auth_token`, `refresh_token`, `user_info`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedSession {
    pub auth_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user_info: Option<UserProfile>,
}

/// Durable key-value mirror for session credentials.
///
/// Injected at construction so the pipeline is environment-agnostic: the CLI
/// uses `FileStorage`, non-interactive contexts use `NoopStorage`, tests use
/// `MemoryStorage`.
pub trait CredentialStorage: Send + Sync {
    fn load(&self) -> io::Result<Option<PersistedSession>>;
    fn save(&self, record: &PersistedSession) -> io::Result<()>;
    fn delete(&self) -> io::Result<()>;
}

/// JSON file under the credentials directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join("credentials.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStorage for FileStorage {
    fn load(&self) -> io::Result<Option<PersistedSession>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let record = serde_json::from_str(&content)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Some(record))
    }

    fn save(&self, record: &PersistedSession) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(record)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(&self.path, content)
    }

    fn delete(&self) -> io::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// In-process mirror, for tests.
#[derive(Default)]
pub struct MemoryStorage {
    record: Mutex<Option<PersistedSession>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStorage for MemoryStorage {
    fn load(&self) -> io::Result<Option<PersistedSession>> {
        Ok(self.record.lock().unwrap().clone())
    }

    fn save(&self, record: &PersistedSession) -> io::Result<()> {
        *self.record.lock().unwrap() = Some(record.clone());
        Ok(())
    }

    fn delete(&self) -> io::Result<()> {
        *self.record.lock().unwrap() = None;
        Ok(())
    }
}

/// Storage for contexts without a durable store. Loads nothing, persists
/// nothing, never fails.
pub struct NoopStorage;

impl CredentialStorage for NoopStorage {
    fn load(&self) -> io::Result<Option<PersistedSession>> {
        Ok(None)
    }

    fn save(&self, _record: &PersistedSession) -> io::Result<()> {
        Ok(())
    }

    fn delete(&self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
}

/// The single place the rest of the pipeline reads and writes credentials.
pub struct TokenStore {
    state: Mutex<SessionState>,
    storage: Box<dyn CredentialStorage>,
}

impl TokenStore {
    pub fn new(storage: Box<dyn CredentialStorage>) -> Self {
        Self {
            state: Mutex::new(SessionState::default()),
            storage,
        }
    }

    /// Update the access token, and the refresh token if the server rotated
    /// it. The mirror write is best-effort.
    pub fn set(&self, access_token: &str, refresh_token: Option<&str>) {
        let mut state = self.state.lock().unwrap();
        state.access_token = Some(access_token.to_string());
        if let Some(refresh) = refresh_token {
            state.refresh_token = Some(refresh.to_string());
        }
        self.persist(&state);
    }

    /// Replace the cached profile.
    pub fn set_user(&self, user: UserProfile) {
        let mut state = self.state.lock().unwrap();
        state.user = Some(user);
        self.persist(&state);
    }

    /// Remove tokens and profile from memory and from the mirror.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        *state = SessionState::default();
        if let Err(e) = self.storage.delete() {
            tracing::warn!("failed to delete persisted credentials: {}", e);
        }
    }

    /// Seed in-memory state from the mirror. Returns true when both tokens
    /// were present. A corrupt or unreadable record counts as absent.
    pub fn restore(&self) -> bool {
        let record = match self.storage.load() {
            Ok(Some(record)) => record,
            Ok(None) => return false,
            Err(e) => {
                tracing::warn!("failed to read persisted credentials: {}", e);
                return false;
            }
        };
        if record.auth_token.is_empty() || record.refresh_token.is_none() {
            return false;
        }
        let mut state = self.state.lock().unwrap();
        state.access_token = Some(record.auth_token);
        state.refresh_token = record.refresh_token;
        state.user = record.user_info;
        true
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.lock().unwrap().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.lock().unwrap().refresh_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.lock().unwrap().user.clone()
    }

    /// True iff both an access token and a profile are present.
    pub fn is_authenticated(&self) -> bool {
        let state = self.state.lock().unwrap();
        state.access_token.is_some() && state.user.is_some()
    }

    fn persist(&self, state: &SessionState) {
        let Some(access_token) = &state.access_token else {
            return;
        };
        let record = PersistedSession {
            auth_token: access_token.clone(),
            refresh_token: state.refresh_token.clone(),
            user_info: state.user.clone(),
        };
        if let Err(e) = self.storage.save(&record) {
            tracing::warn!("failed to persist credentials: {}", e);
        }
    }
}
