//! Persistent client session state.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::ClientError;

/// Everything a client remembers between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_conversation_id: Option<String>,
}

/// Where session state is kept.
pub trait StateStorage: Send + Sync {
    fn load(&self) -> Result<SessionState, ClientError>;
    fn save(&self, state: &SessionState) -> Result<(), ClientError>;
}

/// JSON file backend. A missing file reads as an empty session.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl StateStorage for FileStorage {
    fn load(&self) -> Result<SessionState, ClientError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SessionState::default()),
            Err(e) => Err(ClientError::Storage(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn save(&self, state: &SessionState) -> Result<(), ClientError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ClientError::Storage(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        let text = serde_json::to_string_pretty(state)?;
        std::fs::write(&self.path, text).map_err(|e| {
            ClientError::Storage(format!("Failed to write {}: {}", self.path.display(), e))
        })
    }
}

/// In-memory backend for tests and short-lived tools.
#[derive(Default)]
pub struct MemoryStorage {
    saved: Mutex<SessionState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self) -> Result<SessionState, ClientError> {
        Ok(lock(&self.saved)?.clone())
    }

    fn save(&self, state: &SessionState) -> Result<(), ClientError> {
        *lock(&self.saved)? = state.clone();
        Ok(())
    }
}

/// Process-wide session state, written through to its storage on every change.
#[derive(Clone)]
pub struct SessionStore {
    state: Arc<Mutex<SessionState>>,
    storage: Arc<dyn StateStorage>,
}

impl SessionStore {
    /// Load the saved session from `storage`.
    pub fn load(storage: Arc<dyn StateStorage>) -> Result<Self, ClientError> {
        let state = storage.load()?;
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            storage,
        })
    }

    /// A store that forgets everything when dropped.
    pub fn in_memory() -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            storage: Arc::new(MemoryStorage::new()),
        }
    }

    pub fn snapshot(&self) -> Result<SessionState, ClientError> {
        Ok(lock(&self.state)?.clone())
    }

    pub fn token(&self) -> Result<Option<String>, ClientError> {
        Ok(lock(&self.state)?.token.clone())
    }

    pub fn set_token(&self, token: impl Into<String>) -> Result<(), ClientError> {
        let token = token.into();
        self.update(|state| state.token = Some(token))
    }

    pub fn topic(&self) -> Result<Option<String>, ClientError> {
        Ok(lock(&self.state)?.topic.clone())
    }

    /// Set the active topic. A blank topic clears it.
    pub fn set_topic(&self, topic: &str) -> Result<(), ClientError> {
        let topic = topic.trim();
        let topic = (!topic.is_empty()).then(|| topic.to_string());
        self.update(|state| state.topic = topic)
    }

    pub fn clear_topic(&self) -> Result<(), ClientError> {
        self.update(|state| state.topic = None)
    }

    pub fn active_conversation(&self) -> Result<Option<String>, ClientError> {
        Ok(lock(&self.state)?.active_conversation_id.clone())
    }

    pub fn set_active_conversation(&self, id: Option<String>) -> Result<(), ClientError> {
        self.update(|state| state.active_conversation_id = id)
    }

    /// Forget the token and everything tied to the signed-in user.
    pub fn logout(&self) -> Result<(), ClientError> {
        self.update(|state| *state = SessionState::default())
    }

    fn update(&self, change: impl FnOnce(&mut SessionState)) -> Result<(), ClientError> {
        let mut state = lock(&self.state)?;
        change(&mut state);
        self.storage.save(&state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, ClientError> {
    mutex
        .lock()
        .map_err(|_| ClientError::Storage("Session state lock poisoned".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_storage_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = SessionStore::load(Arc::new(FileStorage::new(&path))).unwrap();
        assert_eq!(store.snapshot().unwrap(), SessionState::default());

        store.set_token("tok").unwrap();
        store.set_topic("  Photosynthesis ").unwrap();
        store
            .set_active_conversation(Some("c1".to_string()))
            .unwrap();

        let reloaded = SessionStore::load(Arc::new(FileStorage::new(&path))).unwrap();
        assert_eq!(reloaded.token().unwrap().as_deref(), Some("tok"));
        assert_eq!(reloaded.topic().unwrap().as_deref(), Some("Photosynthesis"));
        assert_eq!(
            reloaded.active_conversation().unwrap().as_deref(),
            Some("c1")
        );
    }

    #[test]
    fn test_clear_topic_and_logout_write_through() {
        let storage = Arc::new(MemoryStorage::new());
        let store = SessionStore::load(storage.clone()).unwrap();

        store.set_token("tok").unwrap();
        store.set_topic("Cells").unwrap();
        store.clear_topic().unwrap();
        assert_eq!(storage.load().unwrap().topic, None);
        assert_eq!(storage.load().unwrap().token.as_deref(), Some("tok"));

        store.set_topic("Cells").unwrap();
        store.set_topic("   ").unwrap();
        assert_eq!(store.topic().unwrap(), None);

        store.logout().unwrap();
        assert_eq!(storage.load().unwrap(), SessionState::default());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(SessionStore::load(Arc::new(FileStorage::new(&path))).is_err());
    }
}
