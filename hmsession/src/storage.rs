use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

//--------------------------------------------------------------------------------------------------
// Persisted keys
//--------------------------------------------------------------------------------------------------

pub const AUTH_TOKEN_KEY: &str = "hms_auth_token";
pub const USER_DATA_KEY: &str = "hms_user_data";
pub const LAST_REFRESH_KEY: &str = "hms_last_refresh";

//--------------------------------------------------------------------------------------------------
// Storage trait
//--------------------------------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage is unavailable")]
    Unavailable,
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage contents are corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// A change made to a durable store by some other context sharing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
}

/// Durable key-value storage scoped to one device/origin.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Changes made by other contexts. Stores without a change feed return `None`.
    fn subscribe(&self) -> Option<StorageEvents> {
        None
    }
}

impl<T: Storage> Storage for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }

    fn subscribe(&self) -> Option<StorageEvents> {
        (**self).subscribe()
    }
}

//--------------------------------------------------------------------------------------------------
// Change feed
//--------------------------------------------------------------------------------------------------

type ContextId = u64;

#[derive(Clone, Debug)]
struct Change {
    source: ContextId,
    event: StorageEvent,
}

pub struct StorageEvents {
    context: ContextId,
    receiver: broadcast::Receiver<Change>,
}

impl StorageEvents {
    /// Waits for the next change made by another context. `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.source != self.context => return Some(change.event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Storage listener fell behind, {} changes skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// In-memory storage shared between contexts (tabs, windows)
//--------------------------------------------------------------------------------------------------

const CHANGE_FEED_CAPACITY: usize = 64;

struct SharedArea {
    entries: RwLock<HashMap<String, String>>,
    changes: broadcast::Sender<Change>,
    next_context: AtomicU64,
    unavailable: AtomicBool,
}

#[derive(Clone)]
pub struct MemoryStorage {
    context: ContextId,
    area: Arc<SharedArea>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        MemoryStorage {
            context: 0,
            area: Arc::new(SharedArea {
                entries: RwLock::new(HashMap::new()),
                changes,
                next_context: AtomicU64::new(1),
                unavailable: AtomicBool::new(false),
            }),
        }
    }

    /// A second context over the same entries. It sees changes made here and vice versa, but
    /// never its own.
    pub fn open_context(&self) -> Self {
        MemoryStorage {
            context: self.area.next_context.fetch_add(1, Ordering::SeqCst),
            area: self.area.clone(),
        }
    }

    /// Makes every operation fail, the way a browser does in restricted private modes
    pub fn set_unavailable(&self, unavailable: bool) {
        self.area.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.area.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable);
        }
        Ok(())
    }

    fn notify(&self, key: &str, new_value: Option<String>) {
        // No receivers is fine, nobody else is listening
        let _ = self.area.changes.send(Change {
            source: self.context,
            event: StorageEvent {
                key: key.to_string(),
                new_value,
            },
        });
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.check_available()?;
        Ok(self.area.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.check_available()?;
        let previous = self
            .area
            .entries
            .write()
            .insert(key.to_string(), value.to_string());

        // Only real changes are signalled
        if previous.as_deref() != Some(value) {
            self.notify(key, Some(value.to_string()));
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.check_available()?;
        if self.area.entries.write().remove(key).is_some() {
            self.notify(key, None);
        }
        Ok(())
    }

    fn subscribe(&self) -> Option<StorageEvents> {
        Some(StorageEvents {
            context: self.context,
            receiver: self.area.changes.subscribe(),
        })
    }
}

//--------------------------------------------------------------------------------------------------
// File backed storage, a single JSON object
//--------------------------------------------------------------------------------------------------

const STAGING_SUFFIX: &str = ".staging";

/// Durable store for a single host process. Every call does blocking file I/O under a lock, which
/// suits a small session file but not a store shared by many tasks.
pub struct FileStorage {
    path: PathBuf,
    // Serialises read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileStorage {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Appended rather than swapped in, so the staging file never collides with the target
    fn staging_path(&self) -> PathBuf {
        let mut staging = self.path.clone().into_os_string();
        staging.push(STAGING_SUFFIX);
        PathBuf::from(staging)
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to a sibling file and rename so a crash never leaves half a file behind
        let staging = self.staging_path();
        fs::write(&staging, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&staging, &self.path)?;

        debug!("Wrote {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_entries(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        if entries.remove(key).is_some() {
            self.write_entries(&entries)?;
        }
        Ok(())
    }
}

//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn other_contexts_see_changes_but_the_writer_does_not() {
        let first_tab = MemoryStorage::new();
        let second_tab = first_tab.open_context();

        let mut first_events = first_tab.subscribe().unwrap();
        let mut second_events = second_tab.subscribe().unwrap();

        first_tab.set(AUTH_TOKEN_KEY, "token-a").unwrap();
        // Same value again is not a change
        first_tab.set(AUTH_TOKEN_KEY, "token-a").unwrap();
        second_tab.remove(AUTH_TOKEN_KEY).unwrap();

        assert_eq!(
            second_events.recv().await,
            Some(StorageEvent {
                key: AUTH_TOKEN_KEY.to_string(),
                new_value: Some("token-a".to_string()),
            })
        );
        assert_eq!(
            first_events.recv().await,
            Some(StorageEvent {
                key: AUTH_TOKEN_KEY.to_string(),
                new_value: None,
            })
        );
        assert_eq!(first_tab.get(AUTH_TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn unavailable_storage_fails_every_operation() {
        let storage = MemoryStorage::new();
        storage.set_unavailable(true);

        assert!(matches!(storage.get("k"), Err(StorageError::Unavailable)));
        assert!(matches!(storage.set("k", "v"), Err(StorageError::Unavailable)));
        assert!(matches!(storage.remove("k"), Err(StorageError::Unavailable)));
    }

    #[test]
    fn file_storage_survives_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session").join("store.json");

        let storage = FileStorage::new(&path);
        assert_eq!(storage.get(USER_DATA_KEY).unwrap(), None);
        storage.set(USER_DATA_KEY, "{\"userId\":1}").unwrap();
        storage.set(LAST_REFRESH_KEY, "1000").unwrap();
        storage.remove(LAST_REFRESH_KEY).unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(
            reopened.get(USER_DATA_KEY).unwrap().as_deref(),
            Some("{\"userId\":1}")
        );
        assert_eq!(reopened.get(LAST_REFRESH_KEY).unwrap(), None);
        assert!(reopened.subscribe().is_none());
    }

    #[test]
    fn staging_never_lands_on_the_target() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.tmp");

        let storage = FileStorage::new(&path);
        assert_ne!(storage.staging_path(), path);
        storage.set(AUTH_TOKEN_KEY, "a.b.c").unwrap();

        assert!(!storage.staging_path().exists());
        assert_eq!(
            FileStorage::new(&path).get(AUTH_TOKEN_KEY).unwrap().as_deref(),
            Some("a.b.c")
        );
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(storage.get(AUTH_TOKEN_KEY), Err(StorageError::Corrupt(_))));
    }
}
