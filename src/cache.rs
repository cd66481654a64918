//! Local key-value cache: session identity and last-known feed snapshots.

use crate::error::{FeedError, Result};
use crate::types::{FeedItem, Timestamp};
use fs2::FileExt;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};

/// Key of the signed-in user's id.
const USER_ID_KEY: &str = "session.user_id";

/// Prefix of per-parent feed snapshot keys.
const SNAPSHOT_KEY_PREFIX: &str = "feed.snapshot.";

/// Current snapshot format version.
const SNAPSHOT_VERSION: u32 = 1;

/// String-to-string cache that survives restarts. A miss is `Ok(None)`.
pub trait LocalKeyValueCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalKeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Cache persisted as one JSON object on disk.
///
/// The process holds an exclusive lock on `<path>.lock` while open. Every
/// write rewrites the file through a temporary and a rename.
pub struct FileCache {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
    _lock_file: File,
}

impl FileCache {
    /// Open or create the cache file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let lock_file = Self::acquire_lock(&path)?;

        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw)
                    .map_err(|e| FeedError::Corruption(format!("{}: {}", path.display(), e)))?
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            entries: RwLock::new(entries),
            _lock_file: lock_file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.with_extension("lock"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| FeedError::Locked)?;
        Ok(lock_file)
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalKeyValueCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write();
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }
}

/// Signed-in user identity.
pub struct Session;

impl Session {
    pub fn store_user_id(cache: &dyn LocalKeyValueCache, user_id: &str) -> Result<()> {
        cache.set(USER_ID_KEY, user_id)
    }

    pub fn load_user_id(cache: &dyn LocalKeyValueCache) -> Result<Option<String>> {
        Ok(cache.get(USER_ID_KEY)?.filter(|id| !id.is_empty()))
    }

    pub fn clear(cache: &dyn LocalKeyValueCache) -> Result<()> {
        cache.remove(USER_ID_KEY)
    }
}

/// Last-known contents of one parent's feed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedSnapshot {
    pub version: u32,
    pub parent: String,
    pub saved_at: Timestamp,
    pub items: Vec<FeedItem>,
}

impl FeedSnapshot {
    pub fn new(parent: impl Into<String>, items: Vec<FeedItem>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            parent: parent.into(),
            saved_at: Timestamp::now(),
            items,
        }
    }

    pub fn key(parent: &str) -> String {
        format!("{}{}", SNAPSHOT_KEY_PREFIX, parent)
    }

    pub fn save(&self, cache: &dyn LocalKeyValueCache) -> Result<()> {
        let encoded = serde_json::to_string(self)?;
        cache.set(&Self::key(&self.parent), &encoded)
    }

    /// Load the snapshot for `parent`. Undecodable or foreign-version
    /// entries count as a miss.
    pub fn load(cache: &dyn LocalKeyValueCache, parent: &str) -> Result<Option<Self>> {
        let Some(raw) = cache.get(&Self::key(parent))? else {
            return Ok(None);
        };
        match serde_json::from_str::<FeedSnapshot>(&raw) {
            Ok(snapshot) if snapshot.version == SNAPSHOT_VERSION && snapshot.parent == parent => {
                Ok(Some(snapshot))
            }
            Ok(snapshot) => {
                tracing::debug!(parent, version = snapshot.version, "ignoring foreign snapshot");
                Ok(None)
            }
            Err(e) => {
                tracing::warn!(parent, error = %e, "ignoring undecodable snapshot");
                Ok(None)
            }
        }
    }
}
