//! Durable key-value stores for session state.
//!
//! Values are JSON documents wrapped in a [`StoredItem`] carrying an optional
//! absolute expiry. Expired items read as absent and are deleted on read.
//!
//! - [`MemoryStore`]: process-local map
//! - [`FileStore`]: one JSON file per key, written atomically (temp file + rename)
//! - [`KeyringStore`]: OS credential store

use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StorefrontError};

/// Keyring service name for [`KeyringStore`] entries.
pub const KEYRING_SERVICE: &str = "storefront-client";

/// Persisted `get` / `set(ttl?)` / `remove` contract.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read `key`. Missing and expired items are `None`.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write `key`, optionally expiring `ttl` from now.
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()>;

    /// Delete `key`. Deleting a missing key succeeds.
    async fn remove(&self, key: &str) -> Result<()>;
}

// =============================================================================
// Stored Item
// =============================================================================

/// On-disk / in-keyring envelope: `{key, data, expireAt?}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoredItem {
    pub key: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<DateTime<Utc>>,
}

impl StoredItem {
    #[must_use]
    pub fn new(key: &str, data: Value, ttl: Option<Duration>, now: DateTime<Utc>) -> Self {
        let expire_at = ttl.map(|ttl| {
            TimeDelta::from_std(ttl)
                .ok()
                .and_then(|ttl| now.checked_add_signed(ttl))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        Self {
            key: key.to_string(),
            data,
            expire_at,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_at.is_some_and(|at| now >= at)
    }
}

fn storage_error(key: &str, message: impl fmt::Display) -> StorefrontError {
    StorefrontError::Storage {
        key: key.to_string(),
        message: message.to_string(),
    }
}

// =============================================================================
// Store selection
// =============================================================================

/// Which backend holds the session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl StoreKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Keyring => "keyring",
            Self::Memory => "memory",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoreKind {
    type Err = StorefrontError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            other => Err(StorefrontError::ConfigInvalid {
                key: "auth.token_store".to_string(),
                value: other.to_string(),
                message: "expected one of: file, keyring, memory".to_string(),
            }),
        }
    }
}

/// Open the configured store. `dir` is only used by [`StoreKind::File`].
#[must_use]
pub fn open_store(kind: StoreKind, dir: PathBuf) -> Arc<dyn KeyValueStore> {
    match kind {
        StoreKind::File => Arc::new(FileStore::new(dir)),
        StoreKind::Keyring => Arc::new(KeyringStore::new(KEYRING_SERVICE)),
        StoreKind::Memory => Arc::new(MemoryStore::new()),
    }
}

// =============================================================================
// Memory
// =============================================================================

/// Process-local store honoring TTLs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    items: Mutex<HashMap<String, StoredItem>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items, including expired ones not yet read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        match items.get(key) {
            Some(item) if item.is_expired_at(Utc::now()) => {
                items.remove(key);
                Ok(None)
            }
            Some(item) => Ok(Some(item.data.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let item = StoredItem::new(key, value, ttl, Utc::now());
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), item);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// =============================================================================
// File
// =============================================================================

/// One JSON document per key under a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    #[must_use]
    pub const fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`. Characters outside `[A-Za-z0-9_-]` become `_`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let name: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{name}.json"))
    }
}

/// Write bytes atomically using a uniquely named temp file + rename.
fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("item");

    let mut file = tempfile::Builder::new()
        .prefix(&format!(".{name}."))
        .suffix(".tmp")
        .tempfile_in(parent)?;
    file.write_all(content)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_item(path: &Path, key: &str) -> Result<Option<Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(storage_error(key, e)),
    };

    let item: StoredItem = match serde_json::from_str(&content) {
        Ok(item) => item,
        Err(e) => {
            tracing::warn!(?path, error = %e, "Discarding unreadable stored item");
            remove_file(path, key)?;
            return Ok(None);
        }
    };

    if item.is_expired_at(Utc::now()) {
        tracing::debug!(key, "Stored item expired");
        remove_file(path, key)?;
        return Ok(None);
    }
    Ok(Some(item.data))
}

fn remove_file(path: &Path, key: &str) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(storage_error(key, e)),
    }
}

async fn blocking<T: Send + 'static>(
    key: &str,
    f: impl FnOnce() -> Result<T> + Send + 'static,
) -> Result<T> {
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| storage_error(key, e))?
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let path = self.path_for(key);
        let owned_key = key.to_string();
        blocking(key, move || read_item(&path, &owned_key)).await
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let path = self.path_for(key);
        let item = StoredItem::new(key, value, ttl, Utc::now());
        let content = serde_json::to_vec(&item)?;
        let owned_key = key.to_string();
        blocking(key, move || {
            write_atomic(&path, &content).map_err(|e| storage_error(&owned_key, e))
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        let owned_key = key.to_string();
        blocking(key, move || remove_file(&path, &owned_key)).await
    }
}

// =============================================================================
// Keyring
// =============================================================================

/// OS keyring entries under one service name; the account is the key.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    #[must_use]
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(service: &str, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, key).map_err(|e| storage_error(key, format!("keyring error: {e}")))
    }
}

#[async_trait]
impl KeyValueStore for KeyringStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let service = self.service.clone();
        let owned_key = key.to_string();
        let secret = blocking(key, move || {
            let entry = Self::entry(&service, &owned_key)?;
            match entry.get_password() {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(storage_error(&owned_key, e)),
            }
        })
        .await?;

        let Some(secret) = secret else {
            return Ok(None);
        };
        let item: StoredItem = serde_json::from_str(&secret)?;
        if item.is_expired_at(Utc::now()) {
            self.remove(key).await?;
            return Ok(None);
        }
        Ok(Some(item.data))
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> Result<()> {
        let secret = serde_json::to_string(&StoredItem::new(key, value, ttl, Utc::now()))?;
        let service = self.service.clone();
        let owned_key = key.to_string();
        blocking(key, move || {
            Self::entry(&service, &owned_key)?
                .set_password(&secret)
                .map_err(|e| storage_error(&owned_key, e))
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let service = self.service.clone();
        let owned_key = key.to_string();
        blocking(key, move || {
            match Self::entry(&service, &owned_key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(e) => Err(storage_error(&owned_key, e)),
            }
        })
        .await
    }
}
