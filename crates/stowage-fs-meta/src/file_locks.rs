use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use stowage_api_types::meta::{MetaError, MetaResult};
use stowage_api_types::storage::{Bytes, Metadata, MetadataStorageProvider};
use tokio::sync::RwLock as AsyncRwLock;
use tokio::sync::{RwLockReadGuard, RwLockWriteGuard};

/// Relative document path -> lock for file access.
///
/// The lock holds the path of the document to emphasise only locked access is allowed.
/// flock is not used here, because the directory is meant to be handled exclusively by
/// one service instance.
///
/// Strong `Arc` is held by current user of the path, so the hashmap entry can be cleaned up
/// after last use of each lock.
pub(crate) struct AccessLocks<T> {
    locks: Mutex<HashMap<String, Weak<AsyncRwLock<T>>>>,
}

impl<T> AccessLocks<T> {
    pub fn new() -> Self {
        Self {
            locks: Mutex::default(),
        }
    }

    pub fn rwlock_for_key(&self, key: &str, object: T) -> Arc<AsyncRwLock<T>> {
        match self.locks.lock().entry(key.to_owned()) {
            Entry::Occupied(mut e) => {
                if let Some(existing) = e.get().upgrade() {
                    existing
                } else {
                    let new_lock = Arc::new(AsyncRwLock::new(object));
                    *e.get_mut() = Arc::downgrade(&new_lock);
                    new_lock
                }
            }
            Entry::Vacant(e) => {
                let new_lock = Arc::new(AsyncRwLock::new(object));
                e.insert(Arc::downgrade(&new_lock));
                new_lock
            }
        }
    }

    /// Called by a user that is about to drop its handle of the lock.
    pub fn release(&self, key: &str, lock: &Arc<AsyncRwLock<T>>) {
        let mut locks = self.locks.lock();
        // handles are only handed out while the map is locked, so a count of one is final
        if Arc::strong_count(lock) == 1 {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }
}

/// A document path that can be locked for access
pub(crate) struct DocumentPath<'a> {
    lock: Arc<AsyncRwLock<String>>,
    key: String,
    fs: &'a (dyn MetadataStorageProvider + Send + Sync),
    locks: &'a AccessLocks<String>,
}

impl<'a> DocumentPath<'a> {
    pub fn new(
        fs: &'a (dyn MetadataStorageProvider + Send + Sync),
        locks: &'a AccessLocks<String>,
        rel_path: String,
    ) -> Self {
        let lock = locks.rwlock_for_key(&rel_path, rel_path.clone());
        Self {
            lock,
            key: rel_path,
            fs,
            locks,
        }
    }

    pub async fn exclusive(&self) -> LockedDocument<'a, RwLockWriteGuard<'_, String>> {
        LockedDocument {
            fs: self.fs,
            rel_path: self.lock.write().await,
        }
    }

    pub async fn shared(&self) -> LockedDocument<'a, RwLockReadGuard<'_, String>> {
        LockedDocument {
            fs: self.fs,
            rel_path: self.lock.read().await,
        }
    }
}

impl Drop for DocumentPath<'_> {
    fn drop(&mut self) {
        self.locks.release(&self.key, &self.lock);
    }
}

pub(crate) struct LockedDocument<'a, Guard> {
    rel_path: Guard,
    fs: &'a (dyn MetadataStorageProvider + Send + Sync),
}

impl<Guard: Deref<Target = String>> LockedDocument<'_, Guard> {
    /// A single JSON document
    pub async fn load<T: DeserializeOwned>(&self) -> MetaResult<T> {
        let data = self.fs.pull_file(&self.rel_path).await?;
        serde_json::from_slice(&data).map_err(|e| MetaError::ServiceError(e.into()))
    }

    /// A JSON-lines document. A missing file reads as empty.
    pub async fn load_lines<T: DeserializeOwned>(&self) -> MetaResult<Vec<T>> {
        let data = match self.fs.pull_file(&self.rel_path).await {
            Ok(data) => data,
            Err(stowage_api_types::storage::StorageError::NotFound) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        deserialize_lines(&data)
    }
}

impl LockedDocument<'_, RwLockWriteGuard<'_, String>> {
    pub async fn store<T: Serialize>(&self, document: &T) -> MetaResult<()> {
        let bytes: Bytes = serde_json::to_vec(document)
            .map_err(|e| MetaError::ServiceError(e.into()))?
            .into();
        self.put(bytes).await
    }

    pub async fn store_lines<T: Serialize>(&self, items: &[T]) -> MetaResult<()> {
        self.put(serialize_lines(items)?).await
    }

    async fn put(&self, bytes: Bytes) -> MetaResult<()> {
        let meta = Metadata {
            content_type: Some("application/json"),
            content_length: Some(bytes.len()),
            ..Metadata::default()
        };
        self.fs.put_file(&self.rel_path, bytes, meta).await?;
        Ok(())
    }
}

pub(crate) fn deserialize_lines<T: DeserializeOwned>(json_lines: &[u8]) -> MetaResult<Vec<T>> {
    json_lines
        .split(|&c| c == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_slice(line).map_err(|e| {
                tracing::error!("invalid document line: {e}");
                MetaError::ServiceError(anyhow::anyhow!("invalid document format"))
            })
        })
        .collect()
}

fn serialize_lines<T: Serialize>(items: &[T]) -> MetaResult<Bytes> {
    let mut json_lines = Vec::with_capacity((items.len() + 1) * 256);
    for item in items {
        serde_json::to_writer(&mut json_lines, item)
            .map_err(|e| MetaError::ServiceError(e.into()))?;
        json_lines.push(b'\n');
    }
    Ok(json_lines.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_entries_go_away_after_last_use() {
        let locks = AccessLocks::<String>::new();
        let a = locks.rwlock_for_key("a", "a".into());
        let a2 = locks.rwlock_for_key("a", "ignored".into());
        assert!(Arc::ptr_eq(&a, &a2));
        assert_eq!(locks.len(), 1);

        locks.release("a", &a2);
        drop(a2);
        assert_eq!(locks.len(), 1);

        locks.release("a", &a);
        drop(a);
        assert_eq!(locks.len(), 0);
    }

    #[test]
    fn json_lines_skip_blank_lines() {
        let parsed: Vec<u32> = deserialize_lines(b"1\n\n2\n3").unwrap();
        assert_eq!(parsed, [1, 2, 3]);
        assert!(deserialize_lines::<u32>(b"1\nnope\n").is_err());
    }
}
