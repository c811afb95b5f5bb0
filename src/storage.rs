//! Object storage - the blob store contract for response media
//!
//! Uploads land under paths namespaced by the submitting user plus a
//! timestamp-and-uuid suffix, so concurrent submissions can never collide.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StorageError;
use crate::model::UserId;

/// Reference to a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRef {
    pub path: String,
}

/// The object store contract.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store bytes under `path`, overwriting any prior object.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<StorageRef, StorageError>;

    /// Durable download URL for a stored object.
    async fn download_url(&self, storage_ref: &StorageRef) -> Result<String, StorageError>;

    async fn delete(&self, path: &str) -> Result<(), StorageError>;
}

/// Build a collision-resistant upload path for a user's media file.
pub fn media_path(prefix: &str, user_id: &UserId, extension: &str) -> String {
    format!(
        "{}/{}/{}-{}.{}",
        prefix,
        user_id,
        Utc::now().timestamp_millis(),
        Uuid::new_v4(),
        extension
    )
}

/// In-memory [`ObjectStore`] for tests and local runs.
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Vec<u8>>>,
    base_url: String,
    fail_uploads: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: "https://storage.test".to_string(),
            fail_uploads: AtomicBool::new(false),
        }
    }

    /// Make subsequent uploads fail.
    pub fn fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub async fn object_count(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.objects.read().await.contains_key(path)
    }
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<StorageRef, StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::Upload("simulated upload failure".into()));
        }
        self.objects
            .write()
            .await
            .insert(path.to_string(), bytes);
        Ok(StorageRef {
            path: path.to_string(),
        })
    }

    async fn download_url(&self, storage_ref: &StorageRef) -> Result<String, StorageError> {
        let objects = self.objects.read().await;
        if !objects.contains_key(&storage_ref.path) {
            return Err(StorageError::NotFound(storage_ref.path.clone()));
        }
        Ok(format!("{}/{}", self.base_url, storage_ref.path))
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.objects.write().await.remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upload_and_url() {
        let store = MemoryObjectStore::new();
        let r = store.upload("a/b.mp4", vec![1, 2, 3]).await.unwrap();
        let url = store.download_url(&r).await.unwrap();
        assert_eq!(url, "https://storage.test/a/b.mp4");
    }

    #[tokio::test]
    async fn test_upload_failure() {
        let store = MemoryObjectStore::new();
        store.fail_uploads(true);
        let result = store.upload("a/b.mp4", vec![1]).await;
        assert!(matches!(result, Err(StorageError::Upload(_))));
        assert_eq!(store.object_count().await, 0);
    }

    #[test]
    fn test_media_paths_do_not_collide() {
        let a = media_path("challenge-responses", &"bob".to_string(), "mp4");
        let b = media_path("challenge-responses", &"bob".to_string(), "mp4");
        assert_ne!(a, b);
        assert!(a.starts_with("challenge-responses/bob/"));
        assert!(a.ends_with(".mp4"));
    }
}
