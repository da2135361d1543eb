//! Object store adapters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use biomark_protocol::{ObjectStore, ServiceError};
use parking_lot::Mutex;
use tokio::fs;
use tracing::{debug, instrument};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// In-memory store keyed by `(bucket, key)`. The default for tests and for
/// gateway runs that do not need persistence.
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectStore {
    objects: Arc<Mutex<HashMap<(String, String), StoredObject>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object directly, bypassing the port.
    pub fn insert(
        &self,
        bucket: impl Into<String>,
        key: impl Into<String>,
        body: Vec<u8>,
        content_type: impl Into<String>,
    ) {
        self.objects.lock().insert((bucket.into(), key.into()), StoredObject {
            body,
            content_type: content_type.into(),
        });
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .get(&(bucket.to_owned(), key.to_owned()))
            .cloned()
    }

    /// Keys currently held for a bucket, in no particular order.
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        self.objects
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, key)| key.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ServiceError> {
        self.object(bucket, key)
            .map(|object| object.body)
            .ok_or_else(|| ServiceError::NotFound {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
            })
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), ServiceError> {
        self.insert(bucket, key, body, content_type);
        Ok(())
    }
}

/// Filesystem store: `root/bucket/key`, with slashes in keys becoming
/// directories. Content types are not persisted.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(bucket);
        for segment in key.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path.push(segment);
        }
        path
    }

    async fn ensure_parent(path: &Path) -> Result<(), ServiceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|error| ServiceError::request("object-store", error))?;
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    #[instrument(skip(self))]
    async fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ServiceError> {
        let path = self.object_path(bucket, key);
        match fs::read(&path).await {
            Ok(body) => Ok(body),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                Err(ServiceError::NotFound {
                    bucket: bucket.to_owned(),
                    key: key.to_owned(),
                })
            }
            Err(error) => Err(ServiceError::request("object-store", error)),
        }
    }

    #[instrument(skip(self, body, _content_type), fields(bytes = body.len()))]
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), ServiceError> {
        let path = self.object_path(bucket, key);
        Self::ensure_parent(&path).await?;
        fs::write(&path, body)
            .await
            .map_err(|error| ServiceError::request("object-store", error))?;
        debug!(path = %path.display(), "object written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_roundtrips() {
        let store = MemoryObjectStore::new();
        store
            .put("results", "a/b.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        assert_eq!(store.get("results", "a/b.json").await.unwrap(), b"{}");
        assert_eq!(
            store.object("results", "a/b.json").unwrap().content_type,
            "application/json"
        );
        assert_eq!(store.keys("results"), vec!["a/b.json".to_owned()]);
    }

    #[tokio::test]
    async fn memory_store_misses_are_not_found() {
        let store = MemoryObjectStore::new();
        let err = store.get("results", "missing").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn fs_store_roundtrips_nested_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());

        store
            .put("charts", "graphs/km/plot.svg", b"<svg/>".to_vec(), "image/svg+xml")
            .await
            .unwrap();
        assert_eq!(
            store.get("charts", "graphs/km/plot.svg").await.unwrap(),
            b"<svg/>"
        );
    }

    #[tokio::test]
    async fn fs_store_misses_are_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path());
        let err = store.get("charts", "nope.svg").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn fs_store_ignores_traversal_segments() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsObjectStore::new(dir.path().join("root"));
        store
            .put("b", "../../escape.txt", b"x".to_vec(), "text/plain")
            .await
            .unwrap();
        assert!(!dir.path().join("escape.txt").exists());
        assert_eq!(store.get("b", "../../escape.txt").await.unwrap(), b"x");
    }
}
