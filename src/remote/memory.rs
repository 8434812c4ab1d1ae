//! Process-local bucket map implementing [`RemoteStorage`].

use super::{RemoteEntry, RemoteError, RemoteResult, RemoteStorage};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct MemoryObject {
    body: Bytes,
    content_type: String,
    created_at: DateTime<Utc>,
}

impl MemoryObject {
    fn entry(&self, name: &str) -> RemoteEntry {
        RemoteEntry {
            name: name.to_string(),
            size: Some(self.body.len() as u64),
            content_type: Some(self.content_type.clone()),
            created_at: Some(self.created_at),
            is_folder: false,
        }
    }
}

/// In-memory stand-in for a hosted bucket service.
///
/// Buckets must be created before use, as with the real service. Listing
/// order is key order.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    buckets: RwLock<HashMap<String, BTreeMap<String, MemoryObject>>>,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// A remote that already hosts an empty bucket named `bucket`.
    pub fn with_bucket(bucket: impl Into<String>) -> Self {
        let mut buckets = HashMap::new();
        buckets.insert(bucket.into(), BTreeMap::new());
        Self {
            buckets: RwLock::new(buckets),
        }
    }

    /// Create `bucket` if it does not exist yet.
    pub async fn create_bucket(&self, bucket: &str) {
        self.buckets
            .write()
            .await
            .entry(bucket.to_string())
            .or_default();
    }

    fn missing_bucket(bucket: &str) -> RemoteError {
        RemoteError::NotFound(format!("bucket `{}`", bucket))
    }
}

#[async_trait]
impl RemoteStorage for MemoryRemote {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> RemoteResult<RemoteEntry> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        if objects.contains_key(key) {
            return Err(RemoteError::Rejected {
                status: 409,
                message: format!("`{}` already exists", key),
            });
        }
        let object = MemoryObject {
            body,
            content_type: content_type.to_string(),
            created_at: Utc::now(),
        };
        let entry = object.entry(key);
        objects.insert(key.to_string(), object);
        debug!("memory remote stored {}/{}", bucket, key);
        Ok(entry)
    }

    async fn list(&self, bucket: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        Ok(objects
            .iter()
            .map(|(name, object)| object.entry(name))
            .collect())
    }

    async fn get(&self, bucket: &str, key: &str) -> RemoteResult<Bytes> {
        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        objects
            .get(key)
            .map(|object| object.body.clone())
            .ok_or_else(|| RemoteError::NotFound(format!("object `{}`", key)))
    }

    async fn remove(&self, bucket: &str, keys: &[String]) -> RemoteResult<Vec<String>> {
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| Self::missing_bucket(bucket))?;
        Ok(keys
            .iter()
            .filter(|key| objects.remove(key.as_str()).is_some())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_refuses_to_overwrite() {
        let remote = MemoryRemote::with_bucket("uploads");
        remote
            .put("uploads", "a", Bytes::from_static(b"1"), "text/plain")
            .await
            .unwrap();
        let err = remote
            .put("uploads", "a", Bytes::from_static(b"2"), "text/plain")
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::Rejected { status: 409, .. }));
        assert_eq!(remote.get("uploads", "a").await.unwrap(), "1");
    }

    #[tokio::test]
    async fn unknown_bucket_is_not_found() {
        let remote = MemoryRemote::new();
        assert!(matches!(
            remote.list("nope").await,
            Err(RemoteError::NotFound(_))
        ));
        remote.create_bucket("nope").await;
        assert!(remote.list("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn remove_reports_only_existing_keys() {
        let remote = MemoryRemote::with_bucket("b");
        remote
            .put("b", "x", Bytes::from_static(b"x"), "text/plain")
            .await
            .unwrap();
        let removed = remote
            .remove("b", &["x".to_string(), "y".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, vec!["x".to_string()]);
        assert!(remote.remove("b", &["x".to_string()]).await.unwrap().is_empty());
    }
}
