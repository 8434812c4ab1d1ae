//! ObjectStore: the façade callers use to manage objects in one remote bucket.
//!
//! Every operation is a single round trip to the [`RemoteStorage`] handle,
//! bounded by the configured timeout and translated into a [`StoreResult`].
//! There is no local cache and no retry; callers that mutate the bucket and
//! want an up-to-date view must call [`ObjectStore::list`] again.

use crate::{
    errors::{Operation, StoreError, StoreResult},
    models::{
        object::{KEY_SEPARATOR, StoredObject},
        upload::UploadRequest,
    },
    remote::{RemoteError, RemoteResult, RemoteStorage},
};
use bytes::Bytes;
use std::{future::Future, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct ObjectStore {
    /// Shared, already-authenticated handle to the remote service.
    remote: Arc<dyn RemoteStorage>,

    /// Bucket every operation targets.
    bucket: String,

    /// Upper bound for a single round trip.
    timeout: Duration,
}

impl ObjectStore {
    pub fn new(remote: Arc<dyn RemoteStorage>, bucket: impl Into<String>, timeout: Duration) -> Self {
        Self {
            remote,
            bucket: bucket.into(),
            timeout,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Produce a fresh key `<uuid>_<name>`.
    ///
    /// Only the last path segment of `original_name` is kept. An empty name
    /// yields the bare identifier.
    pub fn generate_key(original_name: &str) -> String {
        let id = Uuid::new_v4();
        let name = original_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();
        if name.is_empty() {
            id.to_string()
        } else {
            format!("{}{}{}", id, KEY_SEPARATOR, name)
        }
    }

    /// Upload `bytes` under a newly generated key.
    ///
    /// Never overwrites: retrying after a failure creates another object.
    pub async fn upload(
        &self,
        bytes: impl Into<Bytes>,
        original_name: &str,
    ) -> StoreResult<StoredObject> {
        self.upload_request(UploadRequest::new(bytes, original_name))
            .await
    }

    pub async fn upload_request(&self, request: UploadRequest) -> StoreResult<StoredObject> {
        let (bytes, original_name, content_type) = request.into_parts();
        let key = Self::generate_key(&original_name);
        let size = bytes.len() as u64;
        debug!("uploading {} bytes as {}", size, key);

        let entry = self
            .round_trip(
                Operation::Upload,
                &key,
                self.remote.put(&self.bucket, &key, bytes, &content_type),
            )
            .await?;

        info!("uploaded {} to bucket {}", key, self.bucket);
        Ok(StoredObject {
            key,
            size,
            content_type,
            created_at: entry.created_at,
        })
    }

    /// Every object currently in the bucket, in the order the remote returns.
    ///
    /// A failure is always an `Err`; an empty bucket is `Ok(vec![])`.
    pub async fn list(&self) -> StoreResult<Vec<StoredObject>> {
        let entries = self
            .round_trip(Operation::List, &self.bucket, self.remote.list(&self.bucket))
            .await?;
        let objects: Vec<StoredObject> = entries
            .into_iter()
            .filter(|entry| !entry.is_folder)
            .map(StoredObject::from)
            .collect();
        debug!("bucket {} holds {} objects", self.bucket, objects.len());
        Ok(objects)
    }

    /// Listing for display code: an empty sequence on failure, with the
    /// failure reported alongside.
    pub async fn list_or_empty(&self) -> (Vec<StoredObject>, Option<StoreError>) {
        match self.list().await {
            Ok(objects) => (objects, None),
            Err(err) => (Vec::new(), Some(err)),
        }
    }

    /// Fetch the whole payload stored under `key`.
    pub async fn download(&self, key: &str) -> StoreResult<Bytes> {
        let bytes = self
            .round_trip(
                Operation::Download,
                key,
                self.remote.get(&self.bucket, key),
            )
            .await?;
        debug!("downloaded {} bytes from {}", bytes.len(), key);
        Ok(bytes)
    }

    /// Remove `key`. Removing a key that does not exist succeeds.
    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let keys = [key.to_string()];
        match self
            .round_trip(
                Operation::Delete,
                key,
                self.remote.remove(&self.bucket, &keys),
            )
            .await
        {
            Ok(removed) if removed.is_empty() => {
                debug!("{} was already absent from {}", key, self.bucket);
                Ok(())
            }
            Ok(_) => {
                info!("deleted {} from bucket {}", key, self.bucket);
                Ok(())
            }
            Err(StoreError::NotFound { .. }) => {
                debug!("{} was already absent from {}", key, self.bucket);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Run one remote call under the timeout and classify its failure.
    async fn round_trip<T, F>(&self, operation: Operation, subject: &str, call: F) -> StoreResult<T>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => self.classify(operation, subject, err),
            Err(_) => StoreError::Timeout {
                operation,
                after: self.timeout,
            },
        };
        if !(operation == Operation::Delete && result.is_not_found()) {
            warn!("{} of {} failed: {}", operation, subject, result);
        }
        Err(result)
    }

    fn classify(&self, operation: Operation, subject: &str, err: RemoteError) -> StoreError {
        let reason = err.to_string();
        match err {
            RemoteError::Timeout => StoreError::Timeout {
                operation,
                after: self.timeout,
            },
            RemoteError::Unreachable(msg) | RemoteError::Unauthorized(msg) => {
                StoreError::Connection(msg)
            }
            RemoteError::NotFound(_)
                if matches!(operation, Operation::Download | Operation::Delete) =>
            {
                StoreError::NotFound {
                    key: subject.to_string(),
                }
            }
            RemoteError::NotFound(_)
            | RemoteError::Rejected { .. }
            | RemoteError::Transport(_)
            | RemoteError::Protocol(_) => {
                let subject = subject.to_string();
                match operation {
                    Operation::Upload => StoreError::Upload {
                        key: subject,
                        reason,
                    },
                    Operation::List => StoreError::List {
                        bucket: subject,
                        reason,
                    },
                    Operation::Download => StoreError::Download {
                        key: subject,
                        reason,
                    },
                    Operation::Delete => StoreError::Delete {
                        key: subject,
                        reason,
                    },
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{MockRemoteStorage, RemoteEntry, memory::MemoryRemote};
    use async_trait::async_trait;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn store_with(remote: impl RemoteStorage + 'static) -> ObjectStore {
        ObjectStore::new(Arc::new(remote), "uploads", TIMEOUT)
    }

    #[test]
    fn generated_keys_keep_the_name_and_differ() {
        let a = ObjectStore::generate_key("report.pdf");
        let b = ObjectStore::generate_key("report.pdf");
        assert_ne!(a, b);
        assert!(a.ends_with("_report.pdf"));
        let (id, name) = a.split_once('_').unwrap();
        assert!(Uuid::parse_str(id).is_ok());
        assert_eq!(name, "report.pdf");
    }

    #[test]
    fn empty_name_degrades_to_bare_identifier() {
        let key = ObjectStore::generate_key("");
        assert!(Uuid::parse_str(&key).is_ok());
    }

    #[test]
    fn path_components_are_dropped_from_keys() {
        assert!(ObjectStore::generate_key("../etc/passwd").ends_with("_passwd"));
        assert!(ObjectStore::generate_key(r"C:\Users\me\notes.txt").ends_with("_notes.txt"));
        assert!(Uuid::parse_str(&ObjectStore::generate_key("dir/")).is_ok());
    }

    #[tokio::test]
    async fn upload_reports_size_and_guessed_type() {
        let store = store_with(MemoryRemote::with_bucket("uploads"));
        let obj = store.upload(&b"hello"[..], "greeting.txt").await.unwrap();
        assert_eq!(obj.size, 5);
        assert_eq!(obj.content_type, "text/plain");
        assert_eq!(obj.original_name(), "greeting.txt");
        assert!(obj.created_at.is_some());
    }

    #[tokio::test]
    async fn download_not_found_is_an_error_but_delete_not_found_is_not() {
        let mut remote = MockRemoteStorage::new();
        remote
            .expect_get()
            .returning(|_, _| Err(RemoteError::NotFound("gone".into())));
        remote
            .expect_remove()
            .returning(|_, _| Err(RemoteError::NotFound("gone".into())));
        let store = store_with(remote);

        let err = store.download("k").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { ref key } if key == "k"));
        store.delete("k").await.unwrap();
    }

    #[tokio::test]
    async fn missing_bucket_on_list_is_a_list_error() {
        let mut remote = MockRemoteStorage::new();
        remote
            .expect_list()
            .returning(|_| Err(RemoteError::NotFound("bucket".into())));
        let store = store_with(remote);
        let err = store.list().await.unwrap_err();
        assert!(matches!(err, StoreError::List { ref bucket, .. } if bucket == "uploads"));
    }

    #[tokio::test]
    async fn failures_map_to_their_operation() {
        let mut remote = MockRemoteStorage::new();
        remote.expect_put().returning(|_, _, _, _| {
            Err(RemoteError::Rejected {
                status: 413,
                message: "quota".into(),
            })
        });
        remote
            .expect_get()
            .returning(|_, _| Err(RemoteError::Transport("reset".into())));
        remote.expect_remove().returning(|_, _| {
            Err(RemoteError::Rejected {
                status: 403,
                message: "policy".into(),
            })
        });
        let store = store_with(remote);

        assert!(matches!(
            store.upload(&b"x"[..], "x").await,
            Err(StoreError::Upload { .. })
        ));
        assert!(matches!(
            store.download("k").await,
            Err(StoreError::Download { .. })
        ));
        assert!(matches!(
            store.delete("k").await,
            Err(StoreError::Delete { .. })
        ));
    }

    #[tokio::test]
    async fn unreachable_or_unauthorized_is_a_connection_error() {
        let mut remote = MockRemoteStorage::new();
        remote
            .expect_list()
            .returning(|_| Err(RemoteError::Unreachable("refused".into())));
        remote
            .expect_get()
            .returning(|_, _| Err(RemoteError::Unauthorized("bad key".into())));
        let store = store_with(remote);

        assert!(matches!(store.list().await, Err(StoreError::Connection(_))));
        assert!(matches!(
            store.download("k").await,
            Err(StoreError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn remote_timeout_is_reported_as_timeout() {
        let mut remote = MockRemoteStorage::new();
        remote.expect_get().returning(|_, _| Err(RemoteError::Timeout));
        let store = store_with(remote);
        let err = store.download("k").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Timeout {
                operation: Operation::Download,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn list_failure_is_distinguishable_from_empty_bucket() {
        let empty = store_with(MemoryRemote::with_bucket("uploads"));
        let (objects, err) = empty.list_or_empty().await;
        assert!(objects.is_empty());
        assert!(err.is_none());

        let missing = store_with(MemoryRemote::new());
        let (objects, err) = missing.list_or_empty().await;
        assert!(objects.is_empty());
        assert!(matches!(err, Some(StoreError::List { .. })));
    }

    #[tokio::test]
    async fn folders_are_not_listed_as_objects() {
        let mut remote = MockRemoteStorage::new();
        remote.expect_list().returning(|_| {
            let mut folder = RemoteEntry::object("photos");
            folder.is_folder = true;
            Ok(vec![folder, RemoteEntry::object("k_a.txt")])
        });
        let store = store_with(remote);
        let objects = store.list().await.unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].key, "k_a.txt");
    }

    struct StalledRemote;

    #[async_trait]
    impl RemoteStorage for StalledRemote {
        async fn put(&self, _: &str, _: &str, _: Bytes, _: &str) -> RemoteResult<RemoteEntry> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Err(RemoteError::Transport("unreachable".into()))
        }

        async fn list(&self, _: &str) -> RemoteResult<Vec<RemoteEntry>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }

        async fn get(&self, _: &str, _: &str) -> RemoteResult<Bytes> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Bytes::new())
        }

        async fn remove(&self, _: &str, _: &[String]) -> RemoteResult<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn stalled_calls_fail_with_timeout_instead_of_hanging() {
        let store = ObjectStore::new(
            Arc::new(StalledRemote),
            "uploads",
            Duration::from_millis(20),
        );
        let err = store.list().await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Timeout {
                operation: Operation::List,
                ..
            }
        ));
        assert!(store.upload(&b"x"[..], "x").await.unwrap_err().is_timeout());
        assert!(store.delete("k").await.unwrap_err().is_timeout());
    }
}
