use cloud_file_store::{
    ObjectStore, StoreError, UploadRequest,
    remote::memory::MemoryRemote,
};
use std::{collections::HashSet, sync::Arc, time::Duration};

fn store() -> ObjectStore {
    ObjectStore::new(
        Arc::new(MemoryRemote::with_bucket("uploads")),
        "uploads",
        Duration::from_secs(5),
    )
}

#[tokio::test]
async fn uploaded_object_is_listed_with_its_size() {
    let store = store();
    let payloads: [(&[u8], &str); 3] = [
        (b"", "empty.bin"),
        (b"x", "one byte.txt"),
        (&[0u8, 159, 146, 150, 255], "binary.dat"),
    ];
    for (bytes, name) in payloads {
        let uploaded = store.upload(bytes.to_vec(), name).await.unwrap();
        let listed = store.list().await.unwrap();
        let found = listed
            .iter()
            .find(|o| o.key == uploaded.key)
            .expect("uploaded key missing from listing");
        assert!(found.key.ends_with(name));
        assert_eq!(found.size, bytes.len() as u64);
    }
}

#[tokio::test]
async fn deleting_an_absent_key_succeeds() {
    let store = store();
    store.delete("never-existed.txt").await.unwrap();
    let key = ObjectStore::generate_key("ghost.txt");
    store.delete(&key).await.unwrap();
    store.delete(&key).await.unwrap();
}

#[tokio::test]
async fn download_after_delete_is_not_found() {
    let store = store();
    let obj = store.upload(b"bye".to_vec(), "bye.txt").await.unwrap();
    store.delete(&obj.key).await.unwrap();
    let err = store.download(&obj.key).await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { ref key } if *key == obj.key));
}

#[tokio::test]
async fn download_returns_uploaded_bytes() {
    let store = store();
    let payload: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
    let obj = store.upload(payload.clone(), "blob.bin").await.unwrap();
    assert_eq!(store.download(&obj.key).await.unwrap(), payload);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_uploads_of_the_same_name_do_not_collide() {
    let store = store();
    let (first, second) = tokio::join!(
        store.upload(b"one".to_vec(), "f"),
        store.upload(b"two".to_vec(), "f"),
    );
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_ne!(first.key, second.key);
    assert_eq!(store.download(&first.key).await.unwrap(), "one");
    assert_eq!(store.download(&second.key).await.unwrap(), "two");
    assert_eq!(store.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn many_concurrent_uploads_get_distinct_keys() {
    let store = store();
    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.upload(vec![i as u8], "same.txt").await })
        })
        .collect();
    let mut keys = HashSet::new();
    for task in tasks {
        keys.insert(task.await.unwrap().unwrap().key);
    }
    assert_eq!(keys.len(), 32);
}

#[tokio::test]
async fn empty_bucket_lists_as_empty() {
    assert!(store().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn upload_list_delete_scenario() {
    let store = store();
    let a = store.upload(b"alpha".to_vec(), "a.txt").await.unwrap();
    let b = store.upload(b"bravo".to_vec(), "b.txt").await.unwrap();
    let c = store.upload(b"charlie".to_vec(), "c.txt").await.unwrap();
    assert_eq!(store.list().await.unwrap().len(), 3);

    store.delete(&b.key).await.unwrap();

    let remaining: HashSet<String> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.key)
        .collect();
    assert_eq!(remaining.len(), 2);
    assert!(!remaining.contains(&b.key));
    assert!(remaining.contains(&a.key) && remaining.contains(&c.key));
}

#[tokio::test]
async fn upload_request_keeps_explicit_content_type() {
    let store = store();
    let request = UploadRequest::new(b"{}".to_vec(), "data").with_content_type("application/json");
    let obj = store.upload_request(request).await.unwrap();
    let listed = store.list().await.unwrap();
    assert_eq!(listed[0].content_type, "application/json");
    assert_eq!(obj.original_name(), "data");
}

#[tokio::test]
async fn listing_a_missing_bucket_fails_distinctly() {
    let store = ObjectStore::new(Arc::new(MemoryRemote::new()), "absent", Duration::from_secs(5));
    let err = store.list().await.unwrap_err();
    assert!(matches!(err, StoreError::List { .. }));
    let err = store.upload(b"x".to_vec(), "x").await.unwrap_err();
    assert!(matches!(err, StoreError::Upload { .. }));
}
