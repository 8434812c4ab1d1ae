//! src/services/storage_service.rs
//!
//! StorageService: the backend of the local storage emulator. Metadata lives
//! in SQLite, payloads on disk sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. Deletes are hard deletes: the
//! row and the file both go away.

use crate::models::{bucket::Bucket, record::ObjectRecord};
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut};
use md5::Context;
use sqlx::SqlitePool;
use std::{
    collections::BTreeSet,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct ListParams {
    /// Folder to list, without trailing slash. Empty for the bucket root.
    pub prefix: String,
    pub limit: usize,
    pub offset: usize,
    pub descending: bool,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            limit: 100,
            offset: 0,
            descending: false,
        }
    }
}

/// One row of a folder listing.
#[derive(Debug, Clone)]
pub enum ListEntry {
    /// Pseudo-directory: keys below it share `name/` after the prefix.
    Folder(String),
    /// Object directly inside the listed folder; `name` is relative to it.
    Object { name: String, record: ObjectRecord },
}

impl ListEntry {
    pub fn name(&self) -> &str {
        match self {
            ListEntry::Folder(name) => name,
            ListEntry::Object { name, .. } => name,
        }
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("object `{key}` already exists in bucket `{bucket}`")]
    ObjectAlreadyExists { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// StorageService provides the operations the emulator's HTTP surface needs:
/// - Upload an object (streams bytes to disk, inserts metadata)
/// - Read an object (metadata from SQLite, payload from disk)
/// - List a folder of a bucket
/// - Remove many objects at once, skipping missing ones
/// - Create buckets
#[derive(Clone)]
pub struct StorageService {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,
}

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MAX_LEN: usize = 63;
const OBJECT_COLUMNS: &str =
    "id, bucket_id, key, content_type, size_bytes, etag, created_at";

impl StorageService {
    /// Create a new StorageService backed by the provided SQLite pool and
    /// using `base_path` as the root directory for object payloads.
    pub fn new(db: Arc<SqlitePool>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            db,
            base_path: base_path.into(),
        }
    }

    /// Reject keys that could escape the bucket directory.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.ends_with('/') {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Bucket names become directory names: 1–63 characters of lowercase
    /// letters, digits, `-`, `_` and `.`, not starting with a dot.
    fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty() || name.len() > BUCKET_NAME_MAX_LEN {
            return Err(invalid("must be between 1 and 63 characters"));
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-' | '_'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, hyphens and underscores",
            ));
        }
        if name.starts_with('.') {
            return Err(invalid("cannot start with a dot"));
        }
        Ok(())
    }

    /// Compute the physical base folder path for a bucket.
    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        let mut path = self.base_path.clone();
        path.push(bucket_name);
        path
    }

    /// First two bytes of MD5(bucket/key) as lowercase hex, one directory level each.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    /// base_path/bucket/{shard}/{shard}/{key}. Parent directories may not exist yet.
    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<_, Bucket>(
            "SELECT id, name, public, created_at FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<ObjectRecord> {
        sqlx::query_as::<_, ObjectRecord>(&format!(
            "SELECT {} FROM objects WHERE key = ? AND bucket_id = ?",
            OBJECT_COLUMNS
        ))
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Stream-upload an object.
    ///
    /// The payload is written to a temp file first (computing size and MD5),
    /// then the metadata row is inserted, then the file is renamed into
    /// place. Without `upsert` an existing key fails with
    /// `ObjectAlreadyExists` and the stored payload is left untouched; the
    /// unique index settles concurrent writers of the same key.
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        content_type: Option<String>,
        upsert: bool,
        stream: S,
    ) -> StorageResult<ObjectRecord>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = self.bucket_root(&bucket_rec.name).join(format!(".tmp-{}", Uuid::new_v4()));

        let (size_bytes, etag) = match write_temp(&tmp_path, stream).await {
            Ok(written) => written,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        };

        let sql = if upsert {
            format!(
                "INSERT INTO objects ({cols}) VALUES (?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT(bucket_id, key) DO UPDATE SET
                    content_type = excluded.content_type,
                    size_bytes = excluded.size_bytes,
                    etag = excluded.etag,
                    created_at = excluded.created_at
                 RETURNING {cols}",
                cols = OBJECT_COLUMNS
            )
        } else {
            format!(
                "INSERT INTO objects ({cols}) VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING {cols}",
                cols = OBJECT_COLUMNS
            )
        };

        let inserted = sqlx::query_as::<_, ObjectRecord>(&sql)
            .bind(Uuid::new_v4())
            .bind(bucket_rec.id)
            .bind(key)
            .bind(content_type)
            .bind(size_bytes)
            .bind(&etag)
            .bind(Utc::now())
            .fetch_one(&*self.db)
            .await;

        let record = match inserted {
            Ok(record) => record,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                if is_unique_violation(&err) {
                    return Err(StorageError::ObjectAlreadyExists {
                        bucket: bucket_rec.name,
                        key: key.to_string(),
                    });
                }
                return Err(StorageError::Sqlx(err));
            }
        };

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            if !upsert {
                let _ = sqlx::query("DELETE FROM objects WHERE id = ?")
                    .bind(record.id)
                    .execute(&*self.db)
                    .await;
            }
            return Err(StorageError::Io(err));
        }

        debug!("stored {} bytes at {}", size_bytes, file_path.display());
        Ok(record)
    }

    /// Metadata plus an opened payload file ready for streaming out.
    ///
    /// Returns ObjectNotFound if the row exists but the file is gone.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(ObjectRecord, File)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let file_path = self.object_path(&bucket_rec.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == io::ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;

        Ok((object, file))
    }

    /// List one folder of a bucket.
    ///
    /// Keys nested deeper than the folder collapse into a single `Folder`
    /// entry. Entries are ordered by name; `offset`/`limit` apply after
    /// collapsing.
    pub async fn list_objects(
        &self,
        bucket: &str,
        params: &ListParams,
    ) -> StorageResult<Vec<ListEntry>> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let folder = params.prefix.trim_matches('/');
        let key_prefix = if folder.is_empty() {
            String::new()
        } else {
            format!("{}/", folder)
        };

        let rows: Vec<ObjectRecord> = sqlx::query_as::<_, ObjectRecord>(&format!(
            "SELECT {} FROM objects WHERE bucket_id = ? AND substr(key, 1, ?) = ? ORDER BY key ASC",
            OBJECT_COLUMNS
        ))
        .bind(bucket_rec.id)
        .bind(key_prefix.chars().count() as i64)
        .bind(&key_prefix)
        .fetch_all(&*self.db)
        .await?;

        let mut folders = BTreeSet::new();
        let mut entries = Vec::new();
        for record in rows {
            let relative = record.key[key_prefix.len()..].to_string();
            if let Some(folder) = compute_common_prefix(&relative, "/") {
                folders.insert(folder);
            } else {
                entries.push(ListEntry::Object {
                    name: relative,
                    record,
                });
            }
        }
        entries.extend(folders.into_iter().map(ListEntry::Folder));
        entries.sort_by(|a, b| a.name().cmp(b.name()));
        if params.descending {
            entries.reverse();
        }

        Ok(entries
            .into_iter()
            .skip(params.offset)
            .take(params.limit)
            .collect())
    }

    /// Remove every key in `keys` that exists; missing keys are skipped.
    ///
    /// Returns the records that were removed.
    pub async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> StorageResult<Vec<ObjectRecord>> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let bucket_root = self.bucket_root(&bucket_rec.name);
        let mut removed = Vec::new();

        for key in keys {
            if self.ensure_key_safe(key).is_err() {
                debug!("skipping invalid key {:?} in delete", key);
                continue;
            }
            let deleted = sqlx::query_as::<_, ObjectRecord>(&format!(
                "DELETE FROM objects WHERE key = ? AND bucket_id = ? RETURNING {}",
                OBJECT_COLUMNS
            ))
            .bind(key)
            .bind(bucket_rec.id)
            .fetch_optional(&*self.db)
            .await?;

            let Some(record) = deleted else {
                debug!("{} not present in {}", key, bucket_rec.name);
                continue;
            };

            let file_path = self.object_path(&bucket_rec.name, key);
            match fs::remove_file(&file_path).await {
                Ok(_) => debug!("removed physical file {}", file_path.display()),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    debug!("file {} already missing", file_path.display());
                }
                Err(err) => return Err(StorageError::Io(err)),
            }
            if let Some(parent) = file_path.parent() {
                self.prune_empty_dirs(parent, &bucket_root).await;
            }
            removed.push(record);
        }

        Ok(removed)
    }

    /// Create a bucket and its directory.
    pub async fn create_bucket(&self, name: &str, public: bool) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            public,
            created_at: Utc::now(),
        };

        match sqlx::query("INSERT INTO buckets (id, name, public, created_at) VALUES (?, ?, ?, ?)")
            .bind(bucket.id)
            .bind(&bucket.name)
            .bind(bucket.public)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(bucket),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    /// Create `name` unless it already exists.
    pub async fn ensure_bucket(&self, name: &str) -> StorageResult<Bucket> {
        match self.create_bucket(name, false).await {
            Err(StorageError::BucketAlreadyExists(_)) => self.fetch_bucket(name).await,
            other => other,
        }
    }

    /// Remove empty directories from `start` up to, not including, `stop`.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

/// Drain `stream` into a new file at `path`, returning its size and MD5.
async fn write_temp<S>(path: &Path, stream: S) -> io::Result<(i64, String)>
where
    S: Stream<Item = io::Result<Bytes>>,
{
    let mut file = File::create(path).await?;
    let mut size_bytes: i64 = 0;
    let mut digest = Context::new();
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        size_bytes += chunk.len() as i64;
        digest.consume(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok((size_bytes, format!("{:x}", digest.compute())))
}

/// Return true if SQLx error indicates a unique constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// The folder a relative key belongs to, if it is nested at all.
fn compute_common_prefix(relative_key: &str, delimiter: &str) -> Option<String> {
    relative_key
        .find(delimiter)
        .map(|pos| relative_key[..pos].to_string())
}
