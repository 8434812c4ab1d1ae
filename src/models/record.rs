//! Object metadata rows kept by the local storage emulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata of a single stored blob. The payload itself lives on disk.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct ObjectRecord {
    /// Internal UUID, reported to clients as the object id.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type) supplied on upload.
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 of the payload.
    pub etag: Option<String>,

    /// Timestamp when the object was written.
    pub created_at: DateTime<Utc>,
}
