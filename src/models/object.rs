//! Represents an object (file) stored in the remote bucket.

use crate::remote::RemoteEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Joins the random identifier and the original file name in a key.
pub const KEY_SEPARATOR: char = '_';

/// Content type used when nothing better is known.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// A single object (blob) as seen through the façade.
///
/// Only metadata is carried here; payload bytes are fetched with
/// `ObjectStore::download`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredObject {
    /// `<uuid>_<original-name>`, unique within the bucket and never reassigned.
    pub key: String,

    /// Size in bytes.
    pub size: u64,

    /// Content type (MIME type), best effort.
    pub content_type: String,

    /// Creation time as reported by the remote, if it reports one.
    pub created_at: Option<DateTime<Utc>>,
}

impl StoredObject {
    /// The human-readable suffix of the key.
    pub fn original_name(&self) -> &str {
        original_name(&self.key)
    }
}

impl From<RemoteEntry> for StoredObject {
    fn from(entry: RemoteEntry) -> Self {
        Self {
            key: entry.name,
            size: entry.size.unwrap_or(0),
            content_type: entry
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
            created_at: entry.created_at,
        }
    }
}

/// Strip the generated identifier from a key.
///
/// Keys that were not produced by key generation are returned unchanged.
pub fn original_name(key: &str) -> &str {
    match key.split_once(KEY_SEPARATOR) {
        Some((prefix, name)) if Uuid::parse_str(prefix).is_ok() => name,
        _ => key,
    }
}
