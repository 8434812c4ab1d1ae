//! The remote storage collaborator the façade talks to.
//!
//! [`RemoteStorage`] is the minimal contract of a hosted object store:
//! put, list, get and remove. Implementations:
//! - [`http::HttpRemote`] for the hosted storage REST API (and the local
//!   emulator, which speaks the same dialect);
//! - [`memory::MemoryRemote`] for tests and offline runs.

pub mod http;
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// One entry of a bucket listing, or the result of a put.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub name: String,
    pub size: Option<u64>,
    pub content_type: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Pseudo-directory reported by the remote; carries no payload.
    pub is_folder: bool,
}

impl RemoteEntry {
    /// An object entry with no metadata.
    pub fn object(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
            content_type: None,
            created_at: None,
            is_folder: false,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("request timed out")]
    Timeout,
    #[error("cannot reach storage service: {0}")]
    Unreachable(String),
    #[error("credentials rejected: {0}")]
    Unauthorized(String),
    #[error("rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected response: {0}")]
    Protocol(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Already-authenticated handle to an object storage service.
///
/// Each method is one independent round trip; implementations hold no
/// per-call state, so a single handle is shared across all callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStorage: Send + Sync {
    /// Store `body` under `key`. Must not overwrite an existing key.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> RemoteResult<RemoteEntry>;

    /// Every entry at the root of `bucket`, in the remote's order.
    async fn list(&self, bucket: &str) -> RemoteResult<Vec<RemoteEntry>>;

    /// The full payload stored under `key`.
    async fn get(&self, bucket: &str, key: &str) -> RemoteResult<Bytes>;

    /// Remove `keys`, returning the names that were actually removed.
    /// Keys that do not exist are skipped silently.
    async fn remove(&self, bucket: &str, keys: &[String]) -> RemoteResult<Vec<String>>;
}
