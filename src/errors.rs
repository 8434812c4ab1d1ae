//! Failure taxonomy of the object store façade.
//!
//! Every façade call returns a [`StoreResult`]; nothing is swallowed and
//! nothing is retried. Callers decide whether to surface, log or retry.

use std::{fmt, time::Duration};
use thiserror::Error;

/// The façade operation a failure belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Upload,
    List,
    Download,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Upload => "upload",
            Operation::List => "list",
            Operation::Download => "download",
            Operation::Delete => "delete",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("upload of `{key}` failed: {reason}")]
    Upload { key: String, reason: String },
    #[error("could not list bucket `{bucket}`: {reason}")]
    List { bucket: String, reason: String },
    #[error("download of `{key}` failed: {reason}")]
    Download { key: String, reason: String },
    #[error("delete of `{key}` failed: {reason}")]
    Delete { key: String, reason: String },
    #[error("object `{key}` not found")]
    NotFound { key: String },
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: Operation, after: Duration },
    #[error("storage service unreachable: {0}")]
    Connection(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, StoreError::Timeout { .. })
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_the_operation() {
        let err = StoreError::Timeout {
            operation: Operation::Download,
            after: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "download timed out after 2s");
        assert!(err.is_timeout());
        assert!(!err.is_not_found());
    }

    #[test]
    fn not_found_is_distinct_from_download_failure() {
        let missing = StoreError::NotFound { key: "k".into() };
        let broken = StoreError::Download {
            key: "k".into(),
            reason: "reset by peer".into(),
        };
        assert!(missing.is_not_found());
        assert!(!broken.is_not_found());
    }
}
