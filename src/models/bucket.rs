//! A bucket hosted by the local storage emulator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A named namespace of key → blob mappings.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Bucket name as used in request paths.
    pub name: String,

    /// Whether objects may be read without a key. Recorded, not enforced.
    pub public: bool,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
