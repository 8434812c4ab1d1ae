//! Data models.
//!
//! [`object::StoredObject`] and [`upload::UploadRequest`] are what façade
//! callers see. [`bucket::Bucket`] and [`record::ObjectRecord`] are the rows the
//! local storage emulator keeps in SQLite; they map to tables via
//! `sqlx::FromRow` and serialize as JSON via `serde`.

pub mod bucket;
pub mod object;
pub mod record;
pub mod upload;
