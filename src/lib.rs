//! Cloud file storage: a façade over a remote object bucket, plus a local
//! emulator of the storage service for development and tests.
//!
//! - [`services::object_store::ObjectStore`] is what callers use: generate
//!   keys, upload, list, download and delete.
//! - [`remote`] holds the collaborator contract and its HTTP and in-memory
//!   implementations.
//! - [`server`], [`routes`], [`handlers`] and
//!   [`services::storage_service`] make up the emulator.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod remote;
pub mod routes;
pub mod server;
pub mod services;

pub use errors::{Operation, StoreError, StoreResult};
pub use models::{object::StoredObject, upload::UploadRequest};
pub use services::object_store::ObjectStore;
