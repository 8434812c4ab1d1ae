//! Routes of the local storage emulator, mirroring the hosted storage API.
//!
//! ## Structure
//! - **Object endpoints**
//!   - `POST   /storage/v1/object/{bucket}/{*key}`: upload object
//!   - `GET    /storage/v1/object/{bucket}/{*key}`: download object
//!   - `POST   /storage/v1/object/list/{bucket}`  : list a folder
//!   - `DELETE /storage/v1/object/{bucket}`       : remove keys (`{"prefixes": [...]}`)
//!
//! - **Bucket endpoints**
//!   - `POST   /storage/v1/bucket`: create bucket
//!
//! - **Probes**: `GET /healthz`, `GET /readyz`
//!
//! The wildcard `*key` allows nested keys like `photos/2025/img.jpg`.

use crate::{
    handlers::{
        health_handlers::{healthz, readyz},
        object_handlers::{
            create_bucket, delete_objects, get_object, list_objects, upload_object,
        },
    },
    server::AppState,
};
use axum::{
    Router,
    routing::{delete, get, post},
};

/// Build the emulator router. State (`AppState`) is attached by the caller.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/storage/v1/bucket", post(create_bucket))
        .route("/storage/v1/object/list/{bucket}", post(list_objects))
        .route(
            "/storage/v1/object/{bucket}/{*key}",
            post(upload_object).get(get_object),
        )
        .route("/storage/v1/object/{bucket}", delete(delete_objects))
}
