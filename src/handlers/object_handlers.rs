//! HTTP handlers for object and bucket operations of the emulator.
//! Object bodies are streamed in both directions; storage concerns are
//! delegated to `StorageService`.

use crate::{
    handlers::app_error::AppError,
    models::record::ObjectRecord,
    server::AppState,
    services::storage_service::{ListEntry, ListParams},
};
use axum::{
    Json,
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

const DEFAULT_LIST_LIMIT: usize = 100;
const MAX_LIST_LIMIT: usize = 1000;

/// Body of `POST /storage/v1/object/list/{bucket}`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListObjectsReq {
    pub prefix: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    #[serde(rename = "sortBy")]
    pub sort_by: Option<SortBy>,
}

#[derive(Debug, Deserialize)]
pub struct SortBy {
    pub column: Option<String>,
    pub order: Option<String>,
}

/// Body of `DELETE /storage/v1/object/{bucket}`.
#[derive(Debug, Deserialize)]
pub struct DeleteObjectsReq {
    pub prefixes: Vec<String>,
}

/// Body of `POST /storage/v1/bucket`.
#[derive(Debug, Deserialize)]
pub struct CreateBucketReq {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub public: bool,
}

/// A listing row as the hosted API shapes it. Folders carry no id and no
/// metadata.
#[derive(Debug, Serialize)]
pub struct ListedObject {
    pub name: String,
    pub id: Option<Uuid>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub metadata: Option<ListedMetadata>,
}

#[derive(Debug, Serialize)]
pub struct ListedMetadata {
    pub size: i64,
    pub mimetype: String,
    #[serde(rename = "eTag")]
    pub e_tag: Option<String>,
    #[serde(rename = "lastModified")]
    pub last_modified: DateTime<Utc>,
}

impl ListedObject {
    fn object(name: String, record: &ObjectRecord) -> Self {
        Self {
            name,
            id: Some(record.id),
            created_at: Some(record.created_at),
            updated_at: Some(record.created_at),
            metadata: Some(ListedMetadata {
                size: record.size_bytes,
                mimetype: content_type_of(record),
                e_tag: record.etag.as_ref().map(|e| format!("\"{}\"", e)),
                last_modified: record.created_at,
            }),
        }
    }

    fn folder(name: String) -> Self {
        Self {
            name,
            id: None,
            created_at: None,
            updated_at: None,
            metadata: None,
        }
    }
}

/// Reject the request unless it carries the configured service key, either
/// as `apikey` or as a bearer token.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let Some(expected) = state.service_key.as_deref() else {
        return Ok(());
    };
    let apikey = headers.get("apikey").and_then(|v| v.to_str().ok());
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    if apikey == Some(expected) || bearer == Some(expected) {
        Ok(())
    } else {
        Err(AppError::unauthorized("missing or invalid service key"))
    }
}

/// `POST /storage/v1/object/{bucket}/{*key}`: upload raw body.
///
/// Honors `x-upsert: true`; otherwise an existing key is a 409.
pub async fn upload_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &headers)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    let upsert = headers
        .get("x-upsert")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(io::Error::other));

    let record = state
        .storage
        .upload_object_stream(&bucket, &key, content_type, upsert, stream)
        .await?;

    Ok(Json(json!({
        "Id": record.id,
        "Key": format!("{}/{}", bucket, record.key),
        "created_at": record.created_at,
    })))
}

/// `GET /storage/v1/object/{bucket}/{*key}`: stream the payload back.
pub async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    authorize(&state, &headers)?;
    let (meta, file) = state.storage.get_object_reader(&bucket, &key).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    set_object_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// `POST /storage/v1/object/list/{bucket}`: list one folder.
pub async fn list_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ListObjectsReq>,
) -> Result<Json<Vec<ListedObject>>, AppError> {
    authorize(&state, &headers)?;
    let descending = req
        .sort_by
        .as_ref()
        .and_then(|s| s.order.as_deref())
        .is_some_and(|o| o.eq_ignore_ascii_case("desc"));
    if let Some(column) = req.sort_by.as_ref().and_then(|s| s.column.as_deref()) {
        if column != "name" {
            tracing::debug!("sorting by {} is not supported, using name", column);
        }
    }
    let params = ListParams {
        prefix: req.prefix.unwrap_or_default(),
        limit: req
            .limit
            .unwrap_or(DEFAULT_LIST_LIMIT)
            .clamp(1, MAX_LIST_LIMIT),
        offset: req.offset.unwrap_or(0),
        descending,
    };

    let entries = state.storage.list_objects(&bucket, &params).await?;
    let listed = entries
        .into_iter()
        .map(|entry| match entry {
            ListEntry::Folder(name) => ListedObject::folder(name),
            ListEntry::Object { name, record } => ListedObject::object(name, &record),
        })
        .collect();
    Ok(Json(listed))
}

/// `DELETE /storage/v1/object/{bucket}`: remove many keys. Keys that do not
/// exist are absent from the response; the request still succeeds.
pub async fn delete_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    headers: HeaderMap,
    Json(req): Json<DeleteObjectsReq>,
) -> Result<Json<Vec<ListedObject>>, AppError> {
    authorize(&state, &headers)?;
    let removed = state.storage.delete_objects(&bucket, &req.prefixes).await?;
    Ok(Json(
        removed
            .iter()
            .map(|record| ListedObject::object(record.key.clone(), record))
            .collect(),
    ))
}

/// `POST /storage/v1/bucket`: create a bucket.
pub async fn create_bucket(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateBucketReq>,
) -> Result<impl IntoResponse, AppError> {
    authorize(&state, &headers)?;
    let name = req
        .name
        .or(req.id)
        .ok_or_else(|| AppError::new(StatusCode::BAD_REQUEST, "InvalidRequest", "bucket name is required"))?;
    let bucket = state.storage.create_bucket(&name, req.public).await?;
    Ok(Json(json!({ "name": bucket.name })))
}

fn content_type_of(meta: &ObjectRecord) -> String {
    meta.content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".into())
}

fn set_object_headers(headers: &mut HeaderMap, meta: &ObjectRecord) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type_of(meta))
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );

    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&meta.size_bytes.max(0).to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    if let Some(etag) = meta.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }

    if let Ok(value) = HeaderValue::from_str(&meta.created_at.to_rfc2822()) {
        headers.insert(header::LAST_MODIFIED, value);
    }
}
