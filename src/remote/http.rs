//! Client for the hosted storage REST API (`/storage/v1`).
//!
//! One `reqwest::Client` is built per handle and reused for every request.
//! Both the hosted service and the local emulator (`crate::server`) answer
//! this dialect.

use super::{RemoteEntry, RemoteError, RemoteResult, RemoteStorage};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};
use tracing::debug;
use url::Url;

/// Page size used when walking a bucket listing.
pub const LIST_PAGE_SIZE: usize = 100;

/// Placeholder object the hosted service writes into empty folders.
const FOLDER_PLACEHOLDER: &str = ".emptyFolderPlaceholder";

#[derive(Clone)]
pub struct HttpRemote {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl fmt::Debug for HttpRemote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRemote")
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    #[serde(rename = "sortBy")]
    sort_by: SortBy,
}

#[derive(Debug, Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Debug, Serialize)]
struct RemoveRequest<'a> {
    prefixes: &'a [String],
}

/// One element of a listing (or of a remove response).
#[derive(Debug, Deserialize)]
struct ListedObject {
    name: String,
    id: Option<serde_json::Value>,
    created_at: Option<DateTime<Utc>>,
    metadata: Option<ListedMetadata>,
}

#[derive(Debug, Deserialize)]
struct ListedMetadata {
    size: Option<u64>,
    mimetype: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(rename = "Key")]
    key: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

/// Error body returned by the storage API. `statusCode` arrives as a string
/// from the hosted service and sometimes disagrees with the HTTP status.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(rename = "statusCode")]
    status_code: Option<serde_json::Value>,
    error: Option<String>,
    message: Option<String>,
}

impl ListedObject {
    fn into_entry(self) -> RemoteEntry {
        let is_folder = self.id.as_ref().is_none_or(serde_json::Value::is_null);
        let (size, content_type) = match self.metadata {
            Some(meta) => (meta.size, meta.mimetype),
            None => (None, None),
        };
        RemoteEntry {
            name: self.name,
            size,
            content_type,
            created_at: self.created_at,
            is_folder,
        }
    }
}

impl HttpRemote {
    /// Build a handle for the service rooted at `base_url`, authenticating
    /// every request with `api_key`. `timeout` bounds each whole request.
    pub fn new(base_url: &str, api_key: impl Into<String>, timeout: Duration) -> RemoteResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|err| RemoteError::Unreachable(format!("invalid url `{}`: {}", base_url, err)))?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::Unreachable(format!(
                "url `{}` cannot carry a path",
                base_url
            )));
        }
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|err| RemoteError::Transport(format!("building http client: {}", err)))?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `<base>/storage/v1/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> RemoteResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| RemoteError::Protocol("base url cannot carry a path".into()))?;
            path.pop_if_empty()
                .extend(["storage", "v1"])
                .extend(segments.iter().copied());
        }
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(transport_error)?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn list_page(&self, bucket: &str, offset: usize) -> RemoteResult<Vec<ListedObject>> {
        let url = self.endpoint(&["object", "list", bucket])?;
        let body = ListRequest {
            prefix: "",
            limit: LIST_PAGE_SIZE,
            offset,
            sort_by: SortBy {
                column: "name",
                order: "asc",
            },
        };
        let response = self.send(self.client.post(url).json(&body)).await?;
        response.json().await.map_err(transport_error)
    }
}

#[async_trait]
impl RemoteStorage for HttpRemote {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Bytes,
        content_type: &str,
    ) -> RemoteResult<RemoteEntry> {
        let url = self.endpoint(&["object", bucket, key])?;
        let size = body.len() as u64;
        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header(reqwest::header::CACHE_CONTROL, "max-age=3600")
            .header("x-upsert", "false")
            .body(body);
        let response = self.send(request).await?;
        let created_at = match response.json::<UploadResponse>().await {
            Ok(parsed) => {
                debug!("remote acknowledged {:?}", parsed.key);
                parsed.created_at
            }
            // The write already succeeded; an odd acknowledgement body is not a failure.
            Err(err) => {
                debug!("ignoring unparseable upload acknowledgement: {}", err);
                None
            }
        };
        Ok(RemoteEntry {
            name: key.to_string(),
            size: Some(size),
            content_type: Some(content_type.to_string()),
            created_at,
            is_folder: false,
        })
    }

    async fn list(&self, bucket: &str) -> RemoteResult<Vec<RemoteEntry>> {
        let mut entries = Vec::new();
        let mut offset = 0;
        loop {
            let page = self.list_page(bucket, offset).await?;
            let fetched = page.len();
            entries.extend(
                page.into_iter()
                    .filter(|obj| obj.name != FOLDER_PLACEHOLDER)
                    .map(ListedObject::into_entry),
            );
            if fetched < LIST_PAGE_SIZE {
                break;
            }
            offset += fetched;
        }
        debug!("listed {} entries from {}", entries.len(), bucket);
        Ok(entries)
    }

    async fn get(&self, bucket: &str, key: &str) -> RemoteResult<Bytes> {
        let url = self.endpoint(&["object", bucket, key])?;
        let response = self.send(self.client.get(url)).await?;
        response.bytes().await.map_err(transport_error)
    }

    async fn remove(&self, bucket: &str, keys: &[String]) -> RemoteResult<Vec<String>> {
        let url = self.endpoint(&["object", bucket])?;
        let body = RemoveRequest { prefixes: keys };
        let response = self.send(self.client.delete(url).json(&body)).await?;
        let removed: Vec<ListedObject> = response.json().await.map_err(transport_error)?;
        Ok(removed.into_iter().map(|obj| obj.name).collect())
    }
}

fn transport_error(err: reqwest::Error) -> RemoteError {
    if err.is_timeout() {
        RemoteError::Timeout
    } else if err.is_connect() {
        RemoteError::Unreachable(err.to_string())
    } else if err.is_decode() {
        RemoteError::Protocol(err.to_string())
    } else {
        RemoteError::Transport(err.to_string())
    }
}

async fn error_from_response(response: Response) -> RemoteError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    classify(status, &text)
}

/// Map an unsuccessful response onto [`RemoteError`].
fn classify(status: StatusCode, text: &str) -> RemoteError {
    let body: ErrorBody = serde_json::from_str(text).unwrap_or_default();
    let effective = body
        .status_code
        .as_ref()
        .and_then(|code| match code {
            serde_json::Value::String(s) => s.parse::<u16>().ok(),
            serde_json::Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
            _ => None,
        })
        .unwrap_or(status.as_u16());
    let message = body
        .message
        .or(body.error.clone())
        .unwrap_or_else(|| if text.is_empty() { status.to_string() } else { text.to_string() });

    let unauthorized_kind = matches!(body.error.as_deref(), Some("Unauthorized" | "InvalidJWT"));
    match effective {
        404 => RemoteError::NotFound(message),
        401 => RemoteError::Unauthorized(message),
        _ if unauthorized_kind => RemoteError::Unauthorized(message),
        408 | 504 => RemoteError::Timeout,
        status => RemoteError::Rejected { status, message },
    }
}
