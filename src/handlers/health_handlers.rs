//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks SQLite and the payload directory

use crate::server::AppState;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::fs;
use uuid::Uuid;

/// `GET /healthz`: never performs I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Runs `SELECT 1` against SQLite and a write/read/delete round trip of a
/// scratch file under the payload directory. 200 when both pass, 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let service = &state.storage;

    let sqlite = match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&*service.db)
        .await
    {
        Ok(1) => CheckStatus::ok(),
        Ok(v) => CheckStatus::failed(format!("unexpected result: {}", v)),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };

    let probe = service.base_path.join(format!(".readyz-{}", Uuid::new_v4()));
    let disk = match fs::write(&probe, b"readyz").await {
        Ok(_) => {
            let check = match fs::read(&probe).await {
                Ok(bytes) if bytes == b"readyz" => CheckStatus::ok(),
                Ok(_) => CheckStatus::failed("file content mismatch".to_string()),
                Err(e) => CheckStatus::failed(format!("could not read probe file: {}", e)),
            };
            // cleanup failure does not fail the check
            if let Err(e) = fs::remove_file(&probe).await {
                tracing::debug!("could not remove {}: {}", probe.display(), e);
            }
            check
        }
        Err(e) => CheckStatus::failed(format!("could not write probe file: {}", e)),
    };

    let overall_ok = sqlite.ok && disk.ok;
    let mut checks = BTreeMap::new();
    checks.insert("sqlite", sqlite);
    checks.insert("disk", disk);

    let body = ReadyResponse {
        status: if overall_ok { "ok" } else { "error" }.into(),
        checks,
    };
    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: BTreeMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
