//! Local storage emulator: wiring of SQLite, the payload directory and the
//! HTTP router.

use crate::{config::ServerConfig, routes, services::storage_service::StorageService};
use anyhow::{Context, Result};
use axum::Router;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
};
use std::{io::ErrorKind, path::Path, str::FromStr, sync::Arc};
use tokio::{fs, net::TcpListener};

const INIT_MIGRATION: &str = include_str!("../migrations/0001_init.sql");

/// State shared by every emulator handler.
#[derive(Clone)]
pub struct AppState {
    pub storage: StorageService,

    /// When set, object and bucket routes require this key.
    pub service_key: Option<String>,
}

/// Open (creating if needed) the SQLite database at `database_url`.
pub async fn connect(database_url: &str) -> Result<Arc<SqlitePool>> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("parsing database url `{}`", database_url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    if let Some(parent) = Path::new(options.get_filename()).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .with_context(|| format!("connecting to {}", database_url))?;
    Ok(Arc::new(pool))
}

/// Apply the embedded schema. Every statement is idempotent.
pub async fn run_migrations(db: &SqlitePool) -> Result<()> {
    let statements = INIT_MIGRATION
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();

    tracing::info!("Running {} migration statements...", statements.len());

    for stmt in statements {
        tracing::debug!("Executing migration SQL: {}", stmt);
        sqlx::query(stmt).execute(db).await?;
    }

    Ok(())
}

/// Prepare storage (directory, database, schema, buckets) and return the
/// router with state attached.
pub async fn build_app(cfg: &ServerConfig) -> Result<Router> {
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir).await?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let db = connect(&cfg.database_url).await?;
    run_migrations(&db).await?;

    let storage = StorageService::new(db, cfg.storage_dir.clone());
    for bucket in &cfg.buckets {
        storage
            .ensure_bucket(bucket)
            .await
            .with_context(|| format!("preparing bucket `{}`", bucket))?;
        tracing::info!("Bucket `{}` ready", bucket);
    }

    let state = AppState {
        storage,
        service_key: cfg.service_key.clone(),
    };
    Ok(routes::routes::routes().with_state(state))
}

/// Bind `cfg.addr()` and serve until the process is stopped.
pub async fn serve(cfg: ServerConfig) -> Result<()> {
    let app = build_app(&cfg).await?;

    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Storage emulator listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
