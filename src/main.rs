use anyhow::{Context, Result};
use clap::Parser;
use cloud_file_store::{
    ObjectStore,
    config::{Backend, Cli, ClientConfig, Command, ServerConfig},
    models::object::original_name,
    remote::{RemoteStorage, http::HttpRemote, memory::MemoryRemote},
    server,
};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- .env is optional ---
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            return Err(err).context("loading .env");
        }
    }

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve(args) => {
            let cfg = ServerConfig::from_env_and_args(&args)?;
            tracing::info!("Starting storage emulator with config: {:?}", redacted(&cfg));
            server::serve(cfg).await
        }
        command => {
            let cfg = ClientConfig::from_env_and_args(&cli.remote)?;
            let store = open_store(&cfg)?;
            run(store, command).await
        }
    }
}

/// Build the remote handle once; every command shares it through the façade.
fn open_store(cfg: &ClientConfig) -> Result<ObjectStore> {
    let remote: Arc<dyn RemoteStorage> = match &cfg.backend {
        Backend::Http { url, api_key } => {
            tracing::debug!("Using storage service at {}", url);
            Arc::new(HttpRemote::new(url, api_key.clone(), cfg.timeout).context("configuring storage client")?)
        }
        Backend::Memory => {
            tracing::debug!("Using in-memory bucket {}", cfg.bucket);
            Arc::new(MemoryRemote::with_bucket(cfg.bucket.clone()))
        }
    };
    Ok(ObjectStore::new(remote, cfg.bucket.clone(), cfg.timeout))
}

async fn run(store: ObjectStore, command: Command) -> Result<()> {
    match command {
        Command::Upload { path, name } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let name = name.unwrap_or_else(|| {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });
            let object = store.upload(bytes, &name).await?;
            println!("File uploaded as {}", object.key);
        }
        Command::List => {
            let objects = store.list().await.context("could not fetch files")?;
            if objects.is_empty() {
                println!("No files found.");
            }
            for object in objects {
                println!("{}\t{}\t{}", object.key, object.size, object.content_type);
            }
        }
        Command::Download { key, output } => {
            let bytes = store.download(&key).await?;
            let output = output.unwrap_or_else(|| default_output(&key));
            tokio::fs::write(&output, &bytes)
                .await
                .with_context(|| format!("writing {}", output.display()))?;
            println!("Saved {} bytes to {}", bytes.len(), output.display());
        }
        Command::Delete { key } => {
            store.delete(&key).await?;
            println!("Deleted file: {}", key);
        }
        Command::Serve(_) => anyhow::bail!("serve does not use a client"),
    }
    Ok(())
}

/// Save under the original file name, never outside the working directory.
fn default_output(key: &str) -> PathBuf {
    Path::new(original_name(key))
        .file_name()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(key.replace('/', "_")))
}

fn redacted(cfg: &ServerConfig) -> ServerConfig {
    let mut shown = cfg.clone();
    if shown.service_key.is_some() {
        shown.service_key = Some("***".into());
    }
    shown
}
