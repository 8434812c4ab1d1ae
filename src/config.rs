use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::{env, path::PathBuf, time::Duration};

pub const DEFAULT_BUCKET: &str = "uploads";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Command-line interface. Flags override environment variables.
#[derive(Parser, Debug)]
#[command(author, version, about = "Upload, list, download and delete files in a cloud storage bucket")]
pub struct Cli {
    #[command(flatten)]
    pub remote: RemoteArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Flags shared by every client command.
#[derive(Args, Debug, Default)]
pub struct RemoteArgs {
    /// Storage service URL (overrides SUPABASE_URL)
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// Service key (overrides SUPABASE_KEY)
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Bucket to operate on (overrides STORAGE_BUCKET)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Per-request timeout in seconds (overrides STORAGE_TIMEOUT_SECS)
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Use a throwaway in-memory bucket instead of the remote service
    #[arg(long, global = true)]
    pub memory: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file under a freshly generated key
    Upload {
        path: PathBuf,
        /// Name to store instead of the file's own name
        #[arg(long)]
        name: Option<String>,
    },
    /// List every object in the bucket
    List,
    /// Download an object
    Download {
        key: String,
        /// Destination file (defaults to the original file name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Delete an object; deleting a missing key succeeds
    Delete { key: String },
    /// Run the local storage emulator
    Serve(ServeArgs),
}

#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Host to bind to (overrides FILE_STORE_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides FILE_STORE_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where objects are stored (overrides FILE_STORE_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides FILE_STORE_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Key clients must present (overrides FILE_STORE_SERVICE_KEY)
    #[arg(long)]
    pub service_key: Option<String>,

    /// Buckets to create at startup; repeatable (overrides FILE_STORE_BUCKETS)
    #[arg(long = "bucket-name")]
    pub buckets: Vec<String>,
}

/// Where the façade sends its requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    Http { url: String, api_key: String },
    Memory,
}

/// Settings of the client side: which service, which bucket, how long to wait.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub backend: Backend,
    pub bucket: String,
    pub timeout: Duration,
}

/// Settings of the local storage emulator.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: String,
    pub database_url: String,
    pub service_key: Option<String>,
    pub buckets: Vec<String>,
}

fn process_env(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl ClientConfig {
    /// Merge CLI flags over the process environment.
    pub fn from_env_and_args(args: &RemoteArgs) -> Result<Self> {
        Self::resolve(args, process_env)
    }

    /// Merge CLI flags over variables looked up through `var`.
    pub fn resolve(cli: &RemoteArgs, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let bucket = cli
            .bucket
            .clone()
            .or_else(|| var("STORAGE_BUCKET"))
            .unwrap_or_else(|| DEFAULT_BUCKET.into());

        let timeout_secs = match cli.timeout_secs {
            Some(secs) => secs,
            None => match var("STORAGE_TIMEOUT_SECS") {
                Some(value) => value
                    .parse::<u64>()
                    .with_context(|| format!("parsing STORAGE_TIMEOUT_SECS value `{}`", value))?,
                None => DEFAULT_TIMEOUT_SECS,
            },
        };
        if timeout_secs == 0 {
            bail!("timeout must be at least one second");
        }

        let backend = if cli.memory {
            Backend::Memory
        } else {
            let url = cli
                .url
                .clone()
                .or_else(|| var("SUPABASE_URL"))
                .context("SUPABASE_URL is not set (or pass --url)")?;
            let api_key = cli
                .key
                .clone()
                .or_else(|| var("SUPABASE_KEY"))
                .context("SUPABASE_KEY is not set (or pass --key)")?;
            Backend::Http { url, api_key }
        };

        Ok(Self {
            backend,
            bucket,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

impl ServerConfig {
    /// Merge `serve` flags over the process environment.
    pub fn from_env_and_args(args: &ServeArgs) -> Result<Self> {
        Self::resolve(args, process_env)
    }

    pub fn resolve(args: &ServeArgs, var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_port = match var("FILE_STORE_PORT") {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing FILE_STORE_PORT value `{}`", value))?,
            None => 54321,
        };

        let buckets = if args.buckets.is_empty() {
            var("FILE_STORE_BUCKETS")
                .map(|raw| {
                    raw.split(',')
                        .map(str::trim)
                        .filter(|b| !b.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_else(|| vec![DEFAULT_BUCKET.to_string()])
        } else {
            args.buckets.clone()
        };

        Ok(Self {
            host: args
                .host
                .clone()
                .or_else(|| var("FILE_STORE_HOST"))
                .unwrap_or_else(|| "0.0.0.0".into()),
            port: args.port.unwrap_or(env_port),
            storage_dir: args
                .storage_dir
                .clone()
                .or_else(|| var("FILE_STORE_STORAGE_DIR"))
                .unwrap_or_else(|| "./data/objects".into()),
            database_url: args
                .database_url
                .clone()
                .or_else(|| var("FILE_STORE_DATABASE_URL"))
                .unwrap_or_else(|| "sqlite://./data/meta/file_store.db".into()),
            service_key: args
                .service_key
                .clone()
                .or_else(|| var("FILE_STORE_SERVICE_KEY")),
            buckets,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn cli(args: &[&str]) -> RemoteArgs {
        Cli::try_parse_from(std::iter::once("cloud-file-store").chain(args.iter().copied()))
            .unwrap()
            .remote
    }

    #[test]
    fn client_reads_environment_with_defaults() {
        let cfg = ClientConfig::resolve(
            &cli(&["list"]),
            lookup(&[("SUPABASE_URL", "https://x.supabase.co"), ("SUPABASE_KEY", "k")]),
        )
        .unwrap();
        assert_eq!(
            cfg.backend,
            Backend::Http {
                url: "https://x.supabase.co".into(),
                api_key: "k".into()
            }
        );
        assert_eq!(cfg.bucket, DEFAULT_BUCKET);
        assert_eq!(cfg.timeout, Duration::from_secs(30));
    }

    #[test]
    fn flags_override_environment() {
        let cfg = ClientConfig::resolve(
            &cli(&["--bucket", "docs", "--timeout-secs", "3", "--url", "http://localhost:54321", "list"]),
            lookup(&[
                ("SUPABASE_URL", "https://x.supabase.co"),
                ("SUPABASE_KEY", "k"),
                ("STORAGE_BUCKET", "other"),
                ("STORAGE_TIMEOUT_SECS", "10"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.bucket, "docs");
        assert_eq!(cfg.timeout, Duration::from_secs(3));
        assert!(matches!(cfg.backend, Backend::Http { ref url, .. } if url == "http://localhost:54321"));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let err = ClientConfig::resolve(&cli(&["list"]), lookup(&[("SUPABASE_URL", "u")])).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_KEY"));
    }

    #[test]
    fn memory_backend_needs_no_credentials() {
        let cfg = ClientConfig::resolve(&cli(&["--memory", "list"]), lookup(&[])).unwrap();
        assert_eq!(cfg.backend, Backend::Memory);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let env = lookup(&[("STORAGE_TIMEOUT_SECS", "soon")]);
        assert!(ClientConfig::resolve(&cli(&["--memory", "list"]), env).is_err());
        assert!(ClientConfig::resolve(&cli(&["--memory", "--timeout-secs", "0", "list"]), lookup(&[])).is_err());
    }

    #[test]
    fn server_defaults_and_bucket_list() {
        let cfg = ServerConfig::resolve(&ServeArgs::default(), lookup(&[])).unwrap();
        assert_eq!(cfg.addr(), "0.0.0.0:54321");
        assert_eq!(cfg.buckets, vec!["uploads".to_string()]);
        assert!(cfg.service_key.is_none());

        let cfg = ServerConfig::resolve(
            &ServeArgs {
                port: Some(9000),
                ..ServeArgs::default()
            },
            lookup(&[("FILE_STORE_BUCKETS", "a, b,,c"), ("FILE_STORE_PORT", "1")]),
        )
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.buckets, vec!["a", "b", "c"]);
    }

    #[test]
    fn server_rejects_bad_port() {
        let err = ServerConfig::resolve(&ServeArgs::default(), lookup(&[("FILE_STORE_PORT", "http")]))
            .unwrap_err();
        assert!(err.to_string().contains("FILE_STORE_PORT"));
    }
}
