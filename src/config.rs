use crate::models::credentials::Credentials;
use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use reqwest::Url;
use std::{env, fmt};

/// Which object store backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreKind {
    /// Durable files beneath `storage_dir/bucket`.
    Disk,
    /// Process-local map; contents are lost on restart.
    Memory,
    /// Google Cloud Storage bucket named by `bucket`.
    Gcs,
}

/// Service-account style credential payload for the bucket store. Kept
/// opaque and never printed.
#[derive(Clone)]
pub struct StoreCredentials(String);

impl StoreCredentials {
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreCredentials([REDACTED])")
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments; built once at startup
/// and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreKind,
    /// Bucket name; the disk store uses it as a directory name. Required for
    /// the disk and gcs stores.
    pub bucket: Option<String>,
    pub storage_dir: String,
    /// Credential payload for the gcs store. `None` falls back to the
    /// ambient Google credentials of the host.
    pub store_credentials: Option<StoreCredentials>,
    /// Upstream base URL. `None` disables origin fallback.
    pub upstream: Option<Url>,
    /// Basic-Auth users. `None` disables authentication.
    pub credentials: Option<Credentials>,
    pub debug: bool,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug, Default)]
#[command(author, version, about = "Read-through caching proxy for package artifacts")]
pub struct Args {
    /// Host to bind to (overrides PROXY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides PROXY_STORE)
    #[arg(long, value_enum)]
    pub store: Option<StoreKind>,

    /// Bucket holding cached objects (overrides BUCKET)
    #[arg(long)]
    pub bucket: Option<String>,

    /// Directory holding bucket directories (overrides PROXY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Service-account JSON for the gcs store (overrides STORE_CREDENTIALS)
    #[arg(long)]
    pub store_credentials: Option<String>,

    /// Upstream base URL used on cache misses (overrides UPSTREAM)
    #[arg(long)]
    pub upstream: Option<String>,

    /// Enable debug logging (same as DEBUG=1)
    #[arg(long)]
    pub debug: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::resolve(Args::parse(), |key| env::var(key))
    }

    /// Merge `args` over the variables returned by `lookup`.
    pub fn resolve<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let var = |key: &str| -> Result<Option<String>> {
            match lookup(key) {
                Ok(value) if value.trim().is_empty() => Ok(None),
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", key)),
            }
        };

        // --- Environment fallback ---
        let env_host = var("PROXY_HOST")?.unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match var("PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            None => 8080,
        };
        let env_store = match var("PROXY_STORE")? {
            Some(value) => StoreKind::from_str(&value, true)
                .map_err(|err| anyhow::anyhow!("parsing PROXY_STORE value `{}`: {}", value, err))?,
            None => StoreKind::Disk,
        };
        let env_storage = var("PROXY_STORAGE_DIR")?.unwrap_or_else(|| "./data/objects".into());
        let env_debug = var("DEBUG")?.map(|v| is_truthy(&v)).unwrap_or(false);

        let credentials = match var("BASICAUTH")? {
            Some(raw) => Credentials::parse(&raw).context("parsing BASICAUTH")?,
            None => None,
        };

        // --- Merge ---
        let store = args.store.unwrap_or(env_store);
        let bucket = args.bucket.or(var("BUCKET")?);
        if matches!(store, StoreKind::Disk | StoreKind::Gcs) && bucket.is_none() {
            bail!("BUCKET (or --bucket) must be set for the {:?} store", store);
        }
        let store_credentials = args
            .store_credentials
            .or(var("STORE_CREDENTIALS")?)
            .map(StoreCredentials::new);

        let upstream = match args.upstream.or(var("UPSTREAM")?) {
            Some(raw) => {
                let url = Url::parse(&raw)
                    .with_context(|| format!("parsing UPSTREAM value `{}`", raw))?;
                if url.cannot_be_a_base() {
                    bail!("UPSTREAM value `{}` cannot carry object paths", raw);
                }
                Some(url)
            }
            None => None,
        };

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            store,
            bucket,
            storage_dir: args.storage_dir.unwrap_or(env_storage),
            store_credentials,
            upstream,
            credentials,
            debug: args.debug || env_debug,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
