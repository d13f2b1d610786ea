use anyhow::{Context, Result};
use clap::Parser;
use std::env;
use std::str::FromStr;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root directory holding one subdirectory per conversion batch.
    pub upload_dir: String,
    /// Base URL clients use to fetch artifacts. Defaults to localhost:port.
    pub public_base_url: Option<String>,
    /// Seconds a batch directory may live before the sweeper deletes it.
    pub retention_secs: u64,
    /// Seconds between retention sweeps.
    pub sweep_interval_secs: u64,
    /// Upper bound on per-image transforms running at once, across batches.
    pub max_concurrent_transforms: usize,
    /// Seconds a single image transform may take before it is abandoned.
    pub transform_timeout_secs: u64,
    /// Multipart body size cap in bytes.
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Batch image conversion API")]
pub struct Args {
    /// Host to bind to (overrides IMAGE_CONVERTER_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides IMAGE_CONVERTER_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Directory where converted batches are stored (overrides IMAGE_CONVERTER_UPLOAD_DIR)
    #[arg(long)]
    pub upload_dir: Option<String>,

    /// Public base URL for artifact links (overrides IMAGE_CONVERTER_PUBLIC_BASE_URL)
    #[arg(long)]
    pub public_base_url: Option<String>,

    /// Batch retention in seconds (overrides IMAGE_CONVERTER_RETENTION_SECS)
    #[arg(long)]
    pub retention_secs: Option<u64>,

    /// Sweep period in seconds (overrides IMAGE_CONVERTER_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    pub sweep_interval_secs: Option<u64>,

    /// Concurrent transform limit (overrides IMAGE_CONVERTER_MAX_CONCURRENT_TRANSFORMS)
    #[arg(long)]
    pub max_concurrent_transforms: Option<usize>,

    /// Per-image transform timeout in seconds (overrides IMAGE_CONVERTER_TRANSFORM_TIMEOUT_SECS)
    #[arg(long)]
    pub transform_timeout_secs: Option<u64>,

    /// Multipart body size cap in bytes (overrides IMAGE_CONVERTER_MAX_UPLOAD_BYTES)
    #[arg(long)]
    pub max_upload_bytes: Option<usize>,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig.
    pub fn from_env_and_args() -> Result<Self> {
        Self::from_args(Args::parse())
    }

    fn from_args(args: Args) -> Result<Self> {
        let env_host = env::var("IMAGE_CONVERTER_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_public_base_url = env::var("IMAGE_CONVERTER_PUBLIC_BASE_URL").ok();

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port: merge(args.port, "IMAGE_CONVERTER_PORT")?.unwrap_or(3001),
            upload_dir: args.upload_dir.unwrap_or_else(|| {
                env::var("IMAGE_CONVERTER_UPLOAD_DIR").unwrap_or_else(|_| "./data/uploads".into())
            }),
            public_base_url: args.public_base_url.or(env_public_base_url),
            retention_secs: merge(args.retention_secs, "IMAGE_CONVERTER_RETENTION_SECS")?
                .unwrap_or(3600),
            sweep_interval_secs: merge(
                args.sweep_interval_secs,
                "IMAGE_CONVERTER_SWEEP_INTERVAL_SECS",
            )?
            .unwrap_or(86_400),
            max_concurrent_transforms: merge(
                args.max_concurrent_transforms,
                "IMAGE_CONVERTER_MAX_CONCURRENT_TRANSFORMS",
            )?
            .unwrap_or(8),
            transform_timeout_secs: merge(
                args.transform_timeout_secs,
                "IMAGE_CONVERTER_TRANSFORM_TIMEOUT_SECS",
            )?
            .unwrap_or(30),
            max_upload_bytes: merge(args.max_upload_bytes, "IMAGE_CONVERTER_MAX_UPLOAD_BYTES")?
                .unwrap_or(100 * 1024 * 1024),
        };

        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL used when building artifact retrieval links.
    pub fn public_base_url(&self) -> String {
        self.public_base_url
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", self.port))
    }
}

/// CLI value wins; otherwise parse the environment variable if present.
fn merge<T>(cli: Option<T>, env_name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if cli.is_some() {
        return Ok(cli);
    }
    match env::var(env_name) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("parsing {} value `{}`", env_name, value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(err) => Err(err).with_context(|| format!("reading {}", env_name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_args() -> Args {
        Args {
            host: None,
            port: None,
            upload_dir: None,
            public_base_url: None,
            retention_secs: None,
            sweep_interval_secs: None,
            max_concurrent_transforms: None,
            transform_timeout_secs: None,
            max_upload_bytes: None,
        }
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let cfg = AppConfig::from_args(no_args()).unwrap();
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.retention_secs, 3600);
        assert_eq!(cfg.sweep_interval_secs, 86_400);
        assert_eq!(cfg.public_base_url(), "http://localhost:3001");
    }

    #[test]
    fn cli_args_override_defaults() {
        let cfg = AppConfig::from_args(Args {
            port: Some(8080),
            public_base_url: Some("https://img.example.com".into()),
            ..no_args()
        })
        .unwrap();
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.addr(), "0.0.0.0:8080");
        assert_eq!(cfg.public_base_url(), "https://img.example.com");
    }
}
