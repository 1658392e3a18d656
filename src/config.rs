//! Layered configuration: built-in defaults, then an optional TOML config
//! file, then `S3EMU_*` environment variables, then CLI flags — each layer
//! overriding the previous.

use clap::Parser;
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{0}")]
    Validation(String),
}

/// TLS certificate/key pair. When absent, the server falls back to a
/// self-signed certificate generated at startup (see [`crate::tls`]).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
}

/// One `--configure-bucket` group: a bucket to create at startup plus the
/// subresource config documents to install on it.
#[derive(Debug, Clone)]
pub struct BucketPreconfig {
    pub name: String,
    pub config_files: Vec<PathBuf>,
}

/// Fully resolved server configuration, after merging all layers.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub data_dir: PathBuf,
    pub address: IpAddr,
    pub port: u16,
    pub silent: bool,
    pub tls: TlsConfig,
    pub service_endpoint: String,
    pub allow_mismatched_signatures: bool,
    pub vhost_buckets_enabled: bool,
    pub configure_buckets: Vec<BucketPreconfig>,
}

impl ServerOptions {
    pub fn listen_addr(&self) -> std::net::SocketAddr {
        std::net::SocketAddr::new(self.address, self.port)
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.cert_path.is_some() && self.tls.key_path.is_some()
    }
}

/// On-disk config file layer (TOML). Every field is optional; only present
/// fields override the built-in defaults.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    data_dir: Option<PathBuf>,
    address: Option<String>,
    port: Option<u16>,
    silent: Option<bool>,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
    service_endpoint: Option<String>,
    allow_mismatched_signatures: Option<bool>,
    no_vhost_buckets: Option<bool>,
}

impl FileConfig {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
    env_var(name).map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "yes"))
}

/// Raw CLI surface, parsed with clap. Merged on top of the file/env layers
/// in [`ServerOptions::load`].
#[derive(Debug, Parser)]
#[command(name = "s3emu", version, about = "Local S3 API emulator")]
pub struct Cli {
    /// Directory to use as the emulator's storage root.
    #[arg(short = 'd', long = "directory")]
    pub directory: Option<PathBuf>,

    /// Address to bind the HTTP(S) listener to.
    #[arg(short = 'a', long = "address")]
    pub address: Option<String>,

    /// Port to bind the HTTP(S) listener to.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Suppress the startup banner and per-request access logging.
    #[arg(short = 's', long = "silent")]
    pub silent: bool,

    /// Private key for TLS termination (requires --cert).
    #[arg(long = "key")]
    pub key: Option<PathBuf>,

    /// Certificate for TLS termination (requires --key).
    #[arg(long = "cert")]
    pub cert: Option<PathBuf>,

    /// Domain suffix used to recognize virtual-hosted-style addressing, e.g.
    /// `bucket.s3.<service-endpoint>`.
    #[arg(long = "service-endpoint")]
    pub service_endpoint: Option<String>,

    /// Accept a well-formed but incorrect SigV4 signature as the fixed
    /// account instead of rejecting it. Intended for test harnesses only.
    #[arg(long = "allow-mismatched-signatures")]
    pub allow_mismatched_signatures: bool,

    /// Disable virtual-hosted-style bucket addressing; only path-style
    /// requests are recognized.
    #[arg(long = "no-vhost-buckets")]
    pub no_vhost_buckets: bool,

    /// Optional TOML config file, layered beneath environment variables and
    /// the flags above.
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Pre-create a bucket at startup and install subresource configs on it.
    /// Repeatable: `--configure-bucket NAME [CONFIG.XML...]`. Each config
    /// file's root XML element selects which subresource it installs
    /// (CORSConfiguration / WebsiteConfiguration / Tagging).
    #[arg(
        long = "configure-bucket",
        num_args = 1..,
        action = clap::ArgAction::Append,
        value_name = "NAME [CONFIG.XML...]"
    )]
    pub configure_bucket: Vec<Vec<String>>,
}

impl ServerOptions {
    /// Merge defaults, the config file, environment variables, and CLI
    /// flags, in that order, into a single resolved configuration.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match cli.config.as_deref() {
            Some(path) => FileConfig::from_path(path)?,
            None => FileConfig::default(),
        };

        let data_dir = cli
            .directory
            .clone()
            .or_else(|| env_var("S3EMU_DATA_DIR").map(PathBuf::from))
            .or(file.data_dir)
            .ok_or_else(|| {
                ConfigError::Validation(
                    "a storage directory is required (-d/--directory)".to_string(),
                )
            })?;

        let address_str = cli
            .address
            .clone()
            .or_else(|| env_var("S3EMU_ADDRESS"))
            .or(file.address)
            .unwrap_or_else(|| "0.0.0.0".to_string());
        let address: IpAddr = address_str
            .parse()
            .map_err(|_| ConfigError::Validation(format!("invalid address: {address_str}")))?;

        let port = cli
            .port
            .or_else(|| env_var("S3EMU_PORT").and_then(|v| v.parse().ok()))
            .or(file.port)
            .unwrap_or(4568);

        let silent = cli.silent
            || env_bool("S3EMU_SILENT").unwrap_or(false)
            || file.silent.unwrap_or(false);

        let cert_path = cli
            .cert
            .clone()
            .or_else(|| env_var("S3EMU_CERT").map(PathBuf::from))
            .or(file.cert);
        let key_path = cli
            .key
            .clone()
            .or_else(|| env_var("S3EMU_KEY").map(PathBuf::from))
            .or(file.key);
        if cert_path.is_some() != key_path.is_some() {
            return Err(ConfigError::Validation(
                "--cert and --key must be provided together".to_string(),
            ));
        }

        let service_endpoint = cli
            .service_endpoint
            .clone()
            .or_else(|| env_var("S3EMU_SERVICE_ENDPOINT"))
            .or(file.service_endpoint)
            .unwrap_or_else(|| "amazonaws.com".to_string());

        let allow_mismatched_signatures = cli.allow_mismatched_signatures
            || env_bool("S3EMU_ALLOW_MISMATCHED_SIGNATURES").unwrap_or(false)
            || file.allow_mismatched_signatures.unwrap_or(false);

        let no_vhost_buckets = cli.no_vhost_buckets
            || env_bool("S3EMU_NO_VHOST_BUCKETS").unwrap_or(false)
            || file.no_vhost_buckets.unwrap_or(false);

        let mut configure_buckets = Vec::new();
        for group in &cli.configure_bucket {
            let mut iter = group.iter();
            let name = iter.next().cloned().ok_or_else(|| {
                ConfigError::Validation("--configure-bucket requires a bucket name".to_string())
            })?;
            let config_files = iter.map(PathBuf::from).collect();
            configure_buckets.push(BucketPreconfig { name, config_files });
        }

        Ok(ServerOptions {
            data_dir,
            address,
            port,
            silent,
            tls: TlsConfig {
                cert_path,
                key_path,
            },
            service_endpoint,
            allow_mismatched_signatures,
            vhost_buckets_enabled: !no_vhost_buckets,
            configure_buckets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["s3emu"];
        argv.extend_from_slice(args);
        Cli::parse_from(argv)
    }

    #[test]
    fn requires_directory() {
        let err = ServerOptions::load(cli(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn defaults_applied_when_only_directory_given() {
        let opts = ServerOptions::load(cli(&["-d", "/tmp/s3emu-test"])).unwrap();
        assert_eq!(opts.port, 4568);
        assert_eq!(opts.service_endpoint, "amazonaws.com");
        assert!(opts.vhost_buckets_enabled);
        assert!(!opts.tls_enabled());
    }

    #[test]
    fn no_vhost_buckets_flag_disables_vhost() {
        let opts = ServerOptions::load(cli(&["-d", "/tmp/x", "--no-vhost-buckets"])).unwrap();
        assert!(!opts.vhost_buckets_enabled);
    }

    #[test]
    fn cert_without_key_is_rejected() {
        let err = ServerOptions::load(cli(&["-d", "/tmp/x", "--cert", "a.pem"])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn configure_bucket_groups_name_and_files() {
        let opts = ServerOptions::load(cli(&[
            "-d",
            "/tmp/x",
            "--configure-bucket",
            "bucket-a",
            "cors.xml",
            "website.xml",
            "--configure-bucket",
            "bucket-b",
        ]))
        .unwrap();
        assert_eq!(opts.configure_buckets.len(), 2);
        assert_eq!(opts.configure_buckets[0].name, "bucket-a");
        assert_eq!(opts.configure_buckets[0].config_files.len(), 2);
        assert_eq!(opts.configure_buckets[1].name, "bucket-b");
        assert!(opts.configure_buckets[1].config_files.is_empty());
    }
}
