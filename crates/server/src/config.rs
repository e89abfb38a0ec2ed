use clap::Parser;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen for incoming connections on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// SQLite database file (`:memory:` for a throwaway database)
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// TLS certificate (PEM). TLS is enabled when both cert and key are set.
    #[serde(default)]
    pub tls_cert: Option<PathBuf>,

    /// TLS private key (PEM)
    #[serde(default)]
    pub tls_key: Option<PathBuf>,

    /// Text files listing the allowed API keys. Empty disables the key gate.
    #[serde(default)]
    pub keys_files: Vec<PathBuf>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Command-line flags. Anything set here overrides file and environment.
#[derive(Debug, Clone, Default, Parser)]
#[command(
    name = "measure-saver",
    version,
    about = "Receives network measurement uploads and stores them"
)]
pub struct Cli {
    /// Configuration file (toml, yaml or json)
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Address to listen for incoming connections on
    #[arg(long, value_name = "ADDR")]
    pub listen_addr: Option<String>,

    /// SQLite database file
    #[arg(long, value_name = "PATH")]
    pub database_path: Option<PathBuf>,

    /// TLS certificate file
    #[arg(long, value_name = "FILE")]
    pub tls_cert: Option<PathBuf>,

    /// TLS key file
    #[arg(long, value_name = "FILE")]
    pub tls_key: Option<PathBuf>,

    /// File containing the allowed API keys; repeat for several files
    #[arg(long = "keys-file", value_name = "FILE")]
    pub keys_files: Vec<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_path: default_database_path(),
            tls_cert: None,
            tls_key: None,
            keys_files: Vec::new(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            enable_cors: default_true(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the config file, environment variables
    /// (`MEASURE_SAVER__*`) and command-line flags, later sources winning.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => config::File::from(path.as_path()).required(true),
            None => config::File::with_name("measure-saver").required(false),
        };

        let mut builder = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("MEASURE_SAVER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("keys_files")
                    .try_parsing(true),
            )
            .set_override_option("listen_addr", cli.listen_addr.clone())?
            .set_override_option("database_path", cli.database_path.as_deref().map(path_str))?
            .set_override_option("tls_cert", cli.tls_cert.as_deref().map(path_str))?
            .set_override_option("tls_key", cli.tls_key.as_deref().map(path_str))?;

        if !cli.keys_files.is_empty() {
            let keys_files: Vec<String> = cli.keys_files.iter().map(|p| path_str(p)).collect();
            builder = builder.set_override("keys_files", keys_files)?;
        }

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.tls_paths()?;
        Ok(config)
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listen_addr.parse()?)
    }

    /// Certificate and key paths when TLS is configured.
    ///
    /// Setting only one of the two is a configuration error.
    pub fn tls_paths(&self) -> anyhow::Result<Option<(&Path, &Path)>> {
        match (&self.tls_cert, &self.tls_key) {
            (Some(cert), Some(key)) => Ok(Some((cert.as_path(), key.as_path()))),
            (None, None) => Ok(None),
            _ => anyhow::bail!("tls_cert and tls_key must be set together"),
        }
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb.saturating_mul(1024 * 1024)
    }
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}

fn default_listen_addr() -> String {
    "0.0.0.0:1323".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("measure-saver.db")
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_body_size_mb() -> usize {
    10
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}
