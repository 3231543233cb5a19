use clap::Parser;
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tinylink_storage::DEFAULT_DELETE_WORKERS;
use tinylink_telemetry::LogFormat;

pub const CONFIG_ENV: &str = "CONFIG";
pub const SERVER_ADDRESS_ENV: &str = "SERVER_ADDRESS";
pub const BASE_URL_ENV: &str = "BASE_URL";
pub const FILE_STORAGE_PATH_ENV: &str = "FILE_STORAGE_PATH";
pub const DATABASE_DSN_ENV: &str = "DATABASE_DSN";
pub const COOKIE_SECRET_ENV: &str = "COOKIE_SECRET";
pub const DELETE_WORKERS_ENV: &str = "DELETE_WORKERS";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_FILE_STORAGE_PATH: &str = "./urls.jsonl";
pub const DEFAULT_COOKIE_SECRET: &str = "tinylink-development-secret";

/// Command line flags. Every flag falls back to its environment variable.
#[derive(Debug, Default, Parser)]
#[command(name = "tinylink-gateway", about = "tinylink URL shortener HTTP gateway")]
pub struct Cli {
    /// JSON file with fallback values for every other option.
    #[arg(short = 'c', long, env = CONFIG_ENV)]
    pub config: Option<PathBuf>,

    #[arg(short = 'a', long, env = SERVER_ADDRESS_ENV)]
    pub server_address: Option<SocketAddr>,

    /// Prefix of the returned short URLs.
    #[arg(short = 'b', long, env = BASE_URL_ENV)]
    pub base_url: Option<String>,

    #[arg(short = 'f', long, env = FILE_STORAGE_PATH_ENV)]
    pub file_storage_path: Option<PathBuf>,

    /// Postgres connection string; the database tier is disabled without it.
    #[arg(short = 'd', long, env = DATABASE_DSN_ENV)]
    pub database_dsn: Option<String>,

    #[arg(long, env = COOKIE_SECRET_ENV, hide_env_values = true)]
    pub cookie_secret: Option<String>,

    /// Maximum number of delete batches running at once.
    #[arg(long, env = DELETE_WORKERS_ENV)]
    pub delete_workers: Option<usize>,

    /// `pretty` or `json`.
    #[arg(long, env = LOG_FORMAT_ENV)]
    pub log_format: Option<LogFormat>,
}

/// Contents of the optional JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server_address: Option<SocketAddr>,
    pub base_url: Option<String>,
    pub file_storage_path: Option<PathBuf>,
    pub database_dsn: Option<String>,
    pub cookie_secret: Option<String>,
    pub delete_workers: Option<usize>,
    pub log_format: Option<LogFormat>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolved gateway configuration.
///
/// Precedence is flag, then environment variable, then config file, then
/// the built-in default.
#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: SocketAddr,
    pub base_url: String,
    pub file_storage_path: PathBuf,
    pub database_dsn: Option<String>,
    pub cookie_secret: String,
    pub delete_workers: usize,
    pub log_format: LogFormat,
}

impl Config {
    /// Reads the config file named by `cli`, if any, and merges it.
    pub fn load(cli: Cli) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(cli, file))
    }

    pub fn merge(cli: Cli, file: FileConfig) -> Self {
        Self {
            server_address: cli
                .server_address
                .or(file.server_address)
                .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_SERVER_PORT))),
            base_url: cli
                .base_url
                .or(file.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            file_storage_path: cli
                .file_storage_path
                .or(file.file_storage_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_FILE_STORAGE_PATH)),
            // An empty DSN, e.g. `DATABASE_DSN=`, disables the database tier.
            database_dsn: cli
                .database_dsn
                .or(file.database_dsn)
                .filter(|dsn| !dsn.trim().is_empty()),
            cookie_secret: cli
                .cookie_secret
                .or(file.cookie_secret)
                .unwrap_or_else(|| DEFAULT_COOKIE_SECRET.to_string()),
            delete_workers: cli
                .delete_workers
                .or(file.delete_workers)
                .unwrap_or(DEFAULT_DELETE_WORKERS),
            log_format: cli.log_format.or(file.log_format).unwrap_or_default(),
        }
    }

    pub fn uses_default_cookie_secret(&self) -> bool {
        self.cookie_secret == DEFAULT_COOKIE_SECRET
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::merge(Cli::default(), FileConfig::default());

        assert_eq!(config.server_address.to_string(), "127.0.0.1:8080");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.file_storage_path, PathBuf::from("./urls.jsonl"));
        assert_eq!(config.database_dsn, None);
        assert_eq!(config.delete_workers, DEFAULT_DELETE_WORKERS);
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.uses_default_cookie_secret());
    }

    #[test]
    fn flags_override_file() {
        let cli = Cli {
            base_url: Some("https://tiny.example".to_string()),
            ..Default::default()
        };
        let file = FileConfig {
            base_url: Some("https://file.example".to_string()),
            delete_workers: Some(8),
            ..Default::default()
        };

        let config = Config::merge(cli, file);
        assert_eq!(config.base_url, "https://tiny.example");
        assert_eq!(config.delete_workers, 8);
    }

    #[test]
    fn empty_dsn_disables_database() {
        let cli = Cli {
            database_dsn: Some("  ".to_string()),
            ..Default::default()
        };
        assert_eq!(Config::merge(cli, FileConfig::default()).database_dsn, None);
    }

    #[test]
    fn parses_flags() {
        let cli = Cli::try_parse_from([
            "gateway",
            "-a",
            "0.0.0.0:9000",
            "-b",
            "https://tiny.example",
            "-f",
            "/tmp/urls.jsonl",
            "-d",
            "postgres://localhost/tinylink",
            "--log-format",
            "json",
        ])
        .unwrap();

        let config = Config::merge(cli, FileConfig::default());
        assert_eq!(config.server_address.port(), 9000);
        assert_eq!(config.base_url, "https://tiny.example");
        assert_eq!(config.file_storage_path, PathBuf::from("/tmp/urls.jsonl"));
        assert_eq!(
            config.database_dsn.as_deref(),
            Some("postgres://localhost/tinylink")
        );
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn loads_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"server_address":"127.0.0.1:9090","base_url":"https://json.example","log_format":"json"}}"#
        )
        .unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        let config = Config::load(cli).unwrap();
        assert_eq!(config.server_address.port(), 9090);
        assert_eq!(config.base_url, "https://json.example");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn malformed_json_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();

        let cli = Cli {
            config: Some(file.path().to_path_buf()),
            ..Default::default()
        };
        assert!(matches!(Config::load(cli), Err(ConfigError::Parse { .. })));
    }
}
