//! CLI argument parsing for rSolr-Exporter
//!
//! # Options
//!
//! - `--config` / `-c`: Configuration file path (default: config.yaml, env: RSOLR_CONFIG)
//! - `--port` / `-p`: Server port (env: RSOLR_PORT)
//! - `--bind-address`: Server bind address (env: RSOLR_BIND_ADDRESS)
//! - `--metrics-path`: Metrics endpoint path (env: RSOLR_METRICS_PATH)
//! - `--base-url` / `-b`: Solr base URL (env: RSOLR_BASE_URL)
//! - `--mode`: standalone or cloud (env: RSOLR_MODE)
//! - `--zk-host` / `-z`: ZooKeeper connection string (env: RSOLR_ZK_HOST)
//! - `--timeout`: Solr request timeout in milliseconds (env: RSOLR_TIMEOUT)
//! - `--username` / `--password`: Basic auth (env: RSOLR_USERNAME, RSOLR_PASSWORD)
//! - `--num-threads` / `-n`: Concurrent Solr requests per scrape (env: RSOLR_NUM_THREADS)
//! - `--validate`: Validate configuration without starting server
//! - `--dry-run`: Show enabled categories, rule counts and compiled queries
//! - `--log-level` / `-l`: Log level (env: RSOLR_LOG_LEVEL)
//! - `--log-format`: text or json (env: RSOLR_LOG_FORMAT)
//! - `--output-format`: Output format for validate/dry-run (text/json/yaml)
//!
//! # Precedence
//!
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::SolrMode;

/// rSolr-Exporter - Apache Solr metrics exporter for Prometheus
///
/// Polls Solr admin endpoints on every scrape and exposes the results in
/// Prometheus text format.
#[derive(Parser, Debug)]
#[command(name = "rsolr-exporter")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config.yaml",
        env = "RSOLR_CONFIG"
    )]
    pub config: PathBuf,

    /// Server port (overrides config file)
    #[arg(short, long, value_name = "PORT", env = "RSOLR_PORT")]
    pub port: Option<u16>,

    /// Server bind address (overrides config file)
    #[arg(long, value_name = "ADDRESS", env = "RSOLR_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Metrics endpoint path (overrides config file)
    /// Must start with '/' and not conflict with '/' or '/health'
    #[arg(long, value_name = "PATH", env = "RSOLR_METRICS_PATH")]
    pub metrics_path: Option<String>,

    /// Solr base URL, e.g. http://localhost:8983/solr (overrides config file)
    #[arg(short, long, value_name = "URL", env = "RSOLR_BASE_URL")]
    pub base_url: Option<String>,

    /// Standalone node or SolrCloud seed (overrides config file)
    #[arg(long, value_enum, env = "RSOLR_MODE")]
    pub mode: Option<SolrMode>,

    /// ZooKeeper connection string used as the cluster label (overrides config file)
    #[arg(short, long, value_name = "HOSTS", env = "RSOLR_ZK_HOST")]
    pub zk_host: Option<String>,

    /// Solr request timeout in milliseconds (overrides config file)
    #[arg(long, value_name = "MS", env = "RSOLR_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Basic auth username (overrides config file)
    #[arg(long, value_name = "USERNAME", env = "RSOLR_USERNAME")]
    pub username: Option<String>,

    /// Basic auth password (overrides config file)
    #[arg(long, value_name = "PASSWORD", env = "RSOLR_PASSWORD")]
    pub password: Option<String>,

    /// Maximum concurrent Solr requests per scrape (overrides config file)
    #[arg(short, long, value_name = "N", env = "RSOLR_NUM_THREADS")]
    pub num_threads: Option<usize>,

    /// Validate configuration without starting server
    #[arg(long)]
    pub validate: bool,

    /// Show enabled categories, rule counts and compiled queries
    #[arg(long)]
    pub dry_run: bool,

    /// Log level
    #[arg(
        short,
        long,
        value_enum,
        default_value = "info",
        env = "RSOLR_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, value_enum, default_value = "text", env = "RSOLR_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Output format for --validate and --dry-run
    #[arg(long, value_enum, default_value = "text")]
    pub output_format: OutputFormat,
}

/// Log level options
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Trace level - most verbose
    Trace,
    /// Debug level
    Debug,
    /// Info level - default
    Info,
    /// Warn level
    Warn,
    /// Error level - least verbose
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Log line format
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Output format options for validate and dry-run modes
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Yaml => write!(f, "yaml"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_display() {
        assert_eq!(LogLevel::Trace.to_string(), "trace");
        assert_eq!(LogLevel::Info.to_string(), "info");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn test_log_level_to_tracing() {
        assert_eq!(tracing::Level::from(LogLevel::Debug), tracing::Level::DEBUG);
        assert_eq!(tracing::Level::from(LogLevel::Warn), tracing::Level::WARN);
    }

    #[test]
    fn test_output_format_display() {
        assert_eq!(OutputFormat::Text.to_string(), "text");
        assert_eq!(OutputFormat::Json.to_string(), "json");
        assert_eq!(OutputFormat::Yaml.to_string(), "yaml");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["rsolr-exporter"]);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert!(cli.port.is_none());
        assert!(cli.base_url.is_none());
        assert!(cli.mode.is_none());
        assert!(!cli.validate);
        assert!(!cli.dry_run);
        assert_eq!(cli.log_level, LogLevel::Info);
        assert_eq!(cli.log_format, LogFormat::Text);
        assert_eq!(cli.output_format, OutputFormat::Text);
    }

    #[test]
    fn test_cli_short_flags() {
        let cli = Cli::parse_from([
            "rsolr-exporter",
            "-c",
            "/etc/rsolr/config.yaml",
            "-p",
            "9854",
            "-b",
            "http://solr:8983/solr",
            "-z",
            "zk1:2181",
            "-n",
            "8",
            "-l",
            "debug",
        ]);
        assert_eq!(cli.config, PathBuf::from("/etc/rsolr/config.yaml"));
        assert_eq!(cli.port, Some(9854));
        assert_eq!(cli.base_url.as_deref(), Some("http://solr:8983/solr"));
        assert_eq!(cli.zk_host.as_deref(), Some("zk1:2181"));
        assert_eq!(cli.num_threads, Some(8));
        assert_eq!(cli.log_level, LogLevel::Debug);
    }

    #[test]
    fn test_cli_mode_and_formats() {
        let cli = Cli::parse_from([
            "rsolr-exporter",
            "--mode",
            "cloud",
            "--log-format",
            "json",
            "--dry-run",
            "--output-format",
            "yaml",
        ]);
        assert_eq!(cli.mode, Some(SolrMode::Cloud));
        assert_eq!(cli.log_format, LogFormat::Json);
        assert!(cli.dry_run);
        assert_eq!(cli.output_format, OutputFormat::Yaml);
    }

    #[test]
    fn test_cli_rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["rsolr-exporter", "--mode", "cluster"]).is_err());
    }
}
