//! Configuration management for rSolr-Exporter
//!
//! Handles loading and validating configuration from YAML files, and
//! applying command-line overrides on top.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

use crate::cli::Cli;
use crate::transformer::catalog::Category;
use crate::transformer::query::{QueryScope, QuerySpec, RequestParams};

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Error reading the configuration file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Error parsing the configuration file
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Configuration validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Solr connection
    #[serde(default)]
    pub solr: SolrConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Scrape cycle tuning
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Built-in endpoint categories
    #[serde(default)]
    pub categories: CategoriesConfig,

    /// User-defined queries
    #[serde(default)]
    pub queries: Vec<QuerySpec>,
}

/// How the configured Solr URL is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SolrMode {
    /// A single Solr node
    #[default]
    Standalone,
    /// A seed node of a SolrCloud cluster
    Cloud,
}

impl std::fmt::Display for SolrMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolrMode::Standalone => write!(f, "standalone"),
            SolrMode::Cloud => write!(f, "cloud"),
        }
    }
}

/// Solr connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolrConfig {
    /// Solr base URL, e.g. `http://localhost:8983/solr`
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Standalone or cloud
    #[serde(default)]
    pub mode: SolrMode,

    /// ZooKeeper connection string, used as the cluster identity label
    #[serde(default)]
    pub zk_host: Option<String>,

    /// Optional username for basic auth
    #[serde(default)]
    pub username: Option<String>,

    /// Optional password for basic auth
    #[serde(default)]
    pub password: Option<String>,

    /// Request timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,
}

impl SolrConfig {
    /// Value of the cluster identity label
    pub fn cluster_identity(&self) -> &str {
        self.zk_host.as_deref().unwrap_or(&self.base_url)
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Metrics endpoint path
    #[serde(default = "default_metrics_path")]
    pub path: String,

    /// Server bind address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Scrape cycle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Maximum number of concurrent Solr requests per cycle
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Retries for transient request failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

/// Per-category settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoriesConfig {
    #[serde(default)]
    pub ping: CoreCategoryConfig,
    #[serde(default)]
    pub core_status: CoreCategoryConfig,
    #[serde(default)]
    pub mbeans: MBeansConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub cluster_status: ClusterStatusConfig,
    #[serde(default)]
    pub overseer_status: ToggleConfig,
    #[serde(default)]
    pub facets: FacetsConfig,
}

impl CategoriesConfig {
    /// Whether a category is scraped
    pub fn is_enabled(&self, category: Category) -> bool {
        match category {
            Category::Ping => self.ping.enable,
            Category::CoreStatus => self.core_status.enable,
            Category::MBeans => self.mbeans.enable,
            Category::Metrics => self.metrics.enable,
            Category::ClusterStatus => self.cluster_status.enable,
            Category::OverseerStatus => self.overseer_status.enable,
            Category::Facets => self.facets.enable,
        }
    }

    /// Enabled categories in scrape order
    pub fn enabled(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.is_enabled(*c))
            .collect()
    }
}

/// A category polled per core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreCategoryConfig {
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Cores to poll, all cores when empty
    #[serde(default)]
    pub cores: Vec<String>,
}

impl CoreCategoryConfig {
    /// Whether the core passes the filter
    pub fn selects(&self, core: &str) -> bool {
        self.cores.is_empty() || self.cores.iter().any(|c| c == core)
    }
}

/// MBean statistics settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MBeansConfig {
    #[serde(default)]
    pub enable: bool,

    /// Cores to poll, all cores when empty
    #[serde(default)]
    pub cores: Vec<String>,

    /// Restrict to one MBean category (`cat` parameter)
    #[serde(default)]
    pub category: Option<String>,

    /// Restrict to one MBean key (`key` parameter)
    #[serde(default)]
    pub key: Option<String>,
}

impl MBeansConfig {
    /// Whether the core passes the filter
    pub fn selects(&self, core: &str) -> bool {
        self.cores.is_empty() || self.cores.iter().any(|c| c == core)
    }
}

/// Metrics API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enable: bool,

    /// `group` parameters (jvm, node, core, jetty...)
    #[serde(default)]
    pub group: Vec<String>,

    /// `type` parameters (counter, gauge, timer...)
    #[serde(default, rename = "type")]
    pub metric_type: Vec<String>,

    /// `prefix` parameters
    #[serde(default)]
    pub prefix: Vec<String>,
}

/// CLUSTERSTATUS settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterStatusConfig {
    #[serde(default = "default_true")]
    pub enable: bool,

    /// Collections to poll one by one, the whole cluster when empty
    #[serde(default)]
    pub collections: Vec<String>,
}

/// A category with an enable flag only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToggleConfig {
    #[serde(default = "default_true")]
    pub enable: bool,
}

/// Facet settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FacetsConfig {
    #[serde(default)]
    pub enable: bool,

    #[serde(default)]
    pub queries: Vec<FacetQuery>,
}

/// One facet request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacetQuery {
    /// Collection (or core) to query
    pub collection: String,

    /// Request path
    #[serde(default = "default_facet_path")]
    pub path: String,

    /// Request parameters
    #[serde(default)]
    pub params: RequestParams,
}

// Default value functions
fn default_base_url() -> String {
    "http://localhost:8983/solr".to_string()
}

fn default_timeout() -> u64 {
    5000
}

fn default_port() -> u16 {
    9983
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_max_concurrency() -> usize {
    4
}

fn default_max_retries() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

fn default_facet_path() -> String {
    "/select".to_string()
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            mode: SolrMode::default(),
            zk_host: None,
            username: None,
            password: None,
            timeout_ms: default_timeout(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            path: default_metrics_path(),
            bind_address: default_bind_address(),
        }
    }
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
        }
    }
}

impl Default for CoreCategoryConfig {
    fn default() -> Self {
        Self {
            enable: true,
            cores: Vec::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enable: true,
            group: Vec::new(),
            metric_type: Vec::new(),
            prefix: Vec::new(),
        }
    }
}

impl Default for ClusterStatusConfig {
    fn default() -> Self {
        Self {
            enable: true,
            collections: Vec::new(),
        }
    }
}

impl Default for ToggleConfig {
    fn default() -> Self {
        Self { enable: true }
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Arguments
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed or validated
    ///
    /// # Note
    /// - If the file doesn't exist, returns `ConfigError::ReadError`
    /// - Use `Config::load_or_default()` if you want fallback to defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&contents)
    }

    /// Parse and validate configuration from a YAML string
    pub fn from_yaml(contents: &str) -> Result<Self, ConfigError> {
        // an empty file is a valid, all-defaults configuration
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Config = serde_yaml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, falling back to defaults if not found
    ///
    /// Use this for optional configuration files (e.g., when running without explicit config)
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        Self::load(path)
    }

    /// Apply command-line (and environment) overrides, then re-validate
    pub fn with_overrides(mut self, cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(port) = cli.port {
            self.server.port = port;
        }
        if let Some(bind_address) = &cli.bind_address {
            self.server.bind_address = bind_address.clone();
        }
        if let Some(path) = &cli.metrics_path {
            self.server.path = path.clone();
        }
        if let Some(base_url) = &cli.base_url {
            self.solr.base_url = base_url.clone();
        }
        if let Some(mode) = cli.mode {
            self.solr.mode = mode;
        }
        if let Some(zk_host) = &cli.zk_host {
            self.solr.zk_host = Some(zk_host.clone());
        }
        if let Some(timeout) = cli.timeout {
            self.solr.timeout_ms = timeout;
        }
        if let Some(username) = &cli.username {
            self.solr.username = Some(username.clone());
        }
        if let Some(password) = &cli.password {
            self.solr.password = Some(password.clone());
        }
        if let Some(threads) = cli.num_threads {
            self.scrape.max_concurrency = threads;
        }

        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        match Url::parse(&self.solr.base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return invalid(format!(
                    "Solr base URL must use http or https, got '{}'",
                    url.scheme()
                ))
            }
            Err(e) => return invalid(format!("Invalid Solr base URL '{}': {}", self.solr.base_url, e)),
        }

        if self.solr.timeout_ms == 0 {
            return invalid("Solr timeout must be greater than 0".to_string());
        }

        if self.solr.password.is_some() && self.solr.username.is_none() {
            return invalid("A password requires a username".to_string());
        }

        if self.server.port == 0 {
            return invalid("Server port must be greater than 0".to_string());
        }

        if !self.server.path.starts_with('/') {
            return invalid("Metrics path must start with '/'".to_string());
        }

        if self.server.path == "/" || self.server.path == "/health" {
            return invalid(format!(
                "Metrics path '{}' conflicts with a built-in route",
                self.server.path
            ));
        }

        if self.scrape.max_concurrency == 0 {
            return invalid("Scrape max_concurrency must be at least 1".to_string());
        }

        for facet in &self.categories.facets.queries {
            if facet.collection.trim().is_empty() {
                return invalid("Facet query collection cannot be empty".to_string());
            }
            if !facet.path.starts_with('/') {
                return invalid(format!(
                    "Facet query path '{}' must start with '/'",
                    facet.path
                ));
            }
        }

        // Malformed extraction expressions are rejected per query when the
        // engine compiles them; only settings that affect routing fail here.
        for query in &self.queries {
            if query.collection.is_some() && query.core.is_some() {
                return invalid(format!(
                    "Query '{}' sets both collection and core",
                    query.display_name()
                ));
            }
            if query.scope == QueryScope::Cluster && self.solr.mode == SolrMode::Standalone {
                tracing::warn!(
                    query = %query.display_name(),
                    "Cluster-scoped query in standalone mode runs against the configured node"
                );
            }
        }

        Ok(())
    }
}
