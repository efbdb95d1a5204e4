//! rSolr-Exporter - Apache Solr metrics exporter
//!
//! This binary provides a Prometheus-compatible metrics endpoint
//! that polls Solr admin APIs on every scrape.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tracing::info;

use rsolr_exporter::cli::{Cli, OutputFormat};
use rsolr_exporter::config::{Config, SolrMode};
use rsolr_exporter::error::{AppError, AppResult};
use rsolr_exporter::server;
use rsolr_exporter::transformer::{Category, MetricTable, QueryEngine, QueryScope};

/// Summary printed by `--dry-run`
#[derive(Debug, Serialize)]
struct DryRunReport {
    base_url: String,
    mode: SolrMode,
    listen: String,
    metrics_path: String,
    max_concurrency: usize,
    always_emitted: Vec<String>,
    categories: Vec<CategoryReport>,
    queries: Vec<QueryReport>,
    rejected_queries: Vec<RejectedReport>,
}

#[derive(Debug, Serialize)]
struct CategoryReport {
    name: Category,
    rules: usize,
}

#[derive(Debug, Serialize)]
struct QueryReport {
    name: String,
    scope: QueryScope,
    path: String,
    extractions: usize,
}

#[derive(Debug, Serialize)]
struct RejectedReport {
    name: String,
    error: String,
}

impl DryRunReport {
    fn new(config: &Config, engine: &QueryEngine) -> Self {
        Self {
            base_url: config.solr.base_url.clone(),
            mode: config.solr.mode,
            listen: format!("{}:{}", config.server.bind_address, config.server.port),
            metrics_path: config.server.path.clone(),
            max_concurrency: config.scrape.max_concurrency,
            always_emitted: MetricTable::describe().into_iter().map(|f| f.name).collect(),
            categories: config
                .categories
                .enabled()
                .into_iter()
                .map(|name| CategoryReport {
                    name,
                    rules: name.matcher().rules().len(),
                })
                .collect(),
            queries: engine
                .queries()
                .iter()
                .map(|q| QueryReport {
                    name: q.spec().display_name().to_string(),
                    scope: q.spec().scope,
                    path: q.spec().path.clone(),
                    extractions: q.extraction_count(),
                })
                .collect(),
            rejected_queries: engine
                .rejected()
                .iter()
                .map(|r| RejectedReport {
                    name: r.name.clone(),
                    error: r.error.to_string(),
                })
                .collect(),
        }
    }

    fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(self)?),
            OutputFormat::Text => {
                let mut out = String::new();
                out.push_str(&format!("Solr:        {} ({})\n", self.base_url, self.mode));
                out.push_str(&format!("Listen:      {}{}\n", self.listen, self.metrics_path));
                out.push_str(&format!("Concurrency: {}\n", self.max_concurrency));
                out.push_str(&format!("Always:      {}\n", self.always_emitted.join(", ")));
                out.push_str("Categories:\n");
                for category in &self.categories {
                    out.push_str(&format!("  - {} ({} rules)\n", category.name, category.rules));
                }
                out.push_str("Queries:\n");
                for query in &self.queries {
                    out.push_str(&format!(
                        "  - {} [{:?}] {} ({} extractions)\n",
                        query.name, query.scope, query.path, query.extractions
                    ));
                }
                for rejected in &self.rejected_queries {
                    out.push_str(&format!("  ! {} rejected: {}\n", rejected.name, rejected.error));
                }
                Ok(out)
            }
        }
    }
}

fn load_config(cli: &Cli) -> AppResult<Config> {
    let config = Config::load_or_default(&cli.config)?.with_overrides(cli)?;
    Category::validate_all()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    rsolr_exporter::init_logging(&cli.log_level.to_string(), cli.log_format)?;

    let config = load_config(&cli)?;

    if cli.validate {
        let engine = QueryEngine::compile(&config.queries);
        if let Some(rejected) = engine.into_rejected().into_iter().next() {
            return Err(AppError::InvalidQuery {
                name: rejected.name,
                source: rejected.error,
            }
            .into());
        }
        match cli.output_format {
            OutputFormat::Text => println!("Configuration is valid"),
            OutputFormat::Json => println!("{}", serde_json::json!({"valid": true})),
            OutputFormat::Yaml => println!("valid: true"),
        }
        return Ok(());
    }

    if cli.dry_run {
        let engine = QueryEngine::compile(&config.queries);
        print!("{}", DryRunReport::new(&config, &engine).render(cli.output_format)?);
        return Ok(());
    }

    info!(
        version = env!("CARGO_PKG_VERSION"),
        base_url = %config.solr.base_url,
        mode = %config.solr.mode,
        "Starting rSolr-Exporter"
    );

    server::run(config).await
}
