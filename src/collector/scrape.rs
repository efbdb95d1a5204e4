//! 수집 사이클 오케스트레이션
//!
//! 각 엔드포인트 요청은 독립된 작업으로 `JoinSet`에서 실행되며 동시 실행
//! 수는 `Semaphore`로 제한됩니다. 작업마다 자신의 `MetricTable`을 반환하고,
//! 모든 작업이 끝난 뒤 호출한 태스크에서 한 번에 병합합니다.

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::client::{RetryConfig, SolrClient};
use super::parser::{extract_core_names, extract_overseer_leader, normalize_named_lists, CollectResult};
use crate::config::{CategoriesConfig, Config, FacetQuery, SolrMode};
use crate::transformer::{
    Category, FixedLabels, MetricFamily, MetricTable, QueryContext, QueryEngine, QueryScope,
};

/// 작업 간 공유되는 불변 상태
struct Shared {
    seed: SolrClient,
    mode: SolrMode,
    cluster_identity: String,
    categories: CategoriesConfig,
    queries: QueryEngine,
    retry: RetryConfig,
}

impl Shared {
    /// 클러스터 단위 응답의 식별 레이블
    ///
    /// 클라우드 모드는 `zk_host`, 단독 모드는 seed 노드의 `base_url`입니다.
    fn cluster_labels(&self) -> FixedLabels {
        match self.mode {
            SolrMode::Cloud => FixedLabels::new().with("zk_host", self.cluster_identity.clone()),
            SolrMode::Standalone => node_labels(&self.seed),
        }
    }

    fn cluster_context(&self) -> QueryContext {
        match self.mode {
            SolrMode::Cloud => QueryContext::cluster(self.cluster_identity.clone()),
            SolrMode::Standalone => QueryContext::node(self.seed.base_url()),
        }
    }

    /// 코어 목록이 필요한지 여부
    fn needs_cores(&self) -> bool {
        self.categories.ping.enable
            || self.categories.mbeans.enable
            || self
                .queries
                .queries()
                .iter()
                .any(|q| q.spec().scope == QueryScope::EachCore)
    }
}

fn node_labels(node: &SolrClient) -> FixedLabels {
    FixedLabels::new().with("base_url", node.base_url())
}

/// 응답 하나를 카테고리 규칙으로 변환
fn transform(category: Category, mut response: Value, fixed: &FixedLabels, table: &mut MetricTable) {
    let normalized = normalize_named_lists(&mut response, category.named_list_paths());
    let added = category.matcher().transform(&response, fixed, table);
    debug!(category = %category, normalized, samples = added, "Response transformed");
}

/// 노드 하나의 코어 목록 조회 결과
struct NodeInventory {
    node: SolrClient,
    cores: Vec<String>,
    table: MetricTable,
}

/// 수집 작업 단위
///
/// 요청 하나와 그 응답의 변환을 나타냅니다.
enum ScrapeJob {
    Ping { node: SolrClient, core: String },
    MBeans { node: SolrClient, core: String },
    Metrics { node: SolrClient },
    ClusterStatus { collection: Option<String> },
    OverseerStatus,
    Facet { query: FacetQuery },
    Query {
        node: SolrClient,
        index: usize,
        target: Option<String>,
        context: QueryContext,
    },
}

impl ScrapeJob {
    fn name(&self) -> String {
        match self {
            ScrapeJob::Ping { core, .. } => format!("ping:{}", core),
            ScrapeJob::MBeans { core, .. } => format!("mbeans:{}", core),
            ScrapeJob::Metrics { node } => format!("metrics:{}", node.base_url()),
            ScrapeJob::ClusterStatus { collection } => match collection {
                Some(collection) => format!("cluster_status:{}", collection),
                None => "cluster_status".to_string(),
            },
            ScrapeJob::OverseerStatus => "overseer_status".to_string(),
            ScrapeJob::Facet { query } => format!("facets:{}", query.collection),
            ScrapeJob::Query { index, .. } => format!("query:{}", index),
        }
    }

    /// 작업 실행
    ///
    /// 실패는 여기서 기록되고 빈 테이블이 반환되므로 다른 작업에 영향을 주지
    /// 않습니다.
    async fn run(self, shared: Arc<Shared>) -> MetricTable {
        let name = self.name();
        let started = Instant::now();

        match self.execute(&shared).await {
            Ok(table) => {
                debug!(
                    job = %name,
                    samples = table.sample_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Scrape job finished"
                );
                table
            }
            Err(e) => {
                warn!(job = %name, status = ?e.http_status(), error = %e, "Scrape job failed");
                MetricTable::new()
            }
        }
    }

    async fn execute(self, shared: &Shared) -> CollectResult<MetricTable> {
        let retry = &shared.retry;
        let mut table = MetricTable::new();

        match self {
            ScrapeJob::Ping { node, core } => {
                let response = node.ping(&core, retry).await?;
                let fixed = node_labels(&node).with("core", core);
                transform(Category::Ping, response, &fixed, &mut table);
            }
            ScrapeJob::MBeans { node, core } => {
                let mbeans = &shared.categories.mbeans;
                let response = node
                    .mbeans(&core, mbeans.category.as_deref(), mbeans.key.as_deref(), retry)
                    .await?;
                let fixed = node_labels(&node).with("core", core);
                transform(Category::MBeans, response, &fixed, &mut table);
            }
            ScrapeJob::Metrics { node } => {
                let metrics = &shared.categories.metrics;
                let response = node
                    .metrics(&metrics.group, &metrics.metric_type, &metrics.prefix, retry)
                    .await?;
                transform(Category::Metrics, response, &node_labels(&node), &mut table);
            }
            ScrapeJob::ClusterStatus { collection } => {
                let response = shared.seed.cluster_status(collection.as_deref(), retry).await?;
                transform(Category::ClusterStatus, response, &shared.cluster_labels(), &mut table);
            }
            ScrapeJob::OverseerStatus => {
                let response = shared.seed.overseer_status(retry).await?;
                let leader = extract_overseer_leader(&response).unwrap_or_default();
                let fixed = shared.cluster_labels().with("leader", leader);
                transform(Category::OverseerStatus, response, &fixed, &mut table);
            }
            ScrapeJob::Facet { query } => {
                let response = shared
                    .seed
                    .request_with_retry(
                        Some(query.collection.as_str()),
                        &query.path,
                        &query.params.pairs(),
                        retry,
                    )
                    .await?;
                let fixed = shared
                    .cluster_labels()
                    .with("collection", query.collection.clone());
                transform(Category::Facets, response, &fixed, &mut table);
            }
            ScrapeJob::Query {
                node,
                index,
                target,
                context,
            } => {
                let Some(query) = shared.queries.queries().get(index) else {
                    return Ok(table);
                };
                let spec = query.spec();
                let response = node
                    .request_with_retry(target.as_deref(), &spec.path, &spec.request_params(), retry)
                    .await?;
                return Ok(shared.queries.query(&response, query, &context));
            }
        }

        Ok(table)
    }
}

/// 작업들을 제한된 동시성으로 실행하고 모든 결과를 모음
///
/// 패닉이나 취소로 끝난 작업은 기록만 하고 건너뜁니다. 결과는 완료 순서와
/// 관계없이 작업을 넘긴 순서대로 반환됩니다.
async fn run_bounded<T, F>(limit: usize, tasks: Vec<F>) -> Vec<T>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(limit.max(1)));
    let mut set = JoinSet::new();

    for (index, task) in tasks.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            (index, task.await)
        });
    }

    let mut results = Vec::with_capacity(set.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(e) => error!(error = %e, "Scrape task did not complete"),
        }
    }
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

/// Solr 수집기
///
/// 사이클 사이에 상태를 갖지 않으므로 여러 요청이 동시에 `collect`를
/// 호출해도 됩니다.
pub struct Collector {
    shared: Arc<Shared>,
    max_concurrency: usize,
}

impl std::fmt::Debug for Collector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collector")
            .field("seed", &self.shared.seed)
            .field("mode", &self.shared.mode)
            .field("queries", &self.shared.queries.queries().len())
            .field("max_concurrency", &self.max_concurrency)
            .finish()
    }
}

impl Collector {
    /// 설정으로부터 수집기 생성
    ///
    /// 사용자 쿼리는 여기서 한 번 컴파일되며, 실패한 쿼리는 기록된 뒤
    /// 제외됩니다.
    pub fn new(config: &Config) -> CollectResult<Self> {
        let mut seed = SolrClient::new(&config.solr.base_url, config.solr.timeout_ms)?;
        if let Some(username) = &config.solr.username {
            seed = seed.with_auth(username, config.solr.password.as_deref().unwrap_or_default());
        }

        let queries = QueryEngine::compile(&config.queries);
        info!(
            base_url = %seed.base_url(),
            mode = %config.solr.mode,
            categories = ?config.categories.enabled(),
            queries = queries.queries().len(),
            rejected = queries.rejected().len(),
            "Collector initialized"
        );

        Ok(Self {
            shared: Arc::new(Shared {
                seed,
                mode: config.solr.mode,
                cluster_identity: config.solr.cluster_identity().to_string(),
                categories: config.categories.clone(),
                queries,
                retry: RetryConfig::with_max_retries(config.scrape.max_retries),
            }),
            max_concurrency: config.scrape.max_concurrency,
        })
    }

    /// 컴파일된 사용자 쿼리
    pub fn queries(&self) -> &QueryEngine {
        &self.shared.queries
    }

    /// 수집 사이클 한 번 실행
    ///
    /// 모든 엔드포인트가 실패해도 `solr_scrape_duration_seconds`는 항상
    /// 포함됩니다.
    pub async fn collect(&self) -> Vec<MetricFamily> {
        let started = Instant::now();
        let table = self.scrape().await;
        let elapsed = started.elapsed();

        info!(
            families = table.len(),
            samples = table.sample_count(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Scrape cycle completed"
        );
        table.finish(elapsed)
    }

    async fn scrape(&self) -> MetricTable {
        let nodes = self.discover_nodes().await;
        let inventories = self.inventory(nodes).await;

        let mut table = MetricTable::new();
        let mut jobs = Vec::new();
        for inventory in inventories {
            jobs.extend(self.node_jobs(&inventory.node, &inventory.cores));
            table.merge(inventory.table);
        }
        jobs.extend(self.cluster_jobs());

        debug!(jobs = jobs.len(), "Running scrape jobs");
        let futures = jobs
            .into_iter()
            .map(|job| job.run(Arc::clone(&self.shared)))
            .collect();

        for result in run_bounded(self.max_concurrency, futures).await {
            table.merge(result);
        }
        table
    }

    /// 수집 대상 노드 결정
    ///
    /// 클라우드 모드에서는 CLUSTERSTATUS의 레플리카 `base_url`을 사용하며,
    /// 조회에 실패하거나 결과가 없으면 seed 노드로 대체합니다.
    async fn discover_nodes(&self) -> Vec<SolrClient> {
        let shared = &self.shared;
        if shared.mode == SolrMode::Standalone {
            return vec![shared.seed.clone()];
        }

        let urls = match shared.seed.live_base_urls(&shared.retry).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!(error = %e, "Node discovery failed, using the seed node");
                Vec::new()
            }
        };

        let nodes: Vec<SolrClient> = urls
            .iter()
            .filter_map(|url| match shared.seed.for_node(url) {
                Ok(node) => Some(node),
                Err(e) => {
                    warn!(url = %url, error = %e, "Skipping node with invalid base URL");
                    None
                }
            })
            .collect();

        if nodes.is_empty() {
            return vec![shared.seed.clone()];
        }
        debug!(nodes = nodes.len(), "Discovered nodes");
        nodes
    }

    /// 노드별 CoreAdmin STATUS 조회
    ///
    /// core_status 카테고리가 켜져 있으면 같은 응답을 변환해 결과에 포함합니다.
    async fn inventory(&self, nodes: Vec<SolrClient>) -> Vec<NodeInventory> {
        let shared = &self.shared;
        let core_status = shared.categories.core_status.enable;

        if !core_status && !shared.needs_cores() {
            return nodes
                .into_iter()
                .map(|node| NodeInventory {
                    node,
                    cores: Vec::new(),
                    table: MetricTable::new(),
                })
                .collect();
        }

        let futures = nodes
            .into_iter()
            .map(|node| {
                let shared = Arc::clone(&self.shared);
                async move {
                    let mut table = MetricTable::new();
                    let cores = match node.core_status(&shared.retry).await {
                        Ok(mut response) => {
                            let cores = extract_core_names(&response);
                            if core_status {
                                let filter = &shared.categories.core_status;
                                if let Some(Value::Object(status)) = response.get_mut("status") {
                                    status.retain(|core, _| filter.selects(core));
                                }
                                transform(Category::CoreStatus, response, &node_labels(&node), &mut table);
                            }
                            cores
                        }
                        Err(e) => {
                            warn!(base_url = %node.base_url(), error = %e, "Core status failed");
                            Vec::new()
                        }
                    };
                    NodeInventory { node, cores, table }
                }
            })
            .collect();

        run_bounded(self.max_concurrency, futures).await
    }

    fn node_jobs(&self, node: &SolrClient, cores: &[String]) -> Vec<ScrapeJob> {
        let categories = &self.shared.categories;
        let mut jobs = Vec::new();

        for core in cores {
            if categories.ping.enable && categories.ping.selects(core) {
                jobs.push(ScrapeJob::Ping {
                    node: node.clone(),
                    core: core.clone(),
                });
            }
            if categories.mbeans.enable && categories.mbeans.selects(core) {
                jobs.push(ScrapeJob::MBeans {
                    node: node.clone(),
                    core: core.clone(),
                });
            }
        }

        if categories.metrics.enable {
            jobs.push(ScrapeJob::Metrics { node: node.clone() });
        }

        for (index, query) in self.shared.queries.queries().iter().enumerate() {
            let spec = query.spec();
            match spec.scope {
                QueryScope::Node => jobs.push(ScrapeJob::Query {
                    node: node.clone(),
                    index,
                    target: spec.target().map(str::to_string),
                    context: QueryContext::node(node.base_url()).targeting(spec),
                }),
                QueryScope::EachCore => jobs.extend(cores.iter().map(|core| ScrapeJob::Query {
                    node: node.clone(),
                    index,
                    target: Some(core.clone()),
                    context: QueryContext::node(node.base_url()).with_core(core.clone()),
                })),
                QueryScope::Cluster => {}
            }
        }

        jobs
    }

    fn cluster_jobs(&self) -> Vec<ScrapeJob> {
        let shared = &self.shared;
        let categories = &shared.categories;
        let mut jobs = Vec::new();

        if shared.mode == SolrMode::Cloud {
            if categories.cluster_status.enable {
                if categories.cluster_status.collections.is_empty() {
                    jobs.push(ScrapeJob::ClusterStatus { collection: None });
                } else {
                    jobs.extend(categories.cluster_status.collections.iter().map(|c| {
                        ScrapeJob::ClusterStatus {
                            collection: Some(c.clone()),
                        }
                    }));
                }
            }
            if categories.overseer_status.enable {
                jobs.push(ScrapeJob::OverseerStatus);
            }
        }

        if categories.facets.enable {
            jobs.extend(
                categories
                    .facets
                    .queries
                    .iter()
                    .map(|query| ScrapeJob::Facet { query: query.clone() }),
            );
        }

        for (index, query) in shared.queries.queries().iter().enumerate() {
            let spec = query.spec();
            if spec.scope == QueryScope::Cluster {
                jobs.push(ScrapeJob::Query {
                    node: shared.seed.clone(),
                    index,
                    target: spec.target().map(str::to_string),
                    context: shared.cluster_context().targeting(spec),
                });
            }
        }

        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transformer::SCRAPE_DURATION_NAME;
    use std::time::Duration;

    fn unreachable_config() -> Config {
        let mut config = Config::default();
        // port 9 (discard) is never a Solr node
        config.solr.base_url = "http://127.0.0.1:9/solr".to_string();
        config.solr.timeout_ms = 200;
        config.scrape.max_retries = 0;
        config
    }

    #[tokio::test]
    async fn test_run_bounded_collects_all() {
        let futures: Vec<_> = (0..10).map(|i| async move { i * 2 }).collect();
        let results = run_bounded(3, futures).await;
        assert_eq!(results, (0..10).map(|i| i * 2).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_run_bounded_keeps_submission_order() {
        // later jobs finish first
        let futures: Vec<_> = (0..5u64)
            .map(|i| async move {
                tokio::time::sleep(Duration::from_millis(50 - i * 10)).await;
                i
            })
            .collect();
        let results = run_bounded(5, futures).await;
        assert_eq!(results, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_run_bounded_isolates_panics() {
        let futures: Vec<std::pin::Pin<Box<dyn Future<Output = u32> + Send>>> = vec![
            Box::pin(async { 1 }),
            Box::pin(async { panic!("job exploded") }),
            Box::pin(async { 3 }),
        ];
        let results = run_bounded(2, futures).await;
        assert_eq!(results, vec![1, 3]);
    }

    #[tokio::test]
    async fn test_run_bounded_zero_limit() {
        let results = run_bounded(0, vec![async { 7 }]).await;
        assert_eq!(results, vec![7]);
    }

    #[tokio::test]
    async fn test_collect_unreachable_emits_duration_only() {
        let collector = Collector::new(&unreachable_config()).unwrap();
        let families = collector.collect().await;

        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name, SCRAPE_DURATION_NAME);
        assert_eq!(families[0].len(), 1);
        assert!(families[0].samples()[0].value >= 0.0);
    }

    #[test]
    fn test_collector_rejects_invalid_url() {
        let mut config = Config::default();
        config.solr.base_url = "localhost".to_string();
        assert!(Collector::new(&config).is_err());
    }

    #[test]
    fn test_cluster_jobs_standalone_skips_cloud_categories() {
        let collector = Collector::new(&Config::default()).unwrap();
        assert!(collector.cluster_jobs().is_empty());
    }

    #[test]
    fn test_cluster_jobs_per_collection() {
        let mut config = Config::default();
        config.solr.mode = SolrMode::Cloud;
        config.categories.cluster_status.collections = vec!["c1".to_string(), "c2".to_string()];
        let collector = Collector::new(&config).unwrap();

        let names: Vec<_> = collector.cluster_jobs().iter().map(ScrapeJob::name).collect();
        assert_eq!(names, vec!["cluster_status:c1", "cluster_status:c2", "overseer_status"]);
    }

    #[test]
    fn test_node_jobs_respect_core_filters() {
        let mut config = Config::default();
        config.categories.ping.cores = vec!["core1".to_string()];
        config.categories.mbeans.enable = true;
        let collector = Collector::new(&config).unwrap();
        let node = SolrClient::new("http://h1:8983/solr", 1000).unwrap();

        let names: Vec<_> = collector
            .node_jobs(&node, &["core1".to_string(), "core2".to_string()])
            .iter()
            .map(ScrapeJob::name)
            .collect();
        assert_eq!(
            names,
            vec![
                "ping:core1",
                "mbeans:core1",
                "mbeans:core2",
                "metrics:http://h1:8983/solr",
            ]
        );
    }
}
