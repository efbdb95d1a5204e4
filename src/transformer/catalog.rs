//! Built-in rule tables, one per Solr endpoint category
//!
//! Keys are flattened with `|` because Solr itself uses `.` and `/` inside
//! keys (`QUERY./select.requests`, `solr.core.techproducts`). Every table is
//! built once and shared for the life of the process.
//!
//! Units: millisecond fields are converted to seconds, ratios and counters
//! are exported as reported.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::engine::RuleMatcher;
use super::rules::{Rule, RuleBuilder, RuleResult, RuleSet, ValueTransform};

/// Delimiter used by all built-in tables
pub const DELIMITER: &str = "|";

/// Endpoint category with a built-in rule table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// `/{core}/admin/ping`
    Ping,
    /// `/admin/cores?action=STATUS`
    CoreStatus,
    /// `/{core}/admin/mbeans?stats=true`
    MBeans,
    /// `/admin/metrics`
    Metrics,
    /// `/admin/collections?action=CLUSTERSTATUS`
    ClusterStatus,
    /// `/admin/collections?action=OVERSEERSTATUS`
    OverseerStatus,
    /// `/{collection}/select` with faceting
    Facets,
}

impl Category {
    /// All categories in scrape order
    pub const ALL: [Category; 7] = [
        Category::Ping,
        Category::CoreStatus,
        Category::MBeans,
        Category::Metrics,
        Category::ClusterStatus,
        Category::OverseerStatus,
        Category::Facets,
    ];

    /// Category name as used in configuration and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ping => "ping",
            Category::CoreStatus => "core_status",
            Category::MBeans => "mbeans",
            Category::Metrics => "metrics",
            Category::ClusterStatus => "cluster_status",
            Category::OverseerStatus => "overseer_status",
            Category::Facets => "facets",
        }
    }

    /// Rule matcher of this category
    pub fn matcher(&self) -> &'static RuleMatcher {
        match self {
            Category::Ping => &PING,
            Category::CoreStatus => &CORE_STATUS,
            Category::MBeans => &MBEANS,
            Category::Metrics => &METRICS,
            Category::ClusterStatus => &CLUSTER_STATUS,
            Category::OverseerStatus => &OVERSEER_STATUS,
            Category::Facets => &FACETS,
        }
    }

    /// Paths holding NamedList pair arrays (`[k1, v1, k2, v2, ...]`)
    ///
    /// `*` matches any object key. These arrays are turned into objects
    /// before flattening so that keys, not indices, reach the rules.
    pub fn named_list_paths(&self) -> &'static [&'static [&'static str]] {
        match self {
            Category::MBeans => &[&["solr-mbeans"]],
            Category::Metrics => &[&["metrics"]],
            Category::OverseerStatus => &[
                &["overseer_operations"],
                &["collection_operations"],
                &["overseer_queue"],
                &["overseer_internal_queue"],
                &["collection_queue"],
            ],
            Category::Facets => &[
                &["facet_counts", "facet_fields", "*"],
                &["facet_counts", "facet_ranges", "*", "counts"],
            ],
            _ => &[],
        }
    }

    /// Validate every rule of this category
    pub fn validate(&self) -> RuleResult<()> {
        self.matcher().rules().validate_all()
    }

    /// Validate all built-in tables
    pub fn validate_all() -> RuleResult<()> {
        Category::ALL.iter().try_for_each(Category::validate)
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn matcher(rules: Vec<Rule>, default_help: &str) -> RuleMatcher {
    RuleMatcher::new(RuleSet::from_rules(rules))
        .with_delimiter(DELIMITER)
        .with_default_help(default_help)
}

static PING: Lazy<RuleMatcher> = Lazy::new(|| matcher(ping_rules(), "Solr ping"));
static CORE_STATUS: Lazy<RuleMatcher> =
    Lazy::new(|| matcher(core_status_rules(), "Solr CoreAdmin STATUS"));
static MBEANS: Lazy<RuleMatcher> = Lazy::new(|| matcher(mbeans_rules(), "Solr MBean statistics"));
static METRICS: Lazy<RuleMatcher> =
    Lazy::new(|| matcher(metrics_rules(), "Solr metrics reporting"));
static CLUSTER_STATUS: Lazy<RuleMatcher> =
    Lazy::new(|| matcher(cluster_status_rules(), "SolrCloud cluster status"));
static OVERSEER_STATUS: Lazy<RuleMatcher> =
    Lazy::new(|| matcher(overseer_status_rules(), "SolrCloud overseer status"));
static FACETS: Lazy<RuleMatcher> = Lazy::new(|| matcher(facet_rules(), "Solr facet counts"));

// ============================================================================
// Ping
// ============================================================================

fn ping_rules() -> Vec<Rule> {
    vec![Rule::builder("status")
        .name("solr_ping")
        .gauge()
        .help("Ping status of the core (OK: 1, other: 0).")
        .value(ValueTransform::Equals {
            expected: "OK".to_string(),
        })
        .build()]
}

// ============================================================================
// CoreAdmin STATUS
// ============================================================================

const CORE: &str = r"status\|(?<core>[^|]+)\|";

fn core(rest: &str) -> RuleBuilder {
    Rule::builder(format!("{}{}", CORE, rest)).gauge().capture("core")
}

fn core_status_rules() -> Vec<Rule> {
    vec![
        core("uptime")
            .name("solr_core_uptime_seconds")
            .help("Time since the core was loaded, in seconds.")
            .millis()
            .build(),
        core(r"index\|(?<type>numDocs|maxDoc|deletedDocs)")
            .name("solr_core_index_documents")
            .help("Documents in the core index by type.")
            .capture("type")
            .build(),
        core(r"index\|version")
            .name("solr_core_index_version")
            .help("Version of the core index.")
            .build(),
        core(r"index\|segmentCount")
            .name("solr_core_index_segments")
            .help("Number of segments in the core index.")
            .build(),
        core(r"index\|sizeInBytes")
            .name("solr_core_index_size_bytes")
            .help("Size of the core index, in bytes.")
            .build(),
        core(r"index\|indexHeapUsageBytes")
            .name("solr_core_index_heap_usage_bytes")
            .help("Heap used by the core index, in bytes.")
            .build(),
        core(r"index\|segmentsFileSizeInBytes")
            .name("solr_core_index_segments_file_size_bytes")
            .help("Size of the segments file, in bytes.")
            .build(),
        core(r"index\|current")
            .name("solr_core_index_current")
            .help("Whether the index reader is current (1) or not (0).")
            .value(ValueTransform::Boolean)
            .build(),
        core(r"index\|hasDeletions")
            .name("solr_core_index_has_deletions")
            .help("Whether the index has deletions (1) or not (0).")
            .value(ValueTransform::Boolean)
            .build(),
        core(r"index\|userData\|commitTimeMSec")
            .name("solr_core_index_last_commit_timestamp_seconds")
            .help("Time of the last commit, in seconds since the epoch.")
            .value(ValueTransform::ParseNumber)
            .millis()
            .build(),
    ]
}

// ============================================================================
// MBean statistics
// ============================================================================

// Solr 6 reports `stats|requests`, Solr 7+ prefixes the registry name:
// `stats|QUERY./select.requests`
const HANDLER: &str = r"solr-mbeans\|(?<category>QUERY|UPDATE|ADMIN|REPLICATION|OTHER)\|(?<handler>[^|]+)\|stats\|(?:[A-Z]+\.[^|]*\.)?";
const CACHE: &str = r"solr-mbeans\|CACHE\|(?<cache>[^|]+)\|stats\|(?:CACHE\.searcher\.[^|]+\.)?";
const SEARCHER: &str = r"solr-mbeans\|CORE\|searcher\|stats\|(?:SEARCHER\.searcher\.)?";
const UPDATE_HANDLER: &str =
    r"solr-mbeans\|UPDATE\|updateHandler\|stats\|(?:UPDATE\.updateHandler\.)?";

fn handler(rest: &str) -> RuleBuilder {
    Rule::builder(format!("{}{}", HANDLER, rest))
        .capture("category")
        .capture("handler")
}

fn handler_time(rest: &str, stat: &str) -> Rule {
    handler(rest)
        .name("solr_mbeans_handler_request_time_seconds")
        .gauge()
        .help("Request handler response time, in seconds.")
        .label("stat", stat)
        .millis()
        .build()
}

fn mbeans_rules() -> Vec<Rule> {
    vec![
        // updateHandler before the generic handler rules, it shares the UPDATE category
        Rule::builder(format!(
            "{}(?<item>commits|autocommits|autoCommits|soft autocommits|softAutoCommits|optimizes|rollbacks|expungeDeletes|docsPending|adds|deletesById|deletesByQuery|errors)",
            UPDATE_HANDLER
        ))
        .name("solr_mbeans_update_handler")
        .gauge()
        .help("Update handler statistics since the last commit.")
        .capture("item")
        .build(),
        Rule::builder(format!(
            "{}cumulative_(?<item>adds|deletesById|deletesByQuery|errors)",
            UPDATE_HANDLER
        ))
        .name("solr_mbeans_update_handler_cumulative_total")
        .counter()
        .help("Update handler statistics since the core was loaded.")
        .capture("item")
        .build(),
        handler("requests")
            .name("solr_mbeans_handler_requests_total")
            .counter()
            .help("Requests processed by the request handler.")
            .build(),
        handler("(?<type>errors|serverErrors|clientErrors|timeouts)")
            .name("solr_mbeans_handler_errors_total")
            .counter()
            .help("Errors raised by the request handler, by type.")
            .capture("type")
            .build(),
        handler("totalTime")
            .name("solr_mbeans_handler_time_seconds_total")
            .counter()
            .help("Total time spent in the request handler, in seconds.")
            .millis()
            .build(),
        handler_time("avgTimePerRequest", "mean"),
        handler_time("medianRequestTime", "median"),
        handler_time("75thPcRequestTime", "p75"),
        handler_time("95thPcRequestTime", "p95"),
        handler_time("99thPcRequestTime", "p99"),
        handler_time("999thPcRequestTime", "p999"),
        handler(r"requestTimes\|(?<stat>min|max|mean|median|stddev|p75|p95|p99|p999)_ms")
            .name("solr_mbeans_handler_request_time_seconds")
            .gauge()
            .help("Request handler response time, in seconds.")
            .capture("stat")
            .millis()
            .build(),
        handler("(?<stat>avgRequestsPerSecond|5minRateRequestsPerSecond|15minRateRequestsPerSecond)")
            .name("solr_mbeans_handler_request_rate")
            .gauge()
            .help("Request handler throughput, in requests per second.")
            .capture("stat")
            .build(),
        handler(r"requestTimes\|(?<stat>meanRate|1minRate|5minRate|15minRate)")
            .name("solr_mbeans_handler_request_rate")
            .gauge()
            .help("Request handler throughput, in requests per second.")
            .capture("stat")
            .build(),
        Rule::builder(format!("{}(?<item>lookups|hits|inserts|evictions|size)", CACHE))
            .name("solr_mbeans_cache")
            .gauge()
            .help("Searcher cache statistics.")
            .capture("cache")
            .capture("item")
            .build(),
        Rule::builder(format!(
            "{}cumulative_(?<item>lookups|hits|inserts|evictions)",
            CACHE
        ))
        .name("solr_mbeans_cache_cumulative_total")
        .counter()
        .help("Searcher cache statistics since the core was loaded.")
        .capture("cache")
        .capture("item")
        .build(),
        Rule::builder(format!("{}(?<item>hitratio|cumulative_hitratio)", CACHE))
            .name("solr_mbeans_cache_ratio")
            .gauge()
            .help("Searcher cache hit ratio.")
            .capture("cache")
            .capture("item")
            .build(),
        Rule::builder(format!("{}warmupTime", CACHE))
            .name("solr_mbeans_cache_warmup_time_seconds")
            .gauge()
            .help("Time the cache took to warm up, in seconds.")
            .capture("cache")
            .millis()
            .build(),
        Rule::builder(format!("{}(?<type>numDocs|maxDoc|deletedDocs)", SEARCHER))
            .name("solr_mbeans_searcher_documents")
            .gauge()
            .help("Documents visible to the current searcher, by type.")
            .capture("type")
            .build(),
        Rule::builder(format!("{}warmupTime", SEARCHER))
            .name("solr_mbeans_searcher_warmup_time_seconds")
            .gauge()
            .help("Time the current searcher took to warm up, in seconds.")
            .millis()
            .build(),
    ]
}

// ============================================================================
// Metrics reporting (/admin/metrics)
// ============================================================================

// solr.core.<collection>[.<shard>.<replica>]
const CORE_REGISTRY: &str =
    r"metrics\|solr\.core\.(?<collection>[^.|]+)(?:\.(?<shard>[^.|]+)\.(?<replica>[^.|]+))?\|";
const NODE_REGISTRY: &str = r"metrics\|solr\.node\|";
const JVM_REGISTRY: &str = r"metrics\|solr\.jvm\|";
const JETTY_REGISTRY: &str = r"metrics\|solr\.jetty\|";
const HTTP_REGISTRY: &str = r"metrics\|solr\.http\|";

const HANDLER_CATEGORY: &str = r"(?<category>QUERY|UPDATE|ADMIN|REPLICATION)";

fn core_metric(rest: &str) -> RuleBuilder {
    Rule::builder(format!("{}{}", CORE_REGISTRY, rest))
        .capture("collection")
        .capture("shard")
        .capture("replica")
}

fn registry(prefix: &str, rest: &str) -> RuleBuilder {
    Rule::builder(format!("{}{}", prefix, rest))
}

fn metrics_rules() -> Vec<Rule> {
    let mut rules = core_registry_rules();
    rules.extend(node_registry_rules());
    rules.extend(jvm_registry_rules());
    rules.extend(jetty_and_http_rules());
    rules
}

fn core_registry_rules() -> Vec<Rule> {
    vec![
        core_metric(&format!(r"{}\.(?<handler>[^|]+)\.requests(?:\|count)?", HANDLER_CATEGORY))
            .name("solr_metrics_core_requests_total")
            .counter()
            .help("Requests processed by the core request handler.")
            .capture("category")
            .capture("handler")
            .build(),
        core_metric(&format!(
            r"{}\.(?<handler>[^|]+)\.(?<type>errors|serverErrors|clientErrors|timeouts)(?:\|count)?",
            HANDLER_CATEGORY
        ))
        .name("solr_metrics_core_errors_total")
        .counter()
        .help("Errors raised by the core request handler, by type.")
        .capture("category")
        .capture("handler")
        .capture("type")
        .build(),
        core_metric(&format!(r"{}\.(?<handler>[^|]+)\.totalTime(?:\|count)?", HANDLER_CATEGORY))
            .name("solr_metrics_core_time_seconds_total")
            .counter()
            .help("Total time spent in the core request handler, in seconds.")
            .capture("category")
            .capture("handler")
            .millis()
            .build(),
        core_metric(&format!(
            r"{}\.(?<handler>[^|]+)\.requestTimes\|(?<stat>min|max|mean|median|stddev|p75|p95|p99|p999)_ms",
            HANDLER_CATEGORY
        ))
        .name("solr_metrics_core_request_time_seconds")
        .gauge()
        .help("Core request handler response time, in seconds.")
        .capture("category")
        .capture("handler")
        .capture("stat")
        .millis()
        .build(),
        core_metric(&format!(
            r"{}\.(?<handler>[^|]+)\.requestTimes\|(?<stat>meanRate|1minRate|5minRate|15minRate)",
            HANDLER_CATEGORY
        ))
        .name("solr_metrics_core_request_rate")
        .gauge()
        .help("Core request handler throughput, in requests per second.")
        .capture("category")
        .capture("handler")
        .capture("stat")
        .build(),
        core_metric(r"INDEX\.sizeInBytes")
            .name("solr_metrics_core_index_size_bytes")
            .gauge()
            .help("Size of the core index, in bytes.")
            .build(),
        core_metric(r"SEARCHER\.searcher\.(?<type>numDocs|maxDoc|deletedDocs)")
            .name("solr_metrics_core_searcher_documents")
            .gauge()
            .help("Documents visible to the current searcher, by type.")
            .capture("type")
            .build(),
        core_metric(r"SEARCHER\.searcher\.warmupTime")
            .name("solr_metrics_core_searcher_warmup_time_seconds")
            .gauge()
            .help("Time the current searcher took to warm up, in seconds.")
            .millis()
            .build(),
        core_metric(
            r"CACHE\.searcher\.(?<cache>[^|]+)\|(?<item>lookups|hits|inserts|evictions|size|cumulative_lookups|cumulative_hits|cumulative_inserts|cumulative_evictions)",
        )
        .name("solr_metrics_core_searcher_cache")
        .gauge()
        .help("Searcher cache statistics.")
        .capture("cache")
        .capture("item")
        .build(),
        core_metric(r"CACHE\.searcher\.(?<cache>[^|]+)\|(?<item>hitratio|cumulative_hitratio)")
            .name("solr_metrics_core_searcher_cache_ratio")
            .gauge()
            .help("Searcher cache hit ratio.")
            .capture("cache")
            .capture("item")
            .build(),
        core_metric(r"CACHE\.searcher\.(?<cache>[^|]+)\|warmupTime")
            .name("solr_metrics_core_searcher_cache_warmup_time_seconds")
            .gauge()
            .help("Time the cache took to warm up, in seconds.")
            .capture("cache")
            .millis()
            .build(),
        core_metric(
            r"UPDATE\.updateHandler\.(?<item>adds|deletesById|deletesByQuery|docsPending|errors)(?:\|count)?",
        )
        .name("solr_metrics_core_update_handler")
        .gauge()
        .help("Update handler statistics since the last commit.")
        .capture("item")
        .build(),
        core_metric(
            r"UPDATE\.updateHandler\.(?<item>commits|autoCommits|softAutoCommits|optimizes|rollbacks|expungeDeletes|merges|cumulativeAdds|cumulativeDeletesById|cumulativeDeletesByQuery|cumulativeErrors)(?:\|count)?",
        )
        .name("solr_metrics_core_update_handler_operations_total")
        .counter()
        .help("Update handler operations since the core was loaded.")
        .capture("item")
        .build(),
        core_metric(r"CORE\.fs\.(?<item>totalSpace|usableSpace)")
            .name("solr_metrics_core_fs_bytes")
            .gauge()
            .help("File system space of the core data directory, in bytes.")
            .capture("item")
            .build(),
    ]
}

fn node_registry_rules() -> Vec<Rule> {
    vec![
        registry(NODE_REGISTRY, r"CONTAINER\.cores\.(?<item>loaded|lazy|unloaded)")
            .name("solr_metrics_node_cores")
            .gauge()
            .help("Cores on the node, by state.")
            .capture("item")
            .build(),
        registry(NODE_REGISTRY, r"CONTAINER\.fs\.(?<item>totalSpace|usableSpace)")
            .name("solr_metrics_node_fs_bytes")
            .gauge()
            .help("File system space of the node, in bytes.")
            .capture("item")
            .build(),
        registry(NODE_REGISTRY, r"CONTAINER\.fs\.coreRoot\.(?<item>totalSpace|usableSpace)")
            .name("solr_metrics_node_core_root_fs_bytes")
            .gauge()
            .help("File system space of the core root directory, in bytes.")
            .capture("item")
            .build(),
        registry(
            NODE_REGISTRY,
            r"CONTAINER\.threadPool\.(?<executor>[^.|]+)\.(?<item>completed|submitted|running)(?:\|count)?",
        )
        .name("solr_metrics_node_thread_pool")
        .gauge()
        .help("Node executor thread pool statistics.")
        .capture("executor")
        .capture("item")
        .build(),
        registry(
            NODE_REGISTRY,
            &format!(r"{}\.(?<handler>[^|]+)\.requests(?:\|count)?", HANDLER_CATEGORY),
        )
        .name("solr_metrics_node_requests_total")
        .counter()
        .help("Requests processed by the node request handler.")
        .capture("category")
        .capture("handler")
        .build(),
        registry(
            NODE_REGISTRY,
            &format!(
                r"{}\.(?<handler>[^|]+)\.(?<type>errors|serverErrors|clientErrors|timeouts)(?:\|count)?",
                HANDLER_CATEGORY
            ),
        )
        .name("solr_metrics_node_errors_total")
        .counter()
        .help("Errors raised by the node request handler, by type.")
        .capture("category")
        .capture("handler")
        .capture("type")
        .build(),
        registry(
            NODE_REGISTRY,
            &format!(r"{}\.(?<handler>[^|]+)\.totalTime(?:\|count)?", HANDLER_CATEGORY),
        )
        .name("solr_metrics_node_time_seconds_total")
        .counter()
        .help("Total time spent in the node request handler, in seconds.")
        .capture("category")
        .capture("handler")
        .millis()
        .build(),
    ]
}

fn jvm_registry_rules() -> Vec<Rule> {
    vec![
        registry(
            JVM_REGISTRY,
            r"buffers\.(?<pool>[^.|]+)\.(?<item>Count|MemoryUsed|TotalCapacity)",
        )
        .name("solr_metrics_jvm_buffers")
        .gauge()
        .help("JVM buffer pool statistics.")
        .capture("pool")
        .capture("item")
        .build(),
        registry(JVM_REGISTRY, r"gc\.(?<collector>[^|]+)\.count")
            .name("solr_metrics_jvm_gc_total")
            .counter()
            .help("Garbage collections, by collector.")
            .capture("collector")
            .build(),
        registry(JVM_REGISTRY, r"gc\.(?<collector>[^|]+)\.time")
            .name("solr_metrics_jvm_gc_seconds_total")
            .counter()
            .help("Time spent in garbage collection, in seconds.")
            .capture("collector")
            .millis()
            .build(),
        registry(
            JVM_REGISTRY,
            r"memory\.(?<area>heap|non-heap)\.(?<item>committed|init|max|used)",
        )
        .name("solr_metrics_jvm_memory_bytes")
        .gauge()
        .help("JVM memory, in bytes.")
        .capture("area")
        .capture("item")
        .build(),
        registry(JVM_REGISTRY, r"memory\.(?<area>heap|non-heap)\.usage")
            .name("solr_metrics_jvm_memory_usage_ratio")
            .gauge()
            .help("JVM memory usage ratio.")
            .capture("area")
            .build(),
        registry(JVM_REGISTRY, r"memory\.total\.(?<item>committed|init|max|used)")
            .name("solr_metrics_jvm_memory_total_bytes")
            .gauge()
            .help("Total JVM memory, in bytes.")
            .capture("item")
            .build(),
        registry(
            JVM_REGISTRY,
            r"memory\.pools\.(?<pool>[^|]+)\.(?<item>committed|init|max|used)",
        )
        .name("solr_metrics_jvm_memory_pools_bytes")
        .gauge()
        .help("JVM memory pool usage, in bytes.")
        .capture("pool")
        .capture("item")
        .build(),
        registry(
            JVM_REGISTRY,
            r"os\.(?<item>availableProcessors|committedVirtualMemorySize|freePhysicalMemorySize|freeSwapSpaceSize|maxFileDescriptorCount|openFileDescriptorCount|totalPhysicalMemorySize|totalSwapSpaceSize)",
        )
        .name("solr_metrics_jvm_os")
        .gauge()
        .help("Operating system statistics reported by the JVM.")
        .capture("item")
        .build(),
        registry(JVM_REGISTRY, r"os\.(?<item>processCpuLoad|systemCpuLoad)")
            .name("solr_metrics_jvm_os_cpu_load")
            .gauge()
            .help("CPU load reported by the JVM, as a ratio.")
            .capture("item")
            .build(),
        registry(JVM_REGISTRY, r"os\.processCpuTime")
            .name("solr_metrics_jvm_os_cpu_time_seconds")
            .counter()
            .help("CPU time used by the JVM process, in seconds.")
            .value_factor(1e-9)
            .build(),
        registry(JVM_REGISTRY, r"os\.systemLoadAverage")
            .name("solr_metrics_jvm_os_load_average")
            .gauge()
            .help("System load average over the last minute.")
            .build(),
        registry(JVM_REGISTRY, r"threads\.count")
            .name("solr_metrics_jvm_threads")
            .gauge()
            .help("JVM threads, by state.")
            .label("item", "total")
            .build(),
        registry(JVM_REGISTRY, r"threads\.(?<item>[a-z_]+)\.count")
            .name("solr_metrics_jvm_threads")
            .gauge()
            .help("JVM threads, by state.")
            .capture("item")
            .build(),
    ]
}

fn jetty_and_http_rules() -> Vec<Rule> {
    const DEFAULT_HANDLER: &str = r"org\.eclipse\.jetty\.server\.handler\.DefaultHandler\.";

    vec![
        registry(
            JETTY_REGISTRY,
            &format!(r"{}(?<status>[1-5]xx)-responses(?:\|count)?", DEFAULT_HANDLER),
        )
        .name("solr_metrics_jetty_response_total")
        .counter()
        .help("Jetty responses, by status class.")
        .capture("status")
        .build(),
        registry(
            JETTY_REGISTRY,
            &format!(
                r"{}(?<method>get|post|put|delete|head|options|connect|move|trace|other)-requests\|count",
                DEFAULT_HANDLER
            ),
        )
        .name("solr_metrics_jetty_requests_total")
        .counter()
        .help("Jetty requests, by method.")
        .capture("method")
        .build(),
        registry(JETTY_REGISTRY, &format!(r"{}dispatches\|count", DEFAULT_HANDLER))
            .name("solr_metrics_jetty_dispatches_total")
            .counter()
            .help("Jetty dispatches.")
            .build(),
        registry(
            HTTP_REGISTRY,
            r"(?<pool>[^|]+)\.(?<item>available-connections|leased-connections|max-connections|pending-connections)",
        )
        .name("solr_metrics_http_connections")
        .gauge()
        .help("Internal HTTP client connection pool statistics.")
        .capture("pool")
        .capture("item")
        .build(),
    ]
}

// ============================================================================
// Collections API CLUSTERSTATUS
// ============================================================================

const COLLECTION: &str = r"cluster\|collections\|(?<collection>[^|]+)\|";

fn collection(rest: &str) -> RuleBuilder {
    Rule::builder(format!("{}{}", COLLECTION, rest))
        .gauge()
        .capture("collection")
}

fn replica(rest: &str) -> RuleBuilder {
    collection(&format!(
        r"shards\|(?<shard>[^|]+)\|replicas\|(?<replica>[^|]+)\|{}",
        rest
    ))
    .capture("shard")
    .capture("replica")
    .sibling("core")
    .sibling("base_url")
    .sibling("node_name")
}

fn cluster_status_rules() -> Vec<Rule> {
    vec![
        collection("replicationFactor")
            .name("solr_collections_replication_factor")
            .help("Replication factor of the collection.")
            .value(ValueTransform::ParseNumber)
            .build(),
        collection("maxShardsPerNode")
            .name("solr_collections_max_shards_per_node")
            .help("Maximum shards per node of the collection.")
            .value(ValueTransform::ParseNumber)
            .build(),
        collection("znodeVersion")
            .name("solr_collections_znode_version")
            .help("Version of the collection state znode.")
            .value(ValueTransform::ParseNumber)
            .build(),
        collection("(?<type>nrt|tlog|pull)Replicas")
            .name("solr_collections_replicas_configured")
            .help("Configured replicas of the collection, by replica type.")
            .capture("type")
            .value(ValueTransform::ParseNumber)
            .build(),
        collection(r"shards\|(?<shard>[^|]+)\|state")
            .name("solr_collections_shard_state")
            .help("Shard state (active: 1, other: 0).")
            .capture("shard")
            .value(ValueTransform::Equals {
                expected: "active".to_string(),
            })
            .build(),
        replica("state")
            .name("solr_collections_replica_state")
            .help("Replica state (active: 5, recovering: 4, down: 3, recovery_failed: 2, inactive: 1, other: 0).")
            .value(ValueTransform::mapping(
                &[
                    ("active", 5.0),
                    ("recovering", 4.0),
                    ("down", 3.0),
                    ("recovery_failed", 2.0),
                    ("inactive", 1.0),
                ],
                0.0,
            ))
            .build(),
        replica("leader")
            .name("solr_collections_shard_leader")
            .help("Whether the replica is the shard leader (1) or not (0).")
            .value(ValueTransform::Boolean)
            .build(),
    ]
}

// ============================================================================
// Collections API OVERSEERSTATUS
// ============================================================================

const OVERSEER_GROUP: &str = r"(?<group>overseer_operations|collection_operations|overseer_queue|overseer_internal_queue|collection_queue)\|(?<operation>[^|]+)\|";

fn overseer_time(stat_key: &str, stat: &str) -> Rule {
    Rule::builder(format!("{}{}", OVERSEER_GROUP, stat_key))
        .name("solr_overseer_operation_time_seconds")
        .gauge()
        .help("Overseer operation response time, in seconds.")
        .capture("group")
        .capture("operation")
        .label("stat", stat)
        .millis()
        .build()
}

fn overseer_status_rules() -> Vec<Rule> {
    vec![
        Rule::builder(
            "(?<queue>overseer_queue_size|overseer_work_queue_size|overseer_collection_queue_size)",
        )
        .name("solr_overseer_queue_size")
        .gauge()
        .help("Size of the overseer queues.")
        .capture("queue")
        .build(),
        Rule::builder(format!("{}(?<item>requests|errors)", OVERSEER_GROUP))
            .name("solr_overseer_operations_total")
            .counter()
            .help("Overseer operations, by outcome.")
            .capture("group")
            .capture("operation")
            .capture("item")
            .build(),
        overseer_time("avgTimePerRequest", "mean"),
        overseer_time("medianRequestTime", "median"),
        overseer_time("75thPcRequestTime", "p75"),
        overseer_time("95thPcRequestTime", "p95"),
        overseer_time("99thPcRequestTime", "p99"),
        overseer_time("999thPcRequestTime", "p999"),
        Rule::builder(format!(
            "{}(?<stat>avgRequestsPerSecond|5minRateRequestsPerSecond|15minRateRequestsPerSecond)",
            OVERSEER_GROUP
        ))
        .name("solr_overseer_operation_rate")
        .gauge()
        .help("Overseer operation throughput, in requests per second.")
        .capture("group")
        .capture("operation")
        .capture("stat")
        .build(),
    ]
}

// ============================================================================
// Facets
// ============================================================================

fn facet_rules() -> Vec<Rule> {
    vec![
        Rule::builder(r"facet_counts\|facet_queries\|(?<query>.+)")
            .name("solr_facets_facet_queries")
            .gauge()
            .help("Number of documents matching the facet query.")
            .capture("query")
            .build(),
        Rule::builder(r"facet_counts\|facet_fields\|(?<field>[^|]+)\|(?<term>.+)")
            .name("solr_facets_facet_fields")
            .gauge()
            .help("Number of documents per term of the facet field.")
            .capture("field")
            .capture("term")
            .build(),
        Rule::builder(r"facet_counts\|facet_ranges\|(?<field>[^|]+)\|counts\|(?<range>.+)")
            .name("solr_facets_facet_ranges")
            .gauge()
            .help("Number of documents per range of the facet range.")
            .capture("field")
            .capture("range")
            .build(),
        Rule::builder(r"facet_counts\|facet_intervals\|(?<field>[^|]+)\|(?<interval>.+)")
            .name("solr_facets_facet_intervals")
            .gauge()
            .help("Number of documents per interval of the facet interval.")
            .capture("field")
            .capture("interval")
            .build(),
    ]
}
