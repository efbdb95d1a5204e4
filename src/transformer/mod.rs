//! Metric transformation module
//!
//! This module turns Solr JSON responses into Prometheus metric families:
//! responses are flattened to key paths, matched against ordered rules (or
//! evaluated by user queries), aggregated per cycle and finally formatted.

pub mod aggregate;
pub mod catalog;
pub mod engine;
pub mod flatten;
pub mod formatter;
pub mod query;
pub mod rules;
pub mod sanitize;

pub use aggregate::{AddOutcome, MetricFamily, MetricSample, MetricTable, SCRAPE_DURATION_NAME};
pub use catalog::Category;
pub use engine::{FixedLabels, MatchedSample, RuleMatcher};
pub use flatten::{flatten, FlatMap};
pub use formatter::PrometheusFormatter;
pub use query::{
    CompiledQuery, ExtractionSpec, ParamValue, QueryContext, QueryEngine, QueryScope, QuerySpec,
    RequestParams,
};
pub use rules::{MetricType, Rule, RuleBuilder, RuleError, RuleLabel, RuleSet, ValueTransform};
pub use sanitize::sanitize;
