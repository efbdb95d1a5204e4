//! Declarative extraction queries
//!
//! A [`QuerySpec`] names a Solr request (path, parameters, optional target
//! collection or core) and a list of extractions that pull samples out of
//! the response. Two kinds of extraction exist:
//!
//! - **path**: an expression evaluated on the response tree, e.g.
//!   `facet_counts.facet_fields.{field}.{term:pairs}`. Segments are
//!   separated by `.`:
//!   - `name` or `"quoted.name"`: object key (or array index)
//!   - `*`: any object key or array element
//!   - `{label}`: like `*`, the key or index becomes label `label`
//!   - `{label:pairs}`: iterates a NamedList `[k1, v1, k2, v2, ...]`
//! - **pattern**: a regex matched against flattened keys, exactly like a
//!   built-in rule. Named groups become labels in order of appearance.
//!
//! Every spec is compiled once. A spec that fails to compile is reported and
//! never runs; a spec that fails while evaluating one response yields no
//! samples for that response only.
//!
//! # Example Configuration (YAML)
//!
//! ```yaml
//! queries:
//!   - name: manufacturer_facets
//!     collection: techproducts
//!     path: /select
//!     params:
//!       - q: "*:*"
//!       - facet: true
//!       - facet.field: manu_id_s
//!     extractions:
//!       - path: facet_counts.facet_fields.{field}.{term:pairs}
//!         name: solr_facet_field_count
//!         help: "Documents per facet term"
//!         type: gauge
//! ```

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use super::aggregate::{MetricSample, MetricTable, SCRAPE_DURATION_NAME};
use super::engine::{FixedLabels, RuleMatcher};
use super::rules::{
    apply_substitution, label_value, placeholders, MetricType, Placeholder, Rule, RuleLabel,
    RuleSet, ValueTransform,
};
use super::sanitize::{is_valid_label_name, sanitize};
pub use crate::error::QueryError;

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Labels the engine adds itself and extractions may not declare
pub const RESERVED_LABELS: [&str; 4] = ["base_url", "zk_host", "collection", "core"];

// ============================================================================
// Configuration
// ============================================================================

/// Which nodes a query is sent to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryScope {
    /// Once per node
    #[default]
    Node,
    /// Once per core of every node
    EachCore,
    /// Once per cycle, against the seed node
    Cluster,
}

/// Request parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::String(s) => f.write_str(s),
        }
    }
}

/// Request parameters, a list of one-or-more-entry maps
///
/// Repeated keys (`facet.field` twice) are expressed as separate items:
///
/// ```yaml
/// - q: "*:*"
/// - facet.field: manu_id_s
/// - facet.field: cat
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestParams(pub Vec<BTreeMap<String, ParamValue>>);

impl RequestParams {
    /// Key/value pairs in declaration order
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .flat_map(|entry| entry.iter().map(|(k, v)| (k.clone(), v.to_string())))
            .collect()
    }

    /// Check if no parameter is declared
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One user-defined query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuerySpec {
    /// Name used in logs, defaults to the request path
    #[serde(default)]
    pub name: Option<String>,

    /// Nodes the query is sent to
    #[serde(default)]
    pub scope: QueryScope,

    /// Target collection (mutually exclusive with `core`)
    #[serde(default)]
    pub collection: Option<String>,

    /// Target core (mutually exclusive with `collection`)
    #[serde(default)]
    pub core: Option<String>,

    /// Request path, e.g. `/select` or `/admin/metrics`
    #[serde(default = "default_path")]
    pub path: String,

    /// Request parameters
    #[serde(default)]
    pub params: RequestParams,

    /// Extractions applied to the response
    #[serde(default)]
    pub extractions: Vec<ExtractionSpec>,
}

fn default_path() -> String {
    "/select".to_string()
}

impl QuerySpec {
    /// Create a spec for the given request path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            name: None,
            scope: QueryScope::default(),
            collection: None,
            core: None,
            path: path.into(),
            params: RequestParams::default(),
            extractions: Vec::new(),
        }
    }

    /// Name used in logs
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.path)
    }

    /// Request parameters flattened to key/value pairs, in declaration order
    pub fn request_params(&self) -> Vec<(String, String)> {
        self.params.pairs()
    }

    /// Target core or collection the request goes to
    pub fn target(&self) -> Option<&str> {
        self.collection.as_deref().or(self.core.as_deref())
    }
}

/// One extraction of a query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionSpec {
    /// Path expression (exclusive with `pattern`)
    #[serde(default)]
    pub path: Option<String>,

    /// Regex over flattened keys (exclusive with `path`)
    #[serde(default)]
    pub pattern: Option<String>,

    /// Delimiter for `pattern` extractions
    #[serde(default)]
    pub delimiter: Option<String>,

    /// Metric name template
    pub name: String,

    /// Help text
    #[serde(default)]
    pub help: Option<String>,

    /// Metric type
    #[serde(rename = "type", default)]
    pub metric_type: MetricType,

    /// Value transform
    #[serde(default)]
    pub value: ValueTransform,

    /// Factor applied after the transform
    #[serde(default, alias = "valueFactor")]
    pub value_factor: Option<f64>,

    /// Extra labels, appended after the capture labels
    #[serde(default)]
    pub labels: Vec<RuleLabel>,
}

// ============================================================================
// Path expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Wildcard,
    Capture(String),
    Pairs(String),
}

/// A compiled path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    source: String,
    segments: Vec<Segment>,
}

/// One leaf reached by a path expression
#[derive(Debug, Clone)]
pub struct PathMatch<'a> {
    /// Captured label values, parallel to [`PathExpr::capture_names`]
    pub captures: Vec<String>,
    /// The value the expression ended on
    pub value: &'a Value,
    /// Object holding `value`, used for `@field` lookups
    pub parent: Option<&'a Map<String, Value>>,
}

impl PathExpr {
    /// Parse an expression
    ///
    /// # Errors
    ///
    /// Returns `QueryError::InvalidExpression` for empty expressions or
    /// segments, unbalanced quotes or braces, unknown capture modifiers and
    /// invalid or repeated label names.
    pub fn parse(expression: &str) -> QueryResult<Self> {
        let invalid = |reason: &str| QueryError::InvalidExpression {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        if expression.trim().is_empty() {
            return Err(invalid("expression is empty"));
        }

        let mut segments = Vec::new();
        let mut chars = expression.chars().peekable();

        loop {
            let segment = match chars.peek() {
                Some('"') => {
                    chars.next();
                    let mut key = String::new();
                    loop {
                        match chars.next() {
                            Some('\\') => match chars.next() {
                                Some(c) => key.push(c),
                                None => return Err(invalid("unterminated escape")),
                            },
                            Some('"') => break,
                            Some(c) => key.push(c),
                            None => return Err(invalid("unbalanced quotes")),
                        }
                    }
                    Segment::Key(key)
                }
                Some('{') => {
                    chars.next();
                    let mut inner = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some('{') | None => return Err(invalid("unbalanced braces")),
                            Some(c) => inner.push(c),
                        }
                    }
                    let (label, modifier) = match inner.split_once(':') {
                        Some((label, modifier)) => (label.trim(), Some(modifier.trim())),
                        None => (inner.trim(), None),
                    };
                    if !is_valid_label_name(label) {
                        return Err(invalid(&format!("invalid label name '{}'", label)));
                    }
                    match modifier {
                        None => Segment::Capture(label.to_string()),
                        Some("pairs") => Segment::Pairs(label.to_string()),
                        Some(other) => {
                            return Err(invalid(&format!("unknown capture modifier '{}'", other)))
                        }
                    }
                }
                _ => {
                    let mut key = String::new();
                    while let Some(&c) = chars.peek() {
                        match c {
                            '.' => break,
                            '{' | '}' => return Err(invalid("unbalanced braces")),
                            '"' => return Err(invalid("quote inside unquoted segment")),
                            _ => {
                                key.push(c);
                                chars.next();
                            }
                        }
                    }
                    match key.as_str() {
                        "" => return Err(invalid("empty segment")),
                        "*" => Segment::Wildcard,
                        _ => Segment::Key(key),
                    }
                }
            };
            segments.push(segment);

            match chars.next() {
                None => break,
                Some('.') if chars.peek().is_some() => continue,
                Some('.') => return Err(invalid("trailing '.'")),
                Some(_) => return Err(invalid("segments must be separated by '.'")),
            }
        }

        let expr = Self {
            source: expression.to_string(),
            segments,
        };

        let mut seen = HashSet::new();
        for name in expr.capture_names() {
            if !seen.insert(name) {
                return Err(invalid(&format!("label '{}' captured more than once", name)));
            }
        }

        Ok(expr)
    }

    /// The expression as written
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Capture label names in order of appearance
    pub fn capture_names(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Capture(name) | Segment::Pairs(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Evaluate the expression against a response tree
    ///
    /// Keys that are absent simply produce no match.
    ///
    /// # Errors
    ///
    /// Returns `QueryError::Evaluation` when a `pairs` segment meets an odd
    /// length array or a non-string key.
    pub fn evaluate<'a>(&self, root: &'a Value) -> QueryResult<Vec<PathMatch<'a>>> {
        let mut out = Vec::new();
        let mut captures = Vec::new();
        self.walk(root, None, 0, &mut captures, &mut out)?;
        Ok(out)
    }

    fn walk<'a>(
        &self,
        node: &'a Value,
        parent: Option<&'a Map<String, Value>>,
        depth: usize,
        captures: &mut Vec<String>,
        out: &mut Vec<PathMatch<'a>>,
    ) -> QueryResult<()> {
        let Some(segment) = self.segments.get(depth) else {
            out.push(PathMatch {
                captures: captures.clone(),
                value: node,
                parent,
            });
            return Ok(());
        };

        match (segment, node) {
            (Segment::Key(key), Value::Object(map)) => {
                if let Some(child) = map.get(key) {
                    self.walk(child, Some(map), depth + 1, captures, out)?;
                }
            }
            (Segment::Key(key), Value::Array(items)) => {
                if let Some(child) = key.parse::<usize>().ok().and_then(|i| items.get(i)) {
                    self.walk(child, None, depth + 1, captures, out)?;
                }
            }
            (Segment::Wildcard, Value::Object(map)) => {
                for child in map.values() {
                    self.walk(child, Some(map), depth + 1, captures, out)?;
                }
            }
            (Segment::Wildcard, Value::Array(items)) => {
                for child in items {
                    self.walk(child, None, depth + 1, captures, out)?;
                }
            }
            // an already normalized NamedList is an object
            (Segment::Capture(_) | Segment::Pairs(_), Value::Object(map)) => {
                for (key, child) in map {
                    captures.push(key.clone());
                    self.walk(child, Some(map), depth + 1, captures, out)?;
                    captures.pop();
                }
            }
            (Segment::Capture(_), Value::Array(items)) => {
                for (i, child) in items.iter().enumerate() {
                    captures.push(i.to_string());
                    self.walk(child, None, depth + 1, captures, out)?;
                    captures.pop();
                }
            }
            (Segment::Pairs(_), Value::Array(items)) => {
                if items.len() % 2 != 0 {
                    return Err(self.evaluation_error(format!(
                        "NamedList has odd length {}",
                        items.len()
                    )));
                }
                for pair in items.chunks_exact(2) {
                    let Value::String(key) = &pair[0] else {
                        return Err(
                            self.evaluation_error(format!("NamedList key {} is not a string", pair[0]))
                        );
                    };
                    captures.push(key.clone());
                    self.walk(&pair[1], None, depth + 1, captures, out)?;
                    captures.pop();
                }
            }
            _ => {}
        }

        Ok(())
    }

    fn evaluation_error(&self, reason: String) -> QueryError {
        QueryError::Evaluation {
            expression: self.source.clone(),
            reason,
        }
    }
}

impl fmt::Display for PathExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ============================================================================
// Compiled queries
// ============================================================================

#[derive(Debug, Clone)]
enum Extractor {
    Path(PathExpr),
    // single-rule matcher carrying name, labels and value handling itself
    Pattern(RuleMatcher),
}

#[derive(Debug, Clone)]
struct CompiledExtraction {
    extractor: Extractor,
    name: String,
    help: String,
    metric_type: MetricType,
    value: ValueTransform,
    value_factor: Option<f64>,
    labels: Vec<RuleLabel>,
}

impl CompiledExtraction {
    fn compile(spec: &ExtractionSpec, query: &str) -> QueryResult<Self> {
        let invalid = |reason: String| QueryError::InvalidSpec {
            query: query.to_string(),
            reason,
        };

        if spec.name.trim().is_empty() {
            return Err(invalid("extraction name cannot be empty".to_string()));
        }
        if sanitize(&spec.name) == SCRAPE_DURATION_NAME {
            return Err(invalid(format!("metric name '{}' is reserved", spec.name)));
        }
        if let Some(factor) = spec.value_factor {
            if !factor.is_finite() {
                return Err(invalid("value factor must be a finite number".to_string()));
            }
        }
        let help = spec.help.clone().unwrap_or_default();

        let (extractor, capture_names) = match (&spec.path, &spec.pattern) {
            (Some(path), None) => {
                let expr = PathExpr::parse(path)?;
                let names: Vec<String> = expr.capture_names().map(str::to_string).collect();
                check_templates(spec, &names, path)?;
                (Extractor::Path(expr), names)
            }
            (None, Some(pattern)) => {
                let probe = Rule::new(pattern.clone(), spec.name.clone(), spec.metric_type);
                let names: Vec<String> = probe
                    .compile()?
                    .capture_names()
                    .flatten()
                    .map(str::to_string)
                    .collect();

                let mut rule = Rule::new(pattern.clone(), spec.name.clone(), spec.metric_type)
                    .with_value(spec.value.clone());
                if !help.is_empty() {
                    rule = rule.with_help(help.clone());
                }
                if let Some(factor) = spec.value_factor {
                    rule = rule.with_value_factor(factor);
                }
                for name in &names {
                    rule = rule.with_label(name.clone(), format!("${{{}}}", name));
                }
                for label in &spec.labels {
                    rule = rule.with_label(label.name.clone(), label.value.clone());
                }
                rule.validate()?;

                let matcher = RuleMatcher::new(RuleSet::from_rules(vec![rule]))
                    .with_delimiter(spec.delimiter.as_deref().unwrap_or("."));
                (Extractor::Pattern(matcher), names)
            }
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "extraction declares both 'path' and 'pattern'".to_string(),
                ))
            }
            (None, None) => {
                return Err(invalid(
                    "extraction needs either 'path' or 'pattern'".to_string(),
                ))
            }
        };

        let mut seen = HashSet::new();
        for name in capture_names
            .iter()
            .map(String::as_str)
            .chain(spec.labels.iter().map(|l| l.name.as_str()))
        {
            if !is_valid_label_name(name) {
                return Err(invalid(format!("invalid label name '{}'", name)));
            }
            if RESERVED_LABELS.contains(&name) {
                return Err(invalid(format!("label '{}' is reserved", name)));
            }
            if !seen.insert(name) {
                return Err(invalid(format!("label '{}' declared more than once", name)));
            }
        }

        Ok(Self {
            extractor,
            name: spec.name.clone(),
            help,
            metric_type: spec.metric_type,
            value: spec.value.clone(),
            value_factor: spec.value_factor,
            labels: spec.labels.clone(),
        })
    }

    fn extract(&self, response: &Value, fixed: &FixedLabels, table: &mut MetricTable) -> QueryResult<()> {
        let expr = match &self.extractor {
            Extractor::Pattern(matcher) => {
                matcher.transform(response, fixed, table);
                return Ok(());
            }
            Extractor::Path(expr) => expr,
        };

        let capture_names: Vec<&str> = expr.capture_names().collect();
        for found in expr.evaluate(response)? {
            let Some(raw) = self.value.apply(found.value) else {
                debug!(expression = %expr, value = %found.value, "Non-numeric value, skipping");
                continue;
            };
            let value = match self.value_factor {
                Some(factor) => raw * factor,
                None => raw,
            };

            let render = |template: &str| {
                apply_substitution(template, |placeholder| match placeholder {
                    Placeholder::Index(i) => i.checked_sub(1).and_then(|i| found.captures.get(i)).cloned(),
                    Placeholder::Name(name) => capture_names
                        .iter()
                        .position(|n| *n == name)
                        .map(|i| found.captures[i].clone()),
                    Placeholder::Sibling(field) => found.parent.and_then(|p| p.get(field)).and_then(label_value),
                })
            };

            let name = sanitize(&render(&self.name));
            if name.is_empty() {
                warn!(expression = %expr, template = %self.name, "Metric name is empty after sanitizing");
                continue;
            }

            let mut sample = MetricSample::new(name, value);
            sample.label_names.extend(fixed.names().iter().cloned());
            sample.label_values.extend(fixed.values().iter().cloned());
            sample.label_names.extend(capture_names.iter().map(|n| n.to_string()));
            sample.label_values.extend(found.captures.iter().cloned());
            for label in &self.labels {
                sample.label_names.push(label.name.clone());
                sample.label_values.push(render(&label.value));
            }

            table.add(&self.help, self.metric_type, sample);
        }

        Ok(())
    }
}

fn check_templates(spec: &ExtractionSpec, captures: &[String], expression: &str) -> QueryResult<()> {
    let templates =
        std::iter::once(spec.name.as_str()).chain(spec.labels.iter().map(|l| l.value.as_str()));
    for template in templates {
        for placeholder in placeholders(template) {
            let known = match placeholder {
                Placeholder::Index(i) => (1..=captures.len()).contains(&i),
                Placeholder::Name(name) => captures.iter().any(|c| c == name),
                Placeholder::Sibling(_) => true,
            };
            if !known {
                return Err(QueryError::InvalidExpression {
                    expression: expression.to_string(),
                    reason: format!("template '{}' references an unknown capture", template),
                });
            }
        }
    }
    Ok(())
}

/// Where a query's response came from
///
/// Built fresh for every target; the identity label comes first, then
/// `collection` or `core` when the request targeted one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    identity: (&'static str, String),
    collection: Option<String>,
    core: Option<String>,
}

impl QueryContext {
    /// Response of a single node
    pub fn node(base_url: impl Into<String>) -> Self {
        Self {
            identity: ("base_url", base_url.into()),
            collection: None,
            core: None,
        }
    }

    /// Response describing the whole cluster
    pub fn cluster(identity: impl Into<String>) -> Self {
        Self {
            identity: ("zk_host", identity.into()),
            collection: None,
            core: None,
        }
    }

    /// Target the collection or core named by a spec
    pub fn targeting(self, spec: &QuerySpec) -> Self {
        Self {
            collection: spec.collection.clone(),
            core: spec.core.clone(),
            ..self
        }
    }

    /// Target a discovered core
    pub fn with_core(self, core: impl Into<String>) -> Self {
        Self {
            collection: None,
            core: Some(core.into()),
            ..self
        }
    }

    /// Fixed labels prepended to every sample
    pub fn labels(&self) -> FixedLabels {
        let mut labels = FixedLabels::new().with(self.identity.0, self.identity.1.clone());
        if let Some(collection) = &self.collection {
            labels = labels.with("collection", collection.clone());
        }
        if let Some(core) = &self.core {
            labels = labels.with("core", core.clone());
        }
        labels
    }
}

/// A query that compiled successfully
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    spec: QuerySpec,
    extractions: Vec<CompiledExtraction>,
}

impl CompiledQuery {
    /// Compile every extraction of a spec
    ///
    /// # Errors
    ///
    /// Returns the first extraction error, or `QueryError::InvalidSpec` when
    /// the spec itself is inconsistent.
    pub fn compile(spec: QuerySpec) -> QueryResult<Self> {
        let invalid = |reason: &str| QueryError::InvalidSpec {
            query: spec.display_name().to_string(),
            reason: reason.to_string(),
        };

        if spec.collection.is_some() && spec.core.is_some() {
            return Err(invalid("'collection' and 'core' are mutually exclusive"));
        }
        if spec.scope == QueryScope::EachCore && spec.target().is_some() {
            return Err(invalid("scope 'each_core' cannot target a collection or core"));
        }
        if !spec.path.starts_with('/') {
            return Err(invalid("path must start with '/'"));
        }
        if spec.extractions.is_empty() {
            return Err(invalid("no extractions declared"));
        }

        let extractions = spec
            .extractions
            .iter()
            .map(|e| CompiledExtraction::compile(e, spec.display_name()))
            .collect::<QueryResult<Vec<_>>>()?;

        Ok(Self { spec, extractions })
    }

    /// The spec this query was compiled from
    pub fn spec(&self) -> &QuerySpec {
        &self.spec
    }

    /// Number of extractions
    pub fn extraction_count(&self) -> usize {
        self.extractions.len()
    }

    /// Evaluate the query against one response
    ///
    /// # Errors
    ///
    /// Returns the first evaluation error; samples of earlier extractions
    /// are discarded along with it.
    pub fn evaluate(&self, response: &Value, context: &QueryContext) -> QueryResult<MetricTable> {
        let fixed = context.labels();
        let mut table = MetricTable::new();
        for extraction in &self.extractions {
            extraction.extract(response, &fixed, &mut table)?;
        }
        Ok(table)
    }
}

/// A query that failed to compile
#[derive(Debug)]
pub struct RejectedQuery {
    /// Display name of the spec
    pub name: String,
    /// Why it was rejected
    pub error: QueryError,
}

/// All user queries of the process
#[derive(Debug, Default)]
pub struct QueryEngine {
    queries: Vec<CompiledQuery>,
    rejected: Vec<RejectedQuery>,
}

impl QueryEngine {
    /// Compile all specs, logging and setting aside the ones that fail
    pub fn compile(specs: &[QuerySpec]) -> Self {
        let mut engine = Self::default();
        for spec in specs {
            let name = spec.display_name().to_string();
            match CompiledQuery::compile(spec.clone()) {
                Ok(query) => engine.queries.push(query),
                Err(e) => {
                    error!(query = %name, error = %e, "Query failed to compile, it will not run");
                    engine.rejected.push(RejectedQuery { name, error: e });
                }
            }
        }
        engine
    }

    /// Queries that compiled
    pub fn queries(&self) -> &[CompiledQuery] {
        &self.queries
    }

    /// Queries that did not compile
    pub fn rejected(&self) -> &[RejectedQuery] {
        &self.rejected
    }

    /// Take the rejected queries, dropping the compiled ones
    pub fn into_rejected(self) -> Vec<RejectedQuery> {
        self.rejected
    }

    /// Run one query against one response
    ///
    /// Evaluation errors are logged and produce an empty table.
    pub fn query(&self, response: &Value, query: &CompiledQuery, context: &QueryContext) -> MetricTable {
        match query.evaluate(response, context) {
            Ok(table) => table,
            Err(e) => {
                warn!(query = %query.spec.display_name(), error = %e, "Query evaluation failed");
                MetricTable::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extraction(path: &str, name: &str) -> ExtractionSpec {
        ExtractionSpec {
            path: Some(path.to_string()),
            name: name.to_string(),
            metric_type: MetricType::Gauge,
            ..ExtractionSpec::default()
        }
    }

    fn spec_with(extractions: Vec<ExtractionSpec>) -> QuerySpec {
        QuerySpec {
            collection: Some("techproducts".to_string()),
            extractions,
            ..QuerySpec::new("/select")
        }
    }

    fn facet_response() -> Value {
        json!({
            "responseHeader": {"status": 0},
            "facet_counts": {
                "facet_queries": {},
                "facet_fields": {
                    "manu_id_s": ["corsair", 3, "belkin", 2, "canon", 0]
                }
            }
        })
    }

    // ==========================================================================
    // PathExpr parsing tests
    // ==========================================================================

    #[test]
    fn test_parse_segments() {
        let expr = PathExpr::parse(r#"facet_counts."facet.fields".*.{field}.{term:pairs}"#).unwrap();
        assert_eq!(
            expr.segments,
            vec![
                Segment::Key("facet_counts".into()),
                Segment::Key("facet.fields".into()),
                Segment::Wildcard,
                Segment::Capture("field".into()),
                Segment::Pairs("term".into()),
            ]
        );
        assert_eq!(expr.capture_names().collect::<Vec<_>>(), vec!["field", "term"]);
    }

    #[test]
    fn test_parse_errors() {
        for bad in [
            "",
            "a..b",
            "a.",
            "a.{field",
            "a.field}",
            "a.{1field}",
            "a.{x:rows}",
            "\"open",
            "a.{x}.{x}",
            "a\"b\"",
        ] {
            assert!(
                matches!(PathExpr::parse(bad), Err(QueryError::InvalidExpression { .. })),
                "expected error for {:?}",
                bad
            );
        }
    }

    // ==========================================================================
    // PathExpr evaluation tests
    // ==========================================================================

    #[test]
    fn test_evaluate_pairs() {
        let response = facet_response();
        let expr = PathExpr::parse("facet_counts.facet_fields.{field}.{term:pairs}").unwrap();
        let found = expr.evaluate(&response).unwrap();

        assert_eq!(found.len(), 3);
        assert_eq!(found[0].captures, vec!["manu_id_s", "corsair"]);
        assert_eq!(found[0].value, &json!(3));
        assert_eq!(found[2].captures, vec!["manu_id_s", "canon"]);
    }

    #[test]
    fn test_evaluate_pairs_on_normalized_object() {
        let response = json!({"fields": {"manu": {"apple": 2}}});
        let expr = PathExpr::parse("fields.{field}.{term:pairs}").unwrap();
        let found = expr.evaluate(&response).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].captures, vec!["manu", "apple"]);
    }

    #[test]
    fn test_evaluate_array_index_and_capture() {
        let response = json!({"docs": [{"price": 1.5}, {"price": 2.5}]});

        let first = PathExpr::parse("docs.0.price").unwrap();
        assert_eq!(first.evaluate(&response).unwrap()[0].value, &json!(1.5));

        let all = PathExpr::parse("docs.{doc}.price").unwrap();
        let found = all.evaluate(&response).unwrap();
        assert_eq!(found[1].captures, vec!["1"]);
    }

    #[test]
    fn test_evaluate_missing_key_is_empty() {
        let expr = PathExpr::parse("facet_counts.facet_ranges.{field}").unwrap();
        assert!(expr.evaluate(&facet_response()).unwrap().is_empty());
    }

    #[test]
    fn test_evaluate_odd_pairs_is_error() {
        let response = json!({"list": ["a", 1, "b"]});
        let expr = PathExpr::parse("{key:pairs}").unwrap();
        assert!(expr.evaluate(&json!(["a", 1])).is_ok());

        let expr = PathExpr::parse("list.{key:pairs}").unwrap();
        assert!(matches!(
            expr.evaluate(&response),
            Err(QueryError::Evaluation { .. })
        ));
    }

    #[test]
    fn test_evaluate_non_string_pair_key_is_error() {
        let expr = PathExpr::parse("{key:pairs}").unwrap();
        assert!(expr.evaluate(&json!([1, 2])).is_err());
    }

    // ==========================================================================
    // Compilation tests
    // ==========================================================================

    #[test]
    fn test_compile_rejects_inconsistent_specs() {
        let mut both = spec_with(vec![extraction("a", "m")]);
        both.core = Some("core1".into());
        assert!(CompiledQuery::compile(both).is_err());

        let none = spec_with(vec![]);
        assert!(CompiledQuery::compile(none).is_err());

        let mut relative = spec_with(vec![extraction("a", "m")]);
        relative.path = "select".into();
        assert!(CompiledQuery::compile(relative).is_err());

        let mut each_core = spec_with(vec![extraction("a", "m")]);
        each_core.scope = QueryScope::EachCore;
        assert!(CompiledQuery::compile(each_core).is_err());
    }

    #[test]
    fn test_compile_rejects_bad_extractions() {
        let mut path_and_pattern = extraction("a", "m");
        path_and_pattern.pattern = Some("a".into());
        let reserved = extraction("a.{core}", "m");
        let mut duplicate = extraction("a.{x}", "m");
        duplicate.labels.push(RuleLabel {
            name: "x".into(),
            value: "v".into(),
        });

        for bad in [
            path_and_pattern,
            reserved,
            duplicate,
            extraction("a.{x}", "m_$y"),
            extraction("a.{x}", "m_$2"),
            extraction("a", ""),
            extraction("a", SCRAPE_DURATION_NAME),
            ExtractionSpec {
                pattern: Some("a[".into()),
                name: "m".into(),
                ..ExtractionSpec::default()
            },
        ] {
            assert!(CompiledQuery::compile(spec_with(vec![bad])).is_err());
        }
    }

    #[test]
    fn test_engine_rejects_scrape_duration_name() {
        let mut spec = spec_with(vec![extraction("response.numFound", SCRAPE_DURATION_NAME)]);
        spec.name = Some("shadow".into());

        let engine = QueryEngine::compile(&[spec]);
        assert!(engine.queries().is_empty());
        assert_eq!(engine.rejected()[0].name, "shadow");
        assert!(engine.rejected()[0].error.to_string().contains("reserved"));
    }

    #[test]
    fn test_engine_keeps_valid_and_rejects_invalid() {
        let good = spec_with(vec![extraction("a", "m")]);
        let mut bad = spec_with(vec![extraction("a..b", "m")]);
        bad.name = Some("broken".into());

        let engine = QueryEngine::compile(&[good, bad]);
        assert_eq!(engine.queries().len(), 1);
        assert_eq!(engine.rejected().len(), 1);
        assert_eq!(engine.rejected()[0].name, "broken");
    }

    #[test]
    fn test_request_params() {
        let spec: QuerySpec = serde_yaml::from_str(
            r#"
path: /select
params:
  - q: "*:*"
  - facet: true
  - facet.field: manu_id_s
  - facet.field: cat
  - rows: 0
extractions:
  - path: response.numFound
    name: solr_num_found
"#,
        )
        .unwrap();

        assert_eq!(
            spec.request_params(),
            vec![
                ("q".to_string(), "*:*".to_string()),
                ("facet".to_string(), "true".to_string()),
                ("facet.field".to_string(), "manu_id_s".to_string()),
                ("facet.field".to_string(), "cat".to_string()),
                ("rows".to_string(), "0".to_string()),
            ]
        );
        assert_eq!(spec.display_name(), "/select");
        assert_eq!(spec.scope, QueryScope::Node);
    }

    // ==========================================================================
    // Query evaluation tests
    // ==========================================================================

    #[test]
    fn test_query_facet_terms_with_identity_labels() {
        let spec = spec_with(vec![ExtractionSpec {
            help: Some("Documents per facet term".into()),
            ..extraction(
                "facet_counts.facet_fields.{field}.{term:pairs}",
                "solr_facet_field_count",
            )
        }]);
        let engine = QueryEngine::compile(&[spec]);
        let query = &engine.queries()[0];
        let context = QueryContext::node("http://localhost:8983/solr").targeting(query.spec());

        let table = engine.query(&facet_response(), query, &context);

        let family = table.family("solr_facet_field_count").unwrap();
        assert_eq!(family.help, "Documents per facet term");
        assert_eq!(family.label_names, vec!["base_url", "collection", "field", "term"]);
        assert_eq!(family.len(), 3);
        assert_eq!(
            family.samples()[1].label_values,
            vec!["http://localhost:8983/solr", "techproducts", "manu_id_s", "belkin"]
        );
        assert_eq!(family.samples()[1].value, 2.0);
    }

    #[test]
    fn test_query_name_template_and_sibling_label() {
        let response = json!({
            "cluster": {"collections": {
                "c1": {"replicationFactor": "2", "configName": "_default"}
            }}
        });
        let spec = QuerySpec {
            scope: QueryScope::Cluster,
            extractions: vec![ExtractionSpec {
                value: ValueTransform::ParseNumber,
                labels: vec![RuleLabel {
                    name: "config".into(),
                    value: "@configName".into(),
                }],
                ..extraction("cluster.collections.{collection_name}.replicationFactor", "solr_${collection_name}_rf")
            }],
            ..QuerySpec::new("/admin/collections")
        };
        let query = CompiledQuery::compile(spec).unwrap();

        let table = query
            .evaluate(&response, &QueryContext::cluster("zk1:2181"))
            .unwrap();

        let family = table.family("solr_c1_rf").unwrap();
        assert_eq!(family.label_names, vec!["zk_host", "collection_name", "config"]);
        assert_eq!(family.samples()[0].label_values, vec!["zk1:2181", "c1", "_default"]);
        assert_eq!(family.samples()[0].value, 2.0);
    }

    #[test]
    fn test_query_pattern_extraction() {
        let response = json!({"status": {"core1": {"numDocs": 42, "deletedDocs": 0}}});
        let spec = QuerySpec {
            extractions: vec![ExtractionSpec {
                pattern: Some(r"status\.(?<name>[^.]+)\.numDocs".into()),
                name: "core_documents_total".into(),
                metric_type: MetricType::Gauge,
                ..ExtractionSpec::default()
            }],
            ..QuerySpec::new("/admin/cores")
        };
        let query = CompiledQuery::compile(spec).unwrap();

        let table = query
            .evaluate(&response, &QueryContext::node("http://h:8983/solr"))
            .unwrap();

        let family = table.family("core_documents_total").unwrap();
        assert_eq!(family.label_names, vec!["base_url", "name"]);
        assert_eq!(family.samples()[0].label_values, vec!["http://h:8983/solr", "core1"]);
        assert_eq!(family.samples()[0].value, 42.0);
    }

    #[test]
    fn test_query_each_core_context() {
        let context = QueryContext::node("http://h:8983/solr").with_core("core2");
        let labels = context.labels();
        assert_eq!(labels.names(), &["base_url".to_string(), "core".to_string()]);
        assert_eq!(labels.values()[1], "core2");
    }

    #[test]
    fn test_query_runtime_error_yields_empty_table() {
        let spec = spec_with(vec![
            extraction("response.numFound", "solr_num_found"),
            extraction("facet_counts.facet_fields.{field}.{term:pairs}", "solr_facet"),
        ]);
        let engine = QueryEngine::compile(&[spec]);
        let response = json!({
            "response": {"numFound": 5},
            "facet_counts": {"facet_fields": {"manu": ["apple", 1, "dangling"]}}
        });

        let table = engine.query(&response, &engine.queries()[0], &QueryContext::node("u"));
        assert!(table.is_empty());

        let ok = json!({"response": {"numFound": 5}});
        let table = engine.query(&ok, &engine.queries()[0], &QueryContext::node("u"));
        assert_eq!(table.sample_count(), 1);
    }

    #[test]
    fn test_query_non_numeric_values_skipped() {
        let spec = spec_with(vec![extraction("stats.*", "solr_stat")]);
        let query = CompiledQuery::compile(spec).unwrap();
        let response = json!({"stats": {"a": 1, "b": "two", "c": null, "d": {"nested": 1}}});

        let table = query.evaluate(&response, &QueryContext::node("u")).unwrap();
        assert_eq!(table.sample_count(), 1);
        assert_eq!(table.family("solr_stat").unwrap().samples()[0].value, 1.0);
    }
}
