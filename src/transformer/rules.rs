//! Rule-based metric transformation module
//!
//! This module provides rule definitions for turning flattened Solr response
//! keys into metric samples. A rule pairs an anchored regex over the full
//! flattened key with a metric name template, an ordered list of label
//! templates and a value transform.
//!
//! # Templates
//!
//! Name and label templates support:
//! - `$1`, `$2`: numbered capture groups
//! - `$name` / `${name}`: named capture groups (`$name` stops at the first
//!   non-alphanumeric character, use braces for names containing `_`)
//! - `@field`: a scalar sibling of the matched leaf, e.g. the `core` next
//!   to a replica's `state`
//!
//! Missing captures and siblings render as the empty string.
//!
//! # Example
//!
//! ```ignore
//! use rsolr_exporter::transformer::rules::{Rule, RuleSet, MetricType};
//!
//! let rules = RuleSet::from_rules(vec![
//!     Rule::builder(r"status\|(?<core>[^|]+)\|index\|numDocs")
//!         .name("solr_core_index_num_docs")
//!         .metric_type(MetricType::Gauge)
//!         .capture("core")
//!         .build(),
//! ]);
//!
//! rules.validate_all()?;
//! ```

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::OnceCell;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use super::sanitize::is_valid_label_name;
pub use crate::error::RuleError;

/// Result type for rule operations
pub type RuleResult<T> = Result<T, RuleError>;

/// Prometheus metric type
///
/// The default type is `Untyped` when not specified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MetricType {
    /// Gauge metric - a value that can go up and down
    Gauge,
    /// Counter metric - a monotonically increasing value
    Counter,
    /// Untyped metric - type is not specified
    #[default]
    Untyped,
}

impl MetricType {
    /// Returns the Prometheus type string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Gauge => "gauge",
            MetricType::Counter => "counter",
            MetricType::Untyped => "untyped",
        }
    }
}

impl Serialize for MetricType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetricType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "gauge" => Ok(MetricType::Gauge),
            "counter" => Ok(MetricType::Counter),
            "untyped" => Ok(MetricType::Untyped),
            other => Err(serde::de::Error::custom(format!(
                "unknown metric type '{}', expected one of: gauge, counter, untyped",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a raw scalar becomes a sample value
///
/// Anything a transform does not accept yields no sample. Plain `number`
/// never coerces strings; string-encoded numbers (Solr reports
/// `replicationFactor` as `"1"`) need `parse_number`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueTransform {
    /// JSON numbers only
    #[default]
    Number,
    /// JSON numbers and numeric strings
    ParseNumber,
    /// `true`/`false` (bool or string) to 1/0
    Boolean,
    /// 1 if the string equals `expected`, 0 for any other string
    Equals { expected: String },
    /// Lookup table for enumerated string states
    Mapping {
        values: BTreeMap<String, f64>,
        #[serde(default)]
        default: f64,
    },
}

impl ValueTransform {
    /// Apply the transform to a raw scalar
    pub fn apply(&self, raw: &Value) -> Option<f64> {
        match (self, raw) {
            (_, Value::Null) => None,
            (ValueTransform::Number | ValueTransform::ParseNumber, Value::Number(n)) => n.as_f64(),
            (ValueTransform::ParseNumber, Value::String(s)) => s.trim().parse().ok(),
            (ValueTransform::Boolean, Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
            (ValueTransform::Boolean, Value::String(s)) => match s.as_str() {
                "true" => Some(1.0),
                "false" => Some(0.0),
                _ => None,
            },
            (ValueTransform::Equals { expected }, Value::String(s)) => {
                Some(if s == expected { 1.0 } else { 0.0 })
            }
            (ValueTransform::Mapping { values, default }, Value::String(s)) => {
                Some(values.get(s).copied().unwrap_or(*default))
            }
            _ => None,
        }
    }

    /// Mapping transform from a static table
    pub fn mapping(values: &[(&str, f64)], default: f64) -> Self {
        ValueTransform::Mapping {
            values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            default,
        }
    }
}

/// Render a scalar as a label value
pub fn label_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// One entry of a rule's label schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleLabel {
    /// Label name
    pub name: String,
    /// Value template
    pub value: String,
}

/// Metric transformation rule
///
/// # Example Configuration (YAML)
///
/// ```yaml
/// pattern: 'status\.(?<core>[^.]+)\.index\.numDocs'
/// name: solr_core_index_num_docs
/// type: gauge
/// help: "Number of documents in the core index"
/// labels:
///   - name: core
///     value: "$core"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Regex pattern, matched against the whole flattened key
    pub pattern: String,

    /// Output metric name template
    #[serde(default)]
    pub name: String,

    /// Prometheus metric type
    #[serde(rename = "type", default)]
    pub metric_type: MetricType,

    /// Help text for the metric
    #[serde(default)]
    pub help: Option<String>,

    /// Ordered label schema
    #[serde(default)]
    pub labels: Vec<RuleLabel>,

    /// Value transform
    #[serde(default)]
    pub value: ValueTransform,

    /// Factor to multiply the value by
    ///
    /// Used for unit conversions (e.g., milliseconds to seconds: 0.001)
    #[serde(default, alias = "valueFactor")]
    pub value_factor: Option<f64>,

    /// Compiled regex pattern (internal, not serialized)
    #[serde(skip)]
    compiled_pattern: OnceCell<Regex>,
}

impl Rule {
    /// Create a new rule with the given pattern, name, and metric type
    pub fn new(
        pattern: impl Into<String>,
        name: impl Into<String>,
        metric_type: MetricType,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            name: name.into(),
            metric_type,
            ..Self::default()
        }
    }

    /// Create a new rule builder for fluent configuration
    pub fn builder(pattern: impl Into<String>) -> RuleBuilder {
        RuleBuilder::new(pattern)
    }

    /// Add a label to the rule
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push(RuleLabel {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Set the help text
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Set the value transform
    pub fn with_value(mut self, value: ValueTransform) -> Self {
        self.value = value;
        self
    }

    /// Set the value factor
    pub fn with_value_factor(mut self, factor: f64) -> Self {
        self.value_factor = Some(factor);
        self
    }

    /// Compile the regex pattern
    ///
    /// The pattern is anchored on both ends. Compilation happens once, later
    /// calls return the cached regex.
    ///
    /// # Errors
    ///
    /// Returns `RuleError::InvalidPattern` if the pattern is not valid regex.
    pub fn compile(&self) -> RuleResult<&Regex> {
        self.compiled_pattern.get_or_try_init(|| {
            Regex::new(&format!("^(?:{})$", self.pattern)).map_err(|e| {
                RuleError::InvalidPattern {
                    pattern: self.pattern.clone(),
                    source: e,
                }
            })
        })
    }

    /// Check if the rule matches the given flattened key
    ///
    /// # Errors
    ///
    /// Returns an error if pattern compilation fails.
    pub fn matches<'a>(&'a self, input: &'a str) -> RuleResult<Option<RuleMatch<'a>>> {
        let regex = self.compile()?;
        Ok(regex.captures(input).map(|caps| RuleMatch {
            rule: self,
            captures: caps,
        }))
    }

    /// Label names in schema order
    pub fn label_names(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(|l| l.name.as_str())
    }

    /// Turn a raw scalar into a sample value
    pub fn value_of(&self, raw: &Value) -> Option<f64> {
        let value = self.value.apply(raw)?;
        Some(match self.value_factor {
            Some(factor) => value * factor,
            None => value,
        })
    }

    /// Validate the rule configuration
    ///
    /// Checks the pattern, that the name is not empty, that label names are
    /// valid and unique, and that every capture referenced by a template
    /// exists in the pattern.
    pub fn validate(&self) -> RuleResult<()> {
        let regex = self.compile()?;

        if self.name.is_empty() {
            return Err(RuleError::ValidationError(
                "Rule name cannot be empty".to_string(),
            ));
        }

        if let Some(factor) = self.value_factor {
            if factor.is_nan() || factor.is_infinite() {
                return Err(RuleError::ValidationError(
                    "Value factor must be a finite number".to_string(),
                ));
            }
        }

        let mut seen = HashSet::new();
        for label in &self.labels {
            if !is_valid_label_name(&label.name) {
                return Err(RuleError::InvalidLabel {
                    name: label.name.clone(),
                    reason: "must match [a-zA-Z_][a-zA-Z0-9_]* and not start with '__'"
                        .to_string(),
                });
            }
            if !seen.insert(label.name.as_str()) {
                return Err(RuleError::InvalidLabel {
                    name: label.name.clone(),
                    reason: "declared more than once".to_string(),
                });
            }
        }

        let group_names: HashSet<&str> = regex.capture_names().flatten().collect();
        let templates = std::iter::once(self.name.as_str())
            .chain(self.labels.iter().map(|l| l.value.as_str()));
        for template in templates {
            for placeholder in placeholders(template) {
                match placeholder {
                    Placeholder::Index(i) if i >= regex.captures_len() => {
                        return Err(RuleError::InvalidNameTemplate {
                            template: template.to_string(),
                            reason: format!("capture group ${} does not exist", i),
                        });
                    }
                    Placeholder::Name(name) if !group_names.contains(name) => {
                        return Err(RuleError::InvalidNameTemplate {
                            template: template.to_string(),
                            reason: format!("capture group '{}' does not exist", name),
                        });
                    }
                    _ => {}
                }
            }
        }

        Ok(())
    }
}

impl Default for Rule {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            name: String::new(),
            metric_type: MetricType::default(),
            help: None,
            labels: Vec::new(),
            value: ValueTransform::default(),
            value_factor: None,
            compiled_pattern: OnceCell::new(),
        }
    }
}

/// Builder for creating Rule instances with fluent API
pub struct RuleBuilder {
    rule: Rule,
}

impl RuleBuilder {
    /// Create a new rule builder
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            rule: Rule {
                pattern: pattern.into(),
                ..Rule::default()
            },
        }
    }

    /// Set the metric name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.rule.name = name.into();
        self
    }

    /// Set the metric type
    pub fn metric_type(mut self, metric_type: MetricType) -> Self {
        self.rule.metric_type = metric_type;
        self
    }

    /// Shorthand for `metric_type(MetricType::Gauge)`
    pub fn gauge(self) -> Self {
        self.metric_type(MetricType::Gauge)
    }

    /// Shorthand for `metric_type(MetricType::Counter)`
    pub fn counter(self) -> Self {
        self.metric_type(MetricType::Counter)
    }

    /// Add a label with a value template
    pub fn label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.rule.labels.push(RuleLabel {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Add a label filled from the capture group of the same name
    pub fn capture(self, group: &str) -> Self {
        self.label(group, format!("${{{}}}", group))
    }

    /// Add a label filled from the sibling scalar of the same name
    pub fn sibling(self, field: &str) -> Self {
        self.label(field, format!("@{}", field))
    }

    /// Set help text
    pub fn help(mut self, help: impl Into<String>) -> Self {
        self.rule.help = Some(help.into());
        self
    }

    /// Set value transform
    pub fn value(mut self, value: ValueTransform) -> Self {
        self.rule.value = value;
        self
    }

    /// Set value factor
    pub fn value_factor(mut self, factor: f64) -> Self {
        self.rule.value_factor = Some(factor);
        self
    }

    /// Milliseconds to seconds
    pub fn millis(self) -> Self {
        self.value_factor(0.001)
    }

    /// Build the rule
    pub fn build(self) -> Rule {
        self.rule
    }
}

/// Result of a successful rule match
pub struct RuleMatch<'a> {
    /// The rule that matched
    pub rule: &'a Rule,
    /// The regex captures from the match
    pub captures: regex::Captures<'a>,
}

impl<'a> RuleMatch<'a> {
    /// Get the full matched string
    pub fn as_str(&self) -> &str {
        self.captures.get(0).map(|m| m.as_str()).unwrap_or("")
    }

    /// Get a capture group by index (1-based)
    pub fn get(&self, index: usize) -> Option<&str> {
        self.captures.get(index).map(|m| m.as_str())
    }

    /// Get a capture group by name
    pub fn name(&self, name: &str) -> Option<&str> {
        self.captures.name(name).map(|m| m.as_str())
    }

    /// Render a template against the captures and the given sibling lookup
    pub fn render(&self, template: &str, siblings: &dyn Fn(&str) -> Option<String>) -> String {
        apply_substitution(template, |placeholder| match placeholder {
            Placeholder::Index(i) => self.get(i).map(str::to_string),
            Placeholder::Name(name) => self.name(name).map(str::to_string),
            Placeholder::Sibling(field) => siblings(field),
        })
    }

    /// Generate the raw (unsanitized) metric name
    pub fn metric_name(&self) -> String {
        self.render(&self.rule.name, &|_| None)
    }

    /// Generate label values in schema order
    pub fn label_values(&self, siblings: &dyn Fn(&str) -> Option<String>) -> Vec<String> {
        self.rule
            .labels
            .iter()
            .map(|label| self.render(&label.value, siblings))
            .collect()
    }

    /// Get the metric type
    pub fn metric_type(&self) -> MetricType {
        self.rule.metric_type
    }

    /// Get the help text
    pub fn help(&self) -> Option<&str> {
        self.rule.help.as_deref()
    }
}

/// Ordered collection of transformation rules
///
/// Earlier rules take precedence: [`RuleSet::find_match`] returns the first
/// rule whose pattern matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Create a new empty rule set
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Create a rule set from a vector of rules
    pub fn from_rules(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Add a rule to the set
    pub fn add(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Get the number of rules
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Check if the rule set is empty
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Validate all rules in the set
    pub fn validate_all(&self) -> RuleResult<()> {
        for (index, rule) in self.rules.iter().enumerate() {
            rule.validate().map_err(|e| {
                RuleError::ValidationError(format!("Rule {} validation failed: {}", index, e))
            })?;
        }
        Ok(())
    }

    /// Find the first rule that matches the flattened key
    pub fn find_match<'a>(&'a self, input: &'a str) -> RuleResult<Option<RuleMatch<'a>>> {
        for rule in &self.rules {
            if let Some(m) = rule.matches(input)? {
                return Ok(Some(m));
            }
        }
        Ok(None)
    }

    /// Iterate over all rules
    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    /// Get a rule by index
    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        Self {
            rules: iter.into_iter().collect(),
        }
    }
}

/// A reference inside a name or label template
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder<'t> {
    /// `$1`
    Index(usize),
    /// `$name` or `${name}`
    Name(&'t str),
    /// `@field`
    Sibling(&'t str),
}

/// Collect the placeholders referenced by a template
pub fn placeholders(template: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    apply_substitution(template, |p| {
        found.push(p);
        None
    });
    found
}

/// Substitute placeholders in a template
///
/// `resolve` returns the replacement for each placeholder; `None` renders
/// as the empty string. A `$` or `@` that does not start a placeholder is
/// kept literally.
pub fn apply_substitution<'t, F>(template: &'t str, mut resolve: F) -> String
where
    F: FnMut(Placeholder<'t>) -> Option<String>,
{
    let mut result = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < template.len() {
        let c = bytes[i];
        // '$' and '@' are ASCII, so i + 1 is a char boundary when either matched
        let rest = if c == b'$' || c == b'@' {
            &template[i + 1..]
        } else {
            ""
        };

        if c == b'$' {
            if let Some(digits) = leading(rest, |b| b.is_ascii_digit()) {
                if let Ok(index) = digits.parse::<usize>() {
                    result.push_str(&resolve(Placeholder::Index(index)).unwrap_or_default());
                }
                i += 1 + digits.len();
                continue;
            }
            if let Some(inner) = rest.strip_prefix('{') {
                if let Some(end) = inner.find('}') {
                    let name = &inner[..end];
                    result.push_str(&resolve(Placeholder::Name(name)).unwrap_or_default());
                    i += 2 + end + 1;
                    continue;
                }
            }
            // $name stops at '_' so that "$type_$attr" works
            if rest.starts_with(|ch: char| ch.is_ascii_alphabetic()) {
                if let Some(name) = leading(rest, |b| b.is_ascii_alphanumeric()) {
                    result.push_str(&resolve(Placeholder::Name(name)).unwrap_or_default());
                    i += 1 + name.len();
                    continue;
                }
            }
        } else if c == b'@' && rest.starts_with(|ch: char| ch.is_ascii_alphabetic() || ch == '_') {
            if let Some(field) = leading(rest, |b| b.is_ascii_alphanumeric() || b == b'_') {
                result.push_str(&resolve(Placeholder::Sibling(field)).unwrap_or_default());
                i += 1 + field.len();
                continue;
            }
        }

        let ch = template[i..].chars().next().unwrap_or_default();
        result.push(ch);
        i += ch.len_utf8();
    }

    result
}

fn leading(s: &str, accept: impl Fn(u8) -> bool) -> Option<&str> {
    let end = s.bytes().position(|b| !accept(b)).unwrap_or(s.len());
    (end > 0).then(|| &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // ==========================================================================
    // MetricType tests
    // ==========================================================================

    #[test]
    fn test_metric_type_default() {
        assert_eq!(MetricType::default(), MetricType::Untyped);
    }

    #[test]
    fn test_metric_type_display() {
        assert_eq!(format!("{}", MetricType::Gauge), "gauge");
        assert_eq!(format!("{}", MetricType::Counter), "counter");
        assert_eq!(format!("{}", MetricType::Untyped), "untyped");
    }

    #[test]
    fn test_metric_type_deserialize_case_insensitive() {
        let gauge: MetricType = serde_json::from_str("\"GAUGE\"").unwrap();
        assert_eq!(gauge, MetricType::Gauge);

        let counter: MetricType = serde_json::from_str("\"Counter\"").unwrap();
        assert_eq!(counter, MetricType::Counter);
    }

    #[test]
    fn test_metric_type_deserialize_invalid() {
        let result: Result<MetricType, _> = serde_json::from_str("\"histogram\"");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown metric type"));
    }

    // ==========================================================================
    // ValueTransform tests
    // ==========================================================================

    #[test]
    fn test_number_does_not_coerce_strings() {
        assert_eq!(ValueTransform::Number.apply(&json!(42)), Some(42.0));
        assert_eq!(ValueTransform::Number.apply(&json!("42")), None);
        assert_eq!(ValueTransform::Number.apply(&json!(true)), None);
        assert_eq!(ValueTransform::Number.apply(&Value::Null), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(ValueTransform::ParseNumber.apply(&json!("2")), Some(2.0));
        assert_eq!(ValueTransform::ParseNumber.apply(&json!(1.5)), Some(1.5));
        assert_eq!(ValueTransform::ParseNumber.apply(&json!("n/a")), None);
    }

    #[test]
    fn test_boolean() {
        assert_eq!(ValueTransform::Boolean.apply(&json!(true)), Some(1.0));
        assert_eq!(ValueTransform::Boolean.apply(&json!("false")), Some(0.0));
        assert_eq!(ValueTransform::Boolean.apply(&json!("yes")), None);
    }

    #[test]
    fn test_equals_ping_status() {
        let ping = ValueTransform::Equals {
            expected: "OK".to_string(),
        };
        assert_eq!(ping.apply(&json!("OK")), Some(1.0));
        assert_eq!(ping.apply(&json!("FAIL")), Some(0.0));
        assert_eq!(ping.apply(&json!("")), Some(0.0));
        assert_eq!(ping.apply(&json!(1)), None);
    }

    #[test]
    fn test_mapping() {
        let states = ValueTransform::mapping(&[("active", 5.0), ("down", 3.0)], 0.0);
        assert_eq!(states.apply(&json!("active")), Some(5.0));
        assert_eq!(states.apply(&json!("down")), Some(3.0));
        assert_eq!(states.apply(&json!("gone")), Some(0.0));
    }

    #[test]
    fn test_value_transform_yaml() {
        let yaml = r#"
kind: mapping
values:
  active: 1
  inactive: 0
default: -1
"#;
        let transform: ValueTransform = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(transform.apply(&json!("unknown")), Some(-1.0));

        let transform: ValueTransform = serde_yaml::from_str("kind: equals\nexpected: OK").unwrap();
        assert_eq!(transform.apply(&json!("OK")), Some(1.0));
    }

    // ==========================================================================
    // Rule tests
    // ==========================================================================

    #[test]
    fn test_rule_builder() {
        let rule = Rule::builder(r"status\.(?<core>[^.]+)\.uptime")
            .name("solr_core_uptime_seconds")
            .gauge()
            .capture("core")
            .help("Core uptime")
            .millis()
            .build();

        assert_eq!(rule.name, "solr_core_uptime_seconds");
        assert_eq!(rule.metric_type, MetricType::Gauge);
        assert_eq!(rule.label_names().collect::<Vec<_>>(), vec!["core"]);
        assert_eq!(rule.labels[0].value, "${core}");
        assert_eq!(rule.value_factor, Some(0.001));
        assert_eq!(rule.value_of(&json!(1500)), Some(1.5));
    }

    #[test]
    fn test_rule_pattern_is_anchored() {
        let rule = Rule::new(r"status", "solr_ping", MetricType::Gauge);
        assert!(rule.matches("status").unwrap().is_some());
        assert!(rule.matches("responseHeader.status").unwrap().is_none());
        assert!(rule.matches("status.code").unwrap().is_none());
    }

    #[test]
    fn test_rule_compile_invalid() {
        let rule = Rule::new(r"status[", "metric", MetricType::Gauge);
        match rule.compile() {
            Err(RuleError::InvalidPattern { pattern, .. }) => assert_eq!(pattern, "status["),
            _ => panic!("Expected InvalidPattern error"),
        }
    }

    #[test]
    fn test_rule_match_captures() {
        let rule = Rule::builder(r"metrics\|solr\.jvm\|gc\.(?<collector>[^|]+)\.(count|time)")
            .name("solr_metrics_jvm_gc_$2")
            .capture("collector")
            .build();

        let m = rule
            .matches("metrics|solr.jvm|gc.G1-Young-Generation.count")
            .unwrap()
            .unwrap();

        assert_eq!(m.name("collector"), Some("G1-Young-Generation"));
        assert_eq!(m.get(2), Some("count"));
        assert_eq!(m.metric_name(), "solr_metrics_jvm_gc_count");
        assert_eq!(m.label_values(&|_| None), vec!["G1-Young-Generation"]);
    }

    #[test]
    fn test_rule_sibling_labels() {
        let rule = Rule::builder(r"replicas\|(?<replica>[^|]+)\|state")
            .name("solr_collections_replica_state")
            .capture("replica")
            .sibling("core")
            .label("node", "@node_name")
            .build();

        let m = rule.matches("replicas|core_node2|state").unwrap().unwrap();
        let siblings = |field: &str| match field {
            "core" => Some("c1_shard1_replica_n1".to_string()),
            "node_name" => Some("host:8983_solr".to_string()),
            _ => None,
        };

        assert_eq!(
            m.label_values(&siblings),
            vec!["core_node2", "c1_shard1_replica_n1", "host:8983_solr"]
        );
    }

    #[test]
    fn test_rule_validate_empty_name() {
        let rule = Rule::new(r"pattern", "", MetricType::Gauge);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_rule_validate_invalid_value_factor() {
        let rule = Rule::new(r"pattern", "name", MetricType::Gauge).with_value_factor(f64::NAN);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_rule_validate_unknown_capture() {
        let rule = Rule::new(r"status\.(?<core>\w+)", "solr_$name", MetricType::Gauge);
        assert!(matches!(
            rule.validate(),
            Err(RuleError::InvalidNameTemplate { .. })
        ));

        let rule = Rule::new(r"status\.(\w+)", "solr_$2", MetricType::Gauge);
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_rule_validate_labels() {
        let rule = Rule::builder(r"(?<core>\w+)")
            .name("m")
            .capture("core")
            .capture("core")
            .build();
        assert!(matches!(rule.validate(), Err(RuleError::InvalidLabel { .. })));

        let rule = Rule::builder(r"(?<core>\w+)")
            .name("m")
            .label("base-url", "x")
            .build();
        assert!(matches!(rule.validate(), Err(RuleError::InvalidLabel { .. })));
    }

    #[test]
    fn test_rule_yaml_config() {
        let yaml = r#"
pattern: 'status\.(?<core>[^.]+)\.index\.numDocs'
name: solr_core_index_num_docs
type: gauge
labels:
  - name: core
    value: "$core"
help: "Number of documents"
value:
  kind: parse_number
valueFactor: 1.0
"#;

        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.metric_type, MetricType::Gauge);
        assert_eq!(rule.labels[0].name, "core");
        assert_eq!(rule.value, ValueTransform::ParseNumber);
        assert_eq!(rule.value_factor, Some(1.0));
        assert!(rule.validate().is_ok());
    }

    // ==========================================================================
    // RuleSet tests
    // ==========================================================================

    #[test]
    fn test_ruleset_first_match_wins() {
        let ruleset = RuleSet::from_rules(vec![
            Rule::new(r"status\.core1\.numDocs", "specific", MetricType::Gauge),
            Rule::new(r"status\.[^.]+\.numDocs", "generic", MetricType::Gauge),
        ]);

        let m = ruleset.find_match("status.core1.numDocs").unwrap().unwrap();
        assert_eq!(m.rule.name, "specific");

        let m = ruleset.find_match("status.core2.numDocs").unwrap().unwrap();
        assert_eq!(m.rule.name, "generic");

        assert!(ruleset.find_match("status.core2.maxDoc").unwrap().is_none());
    }

    #[test]
    fn test_ruleset_validate_all_invalid_pattern() {
        let ruleset = RuleSet::from_rules(vec![
            Rule::new(r"valid", "name", MetricType::Gauge),
            Rule::new(r"invalid[", "name", MetricType::Gauge),
        ]);
        assert!(ruleset.validate_all().is_err());
    }

    #[test]
    fn test_ruleset_from_iter_and_get() {
        let ruleset: RuleSet = vec![
            Rule::new("p1", "n1", MetricType::Gauge),
            Rule::new("p2", "n2", MetricType::Counter),
        ]
        .into_iter()
        .collect();

        assert_eq!(ruleset.len(), 2);
        assert_eq!(ruleset.get(1).map(|r| r.name.as_str()), Some("n2"));
        assert!(ruleset.get(2).is_none());
        let names: Vec<_> = ruleset.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["n1", "n2"]);
    }

    // ==========================================================================
    // Substitution tests
    // ==========================================================================

    fn resolve_fixture(p: Placeholder<'_>) -> Option<String> {
        match p {
            Placeholder::Index(1) => Some("QUERY".into()),
            Placeholder::Index(2) => Some("/select".into()),
            Placeholder::Name("type") => Some("numDocs".into()),
            Placeholder::Name("base_url") => Some("http://h:8983/solr".into()),
            Placeholder::Sibling("core") => Some("core1".into()),
            _ => None,
        }
    }

    #[test]
    fn test_apply_substitution_numeric() {
        assert_eq!(
            apply_substitution("solr_$1_$2", resolve_fixture),
            "solr_QUERY_/select"
        );
    }

    #[test]
    fn test_apply_substitution_named_stops_at_underscore() {
        assert_eq!(
            apply_substitution("searcher_$type_total", resolve_fixture),
            "searcher_numDocs_total"
        );
        assert_eq!(apply_substitution("${base_url}", resolve_fixture), "http://h:8983/solr");
    }

    #[test]
    fn test_apply_substitution_sibling() {
        assert_eq!(apply_substitution("@core/x", resolve_fixture), "core1/x");
    }

    #[test]
    fn test_apply_substitution_missing_and_literal() {
        assert_eq!(apply_substitution("a_$3_b", resolve_fixture), "a__b");
        assert_eq!(apply_substitution("price_$", resolve_fixture), "price_$");
        assert_eq!(apply_substitution("user@ 1", resolve_fixture), "user@ 1");
        assert_eq!(apply_substitution("ünï$1", resolve_fixture), "ünïQUERY");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(
            placeholders("a_$1_${core}_@node_name"),
            vec![
                Placeholder::Index(1),
                Placeholder::Name("core"),
                Placeholder::Sibling("node_name"),
            ]
        );
    }
}
