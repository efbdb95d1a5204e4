//! Rule matcher - flattened Solr responses to metric samples
//!
//! A [`RuleMatcher`] owns an ordered [`RuleSet`] and the delimiter its
//! patterns were written against. For every flattened entry the first
//! matching rule decides the metric name, label values and sample value;
//! entries no rule matches are dropped.

use serde_json::Value;
use tracing::{debug, trace, warn};

use super::aggregate::{AddOutcome, MetricSample, MetricTable};
use super::flatten::{flatten, FlatMap};
use super::rules::{label_value, MetricType, RuleSet};
use super::sanitize::sanitize;

/// Labels prepended to every sample produced for one response
///
/// Typically the polled node (`base_url`) or the cluster identity, plus
/// whatever the caller already knows about the target (core, collection).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FixedLabels {
    names: Vec<String>,
    values: Vec<String>,
}

impl FixedLabels {
    /// Create an empty label set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a label
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.names.push(name.into());
        self.values.push(value.into());
        self
    }

    /// Label names in order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Label values in order
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Check if there are no labels
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A sample produced by a rule, with the family metadata of that rule
#[derive(Debug, Clone)]
pub struct MatchedSample {
    /// Help text for the family
    pub help: String,
    /// Type of the family
    pub metric_type: MetricType,
    /// The sample itself
    pub sample: MetricSample,
}

/// Ordered rule table bound to a key delimiter
#[derive(Debug, Clone)]
pub struct RuleMatcher {
    rules: RuleSet,
    delimiter: String,
    default_help: String,
}

impl RuleMatcher {
    /// Create a matcher using `.` as the key delimiter
    ///
    /// # Example
    ///
    /// ```ignore
    /// use rsolr_exporter::transformer::{Rule, RuleMatcher, RuleSet};
    ///
    /// let matcher = RuleMatcher::new(RuleSet::from_rules(vec![
    ///     Rule::builder(r"status\.(?<core>[^.]+)\.numDocs")
    ///         .name("core_documents_total")
    ///         .capture("core")
    ///         .build(),
    /// ]));
    /// ```
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            delimiter: ".".to_string(),
            default_help: String::new(),
        }
    }

    /// Set the delimiter flattened keys are joined with
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    /// Set the help text used by rules without their own
    pub fn with_default_help(mut self, help: impl Into<String>) -> Self {
        self.default_help = help.into();
        self
    }

    /// Get a reference to the rule set
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Key delimiter
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Match a single flattened entry
    ///
    /// Returns `None` when no rule matches, when the value is not numeric for
    /// the matching rule, or when the generated name is empty.
    pub fn match_entry(&self, key: &str, value: &Value) -> Option<MatchedSample> {
        self.match_in(key, value, &FixedLabels::new(), None)
    }

    /// Match a flattened entry with fixed labels and sibling lookup
    pub fn match_in(
        &self,
        key: &str,
        value: &Value,
        fixed: &FixedLabels,
        flat: Option<&FlatMap<'_>>,
    ) -> Option<MatchedSample> {
        let rule_match = match self.rules.find_match(key) {
            Ok(Some(m)) => m,
            Ok(None) => {
                trace!(key = %key, "No matching rule found");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Rule failed to compile, skipping entry");
                return None;
            }
        };

        let Some(number) = rule_match.rule.value_of(value) else {
            debug!(key = %key, value = %value, "Non-numeric value, skipping");
            return None;
        };

        let name = sanitize(&rule_match.metric_name());
        if name.is_empty() {
            warn!(key = %key, template = %rule_match.rule.name, "Metric name is empty after sanitizing");
            return None;
        }

        let siblings = |field: &str| self.sibling(key, field, flat);
        let mut sample = MetricSample::new(name, number);
        sample.label_names.extend(fixed.names().iter().cloned());
        sample.label_values.extend(fixed.values().iter().cloned());
        sample
            .label_names
            .extend(rule_match.rule.label_names().map(str::to_string));
        sample.label_values.extend(rule_match.label_values(&siblings));

        Some(MatchedSample {
            help: rule_match
                .help()
                .unwrap_or(self.default_help.as_str())
                .to_string(),
            metric_type: rule_match.metric_type(),
            sample,
        })
    }

    fn sibling(&self, key: &str, field: &str, flat: Option<&FlatMap<'_>>) -> Option<String> {
        let flat = flat?;
        let sibling_key = match key.rsplit_once(self.delimiter.as_str()) {
            Some((parent, _)) => format!("{}{}{}", parent, self.delimiter, field),
            None => field.to_string(),
        };
        flat.get(&sibling_key).and_then(label_value)
    }

    /// Flatten a response and append every matched sample to `table`
    ///
    /// Returns the number of samples added.
    pub fn transform(&self, tree: &Value, fixed: &FixedLabels, table: &mut MetricTable) -> usize {
        let flat = flatten(tree, &self.delimiter);
        let mut added = 0;

        for (key, value) in flat.iter() {
            if let Some(matched) = self.match_in(key, value, fixed, Some(&flat)) {
                let outcome = table.add(&matched.help, matched.metric_type, matched.sample);
                if outcome == AddOutcome::Added {
                    added += 1;
                }
            }
        }

        debug!(
            entries = flat.len(),
            samples = added,
            "Transformed response"
        );
        added
    }
}
