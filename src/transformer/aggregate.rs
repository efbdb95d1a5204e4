//! Sample aggregation
//!
//! A [`MetricTable`] accumulates the samples of one scrape cycle grouped in
//! [`MetricFamily`] values. Families are created on their first sample and
//! only ever appended to. A sample is identified by its name and label
//! names/values; when the same identity shows up twice the first value
//! seen is kept.
//!
//! Two tables can disagree on the label schema of a family. On merge the
//! schema that sorts first wins and the other schema's samples are dropped,
//! so the surviving samples do not depend on merge order.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::time::Duration;

use tracing::warn;

use super::rules::MetricType;

/// Name of the per-cycle duration family
pub const SCRAPE_DURATION_NAME: &str = "solr_scrape_duration_seconds";

/// Help text of the per-cycle duration family
pub const SCRAPE_DURATION_HELP: &str = "Time this Solr scrape took, in seconds.";

/// A single numeric observation
///
/// Equality and hashing ignore the value: two samples are equal when their
/// name, label names and label values are equal.
#[derive(Debug, Clone)]
pub struct MetricSample {
    /// Metric name
    pub name: String,
    /// Label names, in family schema order
    pub label_names: Vec<String>,
    /// Label values, parallel to `label_names`
    pub label_values: Vec<String>,
    /// Sample value
    pub value: f64,
}

impl MetricSample {
    /// Create a sample without labels
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            label_names: Vec::new(),
            label_values: Vec::new(),
            value,
        }
    }

    /// Append a label
    pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.label_names.push(name.into());
        self.label_values.push(value.into());
        self
    }

    /// Iterate label name/value pairs
    pub fn labels(&self) -> impl Iterator<Item = (&str, &str)> {
        self.label_names
            .iter()
            .zip(&self.label_values)
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

impl PartialEq for MetricSample {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.label_names == other.label_names
            && self.label_values == other.label_values
    }
}

impl Eq for MetricSample {}

impl Hash for MetricSample {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.label_names.hash(state);
        self.label_values.hash(state);
    }
}

/// Outcome of adding a sample to a family or table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    /// The sample was appended
    Added,
    /// A sample with the same identity was already present
    Duplicate,
    /// The sample's label names differ from the family schema
    SchemaMismatch,
}

/// All samples sharing one metric name
#[derive(Debug, Clone)]
pub struct MetricFamily {
    /// Metric name
    pub name: String,
    /// Help text
    pub help: String,
    /// Metric type
    pub metric_type: MetricType,
    /// Label schema every sample follows
    pub label_names: Vec<String>,
    samples: Vec<MetricSample>,
    seen: HashSet<Vec<String>>,
}

impl MetricFamily {
    /// Create an empty family
    pub fn new(
        name: impl Into<String>,
        help: impl Into<String>,
        metric_type: MetricType,
        label_names: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            help: help.into(),
            metric_type,
            label_names,
            samples: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Samples in insertion order
    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the family has no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append a sample unless it is already present or breaks the schema
    pub fn add_sample(&mut self, sample: MetricSample) -> AddOutcome {
        if sample.name != self.name || sample.label_names != self.label_names {
            return AddOutcome::SchemaMismatch;
        }
        if !self.seen.insert(sample.label_values.clone()) {
            return AddOutcome::Duplicate;
        }
        self.samples.push(sample);
        AddOutcome::Added
    }
}

/// Per-cycle table of metric families, keyed by name in insertion order
#[derive(Debug, Clone, Default)]
pub struct MetricTable {
    families: Vec<MetricFamily>,
    index: HashMap<String, usize>,
}

impl MetricTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sample, creating its family on first occurrence
    ///
    /// `help` and `metric_type` are only used when the family is created.
    pub fn add(&mut self, help: &str, metric_type: MetricType, sample: MetricSample) -> AddOutcome {
        let index = match self.index.get(&sample.name) {
            Some(&i) => i,
            None => self.insert_family(MetricFamily::new(
                sample.name.clone(),
                help,
                metric_type,
                sample.label_names.clone(),
            )),
        };
        Self::add_to(&mut self.families[index], sample)
    }

    fn add_to(family: &mut MetricFamily, sample: MetricSample) -> AddOutcome {
        let schema = sample.label_names.clone();
        let outcome = family.add_sample(sample);
        if outcome == AddOutcome::SchemaMismatch {
            warn!(
                metric = %family.name,
                expected = ?family.label_names,
                actual = ?schema,
                "Sample label names differ from family schema, dropping sample"
            );
        }
        outcome
    }

    fn insert_family(&mut self, family: MetricFamily) -> usize {
        let i = self.families.len();
        self.index.insert(family.name.clone(), i);
        self.families.push(family);
        i
    }

    /// Look up a family by name
    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.index.get(name).map(|&i| &self.families[i])
    }

    /// Families in insertion order
    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    /// Number of families
    pub fn len(&self) -> usize {
        self.families.len()
    }

    /// Check if the table has no families
    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }

    /// Total number of samples across all families
    pub fn sample_count(&self) -> usize {
        self.families.iter().map(MetricFamily::len).sum()
    }

    /// Merge another table into this one
    ///
    /// Families unknown to `self` are inserted whole; for known families
    /// only samples not already present are appended. Existing values,
    /// help text and type are never overwritten. When both tables hold a
    /// family under different label schemas, the family whose schema sorts
    /// first is kept whole and the other one is dropped.
    pub fn merge(&mut self, other: MetricTable) {
        for family in other.families {
            let Some(&i) = self.index.get(&family.name) else {
                self.insert_family(family);
                continue;
            };
            let existing = &mut self.families[i];
            match family.label_names.cmp(&existing.label_names) {
                Ordering::Equal => {
                    for sample in family.samples {
                        Self::add_to(existing, sample);
                    }
                }
                Ordering::Less => {
                    schema_conflict(&family, existing);
                    *existing = family;
                }
                Ordering::Greater => schema_conflict(existing, &family),
            }
        }
    }

    /// Families that hold at least one sample
    pub fn into_families(self) -> Vec<MetricFamily> {
        self.families.into_iter().filter(|f| !f.is_empty()).collect()
    }

    /// Close a cycle: drop empty families and append the duration sample
    pub fn finish(self, elapsed: Duration) -> Vec<MetricFamily> {
        let mut families = self.into_families();
        families.retain(|f| {
            let reserved = f.name == SCRAPE_DURATION_NAME;
            if reserved {
                warn!(samples = f.len(), "Dropping samples that reuse the scrape duration name");
            }
            !reserved
        });
        let mut duration = scrape_duration_family();
        duration.add_sample(MetricSample::new(
            SCRAPE_DURATION_NAME,
            elapsed.as_secs_f64(),
        ));
        families.push(duration);
        families
    }

    /// Static description of the families every cycle emits
    pub fn describe() -> Vec<MetricFamily> {
        vec![scrape_duration_family()]
    }
}

fn schema_conflict(kept: &MetricFamily, dropped: &MetricFamily) {
    warn!(
        metric = %kept.name,
        kept = ?kept.label_names,
        dropped = ?dropped.label_names,
        dropped_samples = dropped.len(),
        "Conflicting label schemas for one metric, dropping samples"
    );
}

fn scrape_duration_family() -> MetricFamily {
    MetricFamily::new(
        SCRAPE_DURATION_NAME,
        SCRAPE_DURATION_HELP,
        MetricType::Gauge,
        Vec::new(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ping(core: &str, value: f64) -> MetricSample {
        MetricSample::new("solr_ping", value)
            .with_label("base_url", "http://localhost:8983/solr")
            .with_label("core", core)
    }

    fn table(samples: Vec<MetricSample>) -> MetricTable {
        let mut table = MetricTable::new();
        for sample in samples {
            table.add("help", MetricType::Gauge, sample);
        }
        table
    }

    fn canonical(table: &MetricTable) -> Vec<(String, Vec<String>, u64)> {
        let mut out: Vec<_> = table
            .families()
            .iter()
            .flat_map(|f| f.samples())
            .map(|s| (s.name.clone(), s.label_values.clone(), s.value.to_bits()))
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_sample_equality_ignores_value() {
        assert_eq!(ping("core1", 1.0), ping("core1", 0.0));
        assert_ne!(ping("core1", 1.0), ping("core2", 1.0));
    }

    #[test]
    fn test_family_created_on_first_sample() {
        let mut table = MetricTable::new();
        assert_eq!(
            table.add("Ping status", MetricType::Gauge, ping("core1", 1.0)),
            AddOutcome::Added
        );

        let family = table.family("solr_ping").unwrap();
        assert_eq!(family.help, "Ping status");
        assert_eq!(family.label_names, vec!["base_url", "core"]);
        assert_eq!(family.len(), 1);
    }

    #[test]
    fn test_duplicate_keeps_first_value() {
        let mut table = MetricTable::new();
        table.add("h", MetricType::Gauge, ping("core1", 1.0));
        assert_eq!(
            table.add("h", MetricType::Gauge, ping("core1", 0.0)),
            AddOutcome::Duplicate
        );
        assert_eq!(table.family("solr_ping").unwrap().samples()[0].value, 1.0);
    }

    #[test]
    fn test_schema_mismatch_rejected() {
        let mut table = MetricTable::new();
        table.add("h", MetricType::Gauge, ping("core1", 1.0));

        let other = MetricSample::new("solr_ping", 1.0).with_label("core", "core2");
        assert_eq!(
            table.add("h", MetricType::Gauge, other),
            AddOutcome::SchemaMismatch
        );
        assert_eq!(table.sample_count(), 1);
    }

    #[test]
    fn test_merge_first_seen_wins() {
        let mut a = table(vec![ping("core1", 1.0)]);
        let b = table(vec![ping("core1", 0.0), ping("core2", 0.0)]);

        a.merge(b);

        let family = a.family("solr_ping").unwrap();
        assert_eq!(family.len(), 2);
        assert_eq!(family.samples()[0].value, 1.0);
        assert_eq!(family.samples()[1].label_values[1], "core2");
    }

    #[test]
    fn test_merge_inserts_unknown_family() {
        let mut a = table(vec![ping("core1", 1.0)]);
        let mut b = MetricTable::new();
        b.add(
            "Documents",
            MetricType::Gauge,
            MetricSample::new("solr_core_index_num_docs", 42.0).with_label("core", "core1"),
        );

        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.family("solr_core_index_num_docs").unwrap().help, "Documents");
    }

    #[test]
    fn test_merge_associative() {
        let make = || {
            (
                table(vec![ping("a", 1.0), ping("b", 2.0)]),
                table(vec![ping("b", 3.0), ping("c", 4.0)]),
                table(vec![
                    ping("c", 5.0),
                    ping("d", 6.0),
                    MetricSample::new("solr_other", 7.0),
                ]),
            )
        };

        let (mut left, b, c) = make();
        left.merge(b);
        left.merge(c);

        let (mut right, mut b, c) = make();
        b.merge(c);
        right.merge(b);

        assert_eq!(canonical(&left), canonical(&right));
    }

    #[test]
    fn test_merge_commutative_on_identities() {
        let identities = |t: &MetricTable| {
            let mut ids: Vec<_> = canonical(t).into_iter().map(|(n, l, _)| (n, l)).collect();
            ids.sort();
            ids
        };

        let mut ab = table(vec![ping("a", 1.0), ping("b", 2.0)]);
        ab.merge(table(vec![ping("b", 9.0), ping("c", 3.0)]));

        let mut ba = table(vec![ping("b", 9.0), ping("c", 3.0)]);
        ba.merge(table(vec![ping("a", 1.0), ping("b", 2.0)]));

        assert_eq!(identities(&ab), identities(&ba));
    }

    #[test]
    fn test_finish_drops_empty_and_appends_duration() {
        let mut table = table(vec![ping("core1", 1.0)]);
        table.insert_family(MetricFamily::new("solr_empty", "", MetricType::Gauge, vec![]));

        let families = table.finish(Duration::from_millis(1500));
        let names: Vec<_> = families.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["solr_ping", SCRAPE_DURATION_NAME]);

        let duration = families.last().unwrap();
        assert_eq!(duration.help, SCRAPE_DURATION_HELP);
        assert_eq!(duration.metric_type, MetricType::Gauge);
        assert!(duration.label_names.is_empty());
        assert_eq!(duration.len(), 1);
        assert_eq!(duration.samples()[0].value, 1.5);
    }

    #[test]
    fn test_merge_schema_conflict_is_order_independent() {
        let docs = |value: f64, collection: Option<&str>| {
            let sample = MetricSample::new("solr_docs", value).with_label("base_url", "http://a");
            let sample = match collection {
                Some(c) => sample.with_label("collection", c),
                None => sample,
            };
            table(vec![sample])
        };

        let mut ab = docs(1.0, Some("films"));
        ab.merge(docs(2.0, None));
        let mut ba = docs(2.0, None);
        ba.merge(docs(1.0, Some("films")));

        for merged in [&ab, &ba] {
            let family = merged.family("solr_docs").unwrap();
            assert_eq!(family.label_names, vec!["base_url"]);
            assert_eq!(family.len(), 1);
            assert_eq!(family.samples()[0].value, 2.0);
        }
    }

    #[test]
    fn test_merge_schema_conflict_associative() {
        let one = |labels: &[&str], value: f64| {
            let mut sample = MetricSample::new("solr_docs", value);
            for label in labels {
                sample = sample.with_label(*label, "x");
            }
            table(vec![sample])
        };
        let make = || (one(&["core"], 1.0), one(&["base_url"], 2.0), one(&["base_url", "core"], 3.0));

        let (mut left, b, c) = make();
        left.merge(b);
        left.merge(c);

        let (mut right, mut b, c) = make();
        b.merge(c);
        right.merge(b);

        assert_eq!(canonical(&left), canonical(&right));
        assert_eq!(left.family("solr_docs").unwrap().label_names, vec!["base_url"]);
    }

    #[test]
    fn test_finish_keeps_single_duration_sample() {
        let table = table(vec![MetricSample::new(SCRAPE_DURATION_NAME, 99.0)]);

        let families = table.finish(Duration::from_secs(2));
        let durations: Vec<_> = families
            .iter()
            .filter(|f| f.name == SCRAPE_DURATION_NAME)
            .collect();
        assert_eq!(durations.len(), 1);
        assert_eq!(durations[0].len(), 1);
        assert_eq!(durations[0].samples()[0].value, 2.0);
    }

    #[test]
    fn test_finish_on_empty_table_still_has_duration() {
        let families = MetricTable::new().finish(Duration::ZERO);
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name, SCRAPE_DURATION_NAME);
        assert!(families[0].samples()[0].value >= 0.0);
    }

    #[test]
    fn test_describe() {
        let families = MetricTable::describe();
        assert_eq!(families.len(), 1);
        assert_eq!(families[0].name, SCRAPE_DURATION_NAME);
        assert!(families[0].is_empty());
    }
}
